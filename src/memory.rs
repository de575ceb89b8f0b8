use std::fmt;

use derivative::Derivative;
use serde::{Deserialize, Serialize};
use serde_big_array::BigArray;

use crate::error::ConfigError;

pub const PAGE_SIZE: usize = 0x2000;
pub const PAGE_SHIFT: u32 = 13;
pub const SLOT_COUNT: usize = 8;

/// Byte returned by the fake page standing in for absent hardware.
pub const UNMAPPED_BYTE: u8 = 0xFF;

/// Named page pools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BankId {
    /// Holds the single read-only fake page.
    Unmapped,
    Rom,
    Ram,
    /// Timex cartridge dock.
    Dock,
    /// Timex extension ROM.
    Exrom,
    /// ROM of a peripheral that pages itself over the system ROM.
    Overlay,
}

impl BankId {
    pub const ALL: [BankId; 6] = [
        BankId::Unmapped,
        BankId::Rom,
        BankId::Ram,
        BankId::Dock,
        BankId::Exrom,
        BankId::Overlay,
    ];

    fn index(self) -> usize {
        self as usize
    }
}

/// Handle to a page inside one of the pools. Slots hold these, never bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PageRef {
    pub bank: BankId,
    pub page: u16,
}

impl PageRef {
    pub const UNMAPPED: PageRef = PageRef {
        bank: BankId::Unmapped,
        page: 0,
    };

    pub const fn new(bank: BankId, page: u16) -> Self {
        Self { bank, page }
    }
}

impl fmt::Display for PageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}[{}]", self.bank, self.page)
    }
}

#[derive(Derivative, Clone, Serialize, Deserialize)]
#[derivative(Debug, PartialEq)]
pub struct MemoryPage {
    #[serde(with = "BigArray")]
    #[derivative(Debug = "ignore")]
    data: [u8; PAGE_SIZE],
    pub writable: bool,
    pub contended: bool,
    pub bank: BankId,
    pub page_number: u32,
    /// Offset of this page inside the 16 KiB bank it was split from.
    pub offset: u16,
}

impl MemoryPage {
    pub fn new(bank: BankId, page_number: u32, writable: bool) -> Self {
        Self {
            data: [UNMAPPED_BYTE; PAGE_SIZE],
            writable,
            contended: false,
            bank,
            page_number,
            offset: ((page_number as usize % 2) * PAGE_SIZE) as u16,
        }
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }
}

/// The 64 KiB address space as 8 slots of 8 KiB over shared page pools.
#[derive(Debug, Clone)]
pub struct MemoryMap {
    pools: [Vec<MemoryPage>; BankId::ALL.len()],
    slots: [PageRef; SLOT_COUNT],
}

impl Default for MemoryMap {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMap {
    pub fn new() -> Self {
        let mut pools: [Vec<MemoryPage>; BankId::ALL.len()] = Default::default();
        pools[BankId::Unmapped.index()].push(MemoryPage::new(BankId::Unmapped, 0, false));

        Self {
            pools,
            slots: [PageRef::UNMAPPED; SLOT_COUNT],
        }
    }

    /// Replace the pool for `bank` with `pages` fresh pages filled with 0xFF.
    /// RAM pages are writable, everything else starts read-only.
    pub fn allocate_pool(&mut self, bank: BankId, pages: usize) -> Result<(), ConfigError> {
        if bank == BankId::Unmapped {
            return Err(ConfigError::ReservedBank(bank));
        }

        let mut pool = Vec::new();
        pool.try_reserve_exact(pages)
            .map_err(|source| ConfigError::OutOfMemory { bank, source })?;
        pool.extend((0..pages).map(|n| MemoryPage::new(bank, n as u32, bank == BankId::Ram)));

        tracing::debug!("[MEMORY] Allocated {} pages in the {:?} pool", pages, bank);
        self.pools[bank.index()] = pool;

        // anything still pointing into the old pool must not dangle
        for slot in self.slots.iter_mut() {
            if slot.bank == bank && slot.page as usize >= pages {
                *slot = PageRef::UNMAPPED;
            }
        }
        Ok(())
    }

    pub fn pool(&self, bank: BankId) -> &[MemoryPage] {
        &self.pools[bank.index()]
    }

    pub fn pool_len(&self, bank: BankId) -> usize {
        self.pools[bank.index()].len()
    }

    /// Replace a pool's pages wholesale, used when restoring snapshots.
    pub(crate) fn replace_pool(&mut self, bank: BankId, pages: Vec<MemoryPage>) {
        self.pools[bank.index()] = pages;
    }

    pub fn page(&self, page: PageRef) -> Option<&MemoryPage> {
        self.pools[page.bank.index()].get(page.page as usize)
    }

    pub fn page_mut(&mut self, page: PageRef) -> Option<&mut MemoryPage> {
        if page.bank == BankId::Unmapped {
            return None;
        }
        self.pools[page.bank.index()].get_mut(page.page as usize)
    }

    pub fn contains(&self, page: PageRef) -> bool {
        self.page(page).is_some()
    }

    pub fn set_contended(&mut self, page: PageRef, contended: bool) -> Result<(), ConfigError> {
        self.existing_page_mut(page)?.contended = contended;
        Ok(())
    }

    pub fn set_writable(&mut self, page: PageRef, writable: bool) -> Result<(), ConfigError> {
        self.existing_page_mut(page)?.writable = writable;
        Ok(())
    }

    fn existing_page_mut(&mut self, page: PageRef) -> Result<&mut MemoryPage, ConfigError> {
        self.page_mut(page).ok_or(ConfigError::NoSuchPage {
            bank: page.bank,
            page: page.page as usize,
        })
    }

    /// Copy an image into consecutive pages of a pool starting at
    /// `first_page`. A short final page keeps its remaining bytes.
    pub fn load(&mut self, bank: BankId, first_page: usize, image: &[u8]) -> Result<(), ConfigError> {
        let pages = image.len().div_ceil(PAGE_SIZE);
        if bank == BankId::Unmapped || first_page + pages > self.pool_len(bank) {
            return Err(ConfigError::ImageTooLarge {
                bank,
                len: image.len(),
            });
        }

        for (n, chunk) in image.chunks(PAGE_SIZE).enumerate() {
            let page = &mut self.pools[bank.index()][first_page + n];
            page.data[..chunk.len()].copy_from_slice(chunk);
        }
        tracing::debug!(
            "[MEMORY] Loaded {} bytes into {:?} from page {}",
            image.len(),
            bank,
            first_page
        );
        Ok(())
    }

    /// Fill every page of a pool, e.g. clearing RAM on reset.
    pub fn fill(&mut self, bank: BankId, value: u8) {
        if bank == BankId::Unmapped {
            return;
        }
        for page in self.pools[bank.index()].iter_mut() {
            page.data.fill(value);
        }
    }

    /// Install a page into one of the 8 slots.
    pub fn map_slot(&mut self, slot: usize, page: PageRef) {
        if slot >= SLOT_COUNT || !self.contains(page) {
            debug_assert!(false, "invalid mapping of {} into slot {}", page, slot);
            tracing::error!("[MEMORY] Invalid mapping of {} into slot {}", page, slot);
            return;
        }
        if self.slots[slot] != page {
            tracing::trace!("[MEMORY] Slot {} -> {}", slot, page);
        }
        self.slots[slot] = page;
    }

    pub fn slot(&self, slot: usize) -> PageRef {
        self.slots[slot]
    }

    pub fn slots(&self) -> [PageRef; SLOT_COUNT] {
        self.slots
    }

    fn resolve(&self, address: u16) -> &MemoryPage {
        let slot = self.slots[(address >> PAGE_SHIFT) as usize];
        self.page(slot)
            .unwrap_or(&self.pools[BankId::Unmapped.index()][0])
    }

    pub fn read(&self, address: u16) -> u8 {
        self.resolve(address).data[address as usize & (PAGE_SIZE - 1)]
    }

    /// Writes to read-only pages are dropped, as on real ROM.
    pub fn write(&mut self, address: u16, value: u8) {
        let slot = self.slots[(address >> PAGE_SHIFT) as usize];
        match self.page_mut(slot) {
            Some(page) if page.writable => {
                page.data[address as usize & (PAGE_SIZE - 1)] = value;
            }
            _ => tracing::trace!(
                "[MEMORY] Ignored write to read-only {:#06X} = {:02X}",
                address,
                value
            ),
        }
    }

    /// Side-effect-free read for debuggers.
    pub fn peek(&self, address: u16) -> u8 {
        self.read(address)
    }

    pub fn is_contended(&self, address: u16) -> bool {
        self.resolve(address).contended
    }
}
