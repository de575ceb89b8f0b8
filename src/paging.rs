use serde::{Deserialize, Serialize};

use crate::{
    bus::{BusContext, Peripheral},
    error::SnapshotError,
    machine::MachineType,
    memory::{BankId, MemoryMap, PageRef},
};

/// Decoded bank-switching registers of every paging device on the machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagingState {
    pub model: MachineType,
    /// 16 KiB ROM bank at 0x0000.
    pub rom_bank: u8,
    /// 16 KiB RAM bank at 0xC000.
    pub ram_bank: u8,
    /// RAM bank the ULA displays (5 or 7).
    pub screen_bank: u8,
    /// 0x7FFD bit 5: further writes are ignored until reset.
    pub locked: bool,
    /// A peripheral ROM is paged over 0x0000-0x3FFF.
    pub romcs: bool,
    /// Timex horizontal select register; bit n moves slot n to the cartridge.
    pub hsr: u8,
    /// Timex DEC bit 7: cartridge slots come from EXROM rather than DOCK.
    pub exrom: bool,
}

impl PagingState {
    pub fn new(model: MachineType) -> Self {
        Self {
            model,
            rom_bank: 0,
            ram_bank: 0,
            screen_bank: 5,
            locked: false,
            romcs: false,
            hsr: 0,
            exrom: false,
        }
    }

    pub fn reset(&mut self) {
        *self = Self::new(self.model);
    }

    /// True when the 48K BASIC ROM is the one at 0x0000.
    pub fn basic_rom_selected(&self) -> bool {
        match self.model {
            MachineType::Spectrum128 | MachineType::Pentagon => self.rom_bank == 1,
            MachineType::Spectrum48 | MachineType::Tc2048 => true,
        }
    }

    /// RAM page holding the bitmap and attributes the ULA displays.
    pub fn screen_page(&self) -> PageRef {
        PageRef::new(BankId::Ram, self.screen_bank as u16 * 2)
    }
}

/// Rebuild all 8 slots from the paging registers.
///
/// The home ROM/RAM layout goes in first, Timex cartridge chunks replace
/// slots selected by the HSR, and a paged peripheral ROM wins over both.
pub fn apply(state: &PagingState, memory: &mut MemoryMap) {
    let mut slots = [PageRef::UNMAPPED; 8];

    let rom = state.rom_bank as u16 * 2;
    slots[0] = existing(memory, PageRef::new(BankId::Rom, rom));
    slots[1] = existing(memory, PageRef::new(BankId::Rom, rom + 1));

    let banks = [5, 2, state.ram_bank as u16];
    for (n, bank) in banks.iter().enumerate() {
        slots[2 + n * 2] = existing(memory, PageRef::new(BankId::Ram, bank * 2));
        slots[3 + n * 2] = existing(memory, PageRef::new(BankId::Ram, bank * 2 + 1));
    }

    if state.hsr != 0 {
        let cartridge = if state.exrom {
            BankId::Exrom
        } else {
            BankId::Dock
        };
        for (n, slot) in slots.iter_mut().enumerate() {
            if state.hsr & (1 << n) != 0 {
                // absent chunks read as the fake page
                *slot = existing(memory, PageRef::new(cartridge, n as u16));
            }
        }
    }

    if state.romcs && memory.pool_len(BankId::Overlay) >= 2 {
        slots[0] = PageRef::new(BankId::Overlay, 0);
        slots[1] = PageRef::new(BankId::Overlay, 1);
    }

    for (n, page) in slots.into_iter().enumerate() {
        memory.map_slot(n, page);
    }
}

fn existing(memory: &MemoryMap, page: PageRef) -> PageRef {
    if memory.contains(page) {
        page
    } else {
        PageRef::UNMAPPED
    }
}

/// 128K memory control port at 0x7FFD.
#[derive(Debug, Default)]
pub struct Spectrum128Paging {
    last_value: u8,
}

impl Spectrum128Paging {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Serialize, Deserialize)]
struct LastValue {
    last_value: u8,
}

impl Peripheral for Spectrum128Paging {
    fn name(&self) -> &'static str {
        "128k paging"
    }

    fn reset(&mut self, _ctx: &mut BusContext) {
        self.last_value = 0;
    }

    fn write(&mut self, _port: u16, value: u8, ctx: &mut BusContext) {
        if ctx.paging.locked {
            tracing::trace!("[PAGING] Ignored 0x7FFD write {:02X}, paging is locked", value);
            return;
        }

        self.last_value = value;
        ctx.paging.ram_bank = value & 0x07;
        ctx.paging.screen_bank = if value & 0x08 != 0 { 7 } else { 5 };
        ctx.paging.rom_bank = (value >> 4) & 0x01;
        ctx.paging.locked = value & 0x20 != 0;
        tracing::debug!(
            "[PAGING] 0x7FFD = {:02X}: RAM {} screen {} ROM {}{}",
            value,
            ctx.paging.ram_bank,
            ctx.paging.screen_bank,
            ctx.paging.rom_bank,
            if ctx.paging.locked { " (locked)" } else { "" }
        );
        ctx.remap();
    }

    fn save_state(&self) -> Option<serde_json::Value> {
        serde_json::to_value(LastValue {
            last_value: self.last_value,
        })
        .ok()
    }

    fn check_state(&self, state: &serde_json::Value) -> Result<(), SnapshotError> {
        LastValue::deserialize(state)?;
        Ok(())
    }

    fn load_state(&mut self, state: &serde_json::Value) -> Result<(), SnapshotError> {
        let saved: LastValue = serde_json::from_value(state.clone())?;
        self.last_value = saved.last_value;
        Ok(())
    }
}

/// Timex TC2048 HSR (0xF4) and DEC (0xFF) registers.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct TimexPaging {
    dec: u8,
}

impl TimexPaging {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dec(&self) -> u8 {
        self.dec
    }
}

impl Peripheral for TimexPaging {
    fn name(&self) -> &'static str {
        "timex paging"
    }

    fn reset(&mut self, _ctx: &mut BusContext) {
        self.dec = 0;
    }

    fn read(&mut self, port: u16, ctx: &mut BusContext) -> Option<u8> {
        match port & 0xFF {
            0xF4 => Some(ctx.paging.hsr),
            0xFF => Some(self.dec),
            _ => None,
        }
    }

    fn write(&mut self, port: u16, value: u8, ctx: &mut BusContext) {
        match port & 0xFF {
            0xF4 => {
                tracing::debug!("[PAGING] HSR = {:08b}", value);
                ctx.paging.hsr = value;
            }
            0xFF => {
                tracing::debug!("[PAGING] DEC = {:02X}", value);
                self.dec = value;
                ctx.paging.exrom = value & 0x80 != 0;
            }
            _ => return,
        }
        ctx.remap();
    }

    fn peek(&self, port: u16, _paging: &PagingState) -> Option<u8> {
        (port & 0xFF == 0xFF).then_some(self.dec)
    }

    fn save_state(&self) -> Option<serde_json::Value> {
        serde_json::to_value(self).ok()
    }

    fn check_state(&self, state: &serde_json::Value) -> Result<(), SnapshotError> {
        TimexPaging::deserialize(state)?;
        Ok(())
    }

    fn load_state(&mut self, state: &serde_json::Value) -> Result<(), SnapshotError> {
        *self = serde_json::from_value(state.clone())?;
        Ok(())
    }
}
