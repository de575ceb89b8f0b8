use std::{
    cell::{Ref, RefCell, RefMut},
    fmt,
    ops::ControlFlow,
    rc::Rc,
};

use serde::{Deserialize, Serialize};

use crate::{
    beta::{self, BetaDisk, TRIGGER_PAGE},
    bus::{BusContext, InterruptLines, PeripheralId, PeripheralRef, PortDispatcher, PortRule},
    clock::{Clock, MachineTimings},
    config::{BetaConfig, DriveConfig, MachineConfig},
    disk::DiskImage,
    error::{ConfigError, SchedulingError, SnapshotError},
    event::{Event, EventKind, EventQueue},
    fdd::Drive,
    memory::{BankId, MemoryMap, PageRef, PAGE_SIZE},
    paging::{self, PagingState, Spectrum128Paging, TimexPaging},
    psg::{self, Ay38912},
    snapshot::{PeripheralSnapshot, PoolSnapshot, Snapshot},
    ula::{self, Ula},
    utils::hexdump,
};

/// 16 KiB RAM banks fitted to every model; the 48K only maps three.
const RAM_BANKS: usize = 8;
/// Chunks of the Timex DOCK and EXROM cartridge spaces.
const CARTRIDGE_PAGES: usize = 8;
/// The Beta 128 ROM covers 0x0000-0x3FFF.
const OVERLAY_PAGES: usize = 2;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineType {
    #[default]
    Spectrum48,
    Spectrum128,
    Tc2048,
    Pentagon,
}

impl MachineType {
    pub fn timings(&self) -> MachineTimings {
        match self {
            MachineType::Spectrum48 => MachineTimings::SPECTRUM_48,
            MachineType::Spectrum128 => MachineTimings::SPECTRUM_128,
            MachineType::Tc2048 => MachineTimings::TC2048,
            MachineType::Pentagon => MachineTimings::PENTAGON,
        }
    }

    /// 8 KiB ROM pages: one 16 KiB ROM, or the 128K editor and BASIC pair.
    pub fn rom_pages(&self) -> usize {
        match self {
            MachineType::Spectrum48 | MachineType::Tc2048 => 2,
            MachineType::Spectrum128 | MachineType::Pentagon => 4,
        }
    }

    pub fn has_ay(&self) -> bool {
        matches!(self, MachineType::Spectrum128 | MachineType::Pentagon)
    }

    pub fn has_cartridge(&self) -> bool {
        *self == MachineType::Tc2048
    }

    /// Whether the ULA shares the bus of this 16 KiB RAM bank.
    pub fn is_contended_bank(&self, bank: usize) -> bool {
        match self {
            MachineType::Spectrum48 | MachineType::Tc2048 => bank == 5,
            MachineType::Spectrum128 => bank % 2 == 1,
            MachineType::Pentagon => false,
        }
    }
}

impl fmt::Display for MachineType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MachineType::Spectrum48 => "ZX Spectrum 48K",
            MachineType::Spectrum128 => "ZX Spectrum 128K",
            MachineType::Tc2048 => "Timex TC2048",
            MachineType::Pentagon => "Pentagon 128",
        };
        f.write_str(name)
    }
}

pub struct Machine {
    model: MachineType,
    clock: Clock,
    events: EventQueue,
    memory: MemoryMap,
    ports: PortDispatcher,
    paging: PagingState,
    interrupts: InterruptLines,
    ula: Rc<RefCell<Ula>>,
    ay: Option<Rc<RefCell<Ay38912>>>,
    beta: Option<(PeripheralId, Rc<RefCell<BetaDisk>>)>,
    rom: Vec<u8>,
    beta_rom: Option<Vec<u8>>,
    stopped: bool,
}

impl fmt::Debug for Machine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Machine")
            .field("model", &self.model)
            .field("clock", &self.clock)
            .field("paging", &self.paging)
            .field("interrupts", &self.interrupts)
            .field("ports", &self.ports)
            .field("events", &self.events.len())
            .finish()
    }
}

impl Machine {
    pub fn new(model: MachineType) -> Result<Self, ConfigError> {
        MachineBuilder::new().machine(model).build()
    }

    pub fn model(&self) -> MachineType {
        self.model
    }

    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    pub fn tstates(&self) -> u32 {
        self.clock.tstates()
    }

    pub fn timings(&self) -> MachineTimings {
        *self.clock.timings()
    }

    pub fn frame_count(&self) -> u64 {
        self.clock.frame_count()
    }

    pub fn events(&self) -> &EventQueue {
        &self.events
    }

    pub fn memory(&self) -> &MemoryMap {
        &self.memory
    }

    pub fn memory_mut(&mut self) -> &mut MemoryMap {
        &mut self.memory
    }

    pub fn ports(&self) -> &PortDispatcher {
        &self.ports
    }

    pub fn ports_mut(&mut self) -> &mut PortDispatcher {
        &mut self.ports
    }

    pub fn paging(&self) -> &PagingState {
        &self.paging
    }

    pub fn interrupts(&self) -> InterruptLines {
        self.interrupts
    }

    pub fn ula(&self) -> Ref<'_, Ula> {
        self.ula.borrow()
    }

    pub fn ula_mut(&self) -> RefMut<'_, Ula> {
        self.ula.borrow_mut()
    }

    pub fn ay(&self) -> Option<Ref<'_, Ay38912>> {
        self.ay.as_ref().map(|ay| ay.borrow())
    }

    pub fn beta(&self) -> Option<Ref<'_, BetaDisk>> {
        self.beta.as_ref().map(|(_, beta)| beta.borrow())
    }

    pub fn beta_mut(&self) -> Option<RefMut<'_, BetaDisk>> {
        self.beta.as_ref().map(|(_, beta)| beta.borrow_mut())
    }

    pub fn beta_id(&self) -> Option<PeripheralId> {
        self.beta.as_ref().map(|(id, _)| *id)
    }

    pub fn key_down(&mut self, code: &str) {
        self.ula.borrow_mut().keyboard_mut().key_down(code);
    }

    pub fn key_up(&mut self, code: &str) {
        self.ula.borrow_mut().keyboard_mut().key_up(code);
    }

    fn bus_at(&mut self, tstates: u32) -> BusContext<'_> {
        BusContext {
            tstates,
            timings: *self.clock.timings(),
            memory: &mut self.memory,
            paging: &mut self.paging,
            events: &mut self.events,
            interrupts: &mut self.interrupts,
            ports: &mut self.ports,
        }
    }

    /// Advance the clock by `cycles` tstates of uncontended CPU time.
    pub fn advance(&mut self, cycles: u32) {
        self.clock.advance(cycles);
    }

    /// Fire every event due at the current tstate.
    ///
    /// Returns `Break` when a breakpoint fired; the remaining due events
    /// stay queued for the next call.
    pub fn pump(&mut self) -> ControlFlow<()> {
        while let Some(event) = self.events.pop_due(self.clock.tstates()) {
            if self.dispatch(event).is_break() {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Let `cycles` tstates pass without CPU activity, firing events as
    /// they fall due.
    pub fn idle(&mut self, cycles: u32) -> ControlFlow<()> {
        let mut remaining = cycles;
        loop {
            if self.pump().is_break() {
                return ControlFlow::Break(());
            }
            if remaining == 0 {
                return ControlFlow::Continue(());
            }
            let now = self.clock.tstates();
            let step = self
                .events
                .next_time()
                .map_or(remaining, |time| time.saturating_sub(now).clamp(1, remaining));
            self.clock.advance(step);
            remaining -= step;
        }
    }

    /// Run until the next frame interrupt.
    pub fn run_frame(&mut self) -> ControlFlow<()> {
        let frame = self.clock.frame_count();
        while self.clock.frame_count() == frame {
            let step = self.clock.cycles_until_frame_end().max(1);
            if self.idle(step).is_break() {
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn dispatch(&mut self, event: Event) -> ControlFlow<()> {
        match event.kind {
            EventKind::Null => {}
            EventKind::Frame => self.frame(),
            EventKind::InterruptEnd => self.interrupts.ula = false,
            EventKind::Breakpoint => {
                tracing::info!("[MACHINE] Breakpoint at {}", event.time);
                self.stopped = true;
                return ControlFlow::Break(());
            }
            EventKind::FdcCommand => self.with_beta(event, |beta, ctx| beta.event_fdc(ctx)),
            EventKind::FddMotor | EventKind::FddIndex => {
                let Some(id) = event.payload else {
                    tracing::error!("[MACHINE] {} event without a drive", event.kind);
                    return ControlFlow::Continue(());
                };
                let time = event.time;
                if event.kind == EventKind::FddMotor {
                    self.with_beta(event, |beta, ctx| beta.event_motor(id, time, ctx));
                } else {
                    self.with_beta(event, |beta, ctx| beta.event_index(id, time, ctx));
                }
            }
        }
        ControlFlow::Continue(())
    }

    fn with_beta(&mut self, event: Event, handler: impl FnOnce(&mut BetaDisk, &mut BusContext)) {
        let Some((_, beta)) = self.beta.clone() else {
            tracing::trace!("[MACHINE] Dropping {} event, no disk interface", event.kind);
            return;
        };
        let Ok(mut device) = beta.try_borrow_mut() else {
            tracing::error!("[MACHINE] Disk interface busy during {} event", event.kind);
            return;
        };
        let mut ctx = self.bus_at(event.time);
        handler(&mut device, &mut ctx);
    }

    fn frame(&mut self) {
        let frame_length = self.clock.timings().frame_length();
        self.events.rebase(frame_length);
        self.clock.wrap_frame();
        tracing::trace!("[MACHINE] Frame {}", self.clock.frame_count());
        if let Err(e) = self.start_frame() {
            tracing::error!("[MACHINE] Frame events lost: {}", e);
        }
    }

    /// Raise the frame interrupt and schedule its end and the next frame.
    fn start_frame(&mut self) -> Result<(), SchedulingError> {
        let timings = *self.clock.timings();
        self.interrupts.ula = true;
        self.events
            .schedule(timings.interrupt_length, EventKind::InterruptEnd, None)?;
        self.events
            .schedule(timings.frame_length(), EventKind::Frame, None)?;
        Ok(())
    }

    /// Stop the next pump at `time` tstates into the current frame.
    pub fn add_breakpoint(&mut self, time: u32) -> Result<(), SchedulingError> {
        tracing::debug!("[MACHINE] Breakpoint set at {}", time);
        self.events.schedule(time, EventKind::Breakpoint, None)
    }

    pub fn clear_breakpoints(&mut self) {
        self.events.cancel_kind(EventKind::Breakpoint);
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn resume(&mut self) {
        self.stopped = false;
    }

    /// Level of the CPU's INT pin, sampled before each instruction.
    pub fn interrupt_pending(&self) -> bool {
        self.interrupts.asserted()
    }

    /// A memory read cycle: contention, then 3 tstates.
    pub fn read_memory(&mut self, address: u16) -> u8 {
        if self.memory.is_contended(address) {
            self.clock.contend();
        }
        self.clock.advance(3);
        self.memory.read(address)
    }

    /// A memory write cycle: contention, then 3 tstates.
    pub fn write_memory(&mut self, address: u16, value: u8) {
        if self.memory.is_contended(address) {
            self.clock.contend();
        }
        self.clock.advance(3);
        self.memory.write(address, value);
    }

    /// Internal CPU cycles that keep `address` on the bus without a memory
    /// request; each one is contended separately.
    pub fn contend_memory(&mut self, address: u16, cycles: u32) {
        let contended = self.memory.is_contended(address);
        for _ in 0..cycles {
            if contended {
                self.clock.contend();
            }
            self.clock.advance(1);
        }
    }

    /// First tstate of an I/O cycle, contended when the port's high byte
    /// addresses contended memory.
    fn contend_port_early(&mut self, port: u16) {
        if self.memory.is_contended(port) {
            self.clock.contend();
        }
        self.clock.advance(1);
    }

    /// Remaining 3 tstates of an I/O cycle.
    fn contend_port_late(&mut self, port: u16) {
        if self.clock.timings().port_from_ula(port) {
            self.clock.contend();
            self.clock.advance(3);
        } else if self.memory.is_contended(port) {
            for _ in 0..3 {
                self.clock.contend();
                self.clock.advance(1);
            }
        } else {
            self.clock.advance(3);
        }
    }

    pub fn read_port(&mut self, port: u16) -> u8 {
        self.contend_port_early(port);
        self.contend_port_late(port);

        let tstates = self.clock.tstates();
        let attached = PortDispatcher::read(&mut self.bus_at(tstates), port);
        let value = attached.unwrap_or_else(|| self.floating_bus());
        self.ports.record(value);
        value
    }

    pub fn write_port(&mut self, port: u16, value: u8) {
        self.contend_port_early(port);
        self.contend_port_late(port);

        let tstates = self.clock.tstates();
        PortDispatcher::write(&mut self.bus_at(tstates), port, value);
    }

    /// Byte left on the data bus when nothing answers a port read: whatever
    /// the ULA is fetching from the screen at this tstate.
    pub fn floating_bus(&self) -> u8 {
        if self.model == MachineType::Pentagon {
            return 0xFF;
        }
        let Some((line, column)) = self.clock.timings().screen_position(self.clock.tstates()) else {
            return 0xFF;
        };

        // bitmap, attribute, bitmap + 1, attribute + 1, then 4 idle tstates
        let phase = column % 8;
        if phase >= 4 {
            return 0xFF;
        }
        let x = (column / 8 * 2 + phase / 2) as usize;
        let y = line as usize;
        let offset = if phase % 2 == 0 {
            ((y & 0xC0) << 5) | ((y & 0x07) << 8) | ((y & 0x38) << 2) | x
        } else {
            0x1800 + (y / 8) * 32 + x
        };

        self.memory
            .page(self.paging.screen_page())
            .map_or(0xFF, |page| page.data()[offset])
    }

    /// Page the disk interface ROM in or out for an instruction fetch at `pc`.
    pub fn check_rom_paging(&mut self, pc: u16) {
        let Some(id) = self.beta_id() else {
            return;
        };
        if !self.ports.is_active(id) {
            return;
        }

        let paged = self.paging.romcs;
        let page_in = !paged && pc & 0xFF00 == TRIGGER_PAGE && self.paging.basic_rom_selected();
        let page_out = paged && pc >= 0x4000;
        if page_in || page_out {
            let tstates = self.clock.tstates();
            BetaDisk::set_paged(page_in, &mut self.bus_at(tstates));
        }
    }

    pub fn peek(&self, address: u16) -> u8 {
        self.memory.peek(address)
    }

    pub fn peek_port(&self, port: u16) -> u8 {
        self.ports.peek(port, &self.paging).unwrap_or_else(|| self.floating_bus())
    }

    pub fn memory_dump(&self, start: u16, end: u16) -> String {
        let bytes: Vec<u8> = (start..=end).map(|address| self.memory.peek(address)).collect();
        hexdump(&bytes, start)
    }

    pub fn register_peripheral(&mut self, rules: Vec<PortRule>, peripheral: PeripheralRef) -> PeripheralId {
        self.ports.register(rules, peripheral)
    }

    pub fn set_peripheral_active(&mut self, id: PeripheralId, active: bool) -> Result<(), ConfigError> {
        self.ports.set_active(id, active)
    }

    pub fn insert_disk(&mut self, drive: usize, image: DiskImage) -> Result<(), ConfigError> {
        let mut beta = self.beta_mut().ok_or(ConfigError::NoDiskInterface)?;
        beta.insert(drive, image)
    }

    pub fn eject_disk(&mut self, drive: usize) -> Result<Option<DiskImage>, ConfigError> {
        let mut beta = self.beta_mut().ok_or(ConfigError::NoDiskInterface)?;
        beta.eject(drive)
    }

    pub fn reset(&mut self) {
        tracing::info!("[MACHINE] Reset {}", self.model);
        self.clock.reset();
        self.events.clear();
        self.interrupts = InterruptLines::default();
        self.stopped = false;
        self.paging.reset();
        paging::apply(&self.paging, &mut self.memory);

        PortDispatcher::reset_all(&mut self.bus_at(0));
        if let Err(e) = self.start_frame() {
            tracing::error!("[MACHINE] Frame events lost on reset: {}", e);
        }
    }

    /// Rebuild the machine for a new configuration. ROM images are kept when
    /// they still fit and disks move to the same drive number if it exists.
    pub fn reconfigure(&mut self, config: &MachineConfig) -> Result<(), ConfigError> {
        let mut builder = MachineBuilder::from_config(config);
        if self.rom.len() <= config.machine.rom_pages() * PAGE_SIZE {
            builder.rom(&self.rom);
        } else {
            tracing::warn!(
                "[MACHINE] {} byte ROM does not fit a {}",
                self.rom.len(),
                config.machine
            );
        }
        if let Some(rom) = &self.beta_rom {
            builder.beta_rom(rom);
        }
        let mut machine = builder.build()?;

        if let Some(mut old) = self.beta_mut() {
            let count = old.drives().len();
            for n in 0..count {
                if let Ok(Some(image)) = old.eject(n) {
                    if let Err(e) = machine.insert_disk(n, image) {
                        tracing::warn!("[MACHINE] Disk in drive {} dropped: {}", n, e);
                    }
                }
            }
        }

        tracing::info!("[MACHINE] Reconfigured {} -> {}", self.model, machine.model);
        self.ports.clear_all();
        *self = machine;
        Ok(())
    }

    pub fn snapshot(&self) -> Snapshot {
        let pools = BankId::ALL
            .into_iter()
            .filter(|bank| *bank != BankId::Unmapped)
            .map(|bank| PoolSnapshot {
                bank,
                pages: self.memory.pool(bank).to_vec(),
            })
            .collect();

        let peripherals = self
            .ports
            .peripherals()
            .map(|(_, active, peripheral)| {
                let device = peripheral.borrow();
                PeripheralSnapshot {
                    name: device.name().to_string(),
                    active,
                    state: device.save_state(),
                }
            })
            .collect();

        Snapshot {
            machine: self.model,
            tstates: self.clock.tstates(),
            frame_count: self.clock.frame_count(),
            paging: self.paging,
            slots: self.memory.slots(),
            pools,
            interrupts: self.interrupts,
            events: self.events.events(),
            peripherals,
        }
    }

    /// Restore a snapshot taken from a machine with the same configuration.
    /// The snapshot is checked against this machine before anything changes.
    pub fn restore(&mut self, snapshot: &Snapshot) -> Result<(), SnapshotError> {
        if snapshot.machine != self.model {
            return Err(SnapshotError::MachineMismatch {
                expected: self.model.to_string(),
                found: snapshot.machine.to_string(),
            });
        }
        for pool in &snapshot.pools {
            let expected = self.memory.pool_len(pool.bank);
            if pool.bank == BankId::Unmapped || pool.pages.len() != expected {
                return Err(SnapshotError::PoolMismatch {
                    bank: pool.bank,
                    expected,
                    found: pool.pages.len(),
                });
            }
        }

        let attached: Vec<(PeripheralId, PeripheralRef)> = self
            .ports
            .peripherals()
            .map(|(id, _, peripheral)| (id, Rc::clone(peripheral)))
            .collect();
        if attached.len() != snapshot.peripherals.len() {
            return Err(SnapshotError::PeripheralMismatch(format!(
                "{} saved, {} attached",
                snapshot.peripherals.len(),
                attached.len()
            )));
        }
        for ((_, peripheral), saved) in attached.iter().zip(&snapshot.peripherals) {
            let device = peripheral.borrow();
            if device.name() != saved.name {
                return Err(SnapshotError::PeripheralMismatch(format!(
                    "expected {}, found {}",
                    device.name(),
                    saved.name
                )));
            }
            if let Some(state) = &saved.state {
                device.check_state(state)?;
            }
        }

        for pool in &snapshot.pools {
            self.memory.replace_pool(pool.bank, pool.pages.clone());
        }
        for (slot, page) in snapshot.slots.iter().enumerate() {
            let page = if self.memory.contains(*page) {
                *page
            } else {
                PageRef::UNMAPPED
            };
            self.memory.map_slot(slot, page);
        }
        self.paging = snapshot.paging;
        self.clock.set_tstates(snapshot.tstates);
        self.clock.set_frame_count(snapshot.frame_count);
        self.interrupts = snapshot.interrupts;
        self.events = EventQueue::from_events(snapshot.events.iter().copied());
        self.stopped = false;

        for ((id, peripheral), saved) in attached.iter().zip(&snapshot.peripherals) {
            self.ports
                .set_active(*id, saved.active)
                .map_err(|e| SnapshotError::PeripheralMismatch(e.to_string()))?;
            if let Some(state) = &saved.state {
                peripheral.borrow_mut().load_state(state)?;
            }
        }

        tracing::info!(
            "[MACHINE] Restored snapshot at frame {} tstate {}",
            snapshot.frame_count,
            snapshot.tstates
        );
        Ok(())
    }
}

#[derive(Debug, Clone, Default)]
pub struct MachineBuilder {
    model: MachineType,
    rom: Vec<u8>,
    beta_rom: Option<Vec<u8>>,
    beta: Option<BetaConfig>,
    ay: Option<bool>,
}

impl MachineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &MachineConfig) -> Self {
        Self {
            model: config.machine,
            beta: config.beta.clone(),
            ay: config.ay,
            ..Default::default()
        }
    }

    pub fn machine(&mut self, model: MachineType) -> &mut Self {
        self.model = model;
        self
    }

    pub fn rom(&mut self, data: &[u8]) -> &mut Self {
        self.rom = data.to_vec();
        self
    }

    pub fn beta_rom(&mut self, data: &[u8]) -> &mut Self {
        self.beta_rom = Some(data.to_vec());
        self
    }

    pub fn with_beta(&mut self, intrq_to_cpu: bool) -> &mut Self {
        self.beta.get_or_insert_with(BetaConfig::default).intrq_to_cpu = intrq_to_cpu;
        self
    }

    /// Attach another drive to the disk interface, enabling it if needed.
    pub fn drive(&mut self, drive: DriveConfig) -> &mut Self {
        self.beta
            .get_or_insert_with(BetaConfig::default)
            .drives
            .push(drive);
        self
    }

    pub fn with_ay(&mut self, present: bool) -> &mut Self {
        self.ay = Some(present);
        self
    }

    pub fn build(&self) -> Result<Machine, ConfigError> {
        let model = self.model;
        tracing::info!("[MACHINE] Building {}", model);

        let mut memory = MemoryMap::new();
        memory.allocate_pool(BankId::Rom, model.rom_pages())?;
        memory.allocate_pool(BankId::Ram, RAM_BANKS * 2)?;
        if model.has_cartridge() {
            memory.allocate_pool(BankId::Dock, CARTRIDGE_PAGES)?;
            memory.allocate_pool(BankId::Exrom, CARTRIDGE_PAGES)?;
        }
        if !self.rom.is_empty() {
            memory.load(BankId::Rom, 0, &self.rom)?;
        }
        for bank in (0..RAM_BANKS).filter(|bank| model.is_contended_bank(*bank)) {
            for page in [bank * 2, bank * 2 + 1] {
                memory.set_contended(PageRef::new(BankId::Ram, page as u16), true)?;
            }
        }

        let paging = PagingState::new(model);
        let mut ports = PortDispatcher::new();

        let ula = Rc::new(RefCell::new(Ula::new()));
        ports.register(ula::port_rules(), ula.clone());

        match model {
            MachineType::Spectrum128 | MachineType::Pentagon => {
                ports.register(
                    vec![PortRule::write_only(0x8002, 0x0000)],
                    Rc::new(RefCell::new(Spectrum128Paging::new())),
                );
            }
            MachineType::Tc2048 => {
                ports.register(
                    vec![PortRule::new(0x00FF, 0x00F4), PortRule::new(0x00FF, 0x00FF)],
                    Rc::new(RefCell::new(TimexPaging::new())),
                );
            }
            MachineType::Spectrum48 => {}
        }

        let ay = if self.ay.unwrap_or_else(|| model.has_ay()) {
            let ay = Rc::new(RefCell::new(Ay38912::new()));
            ports.register(psg::port_rules(), ay.clone());
            Some(ay)
        } else {
            None
        };

        let beta = match &self.beta {
            Some(config) => {
                memory.allocate_pool(BankId::Overlay, OVERLAY_PAGES)?;
                match &self.beta_rom {
                    Some(rom) => memory.load(BankId::Overlay, 0, rom)?,
                    None => tracing::warn!("[MACHINE] Disk interface has no ROM"),
                }

                let drives = if config.drives.is_empty() {
                    vec![DriveConfig::default()]
                } else {
                    config.drives.clone()
                };
                let drives = drives
                    .iter()
                    .enumerate()
                    .map(|(id, d)| Drive::new(id, d.kind, d.cylinders, d.heads))
                    .collect::<Result<Vec<_>, _>>()?;

                let device = Rc::new(RefCell::new(BetaDisk::new(drives, config.intrq_to_cpu)?));
                let id = ports.register(beta::port_rules(), device.clone());
                Some((id, device))
            }
            None => {
                if self.beta_rom.is_some() {
                    tracing::warn!("[MACHINE] Ignoring disk ROM without a disk interface");
                }
                None
            }
        };

        paging::apply(&paging, &mut memory);

        let mut machine = Machine {
            model,
            clock: Clock::new(model.timings()),
            events: EventQueue::new(),
            memory,
            ports,
            paging,
            interrupts: InterruptLines::default(),
            ula,
            ay,
            beta,
            rom: self.rom.clone(),
            beta_rom: self.beta_rom.clone(),
            stopped: false,
        };
        machine.start_frame()?;
        Ok(machine)
    }
}
