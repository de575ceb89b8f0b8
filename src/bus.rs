use std::{cell::RefCell, fmt, rc::Rc};

use serde::{Deserialize, Serialize};

use crate::{
    clock::MachineTimings,
    error::{ConfigError, SnapshotError},
    event::EventQueue,
    memory::MemoryMap,
    paging::{self, PagingState},
};

/// Decoding rule: a port matches when `port & mask == value`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortRule {
    pub mask: u16,
    pub value: u16,
    pub read: bool,
    pub write: bool,
}

impl PortRule {
    pub const fn new(mask: u16, value: u16) -> Self {
        Self {
            mask,
            value,
            read: true,
            write: true,
        }
    }

    pub const fn read_only(mask: u16, value: u16) -> Self {
        Self {
            mask,
            value,
            read: true,
            write: false,
        }
    }

    pub const fn write_only(mask: u16, value: u16) -> Self {
        Self {
            mask,
            value,
            read: false,
            write: true,
        }
    }

    pub fn matches(&self, port: u16) -> bool {
        port & self.mask == self.value
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeripheralId(pub usize);

impl fmt::Display for PeripheralId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Interrupt request lines sampled by the CPU before each instruction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterruptLines {
    /// Frame interrupt from the ULA.
    pub ula: bool,
    /// Any peripheral wired to the CPU's INT pin.
    pub peripheral: bool,
}

impl InterruptLines {
    pub fn asserted(&self) -> bool {
        self.ula || self.peripheral
    }
}

/// Everything a peripheral may touch while handling I/O or an event.
pub struct BusContext<'a> {
    pub tstates: u32,
    pub timings: MachineTimings,
    pub memory: &'a mut MemoryMap,
    pub paging: &'a mut PagingState,
    pub events: &'a mut EventQueue,
    pub interrupts: &'a mut InterruptLines,
    pub ports: &'a mut PortDispatcher,
}

impl<'a> BusContext<'a> {
    /// Recompute the page table after a change to the paging state.
    pub fn remap(&mut self) {
        paging::apply(self.paging, self.memory);
    }
}

/// A device attached to the I/O bus.
pub trait Peripheral {
    fn name(&self) -> &'static str;

    fn reset(&mut self, _ctx: &mut BusContext) {}

    /// `None` when the device does not drive the data bus for this port.
    fn read(&mut self, _port: u16, _ctx: &mut BusContext) -> Option<u8> {
        None
    }

    fn write(&mut self, _port: u16, _value: u8, _ctx: &mut BusContext) {}

    /// Side-effect-free read for debuggers.
    /// Side-effect free view of `read`, given the current paging.
    fn peek(&self, _port: u16, _paging: &PagingState) -> Option<u8> {
        None
    }

    fn save_state(&self) -> Option<serde_json::Value> {
        None
    }

    /// Reject a saved state `load_state` would fail on, without touching
    /// the device.
    fn check_state(&self, _state: &serde_json::Value) -> Result<(), SnapshotError> {
        Ok(())
    }

    fn load_state(&mut self, _state: &serde_json::Value) -> Result<(), SnapshotError> {
        Ok(())
    }
}

pub type PeripheralRef = Rc<RefCell<dyn Peripheral>>;

struct Registration {
    id: PeripheralId,
    rules: Vec<PortRule>,
    active: bool,
    peripheral: PeripheralRef,
}

/// Routes port accesses to every active peripheral with a matching rule.
#[derive(Default)]
pub struct PortDispatcher {
    registrations: Vec<Registration>,
    recording: Option<Vec<u8>>,
}

impl fmt::Debug for PortDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PortDispatcher")
            .field("peripherals", &self.registrations.len())
            .field("recording", &self.recording.as_ref().map(Vec::len))
            .finish()
    }
}

impl PortDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, rules: Vec<PortRule>, peripheral: PeripheralRef) -> PeripheralId {
        let id = PeripheralId(self.registrations.len());
        tracing::info!(
            "[BUS] Registered {} as {} with {} port rules",
            peripheral.borrow().name(),
            id,
            rules.len()
        );
        self.registrations.push(Registration {
            id,
            rules,
            active: true,
            peripheral,
        });
        id
    }

    pub fn set_active(&mut self, id: PeripheralId, active: bool) -> Result<(), ConfigError> {
        let registration = self
            .registrations
            .get_mut(id.0)
            .ok_or(ConfigError::UnknownPeripheral(id.0))?;
        if registration.active != active {
            tracing::debug!(
                "[BUS] Peripheral {} {}",
                id,
                if active { "activated" } else { "deactivated" }
            );
        }
        registration.active = active;
        Ok(())
    }

    pub fn is_active(&self, id: PeripheralId) -> bool {
        self.registrations
            .get(id.0)
            .map(|r| r.active)
            .unwrap_or(false)
    }

    /// Drop every registration, e.g. when switching machine type.
    pub fn clear_all(&mut self) {
        tracing::debug!("[BUS] Clearing {} peripherals", self.registrations.len());
        self.registrations.clear();
    }

    pub fn len(&self) -> usize {
        self.registrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.registrations.is_empty()
    }

    /// Every registration as `(id, active, peripheral)`, in registration order.
    pub fn peripherals(&self) -> impl Iterator<Item = (PeripheralId, bool, &PeripheralRef)> {
        self.registrations
            .iter()
            .map(|r| (r.id, r.active, &r.peripheral))
    }

    fn matching(&self, port: u16, want_read: bool) -> Vec<PeripheralRef> {
        self.registrations
            .iter()
            .filter(|r| r.active)
            .flat_map(|r| {
                r.rules
                    .iter()
                    .filter(move |rule| {
                        rule.matches(port) && if want_read { rule.read } else { rule.write }
                    })
                    .map(move |_| Rc::clone(&r.peripheral))
            })
            .collect()
    }

    /// Read a port. Returns `None` if no peripheral drove the bus.
    ///
    /// The list of matching rules is taken before any handler runs, so a
    /// handler may register or deactivate peripherals without affecting
    /// this access.
    pub fn read(ctx: &mut BusContext, port: u16) -> Option<u8> {
        let targets = ctx.ports.matching(port, true);
        let mut result: Option<u8> = None;

        for peripheral in targets {
            let Ok(mut device) = peripheral.try_borrow_mut() else {
                tracing::error!("[BUS] Re-entrant read of port {:#06X}", port);
                continue;
            };
            if let Some(value) = device.read(port, ctx) {
                tracing::trace!("[BUS] {} read {:#06X} = {:02X}", device.name(), port, value);
                result = Some(result.unwrap_or(0xFF) & value);
            }
        }
        result
    }

    pub fn write(ctx: &mut BusContext, port: u16, value: u8) {
        let targets = ctx.ports.matching(port, false);
        if targets.is_empty() {
            tracing::trace!("[BUS] Write to unattached port {:#06X} = {:02X}", port, value);
        }

        for peripheral in targets {
            let Ok(mut device) = peripheral.try_borrow_mut() else {
                tracing::error!("[BUS] Re-entrant write of port {:#06X}", port);
                continue;
            };
            tracing::trace!("[BUS] {} write {:#06X} = {:02X}", device.name(), port, value);
            device.write(port, value, ctx);
        }
    }

    /// AND-combined debugger view of a port, without side effects.
    pub fn peek(&self, port: u16, paging: &PagingState) -> Option<u8> {
        self.matching(port, true)
            .iter()
            .filter_map(|p| p.try_borrow().ok().and_then(|d| d.peek(port, paging)))
            .reduce(|acc, value| acc & value)
    }

    pub fn reset_all(ctx: &mut BusContext) {
        let all: Vec<PeripheralRef> = ctx
            .ports
            .registrations
            .iter()
            .map(|r| Rc::clone(&r.peripheral))
            .collect();
        for peripheral in all {
            if let Ok(mut device) = peripheral.try_borrow_mut() {
                device.reset(ctx);
            }
        }
    }

    pub fn start_recording(&mut self) {
        tracing::debug!("[BUS] Input recording started");
        self.recording = Some(Vec::new());
    }

    pub fn stop_recording(&mut self) -> Option<Vec<u8>> {
        let captured = self.recording.take();
        if let Some(bytes) = &captured {
            tracing::debug!("[BUS] Input recording stopped after {} bytes", bytes.len());
        }
        captured
    }

    pub fn is_recording(&self) -> bool {
        self.recording.is_some()
    }

    /// Append a resolved port read to the capture buffer, if recording.
    pub fn record(&mut self, value: u8) {
        if let Some(bytes) = self.recording.as_mut() {
            bytes.push(value);
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::machine::MachineType;

    pub(crate) struct TestBus {
        pub memory: MemoryMap,
        pub paging: PagingState,
        pub events: EventQueue,
        pub interrupts: InterruptLines,
        pub ports: PortDispatcher,
        pub tstates: u32,
    }

    impl TestBus {
        pub fn new() -> Self {
            Self {
                memory: MemoryMap::new(),
                paging: PagingState::new(MachineType::Spectrum48),
                events: EventQueue::new(),
                interrupts: InterruptLines::default(),
                ports: PortDispatcher::new(),
                tstates: 0,
            }
        }

        pub fn ctx(&mut self) -> BusContext<'_> {
            BusContext {
                tstates: self.tstates,
                timings: MachineTimings::SPECTRUM_48,
                memory: &mut self.memory,
                paging: &mut self.paging,
                events: &mut self.events,
                interrupts: &mut self.interrupts,
                ports: &mut self.ports,
            }
        }
    }

    struct Fixed {
        value: Option<u8>,
        writes: Vec<(u16, u8)>,
    }

    impl Peripheral for Fixed {
        fn name(&self) -> &'static str {
            "fixed"
        }

        fn read(&mut self, _port: u16, _ctx: &mut BusContext) -> Option<u8> {
            self.value
        }

        fn write(&mut self, port: u16, value: u8, _ctx: &mut BusContext) {
            self.writes.push((port, value));
        }

        fn peek(&self, _port: u16, _paging: &PagingState) -> Option<u8> {
            self.value
        }
    }

    fn fixed(value: Option<u8>) -> Rc<RefCell<Fixed>> {
        Rc::new(RefCell::new(Fixed {
            value,
            writes: Vec::new(),
        }))
    }

    #[test]
    fn test_reads_are_and_combined() {
        let mut bus = TestBus::new();
        bus.ports
            .register(vec![PortRule::new(0x00FF, 0x1F)], fixed(Some(0xF0)));
        bus.ports
            .register(vec![PortRule::new(0x0001, 0x01)], fixed(Some(0x3C)));

        assert_eq!(PortDispatcher::read(&mut bus.ctx(), 0x001F), Some(0x30));
        assert_eq!(PortDispatcher::read(&mut bus.ctx(), 0x0003), Some(0x3C));
        assert_eq!(PortDispatcher::read(&mut bus.ctx(), 0x0002), None);
        assert_eq!(bus.ports.peek(0x001F, &bus.paging), Some(0x30));
    }

    #[test]
    fn test_unattached_rule_does_not_drive_bus() {
        let mut bus = TestBus::new();
        bus.ports.register(vec![PortRule::new(0, 0)], fixed(None));
        assert_eq!(PortDispatcher::read(&mut bus.ctx(), 0x1234), None);
    }

    #[test]
    fn test_inactive_peripheral_is_skipped() {
        let mut bus = TestBus::new();
        let device = fixed(Some(0x00));
        let id = bus.ports.register(vec![PortRule::new(0, 0)], device.clone());
        bus.ports.set_active(id, false).unwrap();

        assert_eq!(PortDispatcher::read(&mut bus.ctx(), 0xFE), None);
        PortDispatcher::write(&mut bus.ctx(), 0xFE, 0x07);
        assert!(device.borrow().writes.is_empty());
        assert!(matches!(
            bus.ports.set_active(PeripheralId(9), true),
            Err(ConfigError::UnknownPeripheral(9))
        ));
    }

    #[test]
    fn test_write_only_rule() {
        let mut bus = TestBus::new();
        let device = fixed(Some(0x55));
        bus.ports
            .register(vec![PortRule::write_only(0x8002, 0)], device.clone());

        assert_eq!(PortDispatcher::read(&mut bus.ctx(), 0x7FFD), None);
        PortDispatcher::write(&mut bus.ctx(), 0x7FFD, 0x10);
        assert_eq!(device.borrow().writes, vec![(0x7FFD, 0x10)]);
    }
}
