// Floppy drive mechanics: head positioning, motor, index hole and the
// byte currently under the head

use serde::{Deserialize, Serialize};

use crate::{
    bus::BusContext,
    disk::{DiskImage, DD_TRACK_LENGTH},
    error::FddError,
    event::EventKind,
};

pub const MAX_CYLINDERS: u8 = 99;

/// Value returned when no byte is transferred (no disk, motor stopped,
/// head not loaded).
pub const NO_DATA: u16 = 0x0100;

/// Width of the index pulse.
const INDEX_PULSE_MS: u32 = 4;
/// Time between index pulses, 300 rpm minus the pulse.
const INDEX_GAP_MS: u32 = 196;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriveType {
    /// Head load is driven by the controller.
    Shugart,
    /// Head loads whenever the drive is selected.
    Pc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MotorState {
    Off,
    SpinningUp,
    Ready,
    SpinningDown,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepDirection {
    /// Towards the spindle, higher cylinders.
    In,
    /// Towards cylinder 0.
    Out,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transfer {
    Read,
    /// Low byte is data; a non-zero high byte writes a clock mark.
    Write(u16),
}

/// Mechanical state saved in snapshots. The disk itself is not included.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveSnapshot {
    pub cylinder: u8,
    pub head: u8,
    pub selected: bool,
    pub motor: MotorState,
    pub loaded: bool,
    pub index: bool,
    pub position: usize,
}

#[derive(Debug)]
pub struct Drive {
    id: usize,
    kind: DriveType,
    cylinders: u8,
    heads: u8,

    cylinder: u8,
    head: u8,
    selected: bool,
    motor: MotorState,
    loaded: bool,
    index: bool,
    position: usize,

    disk: Option<DiskImage>,
}

impl Drive {
    pub fn new(id: usize, kind: DriveType, cylinders: u8, heads: u8) -> Result<Self, FddError> {
        if !(1..=2).contains(&heads) || !(1..=MAX_CYLINDERS).contains(&cylinders) {
            tracing::warn!(
                "[FDD] Drive {} rejected geometry {} cylinders x {} heads",
                id,
                cylinders,
                heads
            );
            return Err(FddError::InvalidGeometry);
        }

        Ok(Self {
            id,
            kind,
            cylinders,
            heads,
            cylinder: 0,
            head: 0,
            selected: false,
            motor: MotorState::Off,
            loaded: false,
            index: false,
            position: 0,
            disk: None,
        })
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn kind(&self) -> DriveType {
        self.kind
    }

    pub fn cylinders(&self) -> u8 {
        self.cylinders
    }

    pub fn heads(&self) -> u8 {
        self.heads
    }

    pub fn insert(&mut self, image: DiskImage) -> Result<(), FddError> {
        let geometry = image.geometry();
        if geometry.sides > self.heads || geometry.cylinders > self.cylinders {
            tracing::warn!(
                "[FDD] Drive {} cannot take a {} cylinder {} sided disk",
                self.id,
                geometry.cylinders,
                geometry.sides
            );
            return Err(FddError::InvalidGeometry);
        }

        tracing::info!("[FDD] Disk inserted in drive {}", self.id);
        self.disk = Some(image);
        self.position = 0;
        Ok(())
    }

    /// Remove the disk. Unflushed writes stay in the returned image.
    pub fn eject(&mut self) -> Option<DiskImage> {
        let disk = self.disk.take();
        if disk.is_some() {
            tracing::info!("[FDD] Disk ejected from drive {}", self.id);
        }
        disk
    }

    pub fn disk(&self) -> Option<&DiskImage> {
        self.disk.as_ref()
    }

    pub fn disk_mut(&mut self) -> Option<&mut DiskImage> {
        self.disk.as_mut()
    }

    pub fn has_disk(&self) -> bool {
        self.disk.is_some()
    }

    pub fn select(&mut self, selected: bool) {
        self.selected = selected;
        if self.kind == DriveType::Pc {
            self.loaded = selected;
        }
    }

    pub fn is_selected(&self) -> bool {
        self.selected
    }

    pub fn step(&mut self, direction: StepDirection) {
        match direction {
            StepDirection::In if self.cylinder + 1 < self.cylinders => self.cylinder += 1,
            StepDirection::Out if self.cylinder > 0 => self.cylinder -= 1,
            _ => {}
        }
        tracing::trace!("[FDD] Drive {} at cylinder {}", self.id, self.cylinder);
    }

    pub fn cylinder(&self) -> u8 {
        self.cylinder
    }

    pub fn track_zero(&self) -> bool {
        self.cylinder == 0
    }

    pub fn set_head(&mut self, head: u8) {
        if head < self.heads {
            self.head = head;
        } else {
            tracing::trace!("[FDD] Drive {} has no head {}", self.id, head);
        }
    }

    pub fn head(&self) -> u8 {
        self.head
    }

    pub fn head_load(&mut self, loaded: bool) {
        if self.kind == DriveType::Shugart {
            self.loaded = loaded;
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn motor(&self) -> MotorState {
        self.motor
    }

    /// Motor at speed with a disk in.
    pub fn is_ready(&self) -> bool {
        self.motor == MotorState::Ready && self.disk.is_some()
    }

    pub fn index(&self) -> bool {
        self.index
    }

    pub fn write_protected(&self) -> bool {
        self.disk
            .as_ref()
            .map(DiskImage::is_write_protected)
            .unwrap_or(false)
    }

    pub fn track_length(&self) -> usize {
        self.disk
            .as_ref()
            .map(DiskImage::track_length)
            .unwrap_or(DD_TRACK_LENGTH)
    }

    pub fn rotation(&self) -> usize {
        self.position
    }

    pub fn set_rotation(&mut self, position: usize) {
        self.position = position % self.track_length();
    }

    fn cancel_events(&self, kind: EventKind, ctx: &mut BusContext) {
        let id = self.id;
        ctx.events
            .cancel_matching(|e| e.kind == kind && e.payload == Some(id));
    }

    /// Start or stop the spindle. Spin-up takes one revolution, the
    /// controller notices spin-down after two.
    pub fn motor_on(&mut self, on: bool, ctx: &mut BusContext) {
        let next = match (on, self.motor) {
            (true, MotorState::Off | MotorState::SpinningDown) => MotorState::SpinningUp,
            (false, MotorState::Ready | MotorState::SpinningUp) => MotorState::SpinningDown,
            _ => return,
        };

        let revolutions = if on { 1 } else { 2 };
        let when = ctx.tstates + ctx.timings.revolution() * revolutions;
        self.cancel_events(EventKind::FddMotor, ctx);
        if let Err(e) = ctx.events.schedule(when, EventKind::FddMotor, Some(self.id)) {
            tracing::error!("[FDD] Drive {} motor event lost: {}", self.id, e);
            return;
        }

        tracing::debug!(
            "[FDD] Drive {} motor {:?} -> {:?} until {}",
            self.id,
            self.motor,
            next,
            when
        );
        self.motor = next;
    }

    /// The motor finished a transition. Returns false for a stale event.
    pub fn event_motor(&mut self, time: u32, ctx: &mut BusContext) -> bool {
        match self.motor {
            MotorState::SpinningUp => {
                self.motor = MotorState::Ready;
                self.index = false;
                self.cancel_events(EventKind::FddIndex, ctx);
                let when = time + ctx.timings.ms_to_tstates(INDEX_GAP_MS);
                if let Err(e) = ctx.events.schedule(when, EventKind::FddIndex, Some(self.id)) {
                    tracing::error!("[FDD] Drive {} index event lost: {}", self.id, e);
                }
            }
            MotorState::SpinningDown => {
                self.motor = MotorState::Off;
                self.index = false;
                self.cancel_events(EventKind::FddIndex, ctx);
            }
            MotorState::Off | MotorState::Ready => return false,
        }
        tracing::debug!("[FDD] Drive {} motor {:?}", self.id, self.motor);
        true
    }

    /// Toggle the index sensor and schedule the next edge. `None` if the
    /// disk is not spinning.
    pub fn event_index(&mut self, last_time: u32, ctx: &mut BusContext) -> Option<bool> {
        if self.motor != MotorState::Ready {
            return None;
        }

        self.index = !self.index;
        let wait = if self.index {
            INDEX_PULSE_MS
        } else {
            INDEX_GAP_MS
        };
        let when = last_time + ctx.timings.ms_to_tstates(wait);
        if let Err(e) = ctx.events.schedule(when, EventKind::FddIndex, Some(self.id)) {
            tracing::error!("[FDD] Drive {} index event lost: {}", self.id, e);
        }
        Some(self.index)
    }

    /// Move the disk one byte under the head, reading or writing it.
    pub fn read_write_byte(&mut self, transfer: Transfer) -> Result<u16, FddError> {
        let track_length = self.track_length();
        if self.position >= track_length {
            self.position = 0;
        }
        let position = self.position;
        self.position += 1;

        if !(self.selected && self.loaded && self.motor == MotorState::Ready) {
            return Ok(NO_DATA);
        }
        let (cylinder, head) = (self.cylinder, self.head);
        let Some(disk) = self.disk.as_mut() else {
            return Ok(NO_DATA);
        };

        match transfer {
            Transfer::Read => Ok(disk.read_byte(cylinder, head, position)),
            Transfer::Write(_) if disk.is_write_protected() => Err(FddError::ReadOnly),
            Transfer::Write(value) => {
                disk.write_byte(cylinder, head, position, value);
                Ok(value)
            }
        }
    }

    pub fn snapshot(&self) -> DriveSnapshot {
        DriveSnapshot {
            cylinder: self.cylinder,
            head: self.head,
            selected: self.selected,
            motor: self.motor,
            loaded: self.loaded,
            index: self.index,
            position: self.position,
        }
    }

    pub fn restore(&mut self, state: &DriveSnapshot) {
        self.cylinder = state.cylinder.min(self.cylinders - 1);
        self.head = state.head.min(self.heads - 1);
        self.selected = state.selected;
        self.motor = state.motor;
        self.loaded = state.loaded;
        self.index = state.index;
        self.position = state.position;
    }
}
