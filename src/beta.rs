// Beta 128 disk interface: a WD1793, up to four drives and a ROM that
// pages itself over the system ROM

use serde::{Deserialize, Serialize};

use crate::{
    bus::{BusContext, Peripheral, PortRule},
    disk::DiskImage,
    error::{ConfigError, SnapshotError},
    fdc::Fdc,
    fdd::{Drive, DriveSnapshot},
    paging::PagingState,
};

pub const MAX_DRIVES: usize = 4;

/// Address range whose execution pages the interface ROM in.
pub const TRIGGER_PAGE: u16 = 0x3D00;

const SYSTEM_PORT: u16 = 0xFF;

/// Decoded ports: command/status, track, sector, data and the system register.
pub fn port_rules() -> Vec<PortRule> {
    [0x1Fu16, 0x3F, 0x5F, 0x7F, SYSTEM_PORT]
        .into_iter()
        .map(|port| PortRule::new(0x00FF, port))
        .collect()
}

fn fdc_register(port: u16) -> Option<u8> {
    match port & 0xFF {
        0x1F => Some(0),
        0x3F => Some(1),
        0x5F => Some(2),
        0x7F => Some(3),
        _ => None,
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct BetaState {
    fdc: Fdc,
    system: u8,
    current: usize,
    drives: Vec<DriveSnapshot>,
}

#[derive(Debug)]
pub struct BetaDisk {
    fdc: Fdc,
    drives: Vec<Drive>,
    current: usize,
    system: u8,
}

impl BetaDisk {
    pub fn new(drives: Vec<Drive>, intrq_to_cpu: bool) -> Result<Self, ConfigError> {
        if drives.is_empty() || drives.len() > MAX_DRIVES {
            return Err(ConfigError::InvalidDrive(drives.len()));
        }
        tracing::info!(
            "[BETA] Interface with {} drives, INTRQ {}",
            drives.len(),
            if intrq_to_cpu { "wired to CPU" } else { "on port only" }
        );

        Ok(Self {
            fdc: Fdc::new(intrq_to_cpu),
            drives,
            current: 0,
            system: 0,
        })
    }

    pub fn fdc(&self) -> &Fdc {
        &self.fdc
    }

    pub fn drives(&self) -> &[Drive] {
        &self.drives
    }

    pub fn drive(&self, n: usize) -> Option<&Drive> {
        self.drives.get(n)
    }

    pub fn drive_mut(&mut self, n: usize) -> Option<&mut Drive> {
        self.drives.get_mut(n)
    }

    pub fn current_drive(&self) -> usize {
        self.current
    }

    pub fn insert(&mut self, n: usize, image: DiskImage) -> Result<(), ConfigError> {
        let drive = self
            .drives
            .get_mut(n)
            .ok_or(ConfigError::InvalidDrive(n))?;
        drive.insert(image)?;
        Ok(())
    }

    pub fn eject(&mut self, n: usize) -> Result<Option<DiskImage>, ConfigError> {
        let drive = self
            .drives
            .get_mut(n)
            .ok_or(ConfigError::InvalidDrive(n))?;
        Ok(drive.eject())
    }

    /// Select one drive; its motor starts and every other motor stops.
    pub fn select_drive(&mut self, n: usize, ctx: &mut BusContext) {
        if n >= self.drives.len() {
            tracing::trace!("[BETA] No drive {}, keeping drive {}", n, self.current);
            return;
        }
        if n != self.current {
            tracing::debug!("[BETA] Drive {} selected", n);
        }
        self.current = n;
        for (id, drive) in self.drives.iter_mut().enumerate() {
            drive.select(id == n);
            drive.motor_on(id == n, ctx);
        }
    }

    /// Page the interface ROM in or out.
    pub fn set_paged(paged: bool, ctx: &mut BusContext) {
        if ctx.paging.romcs != paged {
            tracing::trace!("[BETA] ROM paged {}", if paged { "in" } else { "out" });
            ctx.paging.romcs = paged;
            ctx.remap();
        }
    }

    fn write_system(&mut self, value: u8, ctx: &mut BusContext) {
        tracing::debug!("[BETA] System register {:02X}", value);
        self.system = value;

        if value & 0x04 == 0 {
            self.fdc.reset(ctx);
        }
        let side = if value & 0x10 != 0 { 0 } else { 1 };
        self.fdc.set_side(side);
        for drive in self.drives.iter_mut() {
            drive.set_head(side);
        }
        self.select_drive((value & 0x03) as usize, ctx);
    }

    fn read_system(&self) -> u8 {
        let mut value = 0;
        if self.fdc.intrq() {
            value |= 0x80;
        }
        if self.fdc.drq() {
            value |= 0x40;
        }
        value
    }

    fn parse_state(&self, state: &serde_json::Value) -> Result<BetaState, SnapshotError> {
        let state = BetaState::deserialize(state)?;
        if state.drives.len() != self.drives.len() || state.current >= self.drives.len() {
            return Err(SnapshotError::InvalidState {
                name: self.name().to_string(),
                reason: format!(
                    "{} drives saved, {} attached",
                    state.drives.len(),
                    self.drives.len()
                ),
            });
        }
        Ok(state)
    }

    pub fn event_fdc(&mut self, ctx: &mut BusContext) {
        let drive = &mut self.drives[self.current];
        self.fdc.event(drive, ctx);
    }

    pub fn event_motor(&mut self, id: usize, time: u32, ctx: &mut BusContext) {
        match self.drives.get_mut(id) {
            Some(drive) => {
                drive.event_motor(time, ctx);
            }
            None => tracing::trace!("[BETA] Motor event for missing drive {}", id),
        }
    }

    pub fn event_index(&mut self, id: usize, time: u32, ctx: &mut BusContext) {
        let Some(drive) = self.drives.get_mut(id) else {
            tracing::trace!("[BETA] Index event for missing drive {}", id);
            return;
        };
        if let Some(index) = drive.event_index(time, ctx) {
            if id == self.current {
                self.fdc.index_pulse(index, drive, ctx);
            }
        }
    }
}

impl Peripheral for BetaDisk {
    fn name(&self) -> &'static str {
        "beta 128"
    }

    fn reset(&mut self, ctx: &mut BusContext) {
        self.fdc.reset(ctx);
        self.system = 0;
        self.current = 0;
        for drive in self.drives.iter_mut() {
            drive.select(false);
            drive.motor_on(false, ctx);
        }
        Self::set_paged(false, ctx);
    }

    fn read(&mut self, port: u16, ctx: &mut BusContext) -> Option<u8> {
        if !ctx.paging.romcs {
            return None;
        }
        match fdc_register(port) {
            Some(register) => {
                let drive = &mut self.drives[self.current];
                Some(self.fdc.read_register(register, drive, ctx))
            }
            None => Some(self.read_system()),
        }
    }

    fn write(&mut self, port: u16, value: u8, ctx: &mut BusContext) {
        if !ctx.paging.romcs {
            return;
        }
        match fdc_register(port) {
            Some(register) => {
                let drive = &mut self.drives[self.current];
                self.fdc.write_register(register, value, drive, ctx);
            }
            None => self.write_system(value, ctx),
        }
    }

    fn peek(&self, port: u16, paging: &PagingState) -> Option<u8> {
        if !paging.romcs {
            return None;
        }
        match fdc_register(port) {
            Some(register) => Some(self.fdc.peek_register(register, &self.drives[self.current])),
            None => Some(self.read_system()),
        }
    }

    fn save_state(&self) -> Option<serde_json::Value> {
        let state = BetaState {
            fdc: self.fdc.clone(),
            system: self.system,
            current: self.current,
            drives: self.drives.iter().map(Drive::snapshot).collect(),
        };
        serde_json::to_value(state).ok()
    }

    fn check_state(&self, state: &serde_json::Value) -> Result<(), SnapshotError> {
        self.parse_state(state)?;
        Ok(())
    }

    fn load_state(&mut self, state: &serde_json::Value) -> Result<(), SnapshotError> {
        let state = self.parse_state(state)?;
        self.fdc = state.fdc;
        self.system = state.system;
        self.current = state.current;
        for (drive, saved) in self.drives.iter_mut().zip(&state.drives) {
            drive.restore(saved);
        }
        Ok(())
    }
}
