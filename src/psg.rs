use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::{
    bus::{BusContext, Peripheral, PortRule},
    error::SnapshotError,
    paging::PagingState,
};

/// Bits each register actually stores.
const REGISTER_MASKS: [u8; 16] = [
    0xFF, 0x0F, 0xFF, 0x0F, 0xFF, 0x0F, 0x1F, 0xFF, 0x1F, 0x1F, 0x1F, 0xFF, 0xFF, 0x0F, 0xFF, 0xFF,
];

/// Register select / data read at 0xFFFD, data write at 0xBFFD.
pub fn port_rules() -> Vec<PortRule> {
    vec![
        PortRule::new(0xC002, 0xC000),
        PortRule::write_only(0xC002, 0x8000),
    ]
}

/// AY-3-8912 register file. Sound generation lives with the audio backend.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct Ay38912 {
    registers: [u8; 16],
    selected_register: u8,
}

impl Ay38912 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registers(&self) -> &[u8; 16] {
        &self.registers
    }

    pub fn selected_register(&self) -> u8 {
        self.selected_register
    }

    fn select(&mut self, data: u8) {
        trace!("[PSG] Selecting register {:02X}", data);
        self.selected_register = data & 0x0F;
    }

    fn write_data(&mut self, data: u8) {
        let register = self.selected_register as usize;
        trace!("[PSG] Writing {:02X} to register {:02X}", data, register);
        self.registers[register] = data & REGISTER_MASKS[register];
    }

    fn read_data(&self) -> u8 {
        self.registers[self.selected_register as usize]
    }
}

impl Peripheral for Ay38912 {
    fn name(&self) -> &'static str {
        "ay-3-8912"
    }

    fn reset(&mut self, _ctx: &mut BusContext) {
        self.registers = [0; 16];
        self.selected_register = 0;
    }

    fn read(&mut self, _port: u16, _ctx: &mut BusContext) -> Option<u8> {
        Some(self.read_data())
    }

    fn write(&mut self, port: u16, value: u8, _ctx: &mut BusContext) {
        if port & 0x4000 != 0 {
            self.select(value);
        } else {
            self.write_data(value);
        }
    }

    fn peek(&self, _port: u16, _paging: &PagingState) -> Option<u8> {
        Some(self.read_data())
    }

    fn save_state(&self) -> Option<serde_json::Value> {
        serde_json::to_value(self).ok()
    }

    fn check_state(&self, state: &serde_json::Value) -> Result<(), SnapshotError> {
        Ay38912::deserialize(state)?;
        Ok(())
    }

    fn load_state(&mut self, state: &serde_json::Value) -> Result<(), SnapshotError> {
        *self = serde_json::from_value(state.clone())?;
        Ok(())
    }
}
