use serde::{Deserialize, Serialize};

use crate::{
    bus::{BusContext, Peripheral, PortRule},
    error::SnapshotError,
    keyboard::Keyboard,
    paging::PagingState,
};

/// The ULA answers every even port.
pub fn port_rules() -> Vec<PortRule> {
    vec![PortRule::new(0x0001, 0x0000)]
}

/// Port 0xFE: border colour, EAR/MIC outputs and the keyboard.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Ula {
    #[serde(skip)]
    keyboard: Keyboard,
    border: u8,
    ear_output: bool,
    mic_output: bool,
    /// Level on the EAR socket, driven by a tape player.
    ear_input: bool,
}

impl Ula {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn keyboard(&self) -> &Keyboard {
        &self.keyboard
    }

    pub fn keyboard_mut(&mut self) -> &mut Keyboard {
        &mut self.keyboard
    }

    pub fn border(&self) -> u8 {
        self.border
    }

    pub fn ear_output(&self) -> bool {
        self.ear_output
    }

    pub fn mic_output(&self) -> bool {
        self.mic_output
    }

    pub fn set_ear_input(&mut self, level: bool) {
        self.ear_input = level;
    }

    fn input(&self, port: u16) -> u8 {
        let mut value = 0xA0 | self.keyboard.read((port >> 8) as u8);
        // issue 3 boards echo the EAR output when nothing is playing
        if self.ear_input || self.ear_output {
            value |= 0x40;
        }
        value
    }
}

impl Peripheral for Ula {
    fn name(&self) -> &'static str {
        "ula"
    }

    fn reset(&mut self, _ctx: &mut BusContext) {
        self.border = 0;
        self.ear_output = false;
        self.mic_output = false;
    }

    fn read(&mut self, port: u16, _ctx: &mut BusContext) -> Option<u8> {
        Some(self.input(port))
    }

    fn write(&mut self, _port: u16, value: u8, _ctx: &mut BusContext) {
        if self.border != value & 0x07 {
            tracing::trace!("[ULA] Border {}", value & 0x07);
        }
        self.border = value & 0x07;
        self.mic_output = value & 0x08 != 0;
        self.ear_output = value & 0x10 != 0;
    }

    fn peek(&self, port: u16, _paging: &PagingState) -> Option<u8> {
        Some(self.input(port))
    }

    fn save_state(&self) -> Option<serde_json::Value> {
        serde_json::to_value(self).ok()
    }

    fn check_state(&self, state: &serde_json::Value) -> Result<(), SnapshotError> {
        Ula::deserialize(state)?;
        Ok(())
    }

    fn load_state(&mut self, state: &serde_json::Value) -> Result<(), SnapshotError> {
        let saved: Ula = serde_json::from_value(state.clone())?;
        self.border = saved.border;
        self.ear_output = saved.ear_output;
        self.mic_output = saved.mic_output;
        self.ear_input = saved.ear_input;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::tests::TestBus;

    #[test]
    fn test_keyboard_and_ear_bits() {
        let mut bus = TestBus::new();
        let mut ula = Ula::new();

        assert_eq!(ula.read(0xFEFE, &mut bus.ctx()), Some(0xBF));
        ula.keyboard_mut().key_down("ShiftLeft");
        assert_eq!(ula.read(0xFEFE, &mut bus.ctx()), Some(0xBE));

        ula.write(0x00FE, 0x15, &mut bus.ctx());
        assert_eq!(ula.border(), 5);
        assert!(ula.ear_output());
        assert_eq!(ula.read(0x7FFE, &mut bus.ctx()), Some(0xFF));
    }
}
