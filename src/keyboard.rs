use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// The 8 half-rows x 5 keys matrix read through the ULA port.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Keyboard {
    pressed: HashSet<Key>,
}

impl Keyboard {
    pub fn new() -> Self {
        Keyboard::default()
    }

    /// Press a key by its browser `KeyboardEvent.code` name.
    pub fn key_down(&mut self, code: &str) {
        if let Some(mapping) = find_mapping(code) {
            self.pressed.insert(mapping.key);
        }
    }

    pub fn key_up(&mut self, code: &str) {
        if let Some(mapping) = find_mapping(code) {
            self.pressed.remove(&mapping.key);
        }
    }

    pub fn release_all(&mut self) {
        self.pressed.clear();
    }

    /// Bits 0-4 of the half-row, active low.
    pub fn get_row(&self, row: u8) -> u8 {
        MAPPINGS
            .iter()
            .filter(|m| m.row == row && self.pressed.contains(&m.key))
            .fold(0x1F, |acc, m| acc & !(1 << m.col))
    }

    /// Read the keyboard with the port's high byte as the half-row selector;
    /// every half-row whose address line is low contributes.
    pub fn read(&self, high_byte: u8) -> u8 {
        (0..8)
            .filter(|row| high_byte & (1 << row) == 0)
            .fold(0x1F, |acc, row| acc & self.get_row(row))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
enum Key {
    CapsShift,
    SymbolShift,
    Enter,
    Space,
    D0,
    D1,
    D2,
    D3,
    D4,
    D5,
    D6,
    D7,
    D8,
    D9,
    A,
    B,
    C,
    D,
    E,
    F,
    G,
    H,
    I,
    J,
    K,
    L,
    M,
    N,
    O,
    P,
    Q,
    R,
    S,
    T,
    U,
    V,
    W,
    X,
    Y,
    Z,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Mapping {
    code: &'static str,
    row: u8,
    col: u8,
    key: Key,
}

const fn map(code: &'static str, row: u8, col: u8, key: Key) -> Mapping {
    Mapping {
        code,
        row,
        col,
        key,
    }
}

fn find_mapping(code: &str) -> Option<&'static Mapping> {
    MAPPINGS.iter().find(|m| m.code == code)
}

const MAPPINGS: [Mapping; 42] = [
    map("ShiftLeft", 0, 0, Key::CapsShift),
    map("KeyZ", 0, 1, Key::Z),
    map("KeyX", 0, 2, Key::X),
    map("KeyC", 0, 3, Key::C),
    map("KeyV", 0, 4, Key::V),
    map("KeyA", 1, 0, Key::A),
    map("KeyS", 1, 1, Key::S),
    map("KeyD", 1, 2, Key::D),
    map("KeyF", 1, 3, Key::F),
    map("KeyG", 1, 4, Key::G),
    map("KeyQ", 2, 0, Key::Q),
    map("KeyW", 2, 1, Key::W),
    map("KeyE", 2, 2, Key::E),
    map("KeyR", 2, 3, Key::R),
    map("KeyT", 2, 4, Key::T),
    map("Digit1", 3, 0, Key::D1),
    map("Digit2", 3, 1, Key::D2),
    map("Digit3", 3, 2, Key::D3),
    map("Digit4", 3, 3, Key::D4),
    map("Digit5", 3, 4, Key::D5),
    map("Digit0", 4, 0, Key::D0),
    map("Digit9", 4, 1, Key::D9),
    map("Digit8", 4, 2, Key::D8),
    map("Digit7", 4, 3, Key::D7),
    map("Digit6", 4, 4, Key::D6),
    map("KeyP", 5, 0, Key::P),
    map("KeyO", 5, 1, Key::O),
    map("KeyI", 5, 2, Key::I),
    map("KeyU", 5, 3, Key::U),
    map("KeyY", 5, 4, Key::Y),
    map("Enter", 6, 0, Key::Enter),
    map("KeyL", 6, 1, Key::L),
    map("KeyK", 6, 2, Key::K),
    map("KeyJ", 6, 3, Key::J),
    map("KeyH", 6, 4, Key::H),
    map("Space", 7, 0, Key::Space),
    map("ControlLeft", 7, 1, Key::SymbolShift),
    map("KeyM", 7, 2, Key::M),
    map("KeyN", 7, 3, Key::N),
    map("KeyB", 7, 4, Key::B),
    // aliases
    map("ShiftRight", 0, 0, Key::CapsShift),
    map("ControlRight", 7, 1, Key::SymbolShift),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_half_row_selection() {
        let mut keyboard = Keyboard::new();
        keyboard.key_down("KeyA");
        keyboard.key_down("Space");

        assert_eq!(keyboard.read(0xFD), 0x1E);
        assert_eq!(keyboard.read(0x7F), 0x1E);
        assert_eq!(keyboard.read(0xFE), 0x1F);
        // both rows at once
        assert_eq!(keyboard.read(0x7D), 0x1E);

        keyboard.key_up("KeyA");
        assert_eq!(keyboard.read(0xFD), 0x1F);
    }
}
