use serde::{Deserialize, Serialize};

/// Lines of the display area, the only lines that see contention.
pub const SCREEN_LINES: u32 = 192;
/// Tstates of each display line during which the ULA fetches screen data.
pub const CONTENDED_TSTATES_PER_LINE: u32 = 128;
/// Rotational period of a 300 rpm floppy disk.
pub const DISK_REVOLUTION_MS: u32 = 200;

/// Per-model timing constants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineTimings {
    /// CPU clock in Hz.
    pub processor_speed: u32,
    pub tstates_per_line: u32,
    pub lines_per_frame: u32,
    /// How long the ULA holds INT after the frame starts.
    pub interrupt_length: u32,
    /// Tstate of the first contended cycle (top-left pixel fetch).
    pub first_contended: u32,
    /// Extra wait states for each eighth of a contended 8-tstate fetch
    /// cycle. `None` means the model has no contention.
    pub contention_pattern: Option<[u8; 8]>,
    /// Port is handled by the ULA if `port & ula_port_mask == 0`.
    pub ula_port_mask: u16,
}

impl MachineTimings {
    pub const SPECTRUM_48: MachineTimings = MachineTimings {
        processor_speed: 3_500_000,
        tstates_per_line: 224,
        lines_per_frame: 312,
        interrupt_length: 32,
        first_contended: 14_335,
        contention_pattern: Some([6, 5, 4, 3, 2, 1, 0, 0]),
        ula_port_mask: 0x0001,
    };

    pub const SPECTRUM_128: MachineTimings = MachineTimings {
        processor_speed: 3_546_900,
        tstates_per_line: 228,
        lines_per_frame: 311,
        interrupt_length: 36,
        first_contended: 14_361,
        contention_pattern: Some([6, 5, 4, 3, 2, 1, 0, 0]),
        ula_port_mask: 0x0001,
    };

    pub const TC2048: MachineTimings = MachineTimings {
        processor_speed: 3_500_000,
        tstates_per_line: 224,
        lines_per_frame: 312,
        interrupt_length: 32,
        first_contended: 14_335,
        contention_pattern: Some([6, 5, 4, 3, 2, 1, 0, 0]),
        ula_port_mask: 0x0001,
    };

    pub const PENTAGON: MachineTimings = MachineTimings {
        processor_speed: 3_500_000,
        tstates_per_line: 224,
        lines_per_frame: 320,
        interrupt_length: 32,
        first_contended: 17_988,
        contention_pattern: None,
        ula_port_mask: 0x0001,
    };

    pub fn frame_length(&self) -> u32 {
        self.tstates_per_line * self.lines_per_frame
    }

    pub fn ms_to_tstates(&self, ms: u32) -> u32 {
        (self.processor_speed as u64 * ms as u64 / 1000) as u32
    }

    pub fn revolution(&self) -> u32 {
        self.ms_to_tstates(DISK_REVOLUTION_MS)
    }

    pub fn port_from_ula(&self, port: u16) -> bool {
        port & self.ula_port_mask == 0
    }

    /// Position of `tstates` inside the screen fetch window as
    /// `(line, tstate within line)`, or `None` in the border/retrace.
    pub fn screen_position(&self, tstates: u32) -> Option<(u32, u32)> {
        let offset = tstates.checked_sub(self.first_contended)?;
        let line = offset / self.tstates_per_line;
        let column = offset % self.tstates_per_line;
        (line < SCREEN_LINES && column < CONTENDED_TSTATES_PER_LINE).then_some((line, column))
    }

    /// Wait states the ULA inserts for a contended access at `tstates`.
    pub fn contention_delay(&self, tstates: u32) -> u32 {
        match (self.contention_pattern, self.screen_position(tstates)) {
            (Some(pattern), Some((_, column))) => pattern[(column % 8) as usize] as u32,
            _ => 0,
        }
    }
}

/// The tstate counter, relative to the last video interrupt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Clock {
    tstates: u32,
    frame_count: u64,
    timings: MachineTimings,
}

impl Clock {
    pub fn new(timings: MachineTimings) -> Self {
        Self {
            tstates: 0,
            frame_count: 0,
            timings,
        }
    }

    pub fn reset(&mut self) {
        self.tstates = 0;
        self.frame_count = 0;
    }

    pub fn tstates(&self) -> u32 {
        self.tstates
    }

    pub fn set_tstates(&mut self, tstates: u32) {
        self.tstates = tstates;
    }

    /// Advance the clock by the specified number of CPU cycles
    pub fn advance(&mut self, cycles: u32) {
        self.tstates += cycles;
    }

    /// Add contention wait states for an access at the current tstate.
    pub fn contend(&mut self) {
        self.tstates += self.timings.contention_delay(self.tstates);
    }

    /// Reduce the counter by one frame at the interrupt boundary.
    pub fn wrap_frame(&mut self) {
        let frame_length = self.timings.frame_length();
        debug_assert!(
            self.tstates >= frame_length,
            "frame wrapped early at {}",
            self.tstates
        );
        self.tstates = self.tstates.saturating_sub(frame_length);
        self.frame_count += 1;
    }

    pub fn timings(&self) -> &MachineTimings {
        &self.timings
    }

    pub fn frame_count(&self) -> u64 {
        self.frame_count
    }

    pub fn set_frame_count(&mut self, frame_count: u64) {
        self.frame_count = frame_count;
    }

    /// Get cycles until next frame
    pub fn cycles_until_frame_end(&self) -> u32 {
        self.timings.frame_length().saturating_sub(self.tstates)
    }
}
