pub mod beta;
pub mod bus;
pub mod clock;
pub mod config;
pub mod disk;
pub mod error;
pub mod event;
pub mod fdc;
pub mod fdd;
pub mod keyboard;
pub mod machine;
pub mod memory;
pub mod paging;
pub mod psg;
pub mod snapshot;
pub mod ula;
pub mod utils;

pub use bus::{BusContext, Peripheral, PeripheralId, PortDispatcher, PortRule};
pub use config::{BetaConfig, DriveConfig, MachineConfig};
pub use disk::{DiskGeometry, DiskImage};
pub use error::{ConfigError, DiskError, FddError, SchedulingError, SnapshotError};
pub use event::{Event, EventKind, EventQueue};
pub use machine::{Machine, MachineBuilder, MachineType};
pub use memory::{BankId, MemoryMap, PageRef};
pub use snapshot::Snapshot;
pub use utils::hexdump;

use tracing_subscriber::{fmt::time::UtcTime, EnvFilter};
use wasm_bindgen::prelude::*;

/// Install a fmt subscriber filtered by `RUST_LOG` for native hosts.
/// Does nothing if a global subscriber is already set.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_timer(UtcTime::rfc_3339())
        .with_target(false)
        .try_init();
}

fn js_error(e: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&e.to_string())
}

#[wasm_bindgen(js_name = Machine)]
pub struct JsMachine(Machine);

#[wasm_bindgen(js_class = Machine)]
impl JsMachine {
    /// `config` is a JSON `MachineConfig`; `beta_rom` may be empty.
    #[wasm_bindgen(constructor)]
    pub fn new(config: &str, rom: &[u8], beta_rom: &[u8]) -> Result<JsMachine, JsValue> {
        console_error_panic_hook::set_once();
        tracing_wasm::set_as_global_default();

        let config = MachineConfig::from_json(config).map_err(js_error)?;
        let mut builder = MachineBuilder::from_config(&config);
        builder.rom(rom);
        if !beta_rom.is_empty() {
            builder.beta_rom(beta_rom);
        }
        Ok(Self(builder.build().map_err(js_error)?))
    }

    #[wasm_bindgen(getter)]
    pub fn tstates(&self) -> u32 {
        self.0.tstates()
    }

    #[wasm_bindgen(getter = frameCount)]
    pub fn frame_count(&self) -> f64 {
        self.0.frame_count() as f64
    }

    #[wasm_bindgen(getter)]
    pub fn border(&self) -> u8 {
        self.0.ula().border()
    }

    #[wasm_bindgen(getter = interruptPending)]
    pub fn interrupt_pending(&self) -> bool {
        self.0.interrupt_pending()
    }

    pub fn reset(&mut self) {
        self.0.reset();
    }

    /// Returns false if a breakpoint stopped the frame early.
    #[wasm_bindgen(js_name = runFrame)]
    pub fn run_frame(&mut self) -> bool {
        self.0.run_frame().is_continue()
    }

    #[wasm_bindgen(js_name = addBreakpoint)]
    pub fn add_breakpoint(&mut self, time: u32) -> Result<(), JsValue> {
        self.0.add_breakpoint(time).map_err(js_error)
    }

    #[wasm_bindgen(js_name = keyDown)]
    pub fn key_down(&mut self, code: &str) {
        self.0.key_down(code);
    }

    #[wasm_bindgen(js_name = keyUp)]
    pub fn key_up(&mut self, code: &str) {
        self.0.key_up(code);
    }

    pub fn peek(&self, address: u16) -> u8 {
        self.0.peek(address)
    }

    #[wasm_bindgen(js_name = peekPort)]
    pub fn peek_port(&self, port: u16) -> u8 {
        self.0.peek_port(port)
    }

    #[wasm_bindgen(js_name = memoryDump)]
    pub fn memory_dump(&self, start: u16, end: u16) -> String {
        self.0.memory_dump(start, end)
    }

    /// Insert a TR-DOS sector dump (80 cylinders, 2 sides, 16 x 256 bytes).
    #[wasm_bindgen(js_name = insertDisk)]
    pub fn insert_disk(&mut self, drive: usize, data: Vec<u8>) -> Result<(), JsValue> {
        let image = DiskImage::from_raw(DiskGeometry::TRDOS_DS80, data).map_err(js_error)?;
        self.0.insert_disk(drive, image).map_err(js_error)
    }

    /// Eject a disk and return its flushed sector dump, if there was one.
    #[wasm_bindgen(js_name = ejectDisk)]
    pub fn eject_disk(&mut self, drive: usize) -> Result<Option<Vec<u8>>, JsValue> {
        let image = self.0.eject_disk(drive).map_err(js_error)?;
        Ok(image.map(|mut image| {
            image.flush();
            image.to_raw().to_vec()
        }))
    }

    pub fn snapshot(&self) -> Result<String, JsValue> {
        self.0.snapshot().to_json().map_err(js_error)
    }

    pub fn restore(&mut self, json: &str) -> Result<(), JsValue> {
        let snapshot = Snapshot::from_json(json).map_err(js_error)?;
        self.0.restore(&snapshot).map_err(js_error)
    }
}
