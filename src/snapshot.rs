use serde::{Deserialize, Serialize};

use crate::{
    bus::InterruptLines,
    error::SnapshotError,
    event::Event,
    machine::MachineType,
    memory::{BankId, MemoryPage, PageRef, SLOT_COUNT},
    paging::PagingState,
};

/// Contents of one page pool.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PoolSnapshot {
    pub bank: BankId,
    pub pages: Vec<MemoryPage>,
}

/// One registered peripheral, in registration order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeripheralSnapshot {
    pub name: String,
    pub active: bool,
    pub state: Option<serde_json::Value>,
}

/// Everything needed to resume a machine at the same tstate.
///
/// Inserted disk images are not part of a snapshot; the drive mechanics and
/// controller registers are.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub machine: MachineType,
    pub tstates: u32,
    pub frame_count: u64,
    pub paging: PagingState,
    pub slots: [PageRef; SLOT_COUNT],
    pub pools: Vec<PoolSnapshot>,
    pub interrupts: InterruptLines,
    pub events: Vec<Event>,
    pub peripherals: Vec<PeripheralSnapshot>,
}

impl Snapshot {
    pub fn to_json(&self) -> Result<String, SnapshotError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn pool(&self, bank: BankId) -> Option<&PoolSnapshot> {
        self.pools.iter().find(|p| p.bank == bank)
    }
}
