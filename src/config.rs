use std::{fs, path::Path};

use anyhow::Context;
use serde::{Deserialize, Serialize};

use crate::{fdd::DriveType, machine::MachineType};

/// Mechanics of one floppy drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriveConfig {
    pub kind: DriveType,
    pub cylinders: u8,
    pub heads: u8,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            kind: DriveType::Shugart,
            cylinders: 80,
            heads: 2,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BetaConfig {
    /// Attached drives, in select order. An empty list gets one default drive.
    #[serde(default)]
    pub drives: Vec<DriveConfig>,
    /// Wire the controller's INTRQ to the CPU interrupt line as well as the
    /// system port.
    #[serde(default)]
    pub intrq_to_cpu: bool,
}

/// Hardware configuration of a machine, as loaded from JSON.
///
/// ```json
/// { "machine": "spectrum128", "beta": { "drives": [{ "kind": "Shugart", "cylinders": 80, "heads": 2 }] } }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MachineConfig {
    pub machine: MachineType,
    #[serde(default)]
    pub beta: Option<BetaConfig>,
    /// Override whether an AY-3-8912 is fitted. Defaults to the model's own.
    #[serde(default)]
    pub ay: Option<bool>,
}

impl MachineConfig {
    pub fn new(machine: MachineType) -> Self {
        Self {
            machine,
            ..Default::default()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = fs::read_to_string(path)
            .with_context(|| format!("reading machine config {}", path.display()))?;
        let config = Self::from_json(&json)
            .with_context(|| format!("parsing machine config {}", path.display()))?;
        tracing::info!("[CONFIG] Loaded {} from {}", config.machine, path.display());
        Ok(config)
    }

    pub fn has_ay(&self) -> bool {
        self.ay.unwrap_or_else(|| self.machine.has_ay())
    }
}

/// Read a ROM image from disk.
pub fn load_rom<P: AsRef<Path>>(path: P) -> anyhow::Result<Vec<u8>> {
    let path = path.as_ref();
    let data = fs::read(path).with_context(|| format!("reading ROM {}", path.display()))?;
    tracing::info!("[CONFIG] Read {} byte ROM from {}", data.len(), path.display());
    Ok(data)
}
