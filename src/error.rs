// Error types for machine configuration, scheduling, disks and snapshots

use std::collections::TryReserveError;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::memory::BankId;

/// The event queue could not grow.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("event queue allocation failed: {0}")]
pub struct SchedulingError(#[from] pub TryReserveError);

/// Status of a drive operation that affects geometry or media.
///
/// `InvalidGeometry` is final for the drive; `ReadOnly` is advisory and the
/// disk keeps rotating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error, Serialize, Deserialize)]
pub enum FddError {
    #[error("unsupported drive or disk geometry")]
    InvalidGeometry,
    #[error("disk is write protected")]
    ReadOnly,
}

#[derive(Debug, Error)]
pub enum DiskError {
    #[error("invalid disk geometry: {0}")]
    InvalidGeometry(String),
    #[error("invalid disk size: {0}")]
    InvalidSize(String),
    #[error("sectors do not fit on a track: {0}")]
    FormatError(String),
    #[error("disk I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("page pool allocation failed for {bank:?}: {source}")]
    OutOfMemory {
        bank: BankId,
        #[source]
        source: TryReserveError,
    },
    #[error("the {0:?} pool cannot be reallocated")]
    ReservedBank(BankId),
    #[error("page {page} does not exist in the {bank:?} pool")]
    NoSuchPage { bank: BankId, page: usize },
    #[error("image of {len} bytes does not fit in the {bank:?} pool")]
    ImageTooLarge { bank: BankId, len: usize },
    #[error("unknown peripheral id {0}")]
    UnknownPeripheral(usize),
    #[error("no disk interface is configured")]
    NoDiskInterface,
    #[error("drive {0} does not exist")]
    InvalidDrive(usize),
    #[error("drive rejected the request: {0}")]
    Drive(#[from] FddError),
    #[error(transparent)]
    Disk(#[from] DiskError),
    #[error(transparent)]
    Scheduling(#[from] SchedulingError),
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("snapshot is for {found}, machine is {expected}")]
    MachineMismatch { expected: String, found: String },
    #[error("snapshot has {found} pages in the {bank:?} pool, machine has {expected}")]
    PoolMismatch {
        bank: BankId,
        expected: usize,
        found: usize,
    },
    #[error("snapshot peripheral list does not match: {0}")]
    PeripheralMismatch(String),
    #[error("invalid peripheral state for {name}: {reason}")]
    InvalidState { name: String, reason: String },
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
