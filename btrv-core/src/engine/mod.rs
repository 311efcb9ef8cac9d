//! Record manager engine boundary.
//!
//! The adapter hands each normalized command to an `Engine` together with the
//! memory model the command's addresses refer to. The engine reads and writes
//! caller buffers through that model and reports a status.
//!
//! - `Engine`: the boundary trait
//! - `MemoryEngine`: reference engine over an in-memory file catalog
//! - `Catalog`: JSON description of the files `MemoryEngine` serves

mod catalog;
mod memory_engine;

pub use catalog::{load_catalog, load_catalog_from_path, Catalog, FileDefinition, KeyDefinition};
pub use memory_engine::MemoryEngine;

use crate::btrieve::BtrieveCommand;
use crate::error::BtrvResult;
use crate::memory::MemoryCore;

/// Record manager status codes (the engine's own status space).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum BtrieveStatus {
    Success = 0,
    InvalidOperation = 1,
    IoError = 2,
    FileNotOpen = 3,
    KeyValueNotFound = 4,
    DuplicateKeyValue = 5,
    InvalidKeyNumber = 6,
    DifferentKeyNumber = 7,
    InvalidPositioning = 8,
    EndOfFile = 9,
    NonModifiableKeyValue = 10,
    InvalidFileName = 11,
    FileNotFound = 12,
    ExtendedFileError = 13,
    PreImageOpenError = 14,
    PreImageIoError = 15,
    ExpansionError = 16,
    CloseError = 17,
    DiskFull = 18,
    UnrecoverableError = 19,
    RecordManagerInactive = 20,
    KeyBufferTooShort = 21,
    DataBufferLengthOverrun = 22,
    PositionBlockLength = 23,
    PageSizeError = 24,
    CreateIoError = 25,
    InvalidNumberOfKeys = 26,
    InvalidKeyPosition = 27,
    BadRecordLength = 28,
    BadKeyLength = 29,
    NotBtrieveFile = 30,
    TransactionIsActive = 37,
    OperationNotAllowed = 41,
    AccessDenied = 46,
    InvalidInterface = 53,
    FileLocked = 85,
    FileTableFull = 86,
}

impl From<BtrieveStatus> for u16 {
    fn from(status: BtrieveStatus) -> Self {
        status as u16
    }
}

/// Outcome of one engine call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Completion {
    pub status: u16,
    /// Bytes of the data buffer the engine filled, when it reports one.
    pub data_length: Option<u32>,
}

impl Completion {
    pub fn status(status: impl Into<u16>) -> Self {
        Self {
            status: status.into(),
            data_length: None,
        }
    }

    pub fn with_data_length(status: impl Into<u16>, data_length: u32) -> Self {
        Self {
            status: status.into(),
            data_length: Some(data_length),
        }
    }
}

/// A record manager that executes normalized commands.
///
/// Implementations may mutate bytes reachable through the command's data, key
/// and position block regions, and must not keep addresses past the call.
/// Memory failures are returned as errors; the adapter turns them into a
/// status.
pub trait Engine: Send {
    fn execute(
        &mut self,
        command: &BtrieveCommand,
        memory: &mut dyn MemoryCore,
    ) -> BtrvResult<Completion>;
}

impl<E: Engine + ?Sized> Engine for Box<E> {
    fn execute(
        &mut self,
        command: &BtrieveCommand,
        memory: &mut dyn MemoryCore,
    ) -> BtrvResult<Completion> {
        (**self).execute(command, memory)
    }
}
