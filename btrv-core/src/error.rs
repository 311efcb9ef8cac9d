//! Error types for the Btrieve call adapter.

use thiserror::Error;

use crate::memory::LogicalAddress;
use crate::status;

/// Errors that can occur while adapting a Btrieve call.
#[derive(Error, Debug)]
pub enum BtrvError {
    #[error("Memory capability not implemented: {0}")]
    NotImplemented(&'static str),

    #[error("Address out of range: {address} (+{length} bytes)")]
    AddressOutOfRange {
        address: LogicalAddress,
        length: usize,
    },

    #[error("Unterminated string at {0}")]
    UnterminatedString(LogicalAddress),

    #[error("Out of memory: {0} bytes requested")]
    OutOfMemory(usize),

    #[error("Invalid interface id: {0:#06X}")]
    InvalidInterface(u16),

    #[error("Unsupported operation code: {0}")]
    UnsupportedOperation(u16),

    #[error("Invalid open mode: {0}")]
    InvalidOpenMode(i16),

    #[error("Key number {0} does not fit a byte")]
    InvalidKeyNumber(i16),

    #[error("{buffer} buffer length {length} exceeds capacity {capacity}")]
    BufferTooLarge {
        buffer: &'static str,
        length: u32,
        capacity: u32,
    },

    #[error("Key count {0} outside 0..=54")]
    InvalidKeyCount(i16),

    #[error("Buffer too short: need {needed} bytes, got {got}")]
    ShortBuffer { needed: usize, got: usize },

    #[error("Lock poisoned")]
    LockPoisoned,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl BtrvError {
    /// Status code reported to a legacy caller for this error.
    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidInterface(_)
            | Self::UnsupportedOperation(_)
            | Self::InvalidOpenMode(_)
            | Self::InvalidKeyNumber(_)
            | Self::BufferTooLarge { .. } => status::PROTOCOL_ERROR,
            Self::LockPoisoned => status::ENGINE_UNAVAILABLE,
            _ => status::ADDRESSING_ERROR,
        }
    }

    /// True for errors detected before the engine was ever consulted.
    pub fn is_protocol_error(&self) -> bool {
        self.status() == status::PROTOCOL_ERROR
    }
}

/// Result type for adapter operations.
pub type BtrvResult<T> = Result<T, BtrvError>;
