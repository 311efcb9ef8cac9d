//! Btrieve Call Adapter Core
//!
//! This crate lets legacy record-manager callers reach a record manager
//! engine through the calling conventions they were built against:
//! - Interrupt calls carrying a 28-byte request block
//! - Exported-function calls with discrete far pointers
//!
//! # Architecture
//!
//! - `MemoryCore` trait: caller address space (real-mode, flat, or null)
//! - `BtrieveCommand`: normalized request both conventions decode into
//! - `StatBuffer`: file and key metadata codec for the Stat operation
//! - `Engine` trait: the record manager boundary, with `MemoryEngine` as a
//!   catalog-backed reference implementation
//! - `CallAdapter`: lazy engine construction and dispatch

pub mod adapter;
pub mod btrieve;
pub mod engine;
pub mod error;
pub mod memory;

pub use adapter::{
    decode_request, AdapterConfig, AdapterState, ArgWidth, CallAdapter, DataLength, ExportedCall,
    RawCall,
};
pub use btrieve::{
    BtrieveCommand, BufferDescriptor, FileSpecification, KeySpecification, OpenMode, Operation,
    OperationCode, RequestBlock, StatBuffer,
};
pub use engine::{
    load_catalog, load_catalog_from_path, BtrieveStatus, Catalog, Completion, Engine,
    FileDefinition, KeyDefinition, MemoryEngine,
};
pub use error::{BtrvError, BtrvResult};
pub use memory::{FlatMemory, LogicalAddress, MemoryCore, NullMemory, RealModeMemory, SharedMemory};

/// Status codes the adapter itself reports.
///
/// Sentinels sit above the record manager's own status range, so a caller
/// can tell an adapter rejection from an engine one.
pub mod status {
    pub const SUCCESS: u16 = 0;
    /// Bad interface id, unknown operation, or an argument outside its set.
    pub const PROTOCOL_ERROR: u16 = 0xFF01;
    /// The memory model could not satisfy an address or length.
    pub const ADDRESSING_ERROR: u16 = 0xFF02;
    /// The engine lock was poisoned by a panic in an earlier call.
    pub const ENGINE_UNAVAILABLE: u16 = 0xFF03;
}
