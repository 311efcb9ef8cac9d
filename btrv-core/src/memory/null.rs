//! Memory model with no backing store.

use super::{LogicalAddress, MemoryCore};
use crate::error::{BtrvError, BtrvResult};

/// Rejects every operation with `NotImplemented`.
///
/// Used where a dispatch path must be exercised without any memory wired up.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullMemory;

impl NullMemory {
    pub fn new() -> Self {
        Self
    }
}

impl MemoryCore for NullMemory {
    fn read_range(&self, _address: LogicalAddress, _count: usize) -> BtrvResult<Vec<u8>> {
        Err(BtrvError::NotImplemented("read_range"))
    }

    fn write_range(&mut self, _address: LogicalAddress, _bytes: &[u8]) -> BtrvResult<()> {
        Err(BtrvError::NotImplemented("write_range"))
    }

    fn fill(&mut self, _address: LogicalAddress, _count: usize, _value: u8) -> BtrvResult<()> {
        Err(BtrvError::NotImplemented("fill"))
    }

    fn read_null_terminated(
        &self,
        _address: LogicalAddress,
        _strip_terminator: bool,
    ) -> BtrvResult<Vec<u8>> {
        Err(BtrvError::NotImplemented("read_null_terminated"))
    }
}
