//! Thread-shared memory handle.

use std::sync::{Arc, Mutex, MutexGuard};

use super::{LogicalAddress, MemoryCore};
use crate::error::{BtrvError, BtrvResult};

/// A memory model shared between threads.
///
/// Each capability call holds the lock for its whole duration, so a single
/// `read_range`/`write_range`/`fill` never tears. Ordering between calls is
/// up to the callers. Clone is cheap (just clones the Arc).
pub struct SharedMemory<M: MemoryCore> {
    inner: Arc<Mutex<M>>,
}

impl<M: MemoryCore> Clone for SharedMemory<M> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<M: MemoryCore> SharedMemory<M> {
    pub fn new(memory: M) -> Self {
        Self {
            inner: Arc::new(Mutex::new(memory)),
        }
    }

    /// Lock the underlying model, e.g. to allocate from it.
    pub fn lock(&self) -> BtrvResult<MutexGuard<'_, M>> {
        self.inner.lock().map_err(|_| BtrvError::LockPoisoned)
    }
}

impl<M: MemoryCore> MemoryCore for SharedMemory<M> {
    fn read_range(&self, address: LogicalAddress, count: usize) -> BtrvResult<Vec<u8>> {
        self.lock()?.read_range(address, count)
    }

    fn write_range(&mut self, address: LogicalAddress, bytes: &[u8]) -> BtrvResult<()> {
        self.lock()?.write_range(address, bytes)
    }

    fn fill(&mut self, address: LogicalAddress, count: usize, value: u8) -> BtrvResult<()> {
        self.lock()?.fill(address, count, value)
    }

    fn read_null_terminated(
        &self,
        address: LogicalAddress,
        strip_terminator: bool,
    ) -> BtrvResult<Vec<u8>> {
        self.lock()?.read_null_terminated(address, strip_terminator)
    }
}
