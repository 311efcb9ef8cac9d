//! DOS real-mode memory.
//!
//! Segments are 16-byte overlapped paragraphs: `0000:0010` is the same byte as
//! `0001:0000`. One megabyte is allocated and addresses past it are rejected
//! rather than wrapped.

use super::{scan_terminated, span, LogicalAddress, MemoryCore};
use crate::error::{BtrvError, BtrvResult};

/// Size of conventional memory.
pub const REAL_MODE_MEMORY_SIZE: usize = 1024 * 1024;

/// Heap segment used by `alloc`.
pub const DEFAULT_HEAP_SEGMENT: u16 = 0x8000;

/// Heap size (one full segment).
pub const HEAP_SIZE: usize = 64 * 1024;

/// Real-mode address space with a paragraph-aligned bump heap.
#[derive(Clone)]
pub struct RealModeMemory {
    data: Vec<u8>,
    heap_segment: u16,
    /// Bytes used from the start of the heap.
    heap_used: usize,
}

impl Default for RealModeMemory {
    fn default() -> Self {
        Self::new()
    }
}

impl RealModeMemory {
    pub fn new() -> Self {
        Self::with_heap_segment(DEFAULT_HEAP_SEGMENT)
    }

    pub fn with_heap_segment(heap_segment: u16) -> Self {
        Self {
            data: vec![0; REAL_MODE_MEMORY_SIZE],
            heap_segment,
            heap_used: 0,
        }
    }

    /// Allocate `size` bytes on the heap.
    ///
    /// Returns a normalized `seg:0000` pointer; every allocation starts on a
    /// fresh paragraph.
    pub fn alloc(&mut self, size: usize) -> BtrvResult<LogicalAddress> {
        let paragraphs = size.div_ceil(16).max(1);
        let start = self.heap_used;
        let end = start + paragraphs * 16;
        let base = (self.heap_segment as usize) << 4;
        if end > HEAP_SIZE || base + end > self.data.len() {
            return Err(BtrvError::OutOfMemory(size));
        }
        self.heap_used = end;
        Ok(LogicalAddress::new(self.heap_segment + (start >> 4) as u16, 0))
    }
}

impl MemoryCore for RealModeMemory {
    fn read_range(&self, address: LogicalAddress, count: usize) -> BtrvResult<Vec<u8>> {
        let range = span(&self.data, address, address.paragraph(), count)?;
        Ok(self.data[range].to_vec())
    }

    fn write_range(&mut self, address: LogicalAddress, bytes: &[u8]) -> BtrvResult<()> {
        let range = span(&self.data, address, address.paragraph(), bytes.len())?;
        self.data[range].copy_from_slice(bytes);
        Ok(())
    }

    fn fill(&mut self, address: LogicalAddress, count: usize, value: u8) -> BtrvResult<()> {
        let range = span(&self.data, address, address.paragraph(), count)?;
        self.data[range].fill(value);
        Ok(())
    }

    fn read_null_terminated(
        &self,
        address: LogicalAddress,
        strip_terminator: bool,
    ) -> BtrvResult<Vec<u8>> {
        scan_terminated(&self.data, address, address.paragraph(), strip_terminator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paragraph_aliasing() {
        let mut mem = RealModeMemory::new();
        mem.write_u16(LogicalAddress::new(0x2000, 0x0050), 0xCAFE).unwrap();
        assert_eq!(mem.read_u16(LogicalAddress::new(0x2005, 0x0000)).unwrap(), 0xCAFE);
        assert_eq!(mem.read_u16(LogicalAddress::new(0x0000, 0x0010)).unwrap(), 0);
    }

    #[test]
    fn test_beyond_one_megabyte_rejected() {
        let mem = RealModeMemory::new();
        // FFFF:FFFF is 0x10FFEF, past conventional memory
        assert!(matches!(
            mem.read_u8(LogicalAddress::new(0xFFFF, 0xFFFF)),
            Err(BtrvError::AddressOutOfRange { .. })
        ));
        assert!(mem.read_u8(LogicalAddress::new(0xFFFF, 0x000F)).is_ok());
    }

    #[test]
    fn test_alloc_returns_fresh_segments() {
        let mut mem = RealModeMemory::new();
        let a = mem.alloc(28).unwrap();
        let b = mem.alloc(2).unwrap();
        let c = mem.alloc(0).unwrap();
        assert_eq!(a, LogicalAddress::new(0x8000, 0));
        assert_eq!(b, LogicalAddress::new(0x8002, 0));
        assert_eq!(c, LogicalAddress::new(0x8003, 0));
    }

    #[test]
    fn test_alloc_exhaustion() {
        let mut mem = RealModeMemory::new();
        assert!(mem.alloc(HEAP_SIZE).is_ok());
        assert!(matches!(mem.alloc(1), Err(BtrvError::OutOfMemory(1))));
    }

    #[test]
    fn test_heap_near_top_of_memory() {
        let mut mem = RealModeMemory::with_heap_segment(0xFFF0);
        assert!(mem.alloc(0x100).is_ok());
        assert!(mem.alloc(0x100).is_err());
    }
}
