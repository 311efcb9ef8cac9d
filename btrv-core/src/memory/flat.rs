//! Array-backed memory with linear addressing.

use super::{scan_terminated, span, LogicalAddress, MemoryCore};
use crate::error::{BtrvError, BtrvResult};

/// Flat memory for 32-bit callers: `segment:offset` is the pointer value
/// `(segment << 16) | offset`, used as an index into one buffer.
#[derive(Debug, Clone)]
pub struct FlatMemory {
    data: Vec<u8>,
    /// Next free linear index for `alloc`.
    next_free: usize,
}

impl FlatMemory {
    /// Base of the allocation arena. Index 0 stays unused so null is never handed out.
    const ALLOC_BASE: usize = 0x10;

    /// Create a zeroed buffer of `size` bytes.
    pub fn new(size: usize) -> Self {
        Self {
            data: vec![0; size],
            next_free: Self::ALLOC_BASE,
        }
    }

    /// Total addressable bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Reserve `size` bytes (4-byte aligned) and return their address.
    pub fn alloc(&mut self, size: usize) -> BtrvResult<LogicalAddress> {
        let start = self.next_free;
        let end = start
            .checked_add(size)
            .filter(|&end| end <= self.data.len() && end <= u32::MAX as usize)
            .ok_or(BtrvError::OutOfMemory(size))?;
        self.next_free = (end + 3) & !3;
        Ok(LogicalAddress::from_u32(start as u32))
    }
}

impl MemoryCore for FlatMemory {
    fn read_range(&self, address: LogicalAddress, count: usize) -> BtrvResult<Vec<u8>> {
        let range = span(&self.data, address, address.linear(), count)?;
        Ok(self.data[range].to_vec())
    }

    fn write_range(&mut self, address: LogicalAddress, bytes: &[u8]) -> BtrvResult<()> {
        let range = span(&self.data, address, address.linear(), bytes.len())?;
        self.data[range].copy_from_slice(bytes);
        Ok(())
    }

    fn fill(&mut self, address: LogicalAddress, count: usize, value: u8) -> BtrvResult<()> {
        let range = span(&self.data, address, address.linear(), count)?;
        self.data[range].fill(value);
        Ok(())
    }

    fn read_null_terminated(
        &self,
        address: LogicalAddress,
        strip_terminator: bool,
    ) -> BtrvResult<Vec<u8>> {
        scan_terminated(&self.data, address, address.linear(), strip_terminator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_access_is_little_endian() {
        let mut mem = FlatMemory::new(0x100);
        let ptr = LogicalAddress::new(0, 0x11);
        mem.write_u16(ptr, 0xBEEF).unwrap();
        assert_eq!(mem.read_u8(ptr).unwrap(), 0xEF);
        assert_eq!(mem.read_u8(ptr.add(1)).unwrap(), 0xBE);

        mem.write_u32(ptr, 0x1234_5678).unwrap();
        assert_eq!(mem.read_u32(ptr).unwrap(), 0x1234_5678);
        assert_eq!(mem.read_u16(ptr.add(2)).unwrap(), 0x1234);
    }

    #[test]
    fn test_segment_is_high_word() {
        let mut mem = FlatMemory::new(0x2_0000);
        mem.write_u8(LogicalAddress::new(1, 0x0005), 0xAA).unwrap();
        assert_eq!(mem.read_range(LogicalAddress::from_u32(0x1_0005), 1).unwrap(), vec![0xAA]);
    }

    #[test]
    fn test_out_of_range_rejected() {
        let mut mem = FlatMemory::new(0x100);
        let ptr = LogicalAddress::new(0, 0xFE);
        assert!(matches!(
            mem.read_range(ptr, 4),
            Err(BtrvError::AddressOutOfRange { length: 4, .. })
        ));
        assert!(mem.write_u32(ptr, 1).is_err());
        assert!(mem.read_u8(LogicalAddress::new(1, 0)).is_err());
    }

    #[test]
    fn test_zero_count_is_noop() {
        let mut mem = FlatMemory::new(0x10);
        let ptr = LogicalAddress::new(0, 0x10);
        assert!(mem.read_range(ptr, 0).unwrap().is_empty());
        mem.write_range(ptr, &[]).unwrap();
        mem.fill(ptr, 0, 0xFF).unwrap();
    }

    #[test]
    fn test_fill_and_strings() {
        let mut mem = FlatMemory::new(0x100);
        let ptr = mem.alloc(16).unwrap();
        mem.fill(ptr, 16, 0x20).unwrap();
        mem.write_range(ptr, b"TEST.DAT\0").unwrap();

        assert_eq!(mem.read_null_terminated(ptr, true).unwrap(), b"TEST.DAT");
        assert_eq!(mem.read_null_terminated(ptr, false).unwrap(), b"TEST.DAT\0");
        assert_eq!(mem.read_u8(ptr.add(9)).unwrap(), 0x20);
    }

    #[test]
    fn test_unterminated_string() {
        let mut mem = FlatMemory::new(0x20);
        mem.fill(LogicalAddress::NULL, 0x20, b'A').unwrap();
        assert!(matches!(
            mem.read_null_terminated(LogicalAddress::new(0, 4), true),
            Err(BtrvError::UnterminatedString(_))
        ));
    }

    #[test]
    fn test_alloc() {
        let mut mem = FlatMemory::new(0x40);
        let a = mem.alloc(5).unwrap();
        let b = mem.alloc(4).unwrap();
        assert!(!a.is_null());
        assert_eq!(b.linear(), a.linear() + 8);
        assert!(matches!(mem.alloc(0x100), Err(BtrvError::OutOfMemory(0x100))));
    }
}
