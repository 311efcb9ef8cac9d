//! Memory models for legacy segment:offset addressing.
//!
//! This module provides the address space the call adapter works against:
//! - `MemoryCore`: the capability set every model implements
//! - `FlatMemory`: linear `(segment << 16) | offset` addressing
//! - `RealModeMemory`: paragraph `segment * 16 + offset` addressing
//! - `NullMemory`: rejects everything (no backing store wired up)
//! - `SharedMemory`: lock-per-operation handle for sharing a model between threads

mod flat;
mod null;
mod real_mode;
mod shared;

use std::fmt;

pub use flat::FlatMemory;
pub use null::NullMemory;
pub use real_mode::RealModeMemory;
pub use shared::SharedMemory;

use crate::error::{BtrvError, BtrvResult};

/// Size of a far pointer stored in memory (offset word, then segment word).
pub const FAR_PTR_SIZE: usize = 4;

/// A far pointer: segment and offset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct LogicalAddress {
    pub segment: u16,
    pub offset: u16,
}

impl LogicalAddress {
    pub const NULL: Self = Self::new(0, 0);

    pub const fn new(segment: u16, offset: u16) -> Self {
        Self { segment, offset }
    }

    /// Split a flat 32-bit pointer value: upper word segment, lower word offset.
    pub const fn from_u32(value: u32) -> Self {
        Self::new((value >> 16) as u16, (value & 0xFFFF) as u16)
    }

    /// Inverse of `from_u32`.
    pub const fn to_u32(self) -> u32 {
        ((self.segment as u32) << 16) | self.offset as u32
    }

    /// Decode a far pointer as stored in memory.
    pub fn from_le_bytes(bytes: [u8; FAR_PTR_SIZE]) -> Self {
        Self::from_u32(u32::from_le_bytes(bytes))
    }

    /// Encode as stored in memory.
    pub fn to_le_bytes(self) -> [u8; FAR_PTR_SIZE] {
        self.to_u32().to_le_bytes()
    }

    /// Linear resolution, used by the 32-bit flat model.
    pub const fn linear(self) -> usize {
        ((self.segment as usize) << 16) | self.offset as usize
    }

    /// Paragraph resolution, used by the real-mode model.
    pub const fn paragraph(self) -> usize {
        ((self.segment as usize) << 4) + self.offset as usize
    }

    /// Advance the offset, leaving the segment alone. Wraps within the segment.
    pub const fn add(self, delta: u16) -> Self {
        Self::new(self.segment, self.offset.wrapping_add(delta))
    }

    pub const fn is_null(self) -> bool {
        self.segment == 0 && self.offset == 0
    }
}

impl fmt::Display for LogicalAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04X}:{:04X}", self.segment, self.offset)
    }
}

/// Capability set of a memory model.
///
/// The adapter and the engine are written against this trait only; swapping
/// the model never changes their logic. Multi-byte values are little-endian
/// and carry no alignment requirement.
pub trait MemoryCore: Send {
    /// Copy `count` bytes out. `count == 0` returns an empty vector.
    fn read_range(&self, address: LogicalAddress, count: usize) -> BtrvResult<Vec<u8>>;

    /// Copy `bytes` in. An empty slice is a no-op.
    fn write_range(&mut self, address: LogicalAddress, bytes: &[u8]) -> BtrvResult<()>;

    /// Set `count` bytes to `value`.
    fn fill(&mut self, address: LogicalAddress, count: usize, value: u8) -> BtrvResult<()>;

    /// Scan forward to the first zero byte. The terminator is included unless
    /// `strip_terminator` is set.
    fn read_null_terminated(
        &self,
        address: LogicalAddress,
        strip_terminator: bool,
    ) -> BtrvResult<Vec<u8>>;

    fn read_u8(&self, address: LogicalAddress) -> BtrvResult<u8> {
        Ok(self.read_range(address, 1)?[0])
    }

    fn read_u16(&self, address: LogicalAddress) -> BtrvResult<u16> {
        let b = self.read_range(address, 2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn read_u32(&self, address: LogicalAddress) -> BtrvResult<u32> {
        let b = self.read_range(address, 4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn write_u8(&mut self, address: LogicalAddress, value: u8) -> BtrvResult<()> {
        self.write_range(address, &[value])
    }

    fn write_u16(&mut self, address: LogicalAddress, value: u16) -> BtrvResult<()> {
        self.write_range(address, &value.to_le_bytes())
    }

    fn write_u32(&mut self, address: LogicalAddress, value: u32) -> BtrvResult<()> {
        self.write_range(address, &value.to_le_bytes())
    }

    /// Read a far pointer stored at `address`.
    fn read_far_ptr(&self, address: LogicalAddress) -> BtrvResult<LogicalAddress> {
        self.read_u32(address).map(LogicalAddress::from_u32)
    }
}

/// Shared implementation for models backed by one contiguous byte array.
pub(crate) fn span(
    data: &[u8],
    address: LogicalAddress,
    start: usize,
    count: usize,
) -> BtrvResult<std::ops::Range<usize>> {
    let end = start
        .checked_add(count)
        .filter(|&end| end <= data.len())
        .ok_or(BtrvError::AddressOutOfRange {
            address,
            length: count,
        })?;
    Ok(start..end)
}

/// Scan a contiguous byte array for a zero terminator.
pub(crate) fn scan_terminated(
    data: &[u8],
    address: LogicalAddress,
    start: usize,
    strip_terminator: bool,
) -> BtrvResult<Vec<u8>> {
    let tail = data
        .get(start..)
        .ok_or(BtrvError::AddressOutOfRange { address, length: 1 })?;
    let len = tail
        .iter()
        .position(|&b| b == 0)
        .ok_or(BtrvError::UnterminatedString(address))?;
    let end = if strip_terminator { len } else { len + 1 };
    Ok(tail[..end].to_vec())
}
