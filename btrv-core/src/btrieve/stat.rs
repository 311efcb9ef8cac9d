//! File and key metadata exchanged by the Stat operation.
//!
//! Layout of a full stat buffer (962 bytes, little-endian):
//! - Bytes 0-81: Multi-file name (NUL-terminated text)
//! - Bytes 82-97: File specification
//! - Bytes 98-961: 54 key specifications of 16 bytes each
//!
//! The legacy call passes the name region as the key buffer and the
//! specification region (880 bytes) as the data buffer, so both halves are
//! addressable on their own.

use std::fmt;

use crate::error::{BtrvError, BtrvResult};
use crate::memory::{LogicalAddress, MemoryCore};

/// Maximum number of keys a file can describe.
pub const MAX_KEYS: usize = 54;

/// Size of the multi-file name prefix.
pub const MULTIFILE_NAME_SIZE: usize = 82;

/// Size of a file specification.
pub const FILE_SPEC_SIZE: usize = 16;

/// Size of one key specification.
pub const KEY_SPEC_SIZE: usize = 16;

/// Size of the file specification plus all key slots.
pub const SPECS_SIZE: usize = FILE_SPEC_SIZE + MAX_KEYS * KEY_SPEC_SIZE;

/// Size of a complete stat buffer.
pub const STAT_BUFFER_SIZE: usize = MULTIFILE_NAME_SIZE + SPECS_SIZE;

/// Key attribute flags.
pub mod key_flags {
    pub const DUPLICATES: i16 = 0x0001;
    pub const MODIFIABLE: i16 = 0x0002;
    pub const BINARY: i16 = 0x0004;
    pub const NULL_KEY: i16 = 0x0008;
    pub const SEGMENTED: i16 = 0x0010;
    pub const ALTERNATE_COLLATING: i16 = 0x0020;
    pub const DESCENDING: i16 = 0x0040;
    pub const SUPPLEMENTAL: i16 = 0x0080;
    pub const EXTENDED_TYPE: i16 = 0x0100;
}

/// Extended key data types.
pub mod key_type {
    pub const STRING: u8 = 0;
    pub const INTEGER: u8 = 1;
    pub const FLOAT: u8 = 2;
    pub const DATE: u8 = 3;
    pub const TIME: u8 = 4;
    pub const DECIMAL: u8 = 5;
    pub const MONEY: u8 = 6;
    pub const LOGICAL: u8 = 7;
    pub const NUMERIC: u8 = 8;
    pub const BFLOAT: u8 = 9;
    pub const LSTRING: u8 = 10;
    pub const ZSTRING: u8 = 11;
    pub const UNSIGNED_BINARY: u8 = 14;
    pub const AUTOINCREMENT: u8 = 15;
}

fn short(needed: usize, got: usize) -> BtrvError {
    BtrvError::ShortBuffer { needed, got }
}

fn i16_at(b: &[u8], at: usize) -> i16 {
    i16::from_le_bytes([b[at], b[at + 1]])
}

fn i32_at(b: &[u8], at: usize) -> i32 {
    i32::from_le_bytes([b[at], b[at + 1], b[at + 2], b[at + 3]])
}

/// File specification (16 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileSpecification {
    pub record_length: i16,
    pub page_size: i16,
    pub number_of_keys: i16,
    pub number_of_records: i32,
    /// Bit 0: variable-length records.
    pub flags: i16,
    /// Duplicate pointer count, then an unused byte.
    pub reserved: [u8; 2],
    pub unused_pages: i16,
}

impl FileSpecification {
    pub fn to_bytes(&self) -> [u8; FILE_SPEC_SIZE] {
        let mut b = [0u8; FILE_SPEC_SIZE];
        b[0..2].copy_from_slice(&self.record_length.to_le_bytes());
        b[2..4].copy_from_slice(&self.page_size.to_le_bytes());
        b[4..6].copy_from_slice(&self.number_of_keys.to_le_bytes());
        b[6..10].copy_from_slice(&self.number_of_records.to_le_bytes());
        b[10..12].copy_from_slice(&self.flags.to_le_bytes());
        b[12..14].copy_from_slice(&self.reserved);
        b[14..16].copy_from_slice(&self.unused_pages.to_le_bytes());
        b
    }

    /// Decode the first 16 bytes of `b`, rejecting key counts outside 0..=54.
    pub fn from_bytes(b: &[u8]) -> BtrvResult<Self> {
        if b.len() < FILE_SPEC_SIZE {
            return Err(short(FILE_SPEC_SIZE, b.len()));
        }
        let spec = Self {
            record_length: i16_at(b, 0),
            page_size: i16_at(b, 2),
            number_of_keys: i16_at(b, 4),
            number_of_records: i32_at(b, 6),
            flags: i16_at(b, 10),
            reserved: [b[12], b[13]],
            unused_pages: i16_at(b, 14),
        };
        spec.key_count()?;
        Ok(spec)
    }

    /// Key count as an index bound.
    pub fn key_count(&self) -> BtrvResult<usize> {
        usize::try_from(self.number_of_keys)
            .ok()
            .filter(|&n| n <= MAX_KEYS)
            .ok_or(BtrvError::InvalidKeyCount(self.number_of_keys))
    }

    /// Bytes a Stat reply needs for this file: the spec plus one slot per key.
    pub fn reply_size(&self) -> BtrvResult<usize> {
        Ok(FILE_SPEC_SIZE + self.key_count()? * KEY_SPEC_SIZE)
    }
}

/// Key specification (16 bytes).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeySpecification {
    /// 1-based position of the key within the record.
    pub position: i16,
    pub length: i16,
    pub flags: i16,
    /// Count of unique values for this key.
    pub number_of_keys: i32,
    pub data_type: u8,
    pub null_value: u8,
    pub unused: i16,
    /// Key number, only meaningful when the manual key flag is set.
    pub manual_key_number: u8,
    pub acs_number: u8,
}

impl KeySpecification {
    pub fn to_bytes(&self) -> [u8; KEY_SPEC_SIZE] {
        let mut b = [0u8; KEY_SPEC_SIZE];
        b[0..2].copy_from_slice(&self.position.to_le_bytes());
        b[2..4].copy_from_slice(&self.length.to_le_bytes());
        b[4..6].copy_from_slice(&self.flags.to_le_bytes());
        b[6..10].copy_from_slice(&self.number_of_keys.to_le_bytes());
        b[10] = self.data_type;
        b[11] = self.null_value;
        b[12..14].copy_from_slice(&self.unused.to_le_bytes());
        b[14] = self.manual_key_number;
        b[15] = self.acs_number;
        b
    }

    pub fn from_bytes(b: &[u8]) -> BtrvResult<Self> {
        if b.len() < KEY_SPEC_SIZE {
            return Err(short(KEY_SPEC_SIZE, b.len()));
        }
        Ok(Self {
            position: i16_at(b, 0),
            length: i16_at(b, 2),
            flags: i16_at(b, 4),
            number_of_keys: i32_at(b, 6),
            data_type: b[10],
            null_value: b[11],
            unused: i16_at(b, 12),
            manual_key_number: b[14],
            acs_number: b[15],
        })
    }
}

/// Where the two halves of a stat buffer live in caller memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatRegions {
    pub name: LogicalAddress,
    pub specs: LogicalAddress,
}

impl StatRegions {
    /// Regions of one contiguous 962-byte buffer.
    pub fn contiguous(address: LogicalAddress) -> Self {
        Self {
            name: address,
            specs: address.add(MULTIFILE_NAME_SIZE as u16),
        }
    }
}

/// Complete Stat reply: name, file spec and every key slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatBuffer {
    pub multifile_name: [u8; MULTIFILE_NAME_SIZE],
    pub spec: FileSpecification,
    pub keys: [KeySpecification; MAX_KEYS],
}

impl Default for StatBuffer {
    fn default() -> Self {
        Self {
            multifile_name: [0; MULTIFILE_NAME_SIZE],
            spec: FileSpecification::default(),
            keys: [KeySpecification::default(); MAX_KEYS],
        }
    }
}

impl StatBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from a file spec and its keys; `number_of_keys` is set from `keys`.
    pub fn with_keys(spec: FileSpecification, keys: &[KeySpecification]) -> BtrvResult<Self> {
        if keys.len() > MAX_KEYS {
            return Err(BtrvError::InvalidKeyCount(keys.len() as i16));
        }
        let mut buf = Self {
            spec,
            ..Self::default()
        };
        buf.spec.number_of_keys = keys.len() as i16;
        buf.keys[..keys.len()].copy_from_slice(keys);
        Ok(buf)
    }

    /// Multi-file name up to its terminator.
    pub fn name(&self) -> String {
        self.multifile_name
            .iter()
            .take_while(|&&b| b != 0)
            .map(|&b| b as char)
            .collect()
    }

    /// Set the multi-file name (truncated to leave room for the terminator).
    pub fn set_name(&mut self, name: &str) {
        self.multifile_name = [0; MULTIFILE_NAME_SIZE];
        let bytes = name.as_bytes();
        let len = bytes.len().min(MULTIFILE_NAME_SIZE - 1);
        self.multifile_name[..len].copy_from_slice(&bytes[..len]);
    }

    /// Keys the file spec reports; slots past the count are not included.
    pub fn active_keys(&self) -> &[KeySpecification] {
        let n = self.spec.key_count().unwrap_or(0);
        &self.keys[..n]
    }

    /// Encode the 880-byte spec+keys region.
    pub fn specs_to_bytes(&self) -> Vec<u8> {
        let mut b = Vec::with_capacity(SPECS_SIZE);
        b.extend_from_slice(&self.spec.to_bytes());
        for key in &self.keys {
            b.extend_from_slice(&key.to_bytes());
        }
        b
    }

    /// Encode all 962 bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut b = Vec::with_capacity(STAT_BUFFER_SIZE);
        b.extend_from_slice(&self.multifile_name);
        b.extend_from_slice(&self.specs_to_bytes());
        b
    }

    /// Decode from the two regions independently.
    ///
    /// `name` may be shorter than 82 bytes (the rest stays zero). `specs` must
    /// cover the file spec and every key it reports; slots past that are
    /// decoded when present and zero otherwise.
    pub fn from_parts(name: &[u8], specs: &[u8]) -> BtrvResult<Self> {
        let mut buf = Self::default();
        let name_len = name.len().min(MULTIFILE_NAME_SIZE);
        buf.multifile_name[..name_len].copy_from_slice(&name[..name_len]);

        buf.spec = FileSpecification::from_bytes(specs)?;
        let needed = buf.spec.reply_size()?;
        if specs.len() < needed {
            return Err(short(needed, specs.len()));
        }
        for (slot, chunk) in buf
            .keys
            .iter_mut()
            .zip(specs[FILE_SPEC_SIZE..].chunks_exact(KEY_SPEC_SIZE))
        {
            *slot = KeySpecification::from_bytes(chunk)?;
        }
        Ok(buf)
    }

    /// Decode a contiguous 962-byte buffer.
    pub fn from_bytes(b: &[u8]) -> BtrvResult<Self> {
        if b.len() < STAT_BUFFER_SIZE {
            return Err(short(STAT_BUFFER_SIZE, b.len()));
        }
        Self::from_parts(&b[..MULTIFILE_NAME_SIZE], &b[MULTIFILE_NAME_SIZE..STAT_BUFFER_SIZE])
    }

    /// Zero both regions in caller memory before a Stat call.
    pub fn zero_fill(memory: &mut dyn MemoryCore, regions: StatRegions) -> BtrvResult<()> {
        memory.fill(regions.name, MULTIFILE_NAME_SIZE, 0)?;
        memory.fill(regions.specs, SPECS_SIZE, 0)
    }

    /// Read a stat buffer back out of caller memory.
    pub fn read_from(memory: &dyn MemoryCore, regions: StatRegions) -> BtrvResult<Self> {
        let name = memory.read_range(regions.name, MULTIFILE_NAME_SIZE)?;
        let specs = memory.read_range(regions.specs, SPECS_SIZE)?;
        Self::from_parts(&name, &specs)
    }

    /// Store into caller memory.
    pub fn write_to(&self, memory: &mut dyn MemoryCore, regions: StatRegions) -> BtrvResult<()> {
        memory.write_range(regions.name, &self.multifile_name)?;
        memory.write_range(regions.specs, &self.specs_to_bytes())
    }
}

/// Diagnostic dump with labeled fields.
impl fmt::Display for StatBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "record_length:     {}", self.spec.record_length)?;
        writeln!(f, "page_size:         {}", self.spec.page_size)?;
        writeln!(f, "number_of_keys:    {}", self.spec.number_of_keys)?;
        writeln!(f, "number_of_records: {}", self.spec.number_of_records)?;
        writeln!(f, "flags:             0x{:x}", self.spec.flags)?;
        writeln!(f)?;
        for (i, key) in self.active_keys().iter().enumerate() {
            writeln!(f, "key{}_position:  {}", i, key.position)?;
            writeln!(f, "key{}_length:    {}", i, key.length)?;
            writeln!(f, "key{}_flags:     0x{:x}", i, key.flags)?;
            writeln!(f, "key{}_data_type: {}", i, key.data_type)?;
        }
        Ok(())
    }
}
