//! Interrupt request block.
//!
//! A caller of the interrupt interface points DS:DX at this structure.
//!
//! Layout (28 bytes, little-endian, far pointers stored offset then segment):
//! - Bytes 0-3: Data buffer pointer
//! - Bytes 4-5: Data buffer length (updated with the returned length)
//! - Bytes 6-9: Position block pointer
//! - Bytes 10-13: FCB pointer (unused)
//! - Bytes 14-15: Operation code
//! - Bytes 16-19: Key buffer pointer
//! - Byte 20: Key buffer length
//! - Byte 21: Key number (signed; open mode for Open)
//! - Bytes 22-25: Status word pointer
//! - Bytes 26-27: Interface identifier (0x6176)

use super::command::{BtrieveCommand, BufferDescriptor};
use super::OperationCode;
use crate::error::{BtrvError, BtrvResult};
use crate::memory::{LogicalAddress, MemoryCore};

/// Size of a request block in bytes.
pub const REQUEST_BLOCK_SIZE: usize = 28;

/// Field offsets within the request block.
pub mod offset {
    pub const DATA_BUFFER: usize = 0;
    pub const DATA_BUFFER_LENGTH: usize = 4;
    pub const POSITION_BLOCK: usize = 6;
    pub const FCB: usize = 10;
    pub const OPERATION: usize = 14;
    pub const KEY_BUFFER: usize = 16;
    pub const KEY_BUFFER_LENGTH: usize = 20;
    pub const KEY_NUMBER: usize = 21;
    pub const STATUS: usize = 22;
    pub const INTERFACE_ID: usize = 26;
}

/// A copy of the request block taken from caller memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RequestBlock {
    mem: [u8; REQUEST_BLOCK_SIZE],
}

impl RequestBlock {
    /// Blank block (all zero, including the interface id).
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_bytes(bytes: [u8; REQUEST_BLOCK_SIZE]) -> Self {
        Self { mem: bytes }
    }

    /// Copy the block out of caller memory in one bulk read.
    pub fn read_from(memory: &dyn MemoryCore, address: LogicalAddress) -> BtrvResult<Self> {
        let bytes = memory.read_range(address, REQUEST_BLOCK_SIZE)?;
        let mem = bytes
            .try_into()
            .map_err(|v: Vec<u8>| BtrvError::ShortBuffer {
                needed: REQUEST_BLOCK_SIZE,
                got: v.len(),
            })?;
        Ok(Self { mem })
    }

    /// Store the block into caller memory.
    pub fn write_to(&self, memory: &mut dyn MemoryCore, address: LogicalAddress) -> BtrvResult<()> {
        memory.write_range(address, &self.mem)
    }

    pub fn as_bytes(&self) -> &[u8; REQUEST_BLOCK_SIZE] {
        &self.mem
    }

    fn word(&self, at: usize) -> u16 {
        u16::from_le_bytes([self.mem[at], self.mem[at + 1]])
    }

    fn set_word(&mut self, at: usize, v: u16) {
        self.mem[at..at + 2].copy_from_slice(&v.to_le_bytes());
    }

    fn ptr(&self, at: usize) -> LogicalAddress {
        LogicalAddress::from_le_bytes([
            self.mem[at],
            self.mem[at + 1],
            self.mem[at + 2],
            self.mem[at + 3],
        ])
    }

    fn set_ptr(&mut self, at: usize, v: LogicalAddress) {
        self.mem[at..at + 4].copy_from_slice(&v.to_le_bytes());
    }

    /// Far pointer to the caller's data buffer.
    pub fn data_buffer(&self) -> LogicalAddress {
        self.ptr(offset::DATA_BUFFER)
    }

    /// Set the data buffer pointer.
    pub fn set_data_buffer(&mut self, v: LogicalAddress) {
        self.set_ptr(offset::DATA_BUFFER, v);
    }

    /// Data buffer length in bytes. Rewritten with the returned length after a call.
    pub fn data_buffer_length(&self) -> u16 {
        self.word(offset::DATA_BUFFER_LENGTH)
    }

    /// Set the data buffer length.
    pub fn set_data_buffer_length(&mut self, v: u16) {
        self.set_word(offset::DATA_BUFFER_LENGTH, v);
    }

    /// Far pointer to the 128-byte position block.
    pub fn position_block(&self) -> LogicalAddress {
        self.ptr(offset::POSITION_BLOCK)
    }

    /// Set the position block pointer.
    pub fn set_position_block(&mut self, v: LogicalAddress) {
        self.set_ptr(offset::POSITION_BLOCK, v);
    }

    /// FCB pointer. Carried for layout fidelity; never used.
    pub fn fcb(&self) -> LogicalAddress {
        self.ptr(offset::FCB)
    }

    /// Raw operation code, biases included.
    pub fn operation(&self) -> u16 {
        self.word(offset::OPERATION)
    }

    /// Set the raw operation code.
    pub fn set_operation(&mut self, v: u16) {
        self.set_word(offset::OPERATION, v);
    }

    /// Far pointer to the key buffer.
    pub fn key_buffer(&self) -> LogicalAddress {
        self.ptr(offset::KEY_BUFFER)
    }

    /// Set the key buffer pointer.
    pub fn set_key_buffer(&mut self, v: LogicalAddress) {
        self.set_ptr(offset::KEY_BUFFER, v);
    }

    /// Key buffer length, a single byte.
    pub fn key_buffer_length(&self) -> u8 {
        self.mem[offset::KEY_BUFFER_LENGTH]
    }

    /// Set the key buffer length.
    pub fn set_key_buffer_length(&mut self, v: u8) {
        self.mem[offset::KEY_BUFFER_LENGTH] = v;
    }

    /// Key number, sign-extended from the stored byte.
    pub fn key_number(&self) -> i8 {
        self.mem[offset::KEY_NUMBER] as i8
    }

    /// Store a key number or open mode as its two's complement byte.
    pub fn set_key_number(&mut self, v: i8) {
        self.mem[offset::KEY_NUMBER] = v as u8;
    }

    /// Far pointer to the caller's status word.
    pub fn status(&self) -> LogicalAddress {
        self.ptr(offset::STATUS)
    }

    /// Set the status word pointer.
    pub fn set_status(&mut self, v: LogicalAddress) {
        self.set_ptr(offset::STATUS, v);
    }

    /// Interface id word, `0x6176` from a well-formed caller.
    pub fn interface_id(&self) -> u16 {
        self.word(offset::INTERFACE_ID)
    }

    /// Set the interface id word.
    pub fn set_interface_id(&mut self, v: u16) {
        self.set_word(offset::INTERFACE_ID, v);
    }

    /// Decode into a normalized command.
    ///
    /// The interface id is not checked here; the adapter does that against
    /// its configured value before decoding.
    pub fn to_command(&self) -> BtrvResult<BtrieveCommand> {
        let operation = OperationCode::try_from(self.operation())
            .map_err(BtrvError::UnsupportedOperation)?;
        BtrieveCommand::new(
            operation,
            BufferDescriptor::new(self.data_buffer(), self.data_buffer_length() as u32),
            BufferDescriptor::new(self.key_buffer(), self.key_buffer_length() as u32),
            self.position_block(),
            self.key_number(),
            Some(self.status()),
        )
    }
}
