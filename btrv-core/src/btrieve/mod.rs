//! Btrieve call-boundary types.
//!
//! This module holds everything exchanged with legacy callers: operation
//! codes, open modes, the interrupt request block, the normalized command and
//! the stat metadata structures.

pub mod command;
pub mod request;
pub mod stat;

pub use command::{BtrieveCommand, BufferDescriptor};
pub use request::{RequestBlock, REQUEST_BLOCK_SIZE};
pub use stat::{FileSpecification, KeySpecification, StatBuffer};

use std::fmt;

use crate::error::{BtrvError, BtrvResult};

/// Interface identifier carried in every interrupt request block.
pub const INTERFACE_ID: u16 = 0x6176;

/// Software interrupt vector of the record manager.
pub const BTRIEVE_INTERRUPT: u8 = 0x7B;

/// Size of a caller's position block.
pub const POSITION_BLOCK_SIZE: usize = 128;

/// Largest data buffer a request can describe.
pub const MAX_DATA_BUFFER_LENGTH: u32 = u16::MAX as u32;

/// Largest key buffer a request can describe.
pub const MAX_KEY_BUFFER_LENGTH: u32 = u8::MAX as u32;

/// Base Btrieve operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum Operation {
    /// 0: Open file (key number carries the open mode)
    Open = 0,
    /// 1: Close file
    Close = 1,
    /// 2: Insert record
    Insert = 2,
    /// 3: Update record
    Update = 3,
    /// 4: Delete record
    Delete = 4,
    /// 5: Get equal
    GetEqual = 5,
    /// 6: Get next
    GetNext = 6,
    /// 7: Get previous
    GetPrevious = 7,
    /// 8: Get greater
    GetGreater = 8,
    /// 9: Get greater or equal
    GetGreaterOrEqual = 9,
    /// 10: Get less
    GetLess = 10,
    /// 11: Get less or equal
    GetLessOrEqual = 11,
    /// 12: Get first
    GetFirst = 12,
    /// 13: Get last
    GetLast = 13,
    /// 14: Create file
    Create = 14,
    /// 15: Stat (describe file)
    Stat = 15,
    /// 16: Extend file
    Extend = 16,
    /// 17: Set directory
    SetDirectory = 17,
    /// 18: Get directory
    GetDirectory = 18,
    /// 19: Begin transaction
    BeginTransaction = 19,
    /// 20: End transaction
    EndTransaction = 20,
    /// 21: Abort transaction
    AbortTransaction = 21,
    /// 22: Get position
    GetPosition = 22,
    /// 23: Get direct
    GetDirect = 23,
    /// 24: Step next
    StepNext = 24,
    /// 25: Stop record manager
    Stop = 25,
    /// 26: Version
    Version = 26,
    /// 27: Unlock
    Unlock = 27,
    /// 28: Reset
    Reset = 28,
    /// 29: Set owner
    SetOwner = 29,
    /// 30: Clear owner
    ClearOwner = 30,
    /// 31: Create supplemental index
    CreateSupplementalIndex = 31,
    /// 32: Drop supplemental index
    DropSupplementalIndex = 32,
    /// 33: Step first
    StepFirst = 33,
    /// 34: Step last
    StepLast = 34,
    /// 35: Step previous
    StepPrevious = 35,
    /// 36: Get next extended
    GetNextExtended = 36,
    /// 37: Get previous extended
    GetPreviousExtended = 37,
    /// 38: Step next extended
    StepNextExtended = 38,
    /// 39: Step previous extended
    StepPreviousExtended = 39,
    /// 40: Insert extended
    InsertExtended = 40,
}

impl TryFrom<u16> for Operation {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::Open),
            1 => Ok(Self::Close),
            2 => Ok(Self::Insert),
            3 => Ok(Self::Update),
            4 => Ok(Self::Delete),
            5 => Ok(Self::GetEqual),
            6 => Ok(Self::GetNext),
            7 => Ok(Self::GetPrevious),
            8 => Ok(Self::GetGreater),
            9 => Ok(Self::GetGreaterOrEqual),
            10 => Ok(Self::GetLess),
            11 => Ok(Self::GetLessOrEqual),
            12 => Ok(Self::GetFirst),
            13 => Ok(Self::GetLast),
            14 => Ok(Self::Create),
            15 => Ok(Self::Stat),
            16 => Ok(Self::Extend),
            17 => Ok(Self::SetDirectory),
            18 => Ok(Self::GetDirectory),
            19 => Ok(Self::BeginTransaction),
            20 => Ok(Self::EndTransaction),
            21 => Ok(Self::AbortTransaction),
            22 => Ok(Self::GetPosition),
            23 => Ok(Self::GetDirect),
            24 => Ok(Self::StepNext),
            25 => Ok(Self::Stop),
            26 => Ok(Self::Version),
            27 => Ok(Self::Unlock),
            28 => Ok(Self::Reset),
            29 => Ok(Self::SetOwner),
            30 => Ok(Self::ClearOwner),
            31 => Ok(Self::CreateSupplementalIndex),
            32 => Ok(Self::DropSupplementalIndex),
            33 => Ok(Self::StepFirst),
            34 => Ok(Self::StepLast),
            35 => Ok(Self::StepPrevious),
            36 => Ok(Self::GetNextExtended),
            37 => Ok(Self::GetPreviousExtended),
            38 => Ok(Self::StepNextExtended),
            39 => Ok(Self::StepPreviousExtended),
            40 => Ok(Self::InsertExtended),
            _ => Err(value),
        }
    }
}

impl Operation {
    /// Get operations that accept the +50 key-only bias.
    pub fn accepts_key_only(self) -> bool {
        (Self::GetEqual as u16..=Self::GetLast as u16).contains(&(self as u16))
    }
}

/// Record lock requested through the +100..+400 bias.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LockBias {
    #[default]
    None,
    /// +100: single wait lock
    SingleWait,
    /// +200: single no-wait lock
    SingleNoWait,
    /// +300: multiple wait lock
    MultipleWait,
    /// +400: multiple no-wait lock
    MultipleNoWait,
}

impl LockBias {
    fn from_hundreds(hundreds: u16) -> Option<Self> {
        match hundreds {
            0 => Some(Self::None),
            1 => Some(Self::SingleWait),
            2 => Some(Self::SingleNoWait),
            3 => Some(Self::MultipleWait),
            4 => Some(Self::MultipleNoWait),
            _ => None,
        }
    }

    fn bias(self) -> u16 {
        match self {
            Self::None => 0,
            Self::SingleWait => 100,
            Self::SingleNoWait => 200,
            Self::MultipleWait => 300,
            Self::MultipleNoWait => 400,
        }
    }
}

/// A decoded operation code: base operation plus key-only and lock biases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OperationCode {
    pub operation: Operation,
    pub key_only: bool,
    pub lock: LockBias,
}

impl OperationCode {
    pub const fn new(operation: Operation) -> Self {
        Self {
            operation,
            key_only: false,
            lock: LockBias::None,
        }
    }

    /// Raw numeric code as the caller passed it.
    pub fn code(self) -> u16 {
        self.operation as u16 + if self.key_only { 50 } else { 0 } + self.lock.bias()
    }
}

impl From<Operation> for OperationCode {
    fn from(operation: Operation) -> Self {
        Self::new(operation)
    }
}

impl TryFrom<u16> for OperationCode {
    type Error = u16;

    fn try_from(value: u16) -> Result<Self, Self::Error> {
        let lock = LockBias::from_hundreds(value / 100).ok_or(value)?;
        let mut base = value % 100;
        let key_only = base >= 50;
        if key_only {
            base -= 50;
        }
        let operation = Operation::try_from(base).map_err(|_| value)?;
        if key_only && !operation.accepts_key_only() {
            return Err(value);
        }
        Ok(Self {
            operation,
            key_only,
            lock,
        })
    }
}

impl fmt::Display for OperationCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self.operation)?;
        if self.key_only {
            write!(f, "+KeyOnly")?;
        }
        if self.lock != LockBias::None {
            write!(f, "+{:?}", self.lock)?;
        }
        Ok(())
    }
}

/// Open modes, carried in the key number slot of an Open call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(i8)]
pub enum OpenMode {
    #[default]
    Normal = 0,
    ReadOnly = -2,
    VerifyWrite = -3,
    Exclusive = -4,
}

impl TryFrom<i8> for OpenMode {
    type Error = BtrvError;

    fn try_from(value: i8) -> BtrvResult<Self> {
        match value {
            0 => Ok(Self::Normal),
            -2 => Ok(Self::ReadOnly),
            -3 => Ok(Self::VerifyWrite),
            -4 => Ok(Self::Exclusive),
            _ => Err(BtrvError::InvalidOpenMode(value as i16)),
        }
    }
}
