//! Normalized engine-facing command.

use std::fmt;

use super::{
    OpenMode, Operation, OperationCode, MAX_DATA_BUFFER_LENGTH, MAX_KEY_BUFFER_LENGTH,
};
use crate::error::{BtrvError, BtrvResult};
use crate::memory::LogicalAddress;

/// A caller buffer the engine may read or write. Zero length means absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BufferDescriptor {
    pub address: LogicalAddress,
    pub length: u32,
}

impl BufferDescriptor {
    pub const fn new(address: LogicalAddress, length: u32) -> Self {
        Self { address, length }
    }

    pub const fn is_absent(&self) -> bool {
        self.length == 0
    }
}

/// One Btrieve request, independent of how the caller passed it.
///
/// Building a command is address arithmetic only; no caller memory is touched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BtrieveCommand {
    pub operation: OperationCode,
    pub data: BufferDescriptor,
    pub key: BufferDescriptor,
    pub position_block: LogicalAddress,
    /// Key number, or the open mode for Open.
    pub key_number: i8,
    /// Where the status word goes. `None` when it is the call's return value.
    pub status_slot: Option<LogicalAddress>,
}

impl BtrieveCommand {
    /// Validate and build a command.
    pub fn new(
        operation: OperationCode,
        data: BufferDescriptor,
        key: BufferDescriptor,
        position_block: LogicalAddress,
        key_number: i8,
        status_slot: Option<LogicalAddress>,
    ) -> BtrvResult<Self> {
        if operation.operation == Operation::Open {
            OpenMode::try_from(key_number)?;
        }
        check_capacity("data", data.length, MAX_DATA_BUFFER_LENGTH)?;
        check_capacity("key", key.length, MAX_KEY_BUFFER_LENGTH)?;
        Ok(Self {
            operation,
            data,
            key,
            position_block,
            key_number,
            status_slot,
        })
    }

    /// Open mode of an Open command.
    pub fn open_mode(&self) -> Option<OpenMode> {
        match self.operation.operation {
            Operation::Open => OpenMode::try_from(self.key_number).ok(),
            _ => None,
        }
    }

    /// Compare everything but the status slot, which differs by convention
    /// (pointer for the interrupt interface, return value for exports).
    pub fn same_request(&self, other: &Self) -> bool {
        Self {
            status_slot: None,
            ..*self
        } == Self {
            status_slot: None,
            ..*other
        }
    }
}

fn check_capacity(buffer: &'static str, length: u32, capacity: u32) -> BtrvResult<()> {
    if length > capacity {
        return Err(BtrvError::BufferTooLarge {
            buffer,
            length,
            capacity,
        });
    }
    Ok(())
}

impl fmt::Display for BtrieveCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pos={} data={}+{} key={}+{} keynum={}",
            self.operation,
            self.position_block,
            self.data.address,
            self.data.length,
            self.key.address,
            self.key.length,
            self.key_number
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open(mode: i8) -> BtrvResult<BtrieveCommand> {
        BtrieveCommand::new(
            Operation::Open.into(),
            BufferDescriptor::default(),
            BufferDescriptor::new(LogicalAddress::new(0x8000, 0), 12),
            LogicalAddress::new(0x8001, 0),
            mode,
            None,
        )
    }

    #[test]
    fn test_open_mode_checked() {
        assert_eq!(open(0).unwrap().open_mode(), Some(OpenMode::Normal));
        assert_eq!(open(-4).unwrap().open_mode(), Some(OpenMode::Exclusive));
        assert!(matches!(open(-1), Err(BtrvError::InvalidOpenMode(-1))));
        assert!(matches!(open(3), Err(BtrvError::InvalidOpenMode(3))));
    }

    #[test]
    fn test_key_number_free_for_other_operations() {
        let cmd = BtrieveCommand::new(
            Operation::GetEqual.into(),
            BufferDescriptor::default(),
            BufferDescriptor::default(),
            LogicalAddress::NULL,
            -1,
            None,
        )
        .unwrap();
        assert_eq!(cmd.open_mode(), None);
        assert!(cmd.data.is_absent());
    }

    #[test]
    fn test_capacity_checked() {
        let too_long_key = BtrieveCommand::new(
            Operation::Stat.into(),
            BufferDescriptor::default(),
            BufferDescriptor::new(LogicalAddress::NULL, 256),
            LogicalAddress::NULL,
            0,
            None,
        );
        assert!(matches!(
            too_long_key,
            Err(BtrvError::BufferTooLarge { buffer: "key", length: 256, capacity: 255 })
        ));

        let too_long_data = BtrieveCommand::new(
            Operation::Stat.into(),
            BufferDescriptor::new(LogicalAddress::NULL, 0x1_0000),
            BufferDescriptor::default(),
            LogicalAddress::NULL,
            0,
            None,
        );
        assert!(matches!(too_long_data, Err(BtrvError::BufferTooLarge { buffer: "data", .. })));
    }

    #[test]
    fn test_same_request_ignores_status_slot() {
        let a = open(0).unwrap();
        let b = BtrieveCommand {
            status_slot: Some(LogicalAddress::new(0x8005, 0)),
            ..a
        };
        assert_ne!(a, b);
        assert!(a.same_request(&b));
        let c = BtrieveCommand { key_number: -2, ..a };
        assert!(!a.same_request(&c));
    }
}
