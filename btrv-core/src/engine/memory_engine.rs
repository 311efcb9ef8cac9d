//! Reference engine serving Open, Close and Stat from a catalog.

use std::collections::HashMap;

use tracing::{debug, warn};

use super::catalog::{file_name, Catalog, FileDefinition};
use super::{BtrieveStatus, Completion, Engine};
use crate::btrieve::{BtrieveCommand, OpenMode, Operation};
use crate::error::BtrvResult;
use crate::memory::{LogicalAddress, MemoryCore};

/// Handle signature. The position block stores the handle and the handle
/// XOR this value, so a blank or foreign block is never mistaken for one.
const HANDLE_SIGNATURE: u16 = 0xBEEF;

/// Bytes of the position block the engine uses.
const HANDLE_SIZE: usize = 4;

struct OpenFile {
    definition: FileDefinition,
    mode: OpenMode,
}

/// In-memory record manager over a `Catalog`.
pub struct MemoryEngine {
    catalog: Catalog,
    open_files: HashMap<u16, OpenFile>,
    next_handle: u16,
}

impl MemoryEngine {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            catalog,
            open_files: HashMap::new(),
            next_handle: 1,
        }
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    /// Number of files currently open.
    pub fn open_count(&self) -> usize {
        self.open_files.len()
    }

    /// Next free handle, or `None` once every nonzero handle is in use.
    fn allocate_handle(&mut self) -> Option<u16> {
        for _ in 0..u16::MAX {
            let handle = self.next_handle;
            self.next_handle = self.next_handle.wrapping_add(1).max(1);
            if !self.open_files.contains_key(&handle) {
                return Some(handle);
            }
        }
        None
    }

    fn read_handle(
        memory: &dyn MemoryCore,
        position_block: LogicalAddress,
    ) -> BtrvResult<Option<u16>> {
        let n1 = memory.read_u16(position_block)?;
        let n2 = memory.read_u16(position_block.add(2))?;
        Ok((n1 != 0 && (n1 ^ HANDLE_SIGNATURE) == n2).then_some(n1))
    }

    fn write_handle(
        memory: &mut dyn MemoryCore,
        position_block: LogicalAddress,
        handle: u16,
    ) -> BtrvResult<()> {
        memory.write_u16(position_block, handle)?;
        memory.write_u16(position_block.add(2), handle ^ HANDLE_SIGNATURE)
    }

    fn lookup(
        &self,
        command: &BtrieveCommand,
        memory: &dyn MemoryCore,
    ) -> BtrvResult<Option<(u16, &OpenFile)>> {
        let handle = Self::read_handle(memory, command.position_block)?;
        Ok(handle.and_then(|h| self.open_files.get(&h).map(|f| (h, f))))
    }

    /// Operation 0: Open. The key buffer holds the NUL-terminated path.
    fn open(
        &mut self,
        command: &BtrieveCommand,
        memory: &mut dyn MemoryCore,
    ) -> BtrvResult<Completion> {
        let raw = memory.read_null_terminated(command.key.address, true)?;
        let path = String::from_utf8_lossy(&raw).into_owned();
        let mode = command.open_mode().unwrap_or_default();

        let Some(definition) = self.catalog.find(&path).cloned() else {
            warn!(path = %path, "can't open btrieve file");
            return Ok(Completion::status(BtrieveStatus::FileNotFound));
        };

        let name = file_name(&definition.name);
        let conflict = self.open_files.values().any(|f| {
            file_name(&f.definition.name) == name
                && (mode == OpenMode::Exclusive || f.mode == OpenMode::Exclusive)
        });
        if conflict {
            debug!(file = %name, ?mode, "open refused, file locked");
            return Ok(Completion::status(BtrieveStatus::FileLocked));
        }

        let Some(handle) = self.allocate_handle() else {
            warn!(file = %name, open = self.open_files.len(), "file table full");
            return Ok(Completion::status(BtrieveStatus::FileTableFull));
        };
        Self::write_handle(memory, command.position_block, handle)?;
        debug!(file = %name, handle, ?mode, "opened");
        self.open_files.insert(handle, OpenFile { definition, mode });
        Ok(Completion::status(BtrieveStatus::Success))
    }

    /// Operation 1: Close.
    fn close(
        &mut self,
        command: &BtrieveCommand,
        memory: &mut dyn MemoryCore,
    ) -> BtrvResult<Completion> {
        let Some((handle, _)) = self.lookup(command, memory)? else {
            return Ok(Completion::status(BtrieveStatus::FileNotOpen));
        };
        self.open_files.remove(&handle);
        memory.fill(command.position_block, HANDLE_SIZE, 0)?;
        debug!(handle, "closed");
        Ok(Completion::status(BtrieveStatus::Success))
    }

    /// Operation 15: Stat. Writes the file spec and one key spec per key to
    /// the data buffer, and blanks the multi-file name in the key buffer.
    fn stat(
        &mut self,
        command: &BtrieveCommand,
        memory: &mut dyn MemoryCore,
    ) -> BtrvResult<Completion> {
        let Some((handle, file)) = self.lookup(command, memory)? else {
            return Ok(Completion::status(BtrieveStatus::FileNotOpen));
        };
        let stat = file.definition.stat_buffer()?;

        // no multi-file spanning, so the name is always empty
        if !command.key.is_absent() {
            memory.write_u8(command.key.address, 0)?;
        }

        let required = stat.spec.reply_size()?;
        if (command.data.length as usize) < required {
            debug!(handle, required, given = command.data.length, "stat buffer overrun");
            return Ok(Completion::status(BtrieveStatus::DataBufferLengthOverrun));
        }

        memory.write_range(command.data.address, &stat.specs_to_bytes()[..required])?;
        debug!(handle, keys = stat.spec.number_of_keys, "stat");
        Ok(Completion::with_data_length(BtrieveStatus::Success, required as u32))
    }
}

impl Engine for MemoryEngine {
    fn execute(
        &mut self,
        command: &BtrieveCommand,
        memory: &mut dyn MemoryCore,
    ) -> BtrvResult<Completion> {
        match command.operation.operation {
            Operation::Open => self.open(command, memory),
            Operation::Close => self.close(command, memory),
            Operation::Stat => self.stat(command, memory),
            _ => Ok(Completion::status(BtrieveStatus::InvalidOperation)),
        }
    }
}
