//! Legacy call adapter.
//!
//! Two calling conventions reach the same engine:
//!
//! - Interrupt 7Bh: `DS:DX` points at a 28-byte request block, and the status
//!   word is stored through the block's status pointer.
//! - Exported function: discrete far pointers passed as flat 32-bit values
//!   (segment in the high word), and the status is the return value.
//!
//! Both are decoded into a `BtrieveCommand` and executed against an engine
//! that is constructed on the first call and lives as long as the adapter.

use std::sync::{Mutex, OnceLock};

use tracing::{info, trace, warn};

use crate::btrieve::request::offset;
use crate::btrieve::{
    BtrieveCommand, BufferDescriptor, OperationCode, RequestBlock, BTRIEVE_INTERRUPT,
    INTERFACE_ID,
};
use crate::engine::{Completion, Engine};
use crate::error::{BtrvError, BtrvResult};
use crate::memory::{LogicalAddress, MemoryCore};

/// Adapter settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdapterConfig {
    /// Interface id a request block must carry.
    pub interface_id: u16,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            interface_id: INTERFACE_ID,
        }
    }
}

/// Engine lifecycle. `Ready` is entered on the first dispatch and never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdapterState {
    Uninitialized,
    Ready,
}

/// Width of the key length and key number arguments of an exported call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ArgWidth {
    /// Both passed as bytes; only the low byte of each argument is used.
    #[default]
    Byte,
    /// Both passed as words; values must still fit the command's fields.
    Word,
}

/// How an exported call passes the data buffer length.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataLength {
    Value(u32),
    /// Far pointer to a 32-bit in/out length.
    Pointer(u32),
}

/// Arguments of an exported-function call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExportedCall {
    pub operation: u16,
    pub position_block: u32,
    pub data: u32,
    pub data_length: DataLength,
    pub key: u32,
    pub key_length: u16,
    pub key_number: i16,
    pub width: ArgWidth,
}

impl ExportedCall {
    /// Decode into a command. Only a `DataLength::Pointer` touches memory.
    pub fn to_command(&self, memory: &dyn MemoryCore) -> BtrvResult<BtrieveCommand> {
        let operation = OperationCode::try_from(self.operation)
            .map_err(BtrvError::UnsupportedOperation)?;

        let data_length = match self.data_length {
            DataLength::Value(n) => n,
            DataLength::Pointer(ptr) => memory.read_u32(LogicalAddress::from_u32(ptr))?,
        };

        let (key_length, key_number) = match self.width {
            ArgWidth::Byte => (u32::from(self.key_length as u8), self.key_number as i8),
            ArgWidth::Word => (
                u32::from(self.key_length),
                i8::try_from(self.key_number)
                    .map_err(|_| BtrvError::InvalidKeyNumber(self.key_number))?,
            ),
        };

        BtrieveCommand::new(
            operation,
            BufferDescriptor::new(LogicalAddress::from_u32(self.data), data_length),
            BufferDescriptor::new(LogicalAddress::from_u32(self.key), key_length),
            LogicalAddress::from_u32(self.position_block),
            key_number,
            None,
        )
    }
}

/// A call as it arrives from a legacy caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RawCall {
    /// Interrupt convention; `ds:dx` addresses the request block.
    Interrupt { ds: u16, dx: u16 },
    Exported(ExportedCall),
}

/// Check the interface id and decode a request block.
pub fn decode_request(block: &RequestBlock, interface_id: u16) -> BtrvResult<BtrieveCommand> {
    if block.interface_id() != interface_id {
        return Err(BtrvError::InvalidInterface(block.interface_id()));
    }
    block.to_command()
}

type EngineFactory<E> = Box<dyn Fn() -> E + Send + Sync>;

/// Entry point shared by every calling convention.
///
/// The engine is built by `factory` on the first dispatch. Concurrent first
/// calls block until that single construction finishes.
pub struct CallAdapter<E: Engine> {
    config: AdapterConfig,
    factory: EngineFactory<E>,
    engine: OnceLock<Mutex<E>>,
}

impl<E: Engine> CallAdapter<E> {
    pub fn new(factory: impl Fn() -> E + Send + Sync + 'static) -> Self {
        Self::with_config(AdapterConfig::default(), factory)
    }

    pub fn with_config(
        config: AdapterConfig,
        factory: impl Fn() -> E + Send + Sync + 'static,
    ) -> Self {
        Self {
            config,
            factory: Box::new(factory),
            engine: OnceLock::new(),
        }
    }

    pub fn config(&self) -> AdapterConfig {
        self.config
    }

    pub fn state(&self) -> AdapterState {
        match self.engine.get() {
            Some(_) => AdapterState::Ready,
            None => AdapterState::Uninitialized,
        }
    }

    fn engine(&self) -> &Mutex<E> {
        self.engine.get_or_init(|| {
            info!(interface_id = self.config.interface_id, "constructing record manager");
            Mutex::new((self.factory)())
        })
    }

    /// Run `f` against the engine, constructing it if needed.
    pub fn with_engine<R>(&self, f: impl FnOnce(&mut E) -> R) -> BtrvResult<R> {
        let mut engine = self.engine().lock().map_err(|_| BtrvError::LockPoisoned)?;
        Ok(f(&mut engine))
    }

    /// Dispatch any legacy call and return its status.
    pub fn dispatch(&self, memory: &mut dyn MemoryCore, call: RawCall) -> u16 {
        match call {
            RawCall::Interrupt { ds, dx } => self.interrupt(memory, ds, dx),
            RawCall::Exported(call) => self.btrcall(memory, call),
        }
    }

    /// Interrupt convention. The status is also stored through the request
    /// block's status pointer, rejected calls included.
    pub fn interrupt(&self, memory: &mut dyn MemoryCore, ds: u16, dx: u16) -> u16 {
        self.engine();
        let request = LogicalAddress::new(ds, dx);
        trace!(vector = BTRIEVE_INTERRUPT, %request, "interrupt");

        let block = match RequestBlock::read_from(memory, request) {
            Ok(block) => block,
            Err(e) => {
                warn!(%request, error = %e, "unreadable request block");
                return e.status();
            }
        };

        let status = match decode_request(&block, self.config.interface_id) {
            Ok(command) => match self.execute(&command, memory) {
                Ok(completion) => {
                    if let Some(length) = completion.data_length {
                        let at = request.add(offset::DATA_BUFFER_LENGTH as u16);
                        match u16::try_from(length) {
                            Ok(length) => {
                                if let Err(e) = memory.write_u16(at, length) {
                                    warn!(%at, error = %e, "data length write-back failed");
                                }
                            }
                            Err(_) => warn!(%at, length, "data length does not fit the request block"),
                        }
                    }
                    completion.status
                }
                Err(e) => e.status(),
            },
            Err(e) => {
                warn!(%request, error = %e, "request rejected");
                e.status()
            }
        };

        let slot = block.status();
        if let Err(e) = memory.write_u16(slot, status) {
            warn!(%slot, status, error = %e, "status write-back failed");
        }
        status
    }

    /// Exported-function convention. The status is the return value.
    pub fn btrcall(&self, memory: &mut dyn MemoryCore, call: ExportedCall) -> u16 {
        self.engine();

        let command = match call.to_command(memory) {
            Ok(command) => command,
            Err(e) => {
                warn!(operation = call.operation, error = %e, "call rejected");
                return e.status();
            }
        };

        match self.execute(&command, memory) {
            Ok(completion) => {
                if let (DataLength::Pointer(ptr), Some(length)) =
                    (call.data_length, completion.data_length)
                {
                    let at = LogicalAddress::from_u32(ptr);
                    if let Err(e) = memory.write_u32(at, length) {
                        warn!(%at, error = %e, "data length write-back failed");
                    }
                }
                completion.status
            }
            Err(e) => e.status(),
        }
    }

    fn execute(
        &self,
        command: &BtrieveCommand,
        memory: &mut dyn MemoryCore,
    ) -> BtrvResult<Completion> {
        trace!(%command, "dispatch");
        let mut engine = self.engine().lock().map_err(|_| BtrvError::LockPoisoned)?;
        let result = engine.execute(command, memory);
        match &result {
            Ok(completion) => trace!(status = completion.status, "completed"),
            Err(e) => warn!(%command, error = %e, "engine call failed"),
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::btrieve::{OpenMode, Operation, REQUEST_BLOCK_SIZE};
    use crate::engine::BtrieveStatus;
    use crate::memory::{FlatMemory, NullMemory, RealModeMemory};
    use crate::status;
    use proptest::prelude::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Barrier};

    /// Records every command and answers with a fixed completion.
    struct Recorder {
        seen: Arc<Mutex<Vec<BtrieveCommand>>>,
        reply: Completion,
    }

    impl Engine for Recorder {
        fn execute(
            &mut self,
            command: &BtrieveCommand,
            _memory: &mut dyn MemoryCore,
        ) -> BtrvResult<Completion> {
            self.seen.lock().unwrap().push(*command);
            Ok(self.reply)
        }
    }

    struct Harness {
        adapter: CallAdapter<Recorder>,
        seen: Arc<Mutex<Vec<BtrieveCommand>>>,
        built: Arc<AtomicUsize>,
    }

    fn harness(reply: Completion) -> Harness {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let built = Arc::new(AtomicUsize::new(0));
        let (s, b) = (seen.clone(), built.clone());
        let adapter = CallAdapter::new(move || {
            b.fetch_add(1, Ordering::SeqCst);
            Recorder {
                seen: s.clone(),
                reply,
            }
        });
        Harness {
            adapter,
            seen,
            built,
        }
    }

    /// Request block plus status word in real-mode memory.
    fn request(
        mem: &mut RealModeMemory,
        build: impl FnOnce(&mut RequestBlock),
    ) -> (LogicalAddress, LogicalAddress) {
        let at = mem.alloc(REQUEST_BLOCK_SIZE).unwrap();
        let status_slot = mem.alloc(2).unwrap();
        let mut block = RequestBlock::new();
        block.set_interface_id(INTERFACE_ID);
        block.set_status(status_slot);
        build(&mut block);
        block.write_to(mem, at).unwrap();
        (at, status_slot)
    }

    fn exported(operation: u16, key_number: i16) -> ExportedCall {
        ExportedCall {
            operation,
            position_block: 0x8000_0000,
            data: 0x8001_0000,
            data_length: DataLength::Value(10),
            key: 0x8002_0000,
            key_length: 4,
            key_number,
            width: ArgWidth::Word,
        }
    }

    #[test]
    fn test_lazy_construction() {
        let h = harness(Completion::status(0u16));
        assert_eq!(h.adapter.state(), AdapterState::Uninitialized);
        assert_eq!(h.built.load(Ordering::SeqCst), 0);

        let mut mem = NullMemory::new();
        for _ in 0..5 {
            assert_eq!(h.adapter.btrcall(&mut mem, exported(1, 0)), 0);
        }
        assert_eq!(h.adapter.state(), AdapterState::Ready);
        assert_eq!(h.built.load(Ordering::SeqCst), 1);
        assert_eq!(h.seen.lock().unwrap().len(), 5);
    }

    #[test]
    fn test_concurrent_first_call_builds_once() {
        let h = harness(Completion::status(0u16));
        let adapter = Arc::new(h.adapter);
        let barrier = Arc::new(Barrier::new(8));

        let threads: Vec<_> = (0..8)
            .map(|_| {
                let adapter = adapter.clone();
                let barrier = barrier.clone();
                std::thread::spawn(move || {
                    let mut mem = NullMemory::new();
                    barrier.wait();
                    adapter.btrcall(&mut mem, exported(15, 0))
                })
            })
            .collect();
        for t in threads {
            assert_eq!(t.join().unwrap(), 0);
        }
        assert_eq!(h.built.load(Ordering::SeqCst), 1);
        assert_eq!(h.seen.lock().unwrap().len(), 8);
    }

    #[test]
    fn test_interrupt_writes_status_and_length() {
        let h = harness(Completion::with_data_length(0u16, 48));
        let mut mem = RealModeMemory::new();
        let (at, status_slot) = request(&mut mem, |b| {
            b.set_operation(Operation::Stat as u16);
            b.set_data_buffer_length(962);
        });
        mem.write_u16(status_slot, 0xAAAA).unwrap();

        let status = h.adapter.dispatch(&mut mem, RawCall::Interrupt { ds: at.segment, dx: at.offset });
        assert_eq!(status, 0);
        assert_eq!(mem.read_u16(status_slot).unwrap(), 0);
        assert_eq!(RequestBlock::read_from(&mem, at).unwrap().data_buffer_length(), 48);

        let seen = h.seen.lock().unwrap();
        assert_eq!(seen[0].data.length, 962);
        assert_eq!(seen[0].status_slot, Some(status_slot));
    }

    #[test]
    fn test_interrupt_length_too_wide_for_block() {
        let h = harness(Completion::with_data_length(0u16, 0x1_0000));
        let mut mem = RealModeMemory::new();
        let (at, status_slot) = request(&mut mem, |b| {
            b.set_operation(Operation::Stat as u16);
            b.set_data_buffer_length(962);
        });

        assert_eq!(h.adapter.interrupt(&mut mem, at.segment, at.offset), 0);
        assert_eq!(mem.read_u16(status_slot).unwrap(), 0);
        // left alone rather than wrapped to 0
        assert_eq!(RequestBlock::read_from(&mem, at).unwrap().data_buffer_length(), 962);
    }

    #[test]
    fn test_bad_interface_rejected_before_engine() {
        let h = harness(Completion::status(0u16));
        let mut mem = RealModeMemory::new();
        let (at, status_slot) = request(&mut mem, |b| b.set_interface_id(0x1234));

        let status = h.adapter.interrupt(&mut mem, at.segment, at.offset);
        assert_eq!(status, status::PROTOCOL_ERROR);
        assert_eq!(mem.read_u16(status_slot).unwrap(), status::PROTOCOL_ERROR);
        assert!(h.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_bad_open_mode_rejected_before_engine() {
        let h = harness(Completion::status(0u16));
        let mut mem = RealModeMemory::new();
        let (at, status_slot) = request(&mut mem, |b| {
            b.set_operation(Operation::Open as u16);
            b.set_key_number(-1);
        });

        assert_eq!(h.adapter.interrupt(&mut mem, at.segment, at.offset), status::PROTOCOL_ERROR);
        assert_eq!(mem.read_u16(status_slot).unwrap(), status::PROTOCOL_ERROR);
        assert_eq!(h.adapter.btrcall(&mut mem, exported(0, -1)), status::PROTOCOL_ERROR);
        assert!(h.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_unsupported_operation() {
        let h = harness(Completion::status(0u16));
        let mut mem = NullMemory::new();
        assert_eq!(h.adapter.btrcall(&mut mem, exported(41, 0)), status::PROTOCOL_ERROR);
        assert_eq!(h.adapter.btrcall(&mut mem, exported(99, 0)), status::PROTOCOL_ERROR);
        assert!(h.seen.lock().unwrap().is_empty());
    }

    #[test]
    fn test_engine_status_passes_through() {
        let h = harness(Completion::status(BtrieveStatus::FileLocked));
        let mut mem = NullMemory::new();
        assert_eq!(h.adapter.btrcall(&mut mem, exported(0, -4)), 85);
    }

    #[test]
    fn test_null_memory_is_addressing_error() {
        let h = harness(Completion::status(0u16));
        let mut mem = NullMemory::new();
        let status = h.adapter.dispatch(&mut mem, RawCall::Interrupt { ds: 0x8000, dx: 0 });
        assert_eq!(status, status::ADDRESSING_ERROR);
        assert!(h.seen.lock().unwrap().is_empty());
        assert_eq!(h.adapter.state(), AdapterState::Ready);
    }

    #[test]
    fn test_widths() {
        let h = harness(Completion::status(0u16));
        let mut mem = NullMemory::new();

        let word = ExportedCall {
            key_length: 300,
            ..exported(5, 0)
        };
        assert_eq!(h.adapter.btrcall(&mut mem, word), status::PROTOCOL_ERROR);
        let word = ExportedCall {
            key_number: 200,
            ..exported(5, 0)
        };
        assert_eq!(h.adapter.btrcall(&mut mem, word), status::PROTOCOL_ERROR);

        let byte = ExportedCall {
            key_length: 0x0120,
            key_number: 0x01FE,
            width: ArgWidth::Byte,
            ..exported(5, 0)
        };
        assert_eq!(h.adapter.btrcall(&mut mem, byte), 0);
        let seen = h.seen.lock().unwrap();
        assert_eq!(seen[0].key.length, 0x20);
        assert_eq!(seen[0].key_number, -2);
    }

    #[test]
    fn test_data_length_pointer() {
        let h = harness(Completion::with_data_length(0u16, 48));
        let mut mem = FlatMemory::new(0x1000);
        let len_at = mem.alloc(4).unwrap();
        mem.write_u32(len_at, 880).unwrap();

        let call = ExportedCall {
            data_length: DataLength::Pointer(len_at.to_u32()),
            ..exported(15, 0)
        };
        assert_eq!(h.adapter.btrcall(&mut mem, call), 0);
        assert_eq!(h.seen.lock().unwrap()[0].data.length, 880);
        assert_eq!(mem.read_u32(len_at).unwrap(), 48);

        let bad = ExportedCall {
            data_length: DataLength::Pointer(0xFFFF_FFF0),
            ..exported(15, 0)
        };
        assert_eq!(h.adapter.btrcall(&mut mem, bad), status::ADDRESSING_ERROR);
    }

    fn any_valid_call() -> impl Strategy<Value = (u16, i8)> {
        let biased = (0u16..=40, any::<bool>(), 0u16..=4, any::<i8>()).prop_filter_map(
            "invalid operation code",
            |(base, key_only, lock, key_number)| {
                let code = base + if key_only { 50 } else { 0 } + lock * 100;
                OperationCode::try_from(code)
                    .ok()
                    .filter(|c| c.operation != Operation::Open)
                    .map(|_| (code, key_number))
            },
        );
        prop_oneof![
            prop::sample::select(vec![0i8, -2, -3, -4]).prop_map(|m| (0u16, m)),
            (1u16..=40, any::<i8>()),
            biased,
            prop::sample::select(vec![155u16, 412, 262, 363]).prop_map(|code| (code, 0i8)),
        ]
    }

    proptest! {
        #[test]
        fn prop_front_ends_agree(
            (operation, key_number) in any_valid_call(),
            pos in any::<u32>(),
            data in any::<u32>(),
            key in any::<u32>(),
            data_length in any::<u16>(),
            key_length in any::<u8>(),
            by_pointer in any::<bool>(),
            width in prop::sample::select(vec![ArgWidth::Byte, ArgWidth::Word]),
        ) {
            let h = harness(Completion::status(0u16));
            let mut mem = RealModeMemory::new();
            let (at, _) = request(&mut mem, |b| {
                b.set_operation(operation);
                b.set_position_block(LogicalAddress::from_u32(pos));
                b.set_data_buffer(LogicalAddress::from_u32(data));
                b.set_data_buffer_length(data_length);
                b.set_key_buffer(LogicalAddress::from_u32(key));
                b.set_key_buffer_length(key_length);
                b.set_key_number(key_number);
            });
            let len_at = mem.alloc(4).unwrap();
            mem.write_u32(len_at, u32::from(data_length)).unwrap();

            let call = ExportedCall {
                operation,
                position_block: pos,
                data,
                data_length: if by_pointer {
                    DataLength::Pointer(len_at.to_u32())
                } else {
                    DataLength::Value(u32::from(data_length))
                },
                key,
                key_length: u16::from(key_length),
                key_number: i16::from(key_number),
                width,
            };

            prop_assert_eq!(h.adapter.interrupt(&mut mem, at.segment, at.offset), 0);
            prop_assert_eq!(h.adapter.btrcall(&mut mem, call), 0);

            let seen = h.seen.lock().unwrap();
            prop_assert_eq!(seen.len(), 2);
            prop_assert!(seen[0].same_request(&seen[1]));
            prop_assert_eq!(seen[1].status_slot, None);
            if operation == 0 {
                prop_assert_eq!(seen[0].open_mode(), Some(OpenMode::try_from(key_number).unwrap()));
            }
        }
    }
}
