//! Btrieve CLI - Dump file and key metadata through the call adapter.
//!
//! Usage:
//!   btrv --catalog <catalog.json> [options] <files...>
//!
//! Examples:
//!   btrv -c demos/catalog.json MBBSEMU.DAT             # Interrupt calls, real-mode memory
//!   btrv -c demos/catalog.json --memory flat USERS.DAT # Flat address space
//!   btrv -c demos/catalog.json --convention export --trace C:\\BBSV6\\USERS.DAT

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use btrv_core::btrieve::stat::{StatRegions, MULTIFILE_NAME_SIZE, SPECS_SIZE, STAT_BUFFER_SIZE};
use btrv_core::btrieve::{INTERFACE_ID, POSITION_BLOCK_SIZE, REQUEST_BLOCK_SIZE};
use btrv_core::{
    load_catalog_from_path, ArgWidth, BtrvResult, CallAdapter, DataLength, ExportedCall,
    FlatMemory, LogicalAddress, MemoryCore, MemoryEngine, OpenMode, Operation, RealModeMemory,
    RequestBlock, StatBuffer,
};

/// Btrieve metadata dump
#[derive(Parser, Debug)]
#[command(name = "btrv")]
#[command(about = "Open, stat and close Btrieve files through the legacy call adapter")]
struct Args {
    /// JSON catalog of the files the engine serves
    #[arg(short, long)]
    catalog: PathBuf,

    /// Caller address space
    #[arg(long, value_enum, default_value_t = MemoryModel::Real)]
    memory: MemoryModel,

    /// Calling convention used to reach the engine
    #[arg(long, value_enum, default_value_t = Convention::Interrupt)]
    convention: Convention,

    /// Open mode
    #[arg(long, value_enum, default_value_t = Mode::Normal)]
    mode: Mode,

    /// Enable call tracing
    #[arg(short, long)]
    trace: bool,

    /// File names to dump
    #[arg(required = true)]
    files: Vec<String>,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum MemoryModel {
    /// DOS real mode (segment * 16 + offset)
    Real,
    /// 32-bit flat ((segment << 16) | offset)
    Flat,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Convention {
    /// Interrupt 7Bh with a request block
    Interrupt,
    /// Exported BTRCALL-style function
    Export,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Mode {
    Normal,
    ReadOnly,
    VerifyWrite,
    Exclusive,
}

impl From<Mode> for OpenMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Normal => OpenMode::Normal,
            Mode::ReadOnly => OpenMode::ReadOnly,
            Mode::VerifyWrite => OpenMode::VerifyWrite,
            Mode::Exclusive => OpenMode::Exclusive,
        }
    }
}

/// A memory model the dump can allocate caller buffers from.
trait Heap: MemoryCore {
    fn alloc(&mut self, size: usize) -> BtrvResult<LogicalAddress>;
}

impl Heap for RealModeMemory {
    fn alloc(&mut self, size: usize) -> BtrvResult<LogicalAddress> {
        RealModeMemory::alloc(self, size)
    }
}

impl Heap for FlatMemory {
    fn alloc(&mut self, size: usize) -> BtrvResult<LogicalAddress> {
        FlatMemory::alloc(self, size)
    }
}

/// Why a dump stopped.
enum DumpError {
    /// Nonzero status from a call.
    Status(Operation, u16),
    /// Could not set up caller buffers.
    Setup(btrv_core::BtrvError),
}

impl From<btrv_core::BtrvError> for DumpError {
    fn from(e: btrv_core::BtrvError) -> Self {
        DumpError::Setup(e)
    }
}

/// Caller-side buffers for one file.
struct Caller {
    convention: Convention,
    request: LogicalAddress,
    status: LogicalAddress,
    position_block: LogicalAddress,
}

impl Caller {
    fn new(memory: &mut impl Heap, convention: Convention) -> BtrvResult<Self> {
        Ok(Self {
            convention,
            request: memory.alloc(REQUEST_BLOCK_SIZE)?,
            status: memory.alloc(2)?,
            position_block: memory.alloc(POSITION_BLOCK_SIZE)?,
        })
    }

    fn call(
        &self,
        adapter: &CallAdapter<MemoryEngine>,
        memory: &mut dyn MemoryCore,
        operation: Operation,
        data: (LogicalAddress, u16),
        key: (LogicalAddress, u8),
        key_number: i8,
    ) -> Result<(), DumpError> {
        let status = match self.convention {
            Convention::Interrupt => {
                let mut block = RequestBlock::new();
                block.set_interface_id(INTERFACE_ID);
                block.set_operation(operation as u16);
                block.set_data_buffer(data.0);
                block.set_data_buffer_length(data.1);
                block.set_position_block(self.position_block);
                block.set_key_buffer(key.0);
                block.set_key_buffer_length(key.1);
                block.set_key_number(key_number);
                block.set_status(self.status);
                block.write_to(memory, self.request)?;
                adapter.interrupt(memory, self.request.segment, self.request.offset)
            }
            Convention::Export => {
                let call = ExportedCall {
                    operation: operation as u16,
                    position_block: self.position_block.to_u32(),
                    data: data.0.to_u32(),
                    data_length: DataLength::Value(u32::from(data.1)),
                    key: key.0.to_u32(),
                    key_length: u16::from(key.1),
                    key_number: i16::from(key_number),
                    width: ArgWidth::Word,
                };
                adapter.btrcall(memory, call)
            }
        };
        debug!(?operation, status, "call returned");
        match status {
            0 => Ok(()),
            status => Err(DumpError::Status(operation, status)),
        }
    }
}

/// Open, stat and close one file, returning its metadata.
fn dump<M: Heap>(
    mut memory: M,
    adapter: &CallAdapter<MemoryEngine>,
    convention: Convention,
    mode: OpenMode,
    name: &str,
) -> Result<StatBuffer, DumpError> {
    let caller = Caller::new(&mut memory, convention)?;

    let path = memory.alloc(name.len() + 1)?;
    memory.write_range(path, name.as_bytes())?;
    memory.write_u8(path.add(name.len() as u16), 0)?;
    let key_length = u8::try_from(name.len() + 1).unwrap_or(u8::MAX);

    let regions = StatRegions::contiguous(memory.alloc(STAT_BUFFER_SIZE)?);
    StatBuffer::zero_fill(&mut memory, regions)?;

    caller.call(
        adapter,
        &mut memory,
        Operation::Open,
        (LogicalAddress::NULL, 0),
        (path, key_length),
        mode as i8,
    )?;

    let stat = caller.call(
        adapter,
        &mut memory,
        Operation::Stat,
        (regions.specs, SPECS_SIZE as u16),
        (regions.name, MULTIFILE_NAME_SIZE as u8),
        0,
    );
    let close = caller.call(
        adapter,
        &mut memory,
        Operation::Close,
        (LogicalAddress::NULL, 0),
        (LogicalAddress::NULL, 0),
        0,
    );
    stat?;
    close?;

    Ok(StatBuffer::read_from(&memory, regions)?)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let filter = if args.trace {
        EnvFilter::new("btrv_core=trace,btrv=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let catalog = match load_catalog_from_path(&args.catalog) {
        Ok(catalog) => catalog,
        Err(e) => {
            eprintln!("Failed to load {}: {}", args.catalog.display(), e);
            return Err(e.into());
        }
    };
    eprintln!("Loaded catalog: {} files", catalog.files.len());

    let adapter = Arc::new(CallAdapter::new(move || MemoryEngine::new(catalog.clone())));
    let mode = OpenMode::from(args.mode);

    // One blocking task per file, each with its own caller address space
    let handles: Vec<_> = args
        .files
        .iter()
        .cloned()
        .map(|name| {
            let adapter = adapter.clone();
            let (memory, convention) = (args.memory, args.convention);
            tokio::task::spawn_blocking(move || {
                let result = match memory {
                    MemoryModel::Real => {
                        dump(RealModeMemory::new(), &adapter, convention, mode, &name)
                    }
                    MemoryModel::Flat => {
                        dump(FlatMemory::new(0x1_0000), &adapter, convention, mode, &name)
                    }
                };
                (name, result)
            })
        })
        .collect();

    let mut failures = 0;
    for handle in handles {
        let (name, result) = handle.await?;
        match result {
            Ok(stat) => println!("{}:\n{}", name, stat),
            Err(DumpError::Status(operation, status)) => {
                eprintln!("Error from BTRIEVE ({}): {} on {:?}", name, status, operation);
                failures += 1;
            }
            Err(DumpError::Setup(e)) => {
                eprintln!("Failed to dump {}: {}", name, e);
                failures += 1;
            }
        }
    }

    if failures > 0 {
        return Err(format!("{} of {} files failed", failures, args.files.len()).into());
    }
    Ok(())
}
