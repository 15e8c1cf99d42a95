use crate::arch::Architecture;
use crate::engine::{EngineError, FaultKind};

/// Error type of this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The architecture name is not supported.
    #[error("unsupported architecture: {0}")]
    UnsupportedArchitecture(String),

    /// The bit width is incompatible with the architecture.
    #[error("{bits}-bit mode is invalid for {arch}")]
    InvalidBitWidth {
        /// Requested architecture name.
        arch: String,

        /// Requested bit width.
        bits: u32,
    },

    /// The byte order is incompatible with the architecture.
    #[error("big-endian byte order is not supported by {0}")]
    UnsupportedByteOrder(Architecture),

    /// The register name doesn't exist for the architecture.
    #[error("unknown register {0:?}")]
    UnknownRegister(String),

    /// A setup parameter is missing.
    #[error("{0} not specified")]
    MissingParameter(&'static str),

    /// The session was already initialized.
    #[error("session already initialized")]
    AlreadyInitialized,

    /// The session must be initialized first.
    #[error("session not initialized")]
    NotInitialized,

    /// A memory area was declared with an invalid size.
    #[error("invalid memory area size {size:#x} at {base:#x}")]
    InvalidSize {
        /// Base address of the area.
        base: u64,

        /// Declared size.
        size: u64,
    },

    /// A memory content block was declared without data.
    #[error("empty memory content at {0:#x}")]
    EmptyContent(u64),

    /// Two memory regions overlap once aligned to page boundaries.
    #[error("memory region {first:#x?} overlaps {second:#x?}")]
    OverlappingArea {
        /// Page-aligned range of the first region.
        first: std::ops::Range<u64>,

        /// Page-aligned range of the second region.
        second: std::ops::Range<u64>,
    },

    /// The memory table was committed to an engine and can't change.
    #[error("memory layout is already committed")]
    MemoryTableFrozen,

    /// A memory access falls outside the declared regions.
    #[error("memory range {start:#x}..{end:#x} is out of bounds")]
    OutOfBounds {
        /// Start of the rejected range.
        start: u64,

        /// End (exclusive) of the rejected range.
        end: u64,
    },

    /// The engine reported an execution error.
    #[error(transparent)]
    EmulationFault(#[from] EmulationFault),

    /// The session halted on a fault and must be recovered first.
    #[error("session halted on a fault at {0:#x}")]
    Faulted(u64),

    /// The engine rejected an operation.
    #[error(transparent)]
    Engine(#[from] EngineError),

    /// The disassembler failed.
    #[error(transparent)]
    Disassembly(#[from] crate::disasm::DisasmError),
}

/// Execution error reported by the engine during a run.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("emulation fault at {address:#x} ({kind:?}): {message}")]
pub struct EmulationFault {
    /// Address where the fault occurred.
    pub address: u64,

    /// Kind of fault.
    pub kind: FaultKind,

    /// Engine message.
    pub message: String,
}

/// Result type of this crate.
pub type Result<T> = core::result::Result<T, Error>;
