use std::time::Duration;

use crate::arch::RegisterId;

bitflags::bitflags! {
    /// Access permissions of a mapped memory region.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u8 {
        /// Readable.
        const READ = 1 << 0;
        /// Writable.
        const WRITE = 1 << 1;
        /// Executable.
        const EXEC = 1 << 2;
        /// Readable, writable and executable.
        const ALL = Self::READ.bits() | Self::WRITE.bits() | Self::EXEC.bits();
    }
}

impl Permissions {
    /// Parses a `rwx`-style permission string (`-` marks a missing bit).
    pub fn parse(s: &str) -> Option<Self> {
        let mut perms = Self::empty();

        for (i, c) in s.chars().enumerate() {
            match (i, c) {
                (0, 'r') => perms |= Self::READ,
                (1, 'w') => perms |= Self::WRITE,
                (2, 'x') => perms |= Self::EXEC,
                (0..=2, '-') => (),
                _ => return None,
            }
        }

        Some(perms)
    }
}

impl std::fmt::Display for Permissions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let bit = |flag, c| if self.contains(flag) { c } else { '-' };

        write!(
            f,
            "{}{}{}",
            bit(Self::READ, 'r'),
            bit(Self::WRITE, 'w'),
            bit(Self::EXEC, 'x')
        )
    }
}

/// Kind of hook an engine can dispatch to [Hooks].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HookKind {
    /// Called before every executed instruction.
    Code,

    /// Called on accesses to unmapped or protected memory.
    InvalidMemory,
}

/// Kind of memory access reported by the invalid-memory hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryAccess {
    /// Data read.
    Read,

    /// Data write.
    Write,

    /// Instruction fetch.
    Fetch,
}

/// Engine-independent classification of an execution error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultKind {
    /// Read from unmapped memory.
    ReadUnmapped,
    /// Write to unmapped memory.
    WriteUnmapped,
    /// Instruction fetch from unmapped memory.
    FetchUnmapped,
    /// Read from non-readable memory.
    ReadProtected,
    /// Write to non-writable memory.
    WriteProtected,
    /// Instruction fetch from non-executable memory.
    FetchProtected,
    /// Misaligned data access or fetch.
    Unaligned,
    /// Undecodable instruction.
    InvalidInstruction,
    /// Unhandled CPU exception or interrupt.
    CpuException,
    /// Invalid argument given to the engine (e.g., overlapping mapping).
    InvalidArgument,
    /// Anything else.
    Other,
}

/// Error returned by an [Engine].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("engine error ({kind:?}): {message}")]
pub struct EngineError {
    /// Classification of the error.
    pub kind: FaultKind,

    /// Address involved, when known.
    pub address: Option<u64>,

    /// Engine message.
    pub message: String,
}

impl EngineError {
    /// Creates a new engine error.
    pub fn new(
        kind: FaultKind,
        address: impl Into<Option<u64>>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            address: address.into(),
            message: message.into(),
        }
    }
}

/// Parameters of a single engine run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunRequest {
    /// Address of the first instruction to execute.
    pub begin: u64,

    /// Address at which execution stops (not executed).
    pub until: u64,

    /// Maximum run duration.
    pub timeout: Option<Duration>,

    /// Maximum number of instructions (0 for no limit).
    pub count: usize,
}

/// Trait implementing an instruction-set emulation engine.
///
/// The engine runs synchronously on the calling thread, and dispatches the
/// installed hooks inline during [run](Self::run).
pub trait Engine {
    /// Maps a memory region.
    fn map(&mut self, base: u64, size: u64, perms: Permissions) -> Result<(), EngineError>;

    /// Unmaps a memory region.
    fn unmap(&mut self, base: u64, size: u64) -> Result<(), EngineError>;

    /// Reads mapped memory.
    fn mem_read(&self, addr: u64, buf: &mut [u8]) -> Result<(), EngineError>;

    /// Writes mapped memory.
    fn mem_write(&mut self, addr: u64, data: &[u8]) -> Result<(), EngineError>;

    /// Reads a register.
    fn reg_read(&self, reg: RegisterId) -> Result<u64, EngineError>;

    /// Writes a register.
    fn reg_write(&mut self, reg: RegisterId, value: u64) -> Result<(), EngineError>;

    /// Enables dispatching of the given hook kind during runs.
    fn install_hook(&mut self, kind: HookKind) -> Result<(), EngineError>;

    /// Runs the emulation until `request.until` is reached, the instruction
    /// count or timeout is exhausted, [stop](Self::stop) is called, or an
    /// error occurs.
    fn run(&mut self, request: RunRequest, hooks: &mut dyn Hooks<Self>)
    -> Result<(), EngineError>;

    /// Requests the engine to halt before the next instruction.
    fn stop(&mut self);
}

/// Trait implementing the callbacks dispatched by an [Engine] during a run.
pub trait Hooks<E: ?Sized> {
    /// Called before the instruction at `address` executes.
    fn instruction(&mut self, engine: &mut E, address: u64, size: u32);

    /// Called on an invalid memory access.
    ///
    /// Returns whether the access was handled (and execution may go on).
    fn invalid_memory(
        &mut self,
        engine: &mut E,
        access: MemoryAccess,
        address: u64,
        size: usize,
    ) -> bool;
}
