//! Emulation session: memory setup, run control and breakpoints.

mod snapshot;
mod trace;

#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use indexmap::IndexMap;

pub use self::snapshot::RegisterSnapshot;
pub use self::trace::{BreakpointCallback, CallbackError, TraceCallback, TracedInstruction};

use self::trace::TraceState;
use crate::arch::{ArchitectureProfile, RegisterId};
use crate::disasm::Disassembler;
use crate::engine::{Engine, HookKind, Permissions, RunRequest};
use crate::error::{EmulationFault, Error, Result};
use crate::memory::{MappingRequest, MemoryRegionTable, PAGE_SIZE};

/// State of an emulation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not initialized yet.
    Unconfigured,

    /// Initialized and ready to run.
    Ready,

    /// A run is in progress.
    Running,

    /// The last run halted without error.
    HaltedNormal,

    /// The last run halted on a breakpoint.
    HaltedBreakpoint(u64),

    /// The last run halted on an emulation fault.
    HaltedError,
}

/// Reason why a run returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltReason {
    /// The return address was reached.
    ReturnReached,

    /// A breakpoint was hit.
    Breakpoint(u64),

    /// The instruction count limit was exhausted.
    InstructionLimit,

    /// The run timed out.
    Timeout,

    /// A stop was requested.
    Stopped,
}

/// Limits of a single run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunLimits {
    /// Maximum number of instructions (0 for no limit).
    pub count: usize,

    /// Maximum run duration.
    pub timeout: Option<Duration>,
}

impl RunLimits {
    /// Runs until a halt event occurs.
    pub fn unbounded() -> Self {
        Self::default()
    }

    /// Runs at most `count` instructions.
    pub fn count(count: usize) -> Self {
        Self {
            count,
            timeout: None,
        }
    }
}

/// Handle used to request a running session to stop.
///
/// The request is honoured at the next traced instruction, so it has no
/// effect on sessions without [instruction tracing]. Requests issued while
/// no run is in progress are discarded when the next run starts.
///
/// [instruction tracing]: EmulationSession::trace_instructions
#[derive(Debug, Clone)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    /// Requests the session to stop.
    pub fn stop(&self) {
        self.0.store(true, Ordering::Release);
    }
}

/// Emulation session of a single function.
pub struct EmulationSession<E, D> {
    profile: ArchitectureProfile,
    memory: MemoryRegionTable,
    start_address: Option<u64>,
    return_address: Option<u64>,
    presets: IndexMap<RegisterId, u64>,
    tracing: bool,
    state: SessionState,
    engine: Option<E>,
    trace: TraceState<D>,
    stop: Arc<AtomicBool>,
    halted_at: Option<u64>,
    last_snapshot: Option<RegisterSnapshot>,
}

impl<E, D> EmulationSession<E, D>
where
    E: Engine,
    D: Disassembler,
{
    /// Creates a new session with the given stack.
    pub fn new(profile: ArchitectureProfile, stack_base: u64, stack_size: u64) -> Self {
        let stop = Arc::new(AtomicBool::new(false));

        Self {
            trace: TraceState::new(profile.pc(), stop.clone()),
            memory: MemoryRegionTable::new(stack_base, stack_size),
            profile,
            start_address: None,
            return_address: None,
            presets: IndexMap::new(),
            tracing: false,
            state: SessionState::Unconfigured,
            engine: None,
            stop,
            halted_at: None,
            last_snapshot: None,
        }
    }

    /// Returns the architecture profile.
    pub fn profile(&self) -> &ArchitectureProfile {
        &self.profile
    }

    /// Returns the memory layout.
    pub fn memory(&self) -> &MemoryRegionTable {
        &self.memory
    }

    /// Returns the session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns whether [init](Self::init) succeeded.
    pub fn is_initialized(&self) -> bool {
        self.engine.is_some()
    }

    /// Returns whether instruction tracing is enabled.
    pub fn is_tracing(&self) -> bool {
        self.tracing
    }

    /// Returns the address the next run starts from.
    pub fn start_address(&self) -> Option<u64> {
        self.start_address
    }

    /// Returns the address at which runs return.
    pub fn return_address(&self) -> Option<u64> {
        self.return_address
    }

    /// Returns the address of the last traced instruction.
    pub fn current_address(&self) -> Option<u64> {
        self.trace.current_address
    }

    /// Returns the register presets, in declaration order.
    pub fn register_presets(&self) -> impl Iterator<Item = (RegisterId, u64)> + '_ {
        self.presets.iter().map(|(id, v)| (*id, *v))
    }

    /// Returns the engine, once initialized.
    pub fn engine(&self) -> Option<&E> {
        self.engine.as_ref()
    }

    /// Declares a readable, writable and executable memory area.
    pub fn declare_area(&mut self, base: u64, size: u64) -> Result<()> {
        self.memory.declare_area(base, size)
    }

    /// Declares a memory area with explicit permissions.
    pub fn declare_area_with_permissions(
        &mut self,
        base: u64,
        size: u64,
        permissions: Permissions,
    ) -> Result<()> {
        self.memory
            .declare_area_with_permissions(base, size, permissions)
    }

    /// Declares initial memory content.
    pub fn declare_content(&mut self, address: u64, bytes: impl Into<Vec<u8>>) -> Result<()> {
        self.memory.declare_content(address, bytes)
    }

    /// Sets the address of the first instruction to run.
    pub fn set_start_address(&mut self, addr: u64) {
        self.start_address = Some(addr);
    }

    /// Sets the address at which runs return.
    pub fn set_return_address(&mut self, addr: u64) {
        self.return_address = Some(addr);
    }

    /// Presets a register, written once the session is initialized.
    ///
    /// The value is truncated to the word size of the architecture.
    pub fn init_register(&mut self, name: &str, value: u64) -> Result<()> {
        if self.engine.is_some() {
            return Err(Error::AlreadyInitialized);
        }

        let id = self.profile.register_id(name)?;
        self.presets.insert(id, value & self.profile.word_mask());

        Ok(())
    }

    /// Enables instruction tracing (and therefore breakpoints).
    pub fn trace_instructions(&mut self) {
        self.tracing = true;
    }

    /// Sets the callback invoked with every traced instruction, replacing
    /// the previous one.
    pub fn set_trace_callback(
        &mut self,
        callback: impl FnMut(&TracedInstruction) -> std::result::Result<(), CallbackError> + 'static,
    ) {
        self.trace.trace_callback = Some(Box::new(callback));
    }

    /// Adds a callback invoked with the address of every breakpoint hit.
    ///
    /// Callbacks are invoked in registration order.
    pub fn add_breakpoint_callback(
        &mut self,
        callback: impl FnMut(u64) -> std::result::Result<(), CallbackError> + 'static,
    ) {
        self.trace.breakpoint_callbacks.push(Box::new(callback));
    }

    /// Sets a breakpoint.
    pub fn set_breakpoint(&mut self, addr: u64) {
        if self.trace.breakpoints.insert(addr) {
            tracing::debug!(addr = format_args!("{addr:#x}"), "breakpoint set");
        }
    }

    /// Removes a breakpoint.
    pub fn remove_breakpoint(&mut self, addr: u64) {
        if self.trace.breakpoints.shift_remove(&addr) {
            tracing::debug!(addr = format_args!("{addr:#x}"), "breakpoint removed");
        }
    }

    /// Returns the breakpoints, in insertion order.
    pub fn breakpoints(&self) -> impl Iterator<Item = u64> + '_ {
        self.trace.breakpoints.iter().copied()
    }

    /// Returns a handle to stop a running session.
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle(self.stop.clone())
    }

    /// Requests the session to stop at the next traced instruction.
    ///
    /// Without [instruction tracing](Self::trace_instructions), runs
    /// cannot be stopped and only end on the return address, a fault or
    /// their [limits](RunLimits).
    pub fn stop(&self) {
        self.stop.store(true, Ordering::Release);
    }

    /// Returns the mapping requests of the memory layout.
    pub fn mapping_plan(&self) -> Result<Vec<MappingRequest>> {
        self.memory.commit(PAGE_SIZE)
    }

    /// Initializes the session with an engine and a disassembler.
    ///
    /// On failure, the regions mapped so far are unmapped and the engine is
    /// dropped.
    #[tracing::instrument(name = "init", skip_all)]
    pub fn init(&mut self, mut engine: E, disassembler: D) -> Result<()> {
        if self.engine.is_some() {
            return Err(Error::AlreadyInitialized);
        }

        self.start_address
            .ok_or(Error::MissingParameter("start address"))?;
        self.return_address
            .ok_or(Error::MissingParameter("return address"))?;

        if self.memory.areas().is_empty() {
            return Err(Error::MissingParameter("memory areas"));
        }

        if self.memory.contents().is_empty() {
            return Err(Error::MissingParameter("memory contents"));
        }

        self.memory.check_contents()?;
        let requests = self.memory.commit(PAGE_SIZE)?;

        let mut mapped = Vec::with_capacity(requests.len());

        if let Err(e) = self.setup_engine(&mut engine, &requests, &mut mapped) {
            tracing::error!(error = %e, "failed to initialize engine");

            for req in mapped.iter().rev() {
                let _ = engine.unmap(req.base, req.size).inspect_err(|e| {
                    tracing::warn!(
                        error = %e,
                        base = format_args!("{:#x}", req.base),
                        "failed to unmap region"
                    )
                });
            }

            return Err(e);
        }

        self.memory.freeze();
        self.engine = Some(engine);
        self.trace.disassembler = Some(disassembler);
        self.state = SessionState::Ready;

        tracing::info!(arch = %self.profile.architecture(), "session initialized");

        Ok(())
    }

    fn setup_engine(
        &self,
        engine: &mut E,
        requests: &[MappingRequest],
        mapped: &mut Vec<MappingRequest>,
    ) -> Result<()> {
        for req in requests {
            tracing::debug!(
                base = format_args!("{:#x}", req.base),
                size = format_args!("{:#x}", req.size),
                perms = %req.permissions,
                "mapping region"
            );

            engine.map(req.base, req.size, req.permissions)?;
            mapped.push(*req);
        }

        let stack = self.memory.stack();
        engine.mem_write(stack.base, &vec![0; stack.size as usize])?;
        engine.reg_write(self.profile.sp(), stack.top())?;

        if let Some(start) = self.start_address {
            engine.reg_write(self.profile.pc(), start)?;
        }

        for content in self.memory.contents() {
            tracing::debug!(
                addr = format_args!("{:#x}", content.address),
                len = content.bytes.len(),
                "writing content"
            );

            engine.mem_write(content.address, &content.bytes)?;
        }

        for (id, value) in &self.presets {
            engine.reg_write(*id, *value)?;
        }

        engine.install_hook(HookKind::InvalidMemory)?;

        if self.tracing {
            engine.install_hook(HookKind::Code)?;
        }

        Ok(())
    }

    /// Runs the emulation from the current start address to the return
    /// address.
    #[tracing::instrument(name = "run", skip_all)]
    pub fn run(&mut self, limits: RunLimits) -> Result<HaltReason> {
        let Some(engine) = self.engine.as_mut() else {
            return Err(Error::NotInitialized);
        };

        if self.state == SessionState::HaltedError {
            return Err(Error::Faulted(self.start_address.unwrap_or_default()));
        }

        let begin = self
            .start_address
            .ok_or(Error::MissingParameter("start address"))?;
        let until = self
            .return_address
            .ok_or(Error::MissingParameter("return address"))?;

        self.stop.store(false, Ordering::Release);
        self.trace.hit = None;
        // resuming from where the last run halted executes that instruction,
        // even if it holds a breakpoint
        self.trace.skip_once = self.halted_at.filter(|&addr| addr == begin);

        tracing::info!(
            begin = format_args!("{begin:#x}"),
            until = format_args!("{until:#x}"),
            count = limits.count,
            "run"
        );

        self.state = SessionState::Running;
        let started = Instant::now();

        let request = RunRequest {
            begin,
            until,
            timeout: limits.timeout,
            count: limits.count,
        };

        let res = engine.run(request, &mut self.trace);
        let pc = engine.reg_read(self.profile.pc());

        if let Err(e) = res {
            let address = e
                .address
                .or_else(|| pc.as_ref().ok().copied())
                .unwrap_or(begin);

            self.state = SessionState::HaltedError;
            self.start_address = Some(address);
            self.halted_at = None;

            match self.snapshot() {
                Ok(snapshot) => {
                    tracing::error!(
                        addr = format_args!("{address:#x}"),
                        error = %e,
                        "emulation fault\n{snapshot}"
                    );
                    self.last_snapshot = Some(snapshot);
                }
                Err(err) => {
                    tracing::error!(
                        addr = format_args!("{address:#x}"),
                        error = %e,
                        snapshot_error = %err,
                        "emulation fault"
                    );
                }
            }

            return Err(EmulationFault {
                address,
                kind: e.kind,
                message: e.message,
            }
            .into());
        }

        let pc = pc?;
        self.start_address = Some(pc);
        self.halted_at = Some(pc);

        let reason = if let Some(addr) = self.trace.hit.take() {
            HaltReason::Breakpoint(addr)
        } else if pc == until {
            HaltReason::ReturnReached
        } else if self.stop.swap(false, Ordering::AcqRel) {
            HaltReason::Stopped
        } else if limits.timeout.is_some_and(|t| started.elapsed() >= t) {
            HaltReason::Timeout
        } else if limits.count != 0 {
            HaltReason::InstructionLimit
        } else {
            HaltReason::Stopped
        };

        self.state = match reason {
            HaltReason::Breakpoint(addr) => SessionState::HaltedBreakpoint(addr),
            _ => SessionState::HaltedNormal,
        };

        tracing::info!(pc = format_args!("{pc:#x}"), ?reason, "halted");

        if let Ok(snapshot) = self.snapshot() {
            self.last_snapshot = Some(snapshot);
        }

        Ok(reason)
    }

    /// Clears a fault, allowing the session to run again from the faulting
    /// address.
    pub fn recover(&mut self) {
        if self.state == SessionState::HaltedError {
            self.state = SessionState::Ready;
        }
    }

    /// Reads memory from the declared layout.
    pub fn read_memory(&self, addr: u64, size: usize) -> Result<Vec<u8>> {
        let engine = self.engine.as_ref().ok_or(Error::NotInitialized)?;
        self.check_range(addr, size)?;

        let mut buf = vec![0; size];
        engine.mem_read(addr, &mut buf)?;

        Ok(buf)
    }

    /// Writes memory within the declared layout.
    pub fn write_memory(&mut self, addr: u64, data: &[u8]) -> Result<()> {
        self.check_range(addr, data.len())?;
        let engine = self.engine.as_mut().ok_or(Error::NotInitialized)?;

        engine.mem_write(addr, data)?;

        Ok(())
    }

    fn check_range(&self, addr: u64, size: usize) -> Result<()> {
        if self.engine.is_none() {
            return Err(Error::NotInitialized);
        }

        let end = addr.checked_add(size as u64).ok_or(Error::OutOfBounds {
            start: addr,
            end: u64::MAX,
        })?;

        if !self.memory.validate_range(addr, end) {
            return Err(Error::OutOfBounds { start: addr, end });
        }

        Ok(())
    }

    /// Reads a register, given its name.
    pub fn read_register(&self, name: &str) -> Result<u64> {
        let id = self.profile.register_id(name)?;
        self.read_register_id(id)
    }

    /// Writes a register, given its name.
    pub fn write_register(&mut self, name: &str, value: u64) -> Result<()> {
        let id = self.profile.register_id(name)?;
        self.write_register_id(id, value)
    }

    /// Reads a register, given its ID.
    pub fn read_register_id(&self, id: RegisterId) -> Result<u64> {
        let engine = self.engine.as_ref().ok_or(Error::NotInitialized)?;
        Ok(engine.reg_read(id)?)
    }

    /// Writes a register, given its ID.
    pub fn write_register_id(&mut self, id: RegisterId, value: u64) -> Result<()> {
        let engine = self.engine.as_mut().ok_or(Error::NotInitialized)?;
        engine.reg_write(id, value)?;

        // keep the next run in sync with a relocated program counter
        if id == self.profile.pc() {
            self.start_address = Some(value);
        }

        Ok(())
    }

    /// Returns the program counter.
    pub fn program_counter(&self) -> Result<u64> {
        self.read_register_id(self.profile.pc())
    }

    /// Returns the stack pointer.
    pub fn stack_pointer(&self) -> Result<u64> {
        self.read_register_id(self.profile.sp())
    }

    /// Returns the function result register.
    pub fn return_value(&self) -> Result<u64> {
        self.read_register_id(self.profile.result())
    }

    /// Returns the `n`-th register argument.
    pub fn argument(&self, n: usize) -> Result<u64> {
        let id = self.argument_id(n)?;
        self.read_register_id(id)
    }

    /// Sets the `n`-th register argument.
    pub fn set_argument(&mut self, n: usize, value: u64) -> Result<()> {
        let id = self.argument_id(n)?;
        self.write_register_id(id, value)
    }

    fn argument_id(&self, n: usize) -> Result<RegisterId> {
        self.profile
            .arguments()
            .get(n)
            .copied()
            .ok_or_else(|| Error::UnknownRegister(format!("argument #{n}")))
    }

    /// Captures the context registers.
    pub fn snapshot(&self) -> Result<RegisterSnapshot> {
        let engine = self.engine.as_ref().ok_or(Error::NotInitialized)?;
        let mask = self.profile.word_mask();

        let registers = self
            .profile
            .context_registers()
            .iter()
            .map(|name| {
                let id = self.profile.register_id(name)?;
                Ok((*name, engine.reg_read(id)? & mask))
            })
            .collect::<Result<_>>()?;

        Ok(RegisterSnapshot::new(self.profile.word_size(), registers))
    }

    /// Returns the snapshot captured when the last run halted.
    pub fn last_snapshot(&self) -> Option<&RegisterSnapshot> {
        self.last_snapshot.as_ref()
    }
}
