use std::cell::RefCell;
use std::rc::Rc;

use emustub_session::{Disassembler, EmulationSession, Engine, FaultKind, HaltReason, RunLimits};

use crate::error::{Error, Result};
use crate::layout::{self, RegisterLayout};
use crate::signal::Signal;

/// Execution state of a debug target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetState {
    /// The target is halted.
    Halted,

    /// The target is running.
    Running,
}

/// Reason why a debug target halted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HaltCause {
    /// A breakpoint was hit.
    Breakpoint(u64),

    /// A single step (or a bounded resume) completed.
    Step,

    /// The emulated function returned.
    Returned,

    /// The debugger requested a halt.
    Interrupted,

    /// The emulation faulted.
    Fault(FaultKind),
}

#[derive(Debug)]
struct Status {
    state: TargetState,
    cause: Option<HaltCause>,
}

/// Remote-debug target backed by an emulation session.
pub struct DebugTarget<E, D> {
    session: EmulationSession<E, D>,
    layout: RegisterLayout,
    status: Rc<RefCell<Status>>,
}

impl<E, D> DebugTarget<E, D>
where
    E: Engine,
    D: Disassembler,
{
    /// Creates a new debug target.
    ///
    /// The session must be initialized with instruction tracing enabled.
    pub fn new(mut session: EmulationSession<E, D>) -> Result<Self> {
        if !session.is_initialized() {
            return Err(Error::Configuration("session is not initialized"));
        }

        if !session.is_tracing() {
            return Err(Error::Configuration(
                "instruction tracing is required for breakpoints",
            ));
        }

        let layout = RegisterLayout::for_profile(session.profile())?;

        let status = Rc::new(RefCell::new(Status {
            state: TargetState::Halted,
            cause: None,
        }));

        let cb_status = status.clone();
        session.add_breakpoint_callback(move |addr| {
            tracing::warn!(addr = format_args!("{addr:#x}"), "target hit a breakpoint");

            let mut status = cb_status.try_borrow_mut()?;
            status.state = TargetState::Halted;
            status.cause = Some(HaltCause::Breakpoint(addr));

            Ok(())
        });

        Ok(Self {
            session,
            layout,
            status,
        })
    }

    /// Returns the emulation session.
    pub fn session(&self) -> &EmulationSession<E, D> {
        &self.session
    }

    /// Returns the register layout.
    pub fn layout(&self) -> &RegisterLayout {
        &self.layout
    }

    /// Returns the target state.
    pub fn state(&self) -> TargetState {
        self.status.borrow().state
    }

    /// Returns the reason of the last halt, if the target ran already.
    pub fn halt_cause(&self) -> Option<HaltCause> {
        self.status.borrow().cause
    }

    /// Halts the target.
    pub fn halt(&mut self) {
        self.session.stop();
        self.set_status(TargetState::Halted, HaltCause::Interrupted);
    }

    /// Resumes the target for at most `count` instructions (0 for no limit).
    #[tracing::instrument(name = "resume", skip(self))]
    pub fn resume(&mut self, count: usize) -> Result<HaltCause> {
        self.status.borrow_mut().state = TargetState::Running;

        let cause = match self.session.run(RunLimits::count(count)) {
            Ok(HaltReason::Breakpoint(addr)) => HaltCause::Breakpoint(addr),
            Ok(HaltReason::ReturnReached) => HaltCause::Returned,
            Ok(HaltReason::InstructionLimit) => HaltCause::Step,
            Ok(HaltReason::Timeout | HaltReason::Stopped) => HaltCause::Interrupted,
            Err(emustub_session::Error::EmulationFault(fault)) => {
                tracing::error!(
                    addr = format_args!("{:#x}", fault.address),
                    kind = ?fault.kind,
                    "target faulted"
                );
                HaltCause::Fault(fault.kind)
            }
            Err(e) => {
                self.status.borrow_mut().state = TargetState::Halted;
                return Err(e.into());
            }
        };

        self.set_status(TargetState::Halted, cause);

        Ok(cause)
    }

    /// Executes a single instruction.
    pub fn single_step(&mut self) -> Result<HaltCause> {
        let cause = match self.resume(1)? {
            HaltCause::Breakpoint(_) | HaltCause::Returned | HaltCause::Step => HaltCause::Step,
            cause => cause,
        };

        self.set_status(TargetState::Halted, cause);

        Ok(cause)
    }

    /// Clears an emulation fault so the target can resume.
    pub fn recover(&mut self) {
        self.session.recover();
    }

    /// Returns every register of the layout, serialized in target byte order.
    pub fn register_context(&self) -> Result<Vec<u8>> {
        self.ensure_halted()?;

        let profile = self.session.profile();
        let mut ctx = Vec::with_capacity(self.layout.context_size());

        for reg in self.layout.registers() {
            let value = self.session.read_register_id(reg.id)?;
            profile.encode_word(value, &mut ctx);
        }

        Ok(ctx)
    }

    /// Writes every register of the layout from a serialized context.
    pub fn set_register_context(&mut self, ctx: &[u8]) -> Result<()> {
        self.ensure_halted()?;

        let expected = self.layout.context_size();
        if ctx.len() != expected {
            return Err(Error::MalformedContext {
                expected,
                actual: ctx.len(),
            });
        }

        let word_size = self.layout.word_size();

        for (index, word) in ctx.chunks_exact(word_size).enumerate() {
            self.write_register(index, word)?;
        }

        Ok(())
    }

    /// Reads a single register, given its protocol index.
    pub fn read_register(&self, index: usize) -> Result<Vec<u8>> {
        let reg = self
            .layout
            .get(index)
            .ok_or(Error::UnknownRegister(index))?;

        let value = self.session.read_register_id(reg.id)?;

        let mut buf = Vec::with_capacity(self.layout.word_size());
        self.session.profile().encode_word(value, &mut buf);

        Ok(buf)
    }

    /// Writes a single register, given its protocol index.
    pub fn write_register(&mut self, index: usize, bytes: &[u8]) -> Result<()> {
        let reg = self
            .layout
            .get(index)
            .ok_or(Error::UnknownRegister(index))?;

        let value = self
            .session
            .profile()
            .decode_word(bytes)
            .ok_or(Error::MalformedContext {
                expected: self.layout.word_size(),
                actual: bytes.len(),
            })?;

        tracing::debug!(reg = reg.name, value = format_args!("{value:#x}"), "set register");

        self.session.write_register_id(reg.id, value)?;

        Ok(())
    }

    /// Reads target memory.
    pub fn read_memory(&self, addr: u64, size: usize) -> Result<Vec<u8>> {
        Ok(self.session.read_memory(addr, size)?)
    }

    /// Writes target memory.
    pub fn write_memory(&mut self, addr: u64, data: &[u8]) -> Result<()> {
        Ok(self.session.write_memory(addr, data)?)
    }

    /// Sets a breakpoint.
    pub fn set_breakpoint(&mut self, addr: u64) {
        self.session.set_breakpoint(addr);
    }

    /// Removes a breakpoint.
    pub fn remove_breakpoint(&mut self, addr: u64) {
        self.session.remove_breakpoint(addr);
    }

    /// Returns the signal describing the last halt.
    pub fn signal(&self) -> Signal {
        match self.halt_cause() {
            None
            | Some(HaltCause::Breakpoint(_))
            | Some(HaltCause::Step)
            | Some(HaltCause::Returned) => Signal::Trap,
            Some(HaltCause::Interrupted) => Signal::Int,
            Some(HaltCause::Fault(kind)) => {
                Signal::for_fault(self.session.profile().family(), kind)
            }
        }
    }

    /// Returns the stop reply (`T` packet payload) describing the last halt.
    ///
    /// The reply carries the signal, the stack pointer and the program
    /// counter.
    pub fn status_response(&self) -> Result<String> {
        let sp_index = self.layout.sp_index();
        let pc_index = self.layout.pc_index();

        let sp = self.read_register(sp_index)?;
        let pc = self.read_register(pc_index)?;

        let resp = format!(
            "T{:02x}{sp_index:02x}:{};{pc_index:02x}:{};",
            self.signal().number(),
            hex::encode(sp),
            hex::encode(pc),
        );

        tracing::debug!(%resp, "stop reply");

        Ok(resp)
    }

    /// Returns the GDB target description XML.
    pub fn target_description(&self) -> Result<String> {
        self.layout.target_description()
    }

    /// Returns the GDB memory map XML.
    pub fn memory_map(&self) -> Result<String> {
        let requests = self.session.mapping_plan()?;
        layout::memory_map(&requests)
    }

    fn ensure_halted(&self) -> Result<()> {
        match self.state() {
            TargetState::Halted => Ok(()),
            state => Err(Error::InvalidState(state)),
        }
    }

    fn set_status(&self, state: TargetState, cause: HaltCause) {
        let mut status = self.status.borrow_mut();
        status.state = state;
        status.cause = Some(cause);
    }
}
