use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use indexmap::IndexSet;

use crate::arch::RegisterId;
use crate::disasm::{Disassembler, Instruction};
use crate::engine::{Engine, Hooks, MemoryAccess};

/// Error returned by a session callback.
pub type CallbackError = Box<dyn std::error::Error + Send + Sync>;

/// Callback invoked with the address of every breakpoint hit.
pub type BreakpointCallback = Box<dyn FnMut(u64) -> Result<(), CallbackError>>;

/// Callback invoked with every traced instruction.
pub type TraceCallback = Box<dyn FnMut(&TracedInstruction) -> Result<(), CallbackError>>;

/// Instruction observed by the trace hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TracedInstruction {
    /// Address of the instruction.
    pub address: u64,

    /// Raw bytes of the instruction.
    pub bytes: Vec<u8>,

    /// Disassembled instruction, if the bytes could be decoded.
    pub instruction: Option<Instruction>,
}

/// State shared with the engine hooks during a run.
pub(super) struct TraceState<D> {
    pub pc: RegisterId,
    pub disassembler: Option<D>,
    pub breakpoints: IndexSet<u64>,
    pub breakpoint_callbacks: Vec<BreakpointCallback>,
    pub trace_callback: Option<TraceCallback>,
    pub current_address: Option<u64>,
    pub stop: Arc<AtomicBool>,

    /// Breakpoint that halted the current run.
    pub hit: Option<u64>,

    /// Breakpoint to step over on the first instruction of the run.
    pub skip_once: Option<u64>,
}

impl<D> TraceState<D> {
    pub fn new(pc: RegisterId, stop: Arc<AtomicBool>) -> Self {
        Self {
            pc,
            disassembler: None,
            breakpoints: IndexSet::new(),
            breakpoint_callbacks: Vec::new(),
            trace_callback: None,
            current_address: None,
            stop,
            hit: None,
            skip_once: None,
        }
    }
}

impl<E, D> Hooks<E> for TraceState<D>
where
    E: Engine + ?Sized,
    D: Disassembler,
{
    fn instruction(&mut self, engine: &mut E, address: u64, size: u32) {
        let mut bytes = vec![0; size as usize];

        let instruction = match engine.mem_read(address, &mut bytes) {
            Ok(()) => self.disassembler.as_ref().and_then(|d| {
                d.disassemble(&bytes, address)
                    .inspect_err(|e| tracing::warn!(error = %e, "failed to disassemble"))
                    .ok()
                    .and_then(|insns| insns.into_iter().next())
            }),
            Err(e) => {
                tracing::warn!(error = %e, "failed to read instruction bytes");
                None
            }
        };

        if let Some(insn) = &instruction {
            tracing::debug!(
                addr = format_args!("{address:#x}"),
                size,
                insn = %insn,
                "trace"
            );
        } else {
            tracing::debug!(addr = format_args!("{address:#x}"), size, "trace");
        }

        let pc = engine
            .reg_read(self.pc)
            .inspect_err(|e| tracing::warn!(error = %e, "failed to read program counter"))
            .unwrap_or(address);

        self.current_address = Some(pc);

        if let Some(callback) = self.trace_callback.as_mut() {
            let traced = TracedInstruction {
                address: pc,
                bytes,
                instruction,
            };

            invoke_isolated("trace", pc, || callback(&traced));
        }

        if self.stop.load(Ordering::Acquire) {
            tracing::debug!(addr = format_args!("{pc:#x}"), "stop requested");
            engine.stop();
            return;
        }

        if self.skip_once.take() == Some(pc) {
            tracing::debug!(addr = format_args!("{pc:#x}"), "stepping over breakpoint");
            return;
        }

        if !self.breakpoints.contains(&pc) {
            return;
        }

        tracing::info!(addr = format_args!("{pc:#x}"), "breakpoint hit");

        engine.stop();
        self.hit = Some(pc);

        for callback in self.breakpoint_callbacks.iter_mut() {
            invoke_isolated("breakpoint", pc, || callback(pc));
        }
    }

    fn invalid_memory(
        &mut self,
        _engine: &mut E,
        access: MemoryAccess,
        address: u64,
        size: usize,
    ) -> bool {
        tracing::warn!(
            ?access,
            addr = format_args!("{address:#x}"),
            size,
            "invalid memory access"
        );

        false
    }
}

/// Invokes a callback, logging (and swallowing) its errors and panics.
fn invoke_isolated(kind: &str, addr: u64, f: impl FnOnce() -> Result<(), CallbackError>) {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => (),
        Ok(Err(e)) => {
            tracing::warn!(
                callback = kind,
                addr = format_args!("{addr:#x}"),
                error = %e,
                "callback failed"
            );
        }
        Err(payload) => {
            let msg = payload
                .downcast_ref::<&str>()
                .map(|s| (*s).to_owned())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "<unknown>".to_owned());

            tracing::error!(
                callback = kind,
                addr = format_args!("{addr:#x}"),
                panic = %msg,
                "callback panicked"
            );
        }
    }
}
