//! Deterministic engine used by test suites.
//!
//! [StubEngine] has no instruction semantics: every instruction is a fixed
//! number of bytes wide and simply advances the program counter. An
//! instruction made only of [FAULT_OPCODE] bytes raises an
//! invalid-instruction error.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;
use std::time::Instant;

use crate::arch::{ArchitectureProfile, Family, RegisterId};
use crate::disasm::{DisasmError, Disassembler, Instruction};
use crate::engine::{
    Engine, EngineError, FaultKind, HookKind, Hooks, MemoryAccess, Permissions, RunRequest,
};

/// Opcode byte making up a faulting instruction.
pub const FAULT_OPCODE: u8 = 0xff;

/// Call recorded by a [StubEngine].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineCall {
    /// A region was mapped.
    Map {
        /// Base address.
        base: u64,
        /// Size in bytes.
        size: u64,
        /// Access permissions.
        permissions: Permissions,
    },

    /// A region was unmapped.
    Unmap {
        /// Base address.
        base: u64,
        /// Size in bytes.
        size: u64,
    },

    /// A hook was installed.
    InstallHook(HookKind),

    /// A run started.
    Run(RunRequest),
}

/// Shared record of the calls made to a [StubEngine].
pub type Journal = Rc<RefCell<Vec<EngineCall>>>;

struct Region {
    base: u64,
    data: Vec<u8>,
    permissions: Permissions,
}

impl Region {
    fn contains(&self, addr: u64, len: usize) -> bool {
        addr >= self.base
            && addr
                .checked_add(len as u64)
                .is_some_and(|end| end <= self.base + self.data.len() as u64)
    }

    fn offset(&self, addr: u64) -> usize {
        (addr - self.base) as usize
    }
}

/// Fixed-width stepping engine.
pub struct StubEngine {
    regions: Vec<Region>,
    registers: HashMap<RegisterId, u64>,
    hooks: HashSet<HookKind>,
    pc: RegisterId,
    width: usize,
    stop_requested: bool,
    fail_map_at: Option<usize>,
    journal: Journal,
}

impl StubEngine {
    /// Creates an engine for the given profile.
    ///
    /// Instructions are 1 byte wide on x86 and 4 bytes wide elsewhere.
    pub fn new(profile: &ArchitectureProfile) -> Self {
        let width = match profile.family() {
            Family::X86 => 1,
            Family::Arm | Family::Mips => 4,
        };

        Self {
            regions: Vec::new(),
            registers: HashMap::new(),
            hooks: HashSet::new(),
            pc: profile.pc(),
            width,
            stop_requested: false,
            fail_map_at: None,
            journal: Journal::default(),
        }
    }

    /// Makes the `n`-th call to [map](Engine::map) fail (0-based).
    pub fn fail_map_at(mut self, n: usize) -> Self {
        self.fail_map_at = Some(n);
        self
    }

    /// Returns the call journal of this engine.
    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    /// Returns the width of an instruction.
    pub fn instruction_width(&self) -> usize {
        self.width
    }

    fn region(&self, addr: u64, len: usize) -> Option<&Region> {
        self.regions.iter().find(|r| r.contains(addr, len))
    }

    fn fetch(&self, addr: u64) -> Result<Vec<u8>, EngineError> {
        let region = self.region(addr, self.width).ok_or_else(|| {
            EngineError::new(FaultKind::FetchUnmapped, addr, "fetch from unmapped memory")
        })?;

        if !region.permissions.contains(Permissions::EXEC) {
            return Err(EngineError::new(
                FaultKind::FetchProtected,
                addr,
                "fetch from non-executable memory",
            ));
        }

        let offset = region.offset(addr);
        Ok(region.data[offset..offset + self.width].to_vec())
    }
}

impl Engine for StubEngine {
    fn map(&mut self, base: u64, size: u64, permissions: Permissions) -> Result<(), EngineError> {
        let n = self
            .journal
            .borrow()
            .iter()
            .filter(|c| matches!(c, EngineCall::Map { .. }))
            .count();

        if self.fail_map_at == Some(n) {
            return Err(EngineError::new(
                FaultKind::InvalidArgument,
                base,
                "injected map failure",
            ));
        }

        let end = base + size;
        if self
            .regions
            .iter()
            .any(|r| r.base < end && base < r.base + r.data.len() as u64)
        {
            return Err(EngineError::new(
                FaultKind::InvalidArgument,
                base,
                "region already mapped",
            ));
        }

        self.journal.borrow_mut().push(EngineCall::Map {
            base,
            size,
            permissions,
        });

        self.regions.push(Region {
            base,
            data: vec![0; size as usize],
            permissions,
        });

        Ok(())
    }

    fn unmap(&mut self, base: u64, size: u64) -> Result<(), EngineError> {
        let idx = self
            .regions
            .iter()
            .position(|r| r.base == base && r.data.len() as u64 == size)
            .ok_or_else(|| EngineError::new(FaultKind::InvalidArgument, base, "not mapped"))?;

        self.regions.remove(idx);
        self.journal
            .borrow_mut()
            .push(EngineCall::Unmap { base, size });

        Ok(())
    }

    fn mem_read(&self, addr: u64, buf: &mut [u8]) -> Result<(), EngineError> {
        let region = self.region(addr, buf.len()).ok_or_else(|| {
            EngineError::new(FaultKind::ReadUnmapped, addr, "read from unmapped memory")
        })?;

        let offset = region.offset(addr);
        buf.copy_from_slice(&region.data[offset..offset + buf.len()]);

        Ok(())
    }

    fn mem_write(&mut self, addr: u64, data: &[u8]) -> Result<(), EngineError> {
        let region = self
            .regions
            .iter_mut()
            .find(|r| r.contains(addr, data.len()))
            .ok_or_else(|| {
                EngineError::new(FaultKind::WriteUnmapped, addr, "write to unmapped memory")
            })?;

        let offset = region.offset(addr);
        region.data[offset..offset + data.len()].copy_from_slice(data);

        Ok(())
    }

    fn reg_read(&self, reg: RegisterId) -> Result<u64, EngineError> {
        Ok(self.registers.get(&reg).copied().unwrap_or_default())
    }

    fn reg_write(&mut self, reg: RegisterId, value: u64) -> Result<(), EngineError> {
        self.registers.insert(reg, value);
        Ok(())
    }

    fn install_hook(&mut self, kind: HookKind) -> Result<(), EngineError> {
        self.hooks.insert(kind);
        self.journal.borrow_mut().push(EngineCall::InstallHook(kind));
        Ok(())
    }

    fn run(
        &mut self,
        request: RunRequest,
        hooks: &mut dyn Hooks<Self>,
    ) -> Result<(), EngineError> {
        self.journal.borrow_mut().push(EngineCall::Run(request));
        self.stop_requested = false;

        let started = Instant::now();
        let width = self.width;
        let mut executed = 0;
        let mut pc = request.begin;

        self.registers.insert(self.pc, pc);

        loop {
            if pc == request.until || (request.count != 0 && executed >= request.count) {
                break;
            }

            if request.timeout.is_some_and(|t| started.elapsed() >= t) {
                break;
            }

            let insn = match self.fetch(pc) {
                Ok(insn) => insn,
                Err(e) => {
                    if self.hooks.contains(&HookKind::InvalidMemory) {
                        hooks.invalid_memory(self, MemoryAccess::Fetch, pc, width);
                    }
                    return Err(e);
                }
            };

            if self.hooks.contains(&HookKind::Code) {
                hooks.instruction(self, pc, width as u32);
            }

            if self.stop_requested {
                break;
            }

            if insn.iter().all(|b| *b == FAULT_OPCODE) {
                return Err(EngineError::new(
                    FaultKind::InvalidInstruction,
                    pc,
                    "invalid instruction",
                ));
            }

            pc += width as u64;
            executed += 1;
            self.registers.insert(self.pc, pc);
        }

        Ok(())
    }

    fn stop(&mut self) {
        self.stop_requested = true;
    }
}

/// Disassembler rendering every instruction as a `.byte` directive.
#[derive(Debug, Clone, Copy, Default)]
pub struct ByteDisassembler;

impl Disassembler for ByteDisassembler {
    fn disassemble(&self, bytes: &[u8], addr: u64) -> Result<Vec<Instruction>, DisasmError> {
        let operands = bytes
            .iter()
            .map(|b| format!("{b:#04x}"))
            .collect::<Vec<_>>()
            .join(", ");

        Ok(vec![Instruction {
            address: addr,
            mnemonic: ".byte".to_owned(),
            operands,
            size: bytes.len(),
        }])
    }
}
