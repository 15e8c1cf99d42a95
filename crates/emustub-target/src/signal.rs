use emustub_session::FaultKind;
use emustub_session::arch::Family;

/// Signal reported to a remote debugger (GDB numbering).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Signal {
    /// Interrupt.
    Int = 2,
    /// Illegal instruction.
    Ill = 4,
    /// Trace/breakpoint trap.
    Trap = 5,
    /// Arithmetic exception.
    Fpe = 8,
    /// Bus error.
    Bus = 10,
    /// Segmentation fault.
    Segv = 11,
    /// Stopped.
    Stop = 17,
}

const X86_FAULTS: &[(FaultKind, Signal)] = &[
    (FaultKind::ReadUnmapped, Signal::Segv),
    (FaultKind::WriteUnmapped, Signal::Segv),
    (FaultKind::FetchUnmapped, Signal::Segv),
    (FaultKind::ReadProtected, Signal::Segv),
    (FaultKind::WriteProtected, Signal::Segv),
    (FaultKind::FetchProtected, Signal::Segv),
    (FaultKind::Unaligned, Signal::Bus),
    (FaultKind::InvalidInstruction, Signal::Ill),
    (FaultKind::CpuException, Signal::Segv),
];

const ARM_FAULTS: &[(FaultKind, Signal)] = &[
    (FaultKind::ReadUnmapped, Signal::Segv),
    (FaultKind::WriteUnmapped, Signal::Segv),
    (FaultKind::FetchUnmapped, Signal::Segv),
    (FaultKind::ReadProtected, Signal::Segv),
    (FaultKind::WriteProtected, Signal::Segv),
    (FaultKind::FetchProtected, Signal::Segv),
    (FaultKind::Unaligned, Signal::Bus),
    (FaultKind::InvalidInstruction, Signal::Ill),
    (FaultKind::CpuException, Signal::Ill),
];

const MIPS_FAULTS: &[(FaultKind, Signal)] = &[
    (FaultKind::ReadUnmapped, Signal::Segv),
    (FaultKind::WriteUnmapped, Signal::Segv),
    (FaultKind::FetchUnmapped, Signal::Segv),
    (FaultKind::ReadProtected, Signal::Segv),
    (FaultKind::WriteProtected, Signal::Segv),
    (FaultKind::FetchProtected, Signal::Segv),
    (FaultKind::Unaligned, Signal::Bus),
    (FaultKind::InvalidInstruction, Signal::Ill),
    (FaultKind::CpuException, Signal::Trap),
];

impl Signal {
    /// Returns the GDB signal number.
    pub fn number(self) -> u8 {
        self as u8
    }

    /// Returns the signal reporting an emulation fault.
    ///
    /// Faults without an entry in the family's table are reported as
    /// [Signal::Stop].
    pub fn for_fault(family: Family, kind: FaultKind) -> Self {
        let table = match family {
            Family::X86 => X86_FAULTS,
            Family::Arm => ARM_FAULTS,
            Family::Mips => MIPS_FAULTS,
        };

        table
            .iter()
            .find_map(|(k, sig)| (*k == kind).then_some(*sig))
            .unwrap_or(Self::Stop)
    }
}
