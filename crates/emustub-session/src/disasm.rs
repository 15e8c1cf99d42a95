//! Instruction disassembly.

use capstone::Capstone;
use capstone::arch::{BuildsCapstone, BuildsCapstoneEndian};

use crate::arch::{Architecture, ArchitectureProfile, Endianness};

/// Error returned by a [Disassembler].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("disassembly failed: {0}")]
pub struct DisasmError(pub String);

/// Disassembled instruction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
    /// Address of the instruction.
    pub address: u64,

    /// Instruction mnemonic.
    pub mnemonic: String,

    /// Instruction operands.
    pub operands: String,

    /// Size (in bytes) of the instruction.
    pub size: usize,
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.operands.is_empty() {
            f.write_str(&self.mnemonic)
        } else {
            write!(f, "{} {}", self.mnemonic, self.operands)
        }
    }
}

/// Trait implementing an instruction disassembler.
pub trait Disassembler {
    /// Disassembles `bytes`, located at address `addr`.
    fn disassemble(&self, bytes: &[u8], addr: u64) -> Result<Vec<Instruction>, DisasmError>;
}

/// Capstone-backed disassembler.
pub struct CapstoneDisassembler {
    cs: Capstone,
}

impl CapstoneDisassembler {
    /// Creates a disassembler for the given architecture profile.
    pub fn for_profile(profile: &ArchitectureProfile) -> Result<Self, DisasmError> {
        let endian = match profile.endianness() {
            Endianness::Little => capstone::Endian::Little,
            Endianness::Big => capstone::Endian::Big,
        };

        let cs = match profile.architecture() {
            Architecture::X86_16 => Capstone::new()
                .x86()
                .mode(capstone::arch::x86::ArchMode::Mode16)
                .build(),
            Architecture::X86 => Capstone::new()
                .x86()
                .mode(capstone::arch::x86::ArchMode::Mode32)
                .build(),
            Architecture::X64 => Capstone::new()
                .x86()
                .mode(capstone::arch::x86::ArchMode::Mode64)
                .build(),
            Architecture::Arm => Capstone::new()
                .arm()
                .mode(capstone::arch::arm::ArchMode::Arm)
                .endian(endian)
                .build(),
            Architecture::ArmThumb => Capstone::new()
                .arm()
                .mode(capstone::arch::arm::ArchMode::Thumb)
                .endian(endian)
                .build(),
            Architecture::Aarch64 => Capstone::new()
                .arm64()
                .mode(capstone::arch::arm64::ArchMode::Arm)
                .endian(endian)
                .build(),
            Architecture::Mips32 => Capstone::new()
                .mips()
                .mode(capstone::arch::mips::ArchMode::Mips32)
                .endian(endian)
                .build(),
            Architecture::Mips64 => Capstone::new()
                .mips()
                .mode(capstone::arch::mips::ArchMode::Mips64)
                .endian(endian)
                .build(),
        }
        .map_err(|e| DisasmError(e.to_string()))?;

        Ok(Self { cs })
    }
}

impl Disassembler for CapstoneDisassembler {
    fn disassemble(&self, bytes: &[u8], addr: u64) -> Result<Vec<Instruction>, DisasmError> {
        let insns = self
            .cs
            .disasm_all(bytes, addr)
            .map_err(|e| DisasmError(e.to_string()))?;

        let insns = insns
            .iter()
            .map(|insn| Instruction {
                address: insn.address(),
                mnemonic: insn.mnemonic().unwrap_or_default().to_owned(),
                operands: insn.op_str().unwrap_or_default().to_owned(),
                size: insn.bytes().len(),
            })
            .collect();

        Ok(insns)
    }
}

#[cfg(test)]
mod tests {
    use super::{CapstoneDisassembler, Disassembler};
    use crate::arch::{ArchitectureProfile, CallingConvention};

    #[test]
    fn disassemble_x64() {
        let profile = ArchitectureProfile::resolve("x64", 64, true, CallingConvention::Gcc)
            .expect("valid profile");
        let disasm = CapstoneDisassembler::for_profile(&profile).expect("capstone");

        let insns = disasm
            .disassemble(&[0x48, 0x89, 0xf8, 0xc3], 0x1000)
            .expect("disassemble");

        assert_eq!(insns.len(), 2);
        assert_eq!(insns[0].to_string(), "mov rax, rdi");
        assert_eq!(insns[0].size, 3);
        assert_eq!(insns[1].address, 0x1003);
        assert_eq!(insns[1].to_string(), "ret");
    }

    #[test]
    fn disassemble_mips_big_endian() {
        let profile = ArchitectureProfile::resolve("mips", 32, false, CallingConvention::Gcc)
            .expect("valid profile");
        let disasm = CapstoneDisassembler::for_profile(&profile).expect("capstone");

        // jr $ra
        let insns = disasm
            .disassemble(&[0x03, 0xe0, 0x00, 0x08], 0x400000)
            .expect("disassemble");

        assert_eq!(insns.len(), 1);
        assert_eq!(insns[0].mnemonic, "jr");
        assert_eq!(insns[0].size, 4);
    }
}
