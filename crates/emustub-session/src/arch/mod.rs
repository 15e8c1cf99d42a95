//! Architecture profiles.
//!
//! A profile normalizes register naming, word size, byte order and
//! calling-convention argument registers for one emulated architecture.

mod tables;

use byteorder::{BigEndian, ByteOrder, LittleEndian};

use crate::error::{Error, Result};

use self::tables::ArchTable;

/// Emulated architecture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Architecture {
    /// 16-bit x86 (real mode).
    X86_16,
    /// 32-bit x86.
    X86,
    /// x86-64.
    X64,
    /// 32-bit ARM.
    Arm,
    /// ARM in Thumb mode.
    ArmThumb,
    /// 64-bit ARM.
    Aarch64,
    /// 32-bit MIPS.
    Mips32,
    /// 64-bit MIPS.
    Mips64,
}

impl Architecture {
    /// Returns the architecture family.
    pub fn family(self) -> Family {
        match self {
            Self::X86_16 | Self::X86 | Self::X64 => Family::X86,
            Self::Arm | Self::ArmThumb | Self::Aarch64 => Family::Arm,
            Self::Mips32 | Self::Mips64 => Family::Mips,
        }
    }
}

impl std::fmt::Display for Architecture {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::X86_16 => "x86-16",
            Self::X86 => "x86",
            Self::X64 => "x64",
            Self::Arm => "ARM",
            Self::ArmThumb => "ARM-thumb",
            Self::Aarch64 => "AArch64",
            Self::Mips32 => "MIPS32",
            Self::Mips64 => "MIPS64",
        };

        f.write_str(name)
    }
}

/// Architecture family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Family {
    /// x86, x86-16 and x64.
    X86,
    /// ARM, Thumb and AArch64.
    Arm,
    /// MIPS32 and MIPS64.
    Mips,
}

/// Byte order of the emulated target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endianness {
    /// Least significant byte first.
    Little,
    /// Most significant byte first.
    Big,
}

/// Calling convention used to pick argument registers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum CallingConvention {
    /// System V style (GCC, Clang).
    #[default]
    Gcc,
    /// Microsoft x64 style.
    Msvc,
}

impl std::str::FromStr for CallingConvention {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gcc" | "sysv" => Ok(Self::Gcc),
            "msvc" | "windows" => Ok(Self::Msvc),
            _ => Err(format!("unknown calling convention {s:?}")),
        }
    }
}

/// Engine-level register identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegisterId(pub u32);

/// Description of one emulated architecture.
#[derive(Debug, Clone)]
pub struct ArchitectureProfile {
    table: &'static ArchTable,
    endianness: Endianness,
    convention: CallingConvention,
    pc: RegisterId,
    sp: RegisterId,
    ra: Option<RegisterId>,
    result: RegisterId,
    arguments: Vec<RegisterId>,
}

impl std::fmt::Debug for ArchTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchTable")
            .field("arch", &self.arch)
            .finish_non_exhaustive()
    }
}

impl ArchitectureProfile {
    /// Resolves the profile of an architecture, given its name, bit width,
    /// byte order and calling convention.
    pub fn resolve(
        name: &str,
        bits: u32,
        little_endian: bool,
        convention: CallingConvention,
    ) -> Result<Self> {
        let (_, widths) = tables::NAMES
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::UnsupportedArchitecture(name.to_owned()))?;

        let arch = widths
            .iter()
            .find_map(|(b, arch)| (*b == bits).then_some(*arch))
            .ok_or_else(|| Error::InvalidBitWidth {
                arch: name.to_owned(),
                bits,
            })?;

        if arch.family() == Family::X86 && !little_endian {
            return Err(Error::UnsupportedByteOrder(arch));
        }

        let endianness = if little_endian {
            Endianness::Little
        } else {
            Endianness::Big
        };

        Self::from_arch(arch, endianness, convention)
    }

    /// Builds the profile of an architecture.
    pub fn from_arch(
        arch: Architecture,
        endianness: Endianness,
        convention: CallingConvention,
    ) -> Result<Self> {
        let table = tables::TABLES
            .iter()
            .find(|t| t.arch == arch)
            .ok_or_else(|| Error::UnsupportedArchitecture(arch.to_string()))?;

        let id = |name: &str| lookup(table, name);

        let args = match convention {
            CallingConvention::Gcc => table.args_gcc,
            CallingConvention::Msvc => table.args_msvc,
        };

        Ok(Self {
            table,
            endianness,
            convention,
            pc: id(table.pc)?,
            sp: id(table.sp)?,
            ra: table.ra.map(id).transpose()?,
            result: id(table.result)?,
            arguments: args.iter().map(|a| id(a)).collect::<Result<_>>()?,
        })
    }

    /// Returns the architecture.
    pub fn architecture(&self) -> Architecture {
        self.table.arch
    }

    /// Returns the architecture family.
    pub fn family(&self) -> Family {
        self.table.arch.family()
    }

    /// Returns the byte order.
    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Returns the calling convention.
    pub fn calling_convention(&self) -> CallingConvention {
        self.convention
    }

    /// Returns the size (in bytes) of a serialized register.
    pub fn word_size(&self) -> usize {
        self.table.word_size
    }

    /// Returns the ID of a register, given its name (case-insensitive).
    pub fn register_id(&self, name: &str) -> Result<RegisterId> {
        lookup(self.table, name)
    }

    /// Returns the canonical name of a register ID.
    pub fn register_name(&self, id: RegisterId) -> Option<&'static str> {
        self.table
            .registers
            .iter()
            .find_map(|(name, i)| (*i == id.0).then_some(*name))
    }

    /// Returns the program counter register.
    pub fn pc(&self) -> RegisterId {
        self.pc
    }

    /// Returns the stack pointer register.
    pub fn sp(&self) -> RegisterId {
        self.sp
    }

    /// Returns the return address register, if the architecture has one.
    pub fn return_address_register(&self) -> Option<RegisterId> {
        self.ra
    }

    /// Returns the register holding function results.
    pub fn result(&self) -> RegisterId {
        self.result
    }

    /// Returns the argument registers, in calling-convention order.
    pub fn arguments(&self) -> &[RegisterId] {
        &self.arguments
    }

    /// Returns the register name table.
    pub fn registers(&self) -> &'static [(&'static str, u32)] {
        self.table.registers
    }

    /// Returns the names of the registers exchanged with a remote debugger,
    /// in protocol order.
    pub fn context_registers(&self) -> &'static [&'static str] {
        self.table.context
    }

    /// Appends `value`, truncated to the word size, to `buf` in target byte
    /// order.
    pub fn encode_word(&self, value: u64, buf: &mut Vec<u8>) {
        let n = self.word_size();
        let value = value & self.word_mask();

        let start = buf.len();
        buf.resize(start + n, 0);

        match self.endianness {
            Endianness::Little => LittleEndian::write_uint(&mut buf[start..], value, n),
            Endianness::Big => BigEndian::write_uint(&mut buf[start..], value, n),
        }
    }

    /// Decodes a word from target byte order.
    ///
    /// Returns `None` if `bytes` is not exactly one word long.
    pub fn decode_word(&self, bytes: &[u8]) -> Option<u64> {
        let n = self.word_size();

        if bytes.len() != n {
            return None;
        }

        Some(match self.endianness {
            Endianness::Little => LittleEndian::read_uint(bytes, n),
            Endianness::Big => BigEndian::read_uint(bytes, n),
        })
    }

    /// Returns the mask of the bits held by a word.
    pub fn word_mask(&self) -> u64 {
        match self.word_size() {
            8 => u64::MAX,
            n => (1u64 << (n * 8)) - 1,
        }
    }
}

fn lookup(table: &ArchTable, name: &str) -> Result<RegisterId> {
    table
        .registers
        .iter()
        .find_map(|(n, id)| n.eq_ignore_ascii_case(name).then_some(RegisterId(*id)))
        .ok_or_else(|| Error::UnknownRegister(name.to_owned()))
}
