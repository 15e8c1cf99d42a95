//! Static per-architecture register tables.
//!
//! Register IDs follow Unicorn's register constants.

use super::Architecture;

pub(super) struct ArchTable {
    pub arch: Architecture,
    pub word_size: usize,
    pub registers: &'static [(&'static str, u32)],
    pub pc: &'static str,
    pub sp: &'static str,
    pub ra: Option<&'static str>,
    pub result: &'static str,
    pub args_gcc: &'static [&'static str],
    pub args_msvc: &'static [&'static str],

    /// Registers exchanged with a remote debugger, in protocol order.
    pub context: &'static [&'static str],
}

/// Accepted architecture names, with the bit widths each one supports.
pub(super) const NAMES: &[(&str, &[(u32, Architecture)])] = &[
    ("x86", &[(16, Architecture::X86_16), (32, Architecture::X86)]),
    ("x86-16", &[(16, Architecture::X86_16)]),
    ("x64", &[(64, Architecture::X64)]),
    ("x86_64", &[(64, Architecture::X64)]),
    ("amd64", &[(64, Architecture::X64)]),
    ("arm", &[(32, Architecture::Arm), (16, Architecture::ArmThumb)]),
    ("thumb", &[(16, Architecture::ArmThumb), (32, Architecture::ArmThumb)]),
    ("arm-thumb", &[(16, Architecture::ArmThumb), (32, Architecture::ArmThumb)]),
    ("aarch64", &[(64, Architecture::Aarch64)]),
    ("arm64", &[(64, Architecture::Aarch64)]),
    ("mips", &[(32, Architecture::Mips32), (64, Architecture::Mips64)]),
    ("mips32", &[(32, Architecture::Mips32)]),
    ("mips64", &[(64, Architecture::Mips64)]),
];

pub(super) const TABLES: &[ArchTable] = &[
    ArchTable {
        arch: Architecture::X86_16,
        word_size: 2,
        registers: X86_16_REGS,
        pc: "ip",
        sp: "sp",
        ra: None,
        result: "ax",
        args_gcc: &[],
        args_msvc: &[],
        context: &["ax", "cx", "dx", "bx", "sp", "bp", "si", "di", "ip", "flags"],
    },
    ArchTable {
        arch: Architecture::X86,
        word_size: 4,
        registers: X86_REGS,
        pc: "eip",
        sp: "esp",
        ra: None,
        result: "eax",
        args_gcc: &[],
        args_msvc: &[],
        context: &[
            "eax", "ecx", "edx", "ebx", "esp", "ebp", "esi", "edi", "eip", "eflags",
        ],
    },
    ArchTable {
        arch: Architecture::X64,
        word_size: 8,
        registers: X64_REGS,
        pc: "rip",
        sp: "rsp",
        ra: None,
        result: "rax",
        args_gcc: &["rdi", "rsi", "rdx", "rcx", "r8", "r9"],
        args_msvc: &["rcx", "rdx", "r8", "r9"],
        context: &[
            "rax", "rbx", "rcx", "rdx", "rsi", "rdi", "rbp", "rsp", "r8", "r9", "r10", "r11",
            "r12", "r13", "r14", "r15", "rip", "eflags",
        ],
    },
    ArchTable {
        arch: Architecture::Arm,
        word_size: 4,
        registers: ARM_REGS,
        pc: "pc",
        sp: "sp",
        ra: Some("lr"),
        result: "r0",
        args_gcc: &["r0", "r1", "r2", "r3"],
        args_msvc: &["r0", "r1", "r2", "r3"],
        context: ARM_CONTEXT,
    },
    ArchTable {
        arch: Architecture::ArmThumb,
        word_size: 4,
        registers: ARM_REGS,
        pc: "pc",
        sp: "sp",
        ra: Some("lr"),
        result: "r0",
        args_gcc: &["r0", "r1", "r2", "r3"],
        args_msvc: &["r0", "r1", "r2", "r3"],
        context: ARM_CONTEXT,
    },
    ArchTable {
        arch: Architecture::Aarch64,
        word_size: 8,
        registers: AARCH64_REGS,
        pc: "pc",
        sp: "sp",
        ra: Some("lr"),
        result: "x0",
        args_gcc: &["x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7"],
        args_msvc: &["x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7"],
        context: &[
            "x0", "x1", "x2", "x3", "x4", "x5", "x6", "x7", "x8", "x9", "x10", "x11", "x12",
            "x13", "x14", "x15", "x16", "x17", "x18", "x19", "x20", "x21", "x22", "x23", "x24",
            "x25", "x26", "x27", "x28", "x29", "x30", "sp", "pc", "cpsr",
        ],
    },
    ArchTable {
        arch: Architecture::Mips32,
        word_size: 4,
        registers: MIPS_REGS,
        pc: "pc",
        sp: "sp",
        ra: Some("ra"),
        result: "v0",
        args_gcc: &["a0", "a1", "a2", "a3"],
        args_msvc: &["a0", "a1", "a2", "a3"],
        context: MIPS_CONTEXT,
    },
    ArchTable {
        arch: Architecture::Mips64,
        word_size: 8,
        registers: MIPS_REGS,
        pc: "pc",
        sp: "sp",
        ra: Some("ra"),
        result: "v0",
        args_gcc: &["a0", "a1", "a2", "a3"],
        args_msvc: &["a0", "a1", "a2", "a3"],
        context: MIPS_CONTEXT,
    },
];

const X86_16_REGS: &[(&str, u32)] = &[
    ("ax", 3),
    ("bx", 8),
    ("cx", 12),
    ("dx", 18),
    ("si", 45),
    ("di", 14),
    ("bp", 6),
    ("sp", 47),
    ("ip", 34),
    ("flags", 25),
    ("cs", 11),
    ("ds", 17),
    ("es", 28),
    ("ss", 49),
];

const X86_REGS: &[(&str, u32)] = &[
    ("eax", 19),
    ("ebx", 21),
    ("ecx", 22),
    ("edx", 24),
    ("esi", 29),
    ("edi", 23),
    ("ebp", 20),
    ("esp", 30),
    ("eip", 26),
    ("eflags", 25),
    ("cs", 11),
    ("ds", 17),
    ("es", 28),
    ("fs", 32),
    ("gs", 33),
    ("ss", 49),
];

const X64_REGS: &[(&str, u32)] = &[
    ("rax", 35),
    ("rbx", 37),
    ("rcx", 38),
    ("rdx", 40),
    ("rsi", 43),
    ("rdi", 39),
    ("rbp", 36),
    ("rsp", 44),
    ("r8", 106),
    ("r9", 107),
    ("r10", 108),
    ("r11", 109),
    ("r12", 110),
    ("r13", 111),
    ("r14", 112),
    ("r15", 113),
    ("rip", 41),
    ("eflags", 25),
    ("rflags", 25),
    ("fs", 32),
    ("gs", 33),
];

const ARM_REGS: &[(&str, u32)] = &[
    ("r0", 66),
    ("r1", 67),
    ("r2", 68),
    ("r3", 69),
    ("r4", 70),
    ("r5", 71),
    ("r6", 72),
    ("r7", 73),
    ("r8", 74),
    ("r9", 75),
    ("r10", 76),
    ("r11", 77),
    ("r12", 78),
    ("sp", 12),
    ("lr", 10),
    ("pc", 11),
    ("r13", 12),
    ("r14", 10),
    ("r15", 11),
    ("fp", 77),
    ("ip", 78),
    ("cpsr", 3),
];

const ARM_CONTEXT: &[&str] = &[
    "r0", "r1", "r2", "r3", "r4", "r5", "r6", "r7", "r8", "r9", "r10", "r11", "r12", "sp", "lr",
    "pc", "cpsr",
];

const AARCH64_REGS: &[(&str, u32)] = &[
    ("x0", 199),
    ("x1", 200),
    ("x2", 201),
    ("x3", 202),
    ("x4", 203),
    ("x5", 204),
    ("x6", 205),
    ("x7", 206),
    ("x8", 207),
    ("x9", 208),
    ("x10", 209),
    ("x11", 210),
    ("x12", 211),
    ("x13", 212),
    ("x14", 213),
    ("x15", 214),
    ("x16", 215),
    ("x17", 216),
    ("x18", 217),
    ("x19", 218),
    ("x20", 219),
    ("x21", 220),
    ("x22", 221),
    ("x23", 222),
    ("x24", 223),
    ("x25", 224),
    ("x26", 225),
    ("x27", 226),
    ("x28", 227),
    ("x29", 1),
    ("x30", 2),
    ("fp", 1),
    ("lr", 2),
    ("sp", 4),
    ("pc", 260),
    ("cpsr", 3),
    ("nzcv", 3),
    // r-prefixed aliases
    ("r0", 199),
    ("r1", 200),
    ("r2", 201),
    ("r3", 202),
    ("r4", 203),
    ("r5", 204),
    ("r6", 205),
    ("r7", 206),
    ("r8", 207),
    ("r9", 208),
    ("r10", 209),
    ("r11", 210),
    ("r12", 211),
    ("r13", 212),
    ("r14", 213),
    ("r15", 214),
    ("r16", 215),
    ("r17", 216),
    ("r18", 217),
    ("r19", 218),
    ("r20", 219),
    ("r21", 220),
    ("r22", 221),
    ("r23", 222),
    ("r24", 223),
    ("r25", 224),
    ("r26", 225),
    ("r27", 226),
    ("r28", 227),
    ("r29", 1),
    ("r30", 2),
    ("r31", 4),
];

const MIPS_REGS: &[(&str, u32)] = &[
    ("zero", 2),
    ("at", 3),
    ("v0", 4),
    ("v1", 5),
    ("a0", 6),
    ("a1", 7),
    ("a2", 8),
    ("a3", 9),
    ("t0", 10),
    ("t1", 11),
    ("t2", 12),
    ("t3", 13),
    ("t4", 14),
    ("t5", 15),
    ("t6", 16),
    ("t7", 17),
    ("s0", 18),
    ("s1", 19),
    ("s2", 20),
    ("s3", 21),
    ("s4", 22),
    ("s5", 23),
    ("s6", 24),
    ("s7", 25),
    ("t8", 26),
    ("t9", 27),
    ("k0", 28),
    ("k1", 29),
    ("gp", 30),
    ("sp", 31),
    ("fp", 32),
    ("s8", 32),
    ("ra", 33),
    ("hi", 129),
    ("lo", 130),
    ("pc", 1),
];

const MIPS_CONTEXT: &[&str] = &[
    "zero", "at", "v0", "v1", "a0", "a1", "a2", "a3", "t0", "t1", "t2", "t3", "t4", "t5", "t6",
    "t7", "s0", "s1", "s2", "s3", "s4", "s5", "s6", "s7", "t8", "t9", "k0", "k1", "gp", "sp", "fp",
    "ra", "lo", "hi", "pc",
];
