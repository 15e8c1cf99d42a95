use std::path::PathBuf;

/// The emustub emulation toolkit.
#[derive(clap::Parser)]
pub struct CliOpts {
    /// The command to run.
    #[clap(subcommand)]
    pub action: CliAction,
}

/// The command to run.
#[derive(clap::Subcommand)]
pub enum CliAction {
    /// Command to validate a session description and dump its setup plan.
    Plan {
        /// Session description (KDL format).
        ///
        /// If it ends with `.kdl`, it is treated as a path to a configuration
        /// file. Otherwise it is directly parsed as inline KDL-formatted
        /// configuration.
        #[clap(short, long, value_name = "CONTENT/PATH")]
        config: String,

        /// Dump the GDB memory map (XML) instead of the plan.
        #[clap(long)]
        memory_map: bool,

        /// Path to the optional destination of the dump.
        #[clap(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Command to print the GDB target description of an architecture.
    TargetXml {
        /// Architecture configuration.
        #[clap(flatten)]
        arch: CliArch,

        /// Path to the optional destination of the description.
        #[clap(short, long, value_name = "PATH")]
        output: Option<PathBuf>,
    },

    /// Command to disassemble hex-encoded machine code.
    Disasm {
        /// Architecture configuration.
        #[clap(flatten)]
        arch: CliArch,

        /// Address of the first instruction.
        #[clap(long, value_name = "ADDR", default_value = "0", value_parser = parse_address)]
        address: u64,

        /// Hex-encoded machine code.
        bytes: String,
    },
}

/// Configuration of the architecture.
#[derive(clap::Parser)]
pub struct CliArch {
    /// Architecture name (e.g., `x64`, `arm` or `mips`).
    #[clap(short, long)]
    pub arch: String,

    /// Bit width.
    #[clap(short, long, default_value_t = 32)]
    pub bits: u32,

    /// Whether the architecture is big-endian.
    #[clap(long)]
    pub big_endian: bool,

    /// Calling convention (`gcc` or `msvc`).
    #[clap(long)]
    pub convention: Option<String>,
}

impl CliOpts {
    /// Parses the CLI from the command-line.
    ///
    /// # Warning
    ///
    /// Exits on error.
    pub fn parse_from_cmdline() -> Self {
        <Self as clap::Parser>::parse()
    }
}

impl From<CliArch> for crate::config::ArchConfig {
    fn from(arch: CliArch) -> Self {
        Self {
            name: arch.arch,
            bits: arch.bits,
            big_endian: arch.big_endian,
            convention: arch.convention,
        }
    }
}

fn parse_address(s: &str) -> Result<u64, String> {
    let res = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse(),
    };

    res.map_err(|e| format!("invalid address {s:?}: {e}"))
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{CliAction, CliOpts, parse_address};

    #[test]
    fn parse_disasm_command() {
        let cli = CliOpts::try_parse_from([
            "emustub",
            "disasm",
            "--arch",
            "mips",
            "--big-endian",
            "--address",
            "0x400000",
            "03e00008",
        ])
        .expect("parse cli");

        let CliAction::Disasm {
            arch,
            address,
            bytes,
        } = cli.action
        else {
            panic!("not a disasm command");
        };

        assert_eq!(arch.arch, "mips");
        assert_eq!(arch.bits, 32);
        assert!(arch.big_endian);
        assert_eq!(address, 0x40_0000);
        assert_eq!(bytes, "03e00008");
    }

    #[test]
    fn address_parsing() {
        assert_eq!(parse_address("0x1000"), Ok(0x1000));
        assert_eq!(parse_address("4096"), Ok(0x1000));
        assert!(parse_address("0xzz").is_err());
    }
}
