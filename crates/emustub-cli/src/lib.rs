//! Crate implementing the CLI commands.

mod cli;
mod config;
mod disasm;
mod plan;
mod target_xml;

pub use self::cli::{CliAction, CliArch, CliOpts};
pub use self::config::{
    AreaConfig, ArchConfig, ContentConfig, RegisterConfig, SessionConfig, StackConfig,
    decode_hex, parse_session_config,
};
pub use self::disasm::evaluate_disasm;
pub use self::plan::evaluate_plan;
pub use self::target_xml::evaluate_target_xml;
