use std::io::Write;

use emustub_session::{CapstoneDisassembler, Disassembler};
use miette::IntoDiagnostic;

use crate::config::{ArchConfig, decode_hex};

/// Runs the subcommand for disassembling machine code.
pub fn evaluate_disasm(
    arch: ArchConfig,
    address: u64,
    bytes: &str,
    mut output: impl Write,
) -> miette::Result<()> {
    let profile = arch.profile()?;
    let bytes = decode_hex(bytes)?;

    let disass = CapstoneDisassembler::for_profile(&profile).into_diagnostic()?;
    let insns = disass.disassemble(&bytes, address).into_diagnostic()?;

    let decoded = insns.iter().map(|insn| insn.size).sum::<usize>();

    for insn in insns {
        writeln!(output, "{:#x}:    {insn}", insn.address).into_diagnostic()?;
    }

    if decoded < bytes.len() {
        writeln!(
            output,
            "# {} trailing bytes could not be decoded",
            bytes.len() - decoded
        )
        .into_diagnostic()?;
    }

    Ok(())
}
