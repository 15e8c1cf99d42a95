#![allow(missing_docs)]
#![allow(clippy::print_stderr)]

use std::fs::File;
use std::path::PathBuf;

use miette::IntoDiagnostic;

use emustub_cli::{CliAction, CliOpts};

use tracing_subscriber::EnvFilter;

fn main() {
    let cli = CliOpts::parse_from_cmdline();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::builder()
                .with_env_var("EMUSTUB_LOG")
                .from_env_lossy(),
        )
        .init();

    let res = match cli.action {
        CliAction::Plan {
            config,
            memory_map,
            output,
        } => with_output(output, |out| {
            emustub_cli::evaluate_plan(&config, memory_map, out)
        }),
        CliAction::TargetXml { arch, output } => with_output(output, |out| {
            emustub_cli::evaluate_target_xml(arch.into(), out)
        }),
        CliAction::Disasm {
            arch,
            address,
            bytes,
        } => emustub_cli::evaluate_disasm(arch.into(), address, &bytes, std::io::stdout()),
    };

    if let Err(e) = res {
        eprintln!("{e:?}");
        std::process::exit(1);
    }
}

fn with_output(
    output: Option<PathBuf>,
    f: impl FnOnce(&mut dyn std::io::Write) -> miette::Result<()>,
) -> miette::Result<()> {
    if let Some(output) = output {
        let mut file = File::create(output).into_diagnostic()?;
        f(&mut file)
    } else {
        f(&mut std::io::stdout())
    }
}
