use std::io::Write;

use emustub_target::RegisterLayout;
use miette::IntoDiagnostic;

use crate::config::ArchConfig;

/// Runs the subcommand for printing a GDB target description.
pub fn evaluate_target_xml(arch: ArchConfig, mut output: impl Write) -> miette::Result<()> {
    let profile = arch.profile()?;

    let xml = RegisterLayout::for_profile(&profile)
        .and_then(|layout| layout.target_description())
        .into_diagnostic()?;

    writeln!(output, "{xml}").into_diagnostic()
}

#[cfg(test)]
mod tests {
    use super::evaluate_target_xml;
    use crate::config::ArchConfig;

    #[test]
    fn arm_description() {
        let arch = ArchConfig {
            name: "arm".to_owned(),
            bits: 32,
            big_endian: false,
            convention: None,
        };

        let mut out = Vec::new();
        evaluate_target_xml(arch, &mut out).expect("target xml");

        let out = String::from_utf8(out).unwrap();
        assert!(out.contains("<architecture>arm</architecture>"));
        assert!(out.contains(r#"<feature name="org.gnu.gdb.arm.core">"#));
        assert!(out.contains(r#"<reg name="pc" bitsize="32" regnum="15" type="code_ptr" group="general"/>"#));
    }
}
