use std::io::Write;

use emustub_session::arch::Endianness;
use emustub_session::memory::{MappingRequest, MemoryRegionTable, PAGE_SIZE};
use emustub_session::{ArchitectureProfile, CallingConvention, RegisterId};
use kdl::{KdlDocument, KdlEntry, KdlNode};
use miette::IntoDiagnostic;

use crate::config::{SessionConfig, parse_session_config};

/// Runs the subcommand for validating a session description.
///
/// The description goes through the same checks as a session
/// initialization (profile resolution, content placement, region
/// alignment and overlap, register names), without emulating anything.
pub fn evaluate_plan(config: &str, memory_map: bool, mut output: impl Write) -> miette::Result<()> {
    let (config, base_dir) = parse_session_config(config)?;

    let profile = config.arch.profile()?;
    let table = config.memory_table(&base_dir)?;
    let presets = config.register_presets(&profile)?;
    let requests = table.commit(PAGE_SIZE).into_diagnostic()?;

    miette::ensure!(
        table.validate_range(config.start, config.start.saturating_add(1)),
        "start address {:#x} is not mapped",
        config.start
    );

    if memory_map {
        let xml = emustub_target::memory_map(&requests).into_diagnostic()?;
        writeln!(output, "{xml}").into_diagnostic()?;
        return Ok(());
    }

    let mut kdl = dump_to_kdl(&config, &profile, &table, &requests, &presets);

    kdl.autoformat();

    output
        .write_all(kdl.to_string().as_bytes())
        .into_diagnostic()?;

    Ok(())
}

fn dump_to_kdl(
    config: &SessionConfig,
    profile: &ArchitectureProfile,
    table: &MemoryRegionTable,
    requests: &[MappingRequest],
    presets: &[(RegisterId, u64)],
) -> KdlDocument {
    let mut kdl = KdlDocument::new();

    kdl.nodes_mut().push(profile_to_kdl_node(profile));

    for req in requests {
        let mut node = KdlNode::new("map");
        node.entries_mut()
            .push(KdlEntry::new(format!("{:#x}", req.base)));
        node.entries_mut()
            .push(KdlEntry::new_prop("size", format!("{:#x}", req.size)));
        node.entries_mut()
            .push(KdlEntry::new_prop("perms", req.permissions.to_string()));
        kdl.nodes_mut().push(node);
    }

    for content in table.contents() {
        let mut node = KdlNode::new("content");
        node.entries_mut()
            .push(KdlEntry::new(format!("{:#x}", content.address)));
        node.entries_mut().push(KdlEntry::new_prop(
            "size",
            i128::try_from(content.bytes.len()).unwrap_or(i128::MAX),
        ));
        kdl.nodes_mut().push(node);
    }

    let mut node = KdlNode::new("start");
    node.entries_mut()
        .push(KdlEntry::new(format!("{:#x}", config.start)));
    kdl.nodes_mut().push(node);

    let mut node = KdlNode::new("return-address");
    node.entries_mut()
        .push(KdlEntry::new(format!("{:#x}", config.return_address)));
    kdl.nodes_mut().push(node);

    for (id, value) in presets {
        let mut node = KdlNode::new("register");
        node.entries_mut()
            .push(KdlEntry::new(register_name(profile, *id)));
        node.entries_mut()
            .push(KdlEntry::new(format!("{value:#x}")));
        kdl.nodes_mut().push(node);
    }

    let mut node = KdlNode::new("trace");
    node.entries_mut().push(KdlEntry::new(config.trace));
    kdl.nodes_mut().push(node);

    kdl
}

fn profile_to_kdl_node(profile: &ArchitectureProfile) -> KdlNode {
    let mut node = KdlNode::new("profile");

    node.entries_mut()
        .push(KdlEntry::new(profile.architecture().to_string()));

    let endianness = match profile.endianness() {
        Endianness::Little => "little",
        Endianness::Big => "big",
    };
    node.entries_mut()
        .push(KdlEntry::new_prop("endianness", endianness));

    let convention = match profile.calling_convention() {
        CallingConvention::Gcc => "gcc",
        CallingConvention::Msvc => "msvc",
    };
    node.entries_mut()
        .push(KdlEntry::new_prop("convention", convention));

    node.entries_mut().push(KdlEntry::new_prop(
        "word-size",
        i128::try_from(profile.word_size()).unwrap_or(i128::MAX),
    ));

    let children = node.ensure_children().nodes_mut();

    let mut push = |name: &str, ids: &[RegisterId]| {
        let mut child = KdlNode::new(name);
        child.entries_mut().extend(
            ids.iter()
                .map(|id| KdlEntry::new(register_name(profile, *id))),
        );
        children.push(child);
    };

    push("pc", &[profile.pc()]);
    push("sp", &[profile.sp()]);

    if let Some(ra) = profile.return_address_register() {
        push("return-address", &[ra]);
    }

    push("result", &[profile.result()]);
    push("arguments", profile.arguments());

    node
}

fn register_name(profile: &ArchitectureProfile, id: RegisterId) -> String {
    profile
        .register_name(id)
        .map_or_else(|| format!("#{}", id.0), str::to_owned)
}
