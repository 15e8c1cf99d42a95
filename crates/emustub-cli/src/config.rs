use std::ffi::OsStr;
use std::path::{Path, PathBuf};

use emustub_session::memory::MemoryRegionTable;
use emustub_session::{ArchitectureProfile, CallingConvention, Permissions, RegisterId};
use miette::{IntoDiagnostic, WrapErr};

/// Description of an emulation session.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct SessionConfig {
    /// Emulated architecture.
    #[knus(child)]
    pub arch: ArchConfig,

    /// Stack of the emulated function.
    #[knus(child)]
    pub stack: StackConfig,

    /// Memory areas to map.
    #[knus(children(name = "area"))]
    pub areas: Vec<AreaConfig>,

    /// Initial memory contents.
    #[knus(children(name = "content"))]
    pub contents: Vec<ContentConfig>,

    /// Address of the first instruction to run.
    #[knus(child, unwrap(argument))]
    pub start: u64,

    /// Address at which the emulated function returns.
    #[knus(child, unwrap(argument))]
    pub return_address: u64,

    /// Register presets.
    #[knus(children(name = "register"))]
    pub registers: Vec<RegisterConfig>,

    /// Whether to trace executed instructions.
    #[knus(child)]
    pub trace: bool,
}

/// Configuration of the emulated architecture.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct ArchConfig {
    /// Architecture name (e.g., `x64` or `mips`).
    #[knus(argument)]
    pub name: String,

    /// Bit width.
    #[knus(property, default = 32)]
    pub bits: u32,

    /// Whether the architecture is big-endian.
    #[knus(property, default)]
    pub big_endian: bool,

    /// Calling convention (`gcc` or `msvc`).
    #[knus(property)]
    pub convention: Option<String>,
}

/// Configuration of the stack.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct StackConfig {
    /// Base address of the stack.
    #[knus(argument)]
    pub base: u64,

    /// Number of pages of the stack.
    #[knus(property, default = 1)]
    pub pages: u64,
}

/// Configuration of a memory area.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct AreaConfig {
    /// Base address of the area.
    #[knus(argument)]
    pub base: u64,

    /// Size of the area.
    #[knus(property)]
    pub size: u64,

    /// Permissions of the area (`rwx` by default).
    #[knus(property)]
    pub perms: Option<String>,
}

/// Configuration of initial memory content.
///
/// The content is given either inline as hexadecimal, or as a path to a
/// raw binary file.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct ContentConfig {
    /// Address of the content.
    #[knus(argument)]
    pub address: u64,

    /// Hex-encoded content.
    #[knus(property)]
    pub hex: Option<String>,

    /// Path to a file holding the content.
    #[knus(property)]
    pub file: Option<PathBuf>,
}

/// Configuration of a register preset.
#[derive(Debug, PartialEq, knus::Decode)]
pub struct RegisterConfig {
    /// Register name.
    #[knus(argument)]
    pub name: String,

    /// Register value.
    #[knus(argument)]
    pub value: u64,
}

/// Parses a session description.
///
/// If `config` ends with `.kdl`, it is treated as a path to a configuration
/// file. Otherwise it is directly parsed as inline KDL content.
pub fn parse_session_config(config: &str) -> miette::Result<(SessionConfig, PathBuf)> {
    let path = Path::new(config);

    if let Some((filename, "kdl")) = path
        .file_name()
        .and_then(OsStr::to_str)
        .zip(path.extension().and_then(OsStr::to_str))
    {
        let content = std::fs::read_to_string(path).into_diagnostic()?;
        let config = knus::parse(filename, &content)?;
        let base_dir = path.parent().map(Path::to_path_buf).unwrap_or_default();

        Ok((config, base_dir))
    } else {
        let config = knus::parse("<content>", config)?;
        let base_dir = std::env::current_dir().into_diagnostic()?;

        Ok((config, base_dir))
    }
}

impl ArchConfig {
    /// Resolves the architecture profile.
    pub fn profile(&self) -> miette::Result<ArchitectureProfile> {
        let convention = match &self.convention {
            Some(convention) => convention.parse::<CallingConvention>().map_err(|e| {
                miette::miette!("invalid calling convention: {e}")
            })?,
            None => CallingConvention::default(),
        };

        ArchitectureProfile::resolve(&self.name, self.bits, !self.big_endian, convention)
            .into_diagnostic()
    }
}

impl SessionConfig {
    /// Builds the memory layout, loading file contents relative to `base_dir`.
    pub fn memory_table(&self, base_dir: &Path) -> miette::Result<MemoryRegionTable> {
        miette::ensure!(!self.areas.is_empty(), "no memory area declared");
        miette::ensure!(!self.contents.is_empty(), "no memory content declared");

        let stack_size = self
            .stack
            .pages
            .checked_mul(emustub_session::memory::PAGE_SIZE)
            .ok_or_else(|| miette::miette!("stack is too large"))?;

        let mut table = MemoryRegionTable::new(self.stack.base, stack_size);

        for area in &self.areas {
            let perms = match &area.perms {
                Some(perms) => Permissions::parse(perms)
                    .ok_or_else(|| miette::miette!("invalid permissions: {perms:?}"))?,
                None => Permissions::ALL,
            };

            table
                .declare_area_with_permissions(area.base, area.size, perms)
                .into_diagnostic()?;
        }

        for content in &self.contents {
            let bytes = content.load(base_dir)?;
            table
                .declare_content(content.address, bytes)
                .into_diagnostic()?;
        }

        table.check_contents().into_diagnostic()?;

        Ok(table)
    }

    /// Resolves the register presets.
    pub fn register_presets(
        &self,
        profile: &ArchitectureProfile,
    ) -> miette::Result<Vec<(RegisterId, u64)>> {
        self.registers
            .iter()
            .map(|reg| {
                let id = profile.register_id(&reg.name).into_diagnostic()?;
                Ok((id, reg.value & profile.word_mask()))
            })
            .collect()
    }
}

impl ContentConfig {
    /// Loads the content bytes.
    pub fn load(&self, base_dir: &Path) -> miette::Result<Vec<u8>> {
        match (&self.hex, &self.file) {
            (Some(hex), None) => decode_hex(hex),
            (None, Some(file)) => std::fs::read(base_dir.join(file)).into_diagnostic(),
            _ => miette::bail!(
                "content at {:#x} needs exactly one of `hex` or `file`",
                self.address
            ),
        }
    }
}

/// Decodes a hex string, ignoring whitespace.
pub fn decode_hex(s: &str) -> miette::Result<Vec<u8>> {
    let digits = s.chars().filter(|c| !c.is_whitespace()).collect::<String>();

    hex::decode(&digits)
        .into_diagnostic()
        .wrap_err_with(|| format!("invalid hex content {digits:?}"))
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use emustub_session::Permissions;

    use super::{
        AreaConfig, ArchConfig, ContentConfig, RegisterConfig, SessionConfig, StackConfig,
        decode_hex,
    };

    #[test]
    fn parse_from_kdl_minimal() {
        let config = knus::parse::<SessionConfig>(
            "<content>",
            indoc::indoc! {r#"
                arch "mips"
                stack 0x70000000
                area 0x400000 size=0x1000
                content 0x400000 hex="00000000"
                start 0x400000
                return-address 0x400004
            "#},
        )
        .map_err(miette::Report::new)
        .expect("parse kdl");

        assert_eq!(
            config,
            SessionConfig {
                arch: ArchConfig {
                    name: "mips".to_owned(),
                    bits: 32,
                    big_endian: false,
                    convention: None,
                },
                stack: StackConfig {
                    base: 0x7000_0000,
                    pages: 1,
                },
                areas: vec![AreaConfig {
                    base: 0x40_0000,
                    size: 0x1000,
                    perms: None,
                }],
                contents: vec![ContentConfig {
                    address: 0x40_0000,
                    hex: Some("00000000".to_owned()),
                    file: None,
                }],
                start: 0x40_0000,
                return_address: 0x40_0004,
                registers: vec![],
                trace: false,
            }
        );
    }

    #[test]
    fn parse_from_kdl_full() {
        let config = knus::parse::<SessionConfig>(
            "<content>",
            indoc::indoc! {r#"
                arch "x64" bits=64 convention="msvc"
                stack 0x70000000 pages=4
                area 0x1000 size=0x100 perms="r-x"
                area 0x2000 size=0x100 perms="rw-"
                content 0x1000 hex="c3"
                start 0x1000
                return-address 0x1001
                register "rcx" 0x10
                register "rdx" 0x20
                trace
            "#},
        )
        .map_err(miette::Report::new)
        .expect("parse kdl");

        assert_eq!(config.arch.bits, 64);
        assert_eq!(config.arch.convention.as_deref(), Some("msvc"));
        assert_eq!(config.stack.pages, 4);
        assert_eq!(config.areas.len(), 2);
        assert_eq!(
            config.registers,
            vec![
                RegisterConfig {
                    name: "rcx".to_owned(),
                    value: 0x10
                },
                RegisterConfig {
                    name: "rdx".to_owned(),
                    value: 0x20
                },
            ]
        );
        assert!(config.trace);

        let profile = config.arch.profile().expect("profile");
        assert_eq!(profile.word_size(), 8);
        assert_eq!(profile.arguments()[0], profile.register_id("rcx").unwrap());

        let table = config.memory_table(Path::new(".")).expect("memory table");
        assert_eq!(table.stack().size, 0x4000);
        assert_eq!(table.areas()[0].permissions, Permissions::READ | Permissions::EXEC);

        let presets = config.register_presets(&profile).expect("presets");
        assert_eq!(presets.len(), 2);
    }

    #[test]
    fn invalid_descriptions() {
        let parse = |content: &str| {
            knus::parse::<SessionConfig>("<content>", content)
                .map_err(miette::Report::new)
                .expect("parse kdl")
        };

        let config = parse(indoc::indoc! {r#"
            arch "x64" bits=64 convention="fastcall"
            stack 0x70000000
            area 0x1000 size=0x100
            content 0x1000 hex="c3"
            start 0x1000
            return-address 0x1001
        "#});
        assert!(config.arch.profile().is_err());

        let config = parse(indoc::indoc! {r#"
            arch "x64" bits=64
            stack 0x70000000
            area 0x1000 size=0x100
            content 0x3000 hex="c3"
            start 0x1000
            return-address 0x1001
        "#});
        assert!(config.memory_table(Path::new(".")).is_err());

        let config = parse(indoc::indoc! {r#"
            arch "x64" bits=64
            stack 0x70000000
            area 0x1000 size=0x100
            content 0x1000 hex="c3" file="code.bin"
            start 0x1000
            return-address 0x1001
            register "r0" 1
        "#});
        assert!(config.memory_table(Path::new(".")).is_err());

        let profile = config.arch.profile().expect("profile");
        assert!(config.register_presets(&profile).is_err());
    }

    #[test]
    fn hex_decoding() {
        assert_eq!(decode_hex("c3").unwrap(), [0xc3]);
        assert_eq!(decode_hex("DE ad\nbe EF").unwrap(), [0xde, 0xad, 0xbe, 0xef]);
        assert!(decode_hex("").unwrap().is_empty());
        assert!(decode_hex("abc").is_err());
        assert!(decode_hex("zz").is_err());
    }
}
