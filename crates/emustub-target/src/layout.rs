use emustub_session::arch::{Architecture, Family};
use emustub_session::memory::MappingRequest;
use emustub_session::{ArchitectureProfile, Permissions, RegisterId};
use quick_xml::Writer;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};

use crate::error::{Error, Result};

/// Register exposed to a remote debugger.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayoutRegister {
    /// Register name.
    pub name: &'static str,

    /// Engine register ID.
    pub id: RegisterId,

    /// GDB register type (`int`, `code_ptr` or `data_ptr`).
    pub reg_type: &'static str,
}

/// Ordered registers exchanged with a remote debugger.
#[derive(Debug, Clone)]
pub struct RegisterLayout {
    architecture: Architecture,
    word_size: usize,
    registers: Vec<LayoutRegister>,
    pc_index: usize,
    sp_index: usize,
}

impl RegisterLayout {
    /// Builds the register layout of an architecture profile.
    pub fn for_profile(profile: &ArchitectureProfile) -> Result<Self> {
        let registers = profile
            .context_registers()
            .iter()
            .map(|&name| {
                let id = profile.register_id(name)?;

                let reg_type = if id == profile.pc() {
                    "code_ptr"
                } else if id == profile.sp() {
                    "data_ptr"
                } else {
                    "int"
                };

                Ok(LayoutRegister { name, id, reg_type })
            })
            .collect::<Result<Vec<_>>>()?;

        let index_of = |id| {
            registers
                .iter()
                .position(|r| r.id == id)
                .ok_or(Error::Configuration("role register missing from context"))
        };

        Ok(Self {
            architecture: profile.architecture(),
            word_size: profile.word_size(),
            pc_index: index_of(profile.pc())?,
            sp_index: index_of(profile.sp())?,
            registers,
        })
    }

    /// Returns the registers, in protocol order.
    pub fn registers(&self) -> &[LayoutRegister] {
        &self.registers
    }

    /// Returns the register at the given protocol index.
    pub fn get(&self, index: usize) -> Option<&LayoutRegister> {
        self.registers.get(index)
    }

    /// Returns the number of registers.
    pub fn len(&self) -> usize {
        self.registers.len()
    }

    /// Returns whether the layout has no registers.
    pub fn is_empty(&self) -> bool {
        self.registers.is_empty()
    }

    /// Returns the size (in bytes) of one serialized register.
    pub fn word_size(&self) -> usize {
        self.word_size
    }

    /// Returns the size (in bytes) of a full register context.
    pub fn context_size(&self) -> usize {
        self.word_size * self.registers.len()
    }

    /// Returns the protocol index of the program counter.
    pub fn pc_index(&self) -> usize {
        self.pc_index
    }

    /// Returns the protocol index of the stack pointer.
    pub fn sp_index(&self) -> usize {
        self.sp_index
    }

    /// Generates the GDB target description XML (`target.xml`).
    pub fn target_description(&self) -> Result<String> {
        let (arch_name, feature) = gdb_names(self.architecture);
        let bitsize = (self.word_size * 8).to_string();

        let mut writer = Writer::new(Vec::new());

        write_prolog(&mut writer, "target SYSTEM \"gdb-target.dtd\"")?;

        write(
            &mut writer,
            Event::Start(BytesStart::new("target").with_attributes([("version", "1.0")])),
        )?;
        write(&mut writer, Event::Start(BytesStart::new("architecture")))?;
        write(&mut writer, Event::Text(BytesText::new(arch_name)))?;
        write(&mut writer, Event::End(BytesEnd::new("architecture")))?;

        write(
            &mut writer,
            Event::Start(BytesStart::new("feature").with_attributes([("name", feature)])),
        )?;

        for (regnum, reg) in self.registers.iter().enumerate() {
            let regnum = regnum.to_string();

            let elem = BytesStart::new("reg").with_attributes([
                ("name", reg.name),
                ("bitsize", bitsize.as_str()),
                ("regnum", regnum.as_str()),
                ("type", reg.reg_type),
                ("group", "general"),
            ]);

            write(&mut writer, Event::Empty(elem))?;
        }

        write(&mut writer, Event::End(BytesEnd::new("feature")))?;
        write(&mut writer, Event::End(BytesEnd::new("target")))?;

        into_string(writer)
    }
}

/// Generates the GDB memory map XML from the mapping requests of a session.
pub fn memory_map(requests: &[MappingRequest]) -> Result<String> {
    let mut writer = Writer::new(Vec::new());

    write_prolog(
        &mut writer,
        "memory-map PUBLIC \"+//IDN gnu.org//DTD GDB Memory Map V1.0//EN\" \
         \"http://sourceware.org/gdb/gdb-memory-map.dtd\"",
    )?;

    write(&mut writer, Event::Start(BytesStart::new("memory-map")))?;

    for req in requests {
        let kind = if req.permissions.contains(Permissions::WRITE) {
            "ram"
        } else {
            "rom"
        };
        let start = format!("{:#x}", req.base);
        let length = format!("{:#x}", req.size);

        let elem = BytesStart::new("memory").with_attributes([
            ("type", kind),
            ("start", start.as_str()),
            ("length", length.as_str()),
        ]);

        write(&mut writer, Event::Empty(elem))?;
    }

    write(&mut writer, Event::End(BytesEnd::new("memory-map")))?;

    into_string(writer)
}

fn gdb_names(arch: Architecture) -> (&'static str, &'static str) {
    let arch_name = match arch {
        Architecture::X86_16 => "i8086",
        Architecture::X86 => "i386",
        Architecture::X64 => "i386:x86-64",
        Architecture::Arm | Architecture::ArmThumb => "arm",
        Architecture::Aarch64 => "aarch64",
        Architecture::Mips32 => "mips",
        Architecture::Mips64 => "mips:isa64",
    };

    let feature = match (arch.family(), arch) {
        (_, Architecture::Aarch64) => "org.gnu.gdb.aarch64.core",
        (Family::X86, _) => "org.gnu.gdb.i386.core",
        (Family::Arm, _) => "org.gnu.gdb.arm.core",
        (Family::Mips, _) => "org.gnu.gdb.mips.cpu",
    };

    (arch_name, feature)
}

fn write_prolog(writer: &mut Writer<Vec<u8>>, doctype: &str) -> Result<()> {
    write(writer, Event::Decl(BytesDecl::new("1.0", None, None)))?;
    write(writer, Event::DocType(BytesText::from_escaped(doctype)))
}

fn write(writer: &mut Writer<Vec<u8>>, event: Event<'_>) -> Result<()> {
    writer
        .write_event(event)
        .map_err(|e| Error::TargetDescription(e.to_string()))
}

fn into_string(writer: Writer<Vec<u8>>) -> Result<String> {
    String::from_utf8(writer.into_inner()).map_err(|e| Error::TargetDescription(e.to_string()))
}
