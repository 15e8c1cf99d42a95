use emustub_session::memory::PAGE_SIZE;
use emustub_session::testing::{ByteDisassembler, StubEngine};
use emustub_session::{ArchitectureProfile, CallingConvention, EmulationSession};
use emustub_target::DebugTarget;

pub type Session = EmulationSession<StubEngine, ByteDisassembler>;
pub type Target = DebugTarget<StubEngine, ByteDisassembler>;

pub const STACK: u64 = 0x7000_0000;

/// MIPS32 function made of three 4-byte instructions at `0x400000`.
pub fn mips_session(little_endian: bool) -> Session {
    let profile = ArchitectureProfile::resolve("mips", 32, little_endian, CallingConvention::Gcc)
        .expect("valid profile");

    let mut session = Session::new(profile, STACK, PAGE_SIZE);
    session.declare_area(0x40_0000, 0x1000).unwrap();
    session.declare_content(0x40_0000, vec![0u8; 12]).unwrap();
    session.set_start_address(0x40_0000);
    session.set_return_address(0x40_000c);
    session.trace_instructions();
    session
}

/// x64 function made of a single `ret` at `0x1000`.
pub fn x64_session() -> Session {
    let profile = ArchitectureProfile::resolve("x64", 64, true, CallingConvention::Gcc)
        .expect("valid profile");

    let mut session = Session::new(profile, STACK, 4 * PAGE_SIZE);
    session.declare_area(0x1000, 0x100).unwrap();
    session.declare_content(0x1000, vec![0xc3u8]).unwrap();
    session.set_start_address(0x1000);
    session.set_return_address(0x1001);
    session.trace_instructions();
    session
}

pub fn init(mut session: Session) -> Session {
    let engine = StubEngine::new(session.profile());
    session.init(engine, ByteDisassembler).unwrap();
    session
}

pub fn target(session: Session) -> Target {
    DebugTarget::new(init(session)).expect("debug target")
}
