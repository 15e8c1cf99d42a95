#![allow(clippy::panic)]

use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use test_log::test;

use super::{EmulationSession, HaltReason, RunLimits, SessionState};
use crate::arch::{ArchitectureProfile, CallingConvention, Endianness};
use crate::engine::{FaultKind, HookKind, Permissions};
use crate::error::Error;
use crate::memory::PAGE_SIZE;
use crate::testing::{ByteDisassembler, EngineCall, FAULT_OPCODE, StubEngine};

type Session = EmulationSession<StubEngine, ByteDisassembler>;

const STACK: u64 = 0x7000_0000;

fn x64_ret_session() -> Session {
    let profile = ArchitectureProfile::resolve("x64", 64, true, CallingConvention::Gcc)
        .expect("valid profile");

    let mut session = Session::new(profile, STACK, 4 * PAGE_SIZE);
    session.declare_area(0x1000, 0x100).unwrap();
    session.declare_content(0x1000, vec![0xc3u8]).unwrap();
    session.set_start_address(0x1000);
    session.set_return_address(0x1001);
    session
}

fn mips_session() -> Session {
    let profile = ArchitectureProfile::resolve("mips", 32, true, CallingConvention::Gcc)
        .expect("valid profile");

    let mut session = Session::new(profile, STACK, PAGE_SIZE);
    session.declare_area(0x40_0000, 0x100).unwrap();
    // three 4-byte instructions (nops)
    session.declare_content(0x40_0000, vec![0u8; 12]).unwrap();
    session.set_start_address(0x40_0000);
    session.set_return_address(0x40_000c);
    session.trace_instructions();
    session
}

fn init(session: &mut Session) {
    let engine = StubEngine::new(session.profile());
    session.init(engine, ByteDisassembler).unwrap();
}

#[test]
fn x64_ret_stub_returns() {
    let mut session = x64_ret_session();
    session.init_register("rdi", 0x42).unwrap();
    init(&mut session);

    assert_eq!(session.state(), SessionState::Ready);
    assert_eq!(session.stack_pointer().unwrap(), STACK + 4 * PAGE_SIZE);
    assert_eq!(session.argument(0).unwrap(), 0x42);

    let reason = session.run(RunLimits::unbounded()).unwrap();

    assert_eq!(reason, HaltReason::ReturnReached);
    assert_eq!(session.state(), SessionState::HaltedNormal);
    assert_eq!(session.program_counter().unwrap(), 0x1001);
    assert_eq!(session.start_address(), Some(0x1001));

    let snapshot = session.last_snapshot().expect("snapshot");
    assert_eq!(snapshot.get("rip"), Some(0x1001));
    assert_eq!(snapshot.get("rdi"), Some(0x42));
}

#[test]
fn init_maps_layout_in_order() {
    let mut session = x64_ret_session();
    session.trace_instructions();

    let engine = StubEngine::new(session.profile());
    let journal = engine.journal();
    session.init(engine, ByteDisassembler).unwrap();

    assert_eq!(
        journal.borrow().as_slice(),
        [
            EngineCall::Map {
                base: STACK,
                size: 4 * PAGE_SIZE,
                permissions: Permissions::READ | Permissions::WRITE,
            },
            EngineCall::Map {
                base: 0x1000,
                size: PAGE_SIZE,
                permissions: Permissions::ALL,
            },
            EngineCall::InstallHook(HookKind::InvalidMemory),
            EngineCall::InstallHook(HookKind::Code),
        ]
    );

    assert!(session.memory().is_frozen());
    assert!(matches!(
        session.declare_area(0x9000, 0x10),
        Err(Error::MemoryTableFrozen)
    ));
    assert_eq!(session.read_memory(0x1000, 1).unwrap(), [0xc3]);
}

#[test]
fn init_requires_parameters() {
    let profile = ArchitectureProfile::resolve("x64", 64, true, CallingConvention::Gcc)
        .expect("valid profile");
    let mut session = Session::new(profile, STACK, PAGE_SIZE);

    let res = session.init(StubEngine::new(session.profile()), ByteDisassembler);
    assert!(matches!(res, Err(Error::MissingParameter("start address"))));

    session.set_start_address(0x1000);
    let res = session.init(StubEngine::new(session.profile()), ByteDisassembler);
    assert!(matches!(res, Err(Error::MissingParameter("return address"))));

    session.set_return_address(0x1001);
    let res = session.init(StubEngine::new(session.profile()), ByteDisassembler);
    assert!(matches!(res, Err(Error::MissingParameter("memory areas"))));

    session.declare_area(0x1000, 0x10).unwrap();
    let res = session.init(StubEngine::new(session.profile()), ByteDisassembler);
    assert!(matches!(res, Err(Error::MissingParameter("memory contents"))));

    session.declare_content(0x2000, vec![0xc3u8]).unwrap();
    let res = session.init(StubEngine::new(session.profile()), ByteDisassembler);
    assert!(matches!(res, Err(Error::OutOfBounds { start: 0x2000, .. })));

    assert_eq!(session.state(), SessionState::Unconfigured);
    assert!(!session.is_initialized());
}

#[test]
fn init_twice_fails() {
    let mut session = x64_ret_session();
    init(&mut session);

    let res = session.init(StubEngine::new(session.profile()), ByteDisassembler);
    assert!(matches!(res, Err(Error::AlreadyInitialized)));
    assert!(matches!(
        session.init_register("rax", 1),
        Err(Error::AlreadyInitialized)
    ));
}

#[test]
fn failed_init_unmaps_regions() {
    let mut session = x64_ret_session();
    session.declare_area(0x8000, 0x10).unwrap();

    // stack and first area map, second area fails
    let engine = StubEngine::new(session.profile()).fail_map_at(2);
    let journal = engine.journal();

    let res = session.init(engine, ByteDisassembler);
    assert!(matches!(
        res,
        Err(Error::Engine(ref e)) if e.kind == FaultKind::InvalidArgument
    ));

    let calls = journal.borrow();
    assert_eq!(
        calls[calls.len() - 2..],
        [
            EngineCall::Unmap {
                base: 0x1000,
                size: PAGE_SIZE
            },
            EngineCall::Unmap {
                base: STACK,
                size: 4 * PAGE_SIZE
            },
        ]
    );

    assert_eq!(session.state(), SessionState::Unconfigured);
    assert!(session.engine().is_none());
    assert!(!session.memory().is_frozen());
}

#[test]
fn unknown_register_rejected() {
    let mut session = x64_ret_session();

    assert!(matches!(
        session.init_register("pc", 0),
        Err(Error::UnknownRegister(name)) if name == "pc"
    ));

    init(&mut session);
    assert!(matches!(
        session.read_register("xmm0"),
        Err(Error::UnknownRegister(_))
    ));
}

#[test]
fn register_roundtrip() {
    let mut session = x64_ret_session();
    init(&mut session);

    session.write_register("RAX", 0xdead_beef).unwrap();
    assert_eq!(session.read_register("rax").unwrap(), 0xdead_beef);
    assert_eq!(session.return_value().unwrap(), 0xdead_beef);

    session.set_argument(1, 7).unwrap();
    assert_eq!(session.read_register("rsi").unwrap(), 7);
    assert!(matches!(
        session.argument(6),
        Err(Error::UnknownRegister(_))
    ));

    // relocating the program counter moves the next run
    session.write_register("rip", 0x1000).unwrap();
    assert_eq!(session.start_address(), Some(0x1000));
}

#[test]
fn memory_access_bounds() {
    let mut session = x64_ret_session();

    assert!(matches!(
        session.read_memory(0x1000, 1),
        Err(Error::NotInitialized)
    ));

    init(&mut session);

    session.write_memory(0x10f0, &[1, 2, 3, 4]).unwrap();
    assert_eq!(session.read_memory(0x10f0, 4).unwrap(), [1, 2, 3, 4]);

    // mapped (page-aligned) but outside the declared area
    assert!(matches!(
        session.read_memory(0x10fe, 4),
        Err(Error::OutOfBounds {
            start: 0x10fe,
            end: 0x1102
        })
    ));
    assert!(matches!(
        session.write_memory(0x5000, &[0]),
        Err(Error::OutOfBounds { .. })
    ));

    // the stack is always accessible, and zeroed
    assert_eq!(
        session.read_memory(STACK + 4 * PAGE_SIZE - 8, 8).unwrap(),
        [0; 8]
    );
}

#[test]
fn mips_breakpoint_and_resume() {
    let mut session = mips_session();

    let hits = Rc::new(RefCell::new(Vec::new()));
    let hits_cb = hits.clone();
    session.add_breakpoint_callback(move |addr| {
        hits_cb.borrow_mut().push(addr);
        Ok(())
    });

    session.set_breakpoint(0x40_0004);
    init(&mut session);

    let reason = session.run(RunLimits::unbounded()).unwrap();
    assert_eq!(reason, HaltReason::Breakpoint(0x40_0004));
    assert_eq!(session.state(), SessionState::HaltedBreakpoint(0x40_0004));
    assert_eq!(session.program_counter().unwrap(), 0x40_0004);
    assert_eq!(session.current_address(), Some(0x40_0004));
    assert_eq!(*hits.borrow(), [0x40_0004]);

    let reason = session.run(RunLimits::unbounded()).unwrap();
    assert_eq!(reason, HaltReason::ReturnReached);
    assert_eq!(session.program_counter().unwrap(), 0x40_000c);
    assert_eq!(*hits.borrow(), [0x40_0004]);
}

#[test]
fn removed_breakpoint_does_not_halt() {
    let mut session = mips_session();
    session.set_breakpoint(0x40_0004);
    session.set_breakpoint(0x40_0008);
    session.set_breakpoint(0x40_0004);
    session.remove_breakpoint(0x40_0004);
    session.remove_breakpoint(0x40_0004);

    assert_eq!(session.breakpoints().collect::<Vec<_>>(), [0x40_0008]);

    init(&mut session);

    let reason = session.run(RunLimits::unbounded()).unwrap();
    assert_eq!(reason, HaltReason::Breakpoint(0x40_0008));
}

#[test]
fn callback_failures_are_isolated() {
    let mut session = mips_session();

    let calls = Rc::new(RefCell::new(Vec::new()));

    let c = calls.clone();
    session.add_breakpoint_callback(move |_| {
        c.borrow_mut().push("first");
        Err("callback error".into())
    });

    let c = calls.clone();
    session.add_breakpoint_callback(move |_| {
        c.borrow_mut().push("second");
        panic!("callback panic");
    });

    let c = calls.clone();
    session.add_breakpoint_callback(move |_| {
        c.borrow_mut().push("third");
        Ok(())
    });

    session.set_trace_callback(|_| Err("trace error".into()));

    session.set_breakpoint(0x40_0004);
    init(&mut session);

    let reason = session.run(RunLimits::unbounded()).unwrap();
    assert_eq!(reason, HaltReason::Breakpoint(0x40_0004));
    assert_eq!(*calls.borrow(), ["first", "second", "third"]);
}

#[test]
fn trace_callback_sees_every_instruction() {
    let mut session = mips_session();

    let traced = Rc::new(RefCell::new(Vec::new()));
    let t = traced.clone();
    session.set_trace_callback(move |insn| {
        t.borrow_mut().push((insn.address, insn.bytes.len()));
        Ok(())
    });

    init(&mut session);
    session.run(RunLimits::unbounded()).unwrap();

    assert_eq!(
        *traced.borrow(),
        [(0x40_0000, 4), (0x40_0004, 4), (0x40_0008, 4)]
    );
}

#[test]
fn instruction_limit_and_timeout() {
    let mut session = mips_session();
    init(&mut session);

    let reason = session.run(RunLimits::count(1)).unwrap();
    assert_eq!(reason, HaltReason::InstructionLimit);
    assert_eq!(session.start_address(), Some(0x40_0004));

    let reason = session
        .run(RunLimits {
            count: 0,
            timeout: Some(Duration::ZERO),
        })
        .unwrap();
    assert_eq!(reason, HaltReason::Timeout);
    assert_eq!(session.start_address(), Some(0x40_0004));
}

#[test]
fn stepping_onto_breakpoint_makes_progress() {
    let mut session = mips_session();
    session.set_breakpoint(0x40_0004);
    session.set_breakpoint(0x40_0008);
    init(&mut session);

    // the step ends on the breakpoint without hitting it
    let reason = session.run(RunLimits::count(1)).unwrap();
    assert_eq!(reason, HaltReason::InstructionLimit);
    assert_eq!(session.state(), SessionState::HaltedNormal);
    assert_eq!(session.program_counter().unwrap(), 0x40_0004);

    // the next step executes it
    let reason = session.run(RunLimits::count(1)).unwrap();
    assert_eq!(reason, HaltReason::InstructionLimit);
    assert_eq!(session.program_counter().unwrap(), 0x40_0008);

    // a full run from there stops on the next one only
    let reason = session.run(RunLimits::unbounded()).unwrap();
    assert_eq!(reason, HaltReason::ReturnReached);
}

#[test]
fn breakpoint_on_start_address_hits_first_run() {
    let mut session = mips_session();
    session.set_breakpoint(0x40_0000);
    init(&mut session);

    let reason = session.run(RunLimits::unbounded()).unwrap();
    assert_eq!(reason, HaltReason::Breakpoint(0x40_0000));

    // relocating the PC onto a breakpoint hits it again
    session.run(RunLimits::count(1)).unwrap();
    session.write_register("pc", 0x40_0000).unwrap();
    let reason = session.run(RunLimits::unbounded()).unwrap();
    assert_eq!(reason, HaltReason::Breakpoint(0x40_0000));
}

#[test]
fn register_presets_are_truncated() {
    let mut session = mips_session();
    session.init_register("a0", 0x1_2345_6789).unwrap();

    assert_eq!(
        session.register_presets().collect::<Vec<_>>(),
        [(session.profile().register_id("a0").unwrap(), 0x2345_6789)]
    );

    init(&mut session);
    assert_eq!(session.argument(0).unwrap(), 0x2345_6789);
}

#[test]
fn untraced_session_has_no_code_hook() {
    let mut session = x64_ret_session();

    let engine = StubEngine::new(session.profile());
    let journal = engine.journal();
    session.init(engine, ByteDisassembler).unwrap();

    assert!(
        !journal
            .borrow()
            .contains(&EngineCall::InstallHook(HookKind::Code))
    );

    // without the code hook, runs end on the return address
    session.stop();
    assert_eq!(
        session.run(RunLimits::unbounded()).unwrap(),
        HaltReason::ReturnReached
    );
}

#[test]
fn stop_request_halts_run() {
    let mut session = mips_session();

    let handle = session.stop_handle();
    let mut stopped = false;
    session.set_trace_callback(move |insn| {
        if !stopped && insn.address == 0x40_0004 {
            stopped = true;
            handle.stop();
        }
        Ok(())
    });

    init(&mut session);

    let reason = session.run(RunLimits::unbounded()).unwrap();
    assert_eq!(reason, HaltReason::Stopped);
    assert_eq!(session.program_counter().unwrap(), 0x40_0004);

    // a stale request doesn't leak into the next run
    session.stop();
    let reason = session.run(RunLimits::unbounded()).unwrap();
    assert_eq!(reason, HaltReason::ReturnReached);
}

#[test]
fn fault_halts_with_error() {
    let mut session = mips_session();
    init(&mut session);

    session
        .write_memory(0x40_0004, &[FAULT_OPCODE; 4])
        .unwrap();
    session.write_register("v0", 0x1234).unwrap();

    let fault = match session.run(RunLimits::unbounded()) {
        Err(Error::EmulationFault(fault)) => fault,
        other => panic!("expected emulation fault, got {other:?}"),
    };

    assert_eq!(fault.address, 0x40_0004);
    assert_eq!(fault.kind, FaultKind::InvalidInstruction);
    assert_eq!(session.state(), SessionState::HaltedError);

    let snapshot = session.last_snapshot().expect("snapshot");
    assert_eq!(snapshot.get("v0"), Some(0x1234));
    assert_eq!(snapshot.get("pc"), Some(0x40_0004));

    assert!(matches!(
        session.run(RunLimits::unbounded()),
        Err(Error::Faulted(0x40_0004))
    ));

    // patch the faulting instruction and recover
    session.write_memory(0x40_0004, &[0; 4]).unwrap();
    session.recover();
    assert_eq!(
        session.run(RunLimits::unbounded()).unwrap(),
        HaltReason::ReturnReached
    );
}

#[test]
fn unmapped_fetch_faults() {
    let mut session = x64_ret_session();
    init(&mut session);

    session.write_register("rip", 0x9000).unwrap();

    let res = session.run(RunLimits::unbounded());
    assert!(matches!(
        res,
        Err(Error::EmulationFault(ref f))
            if f.kind == FaultKind::FetchUnmapped && f.address == 0x9000
    ));
}

#[test]
fn big_endian_profile_session() {
    let profile = ArchitectureProfile::from_arch(
        crate::arch::Architecture::Mips32,
        Endianness::Big,
        CallingConvention::Gcc,
    )
    .expect("valid profile");

    let mut session = Session::new(profile, STACK, PAGE_SIZE);
    session.declare_area(0x1000, 0x10).unwrap();
    session.declare_content(0x1000, vec![0u8; 4]).unwrap();
    session.set_start_address(0x1000);
    session.set_return_address(0x1004);
    init(&mut session);

    assert_eq!(
        session.run(RunLimits::unbounded()).unwrap(),
        HaltReason::ReturnReached
    );
}

#[test]
fn run_before_init_fails() {
    let mut session = x64_ret_session();
    assert!(matches!(
        session.run(RunLimits::unbounded()),
        Err(Error::NotInitialized)
    ));
}
