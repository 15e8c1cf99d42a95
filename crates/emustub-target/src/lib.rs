//! This crate provides the remote-debug target side of `emustub`: a
//! GDB-style target state machine backed by an [EmulationSession].
//!
//! It exposes what a remote-protocol server needs to answer a debugger
//! (register contexts, stop replies, target description and memory map),
//! but implements neither the packet framing nor the transport.
//!
//! [EmulationSession]: emustub_session::EmulationSession

mod error;
mod layout;
mod signal;
mod target;

pub use self::error::{Error, Result};
pub use self::layout::{LayoutRegister, RegisterLayout, memory_map};
pub use self::signal::Signal;
pub use self::target::{DebugTarget, HaltCause, TargetState};
