//! This crate provides the emulation side of `emustub`: architecture
//! profiles, memory layout validation, and an emulation session driving an
//! instruction-set emulation engine with breakpoints and instruction tracing.
//!
//! The emulation engine and the disassembler are not implemented here. They
//! are plugged in through the [Engine] and [Disassembler] traits (a
//! capstone-backed [CapstoneDisassembler] is provided).
//!
//! # Supported Architectures
//!
//! <table>
//!     <thead>
//!         <tr>
//!             <th>Architecture</th>
//!             <th>Modes</th>
//!             <th>Byte Order</th>
//!         </tr>
//!     </thead>
//!     <tbody>
//!         <tr>
//!             <td>x86</td>
//!             <td><code>16</code>, <code>32</code>, <code>64</code></td>
//!             <td>little</td>
//!         </tr>
//!         <tr>
//!             <td>ARM</td>
//!             <td><code>arm</code>, <code>thumb</code>, <code>aarch64</code></td>
//!             <td>little, big</td>
//!         </tr>
//!         <tr>
//!             <td>MIPS</td>
//!             <td><code>32</code>, <code>64</code></td>
//!             <td>little, big</td>
//!         </tr>
//!     </tbody>
//! </table>

pub mod arch;
pub mod disasm;
pub mod engine;
pub mod memory;
pub mod session;

mod error;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use self::arch::{ArchitectureProfile, CallingConvention, RegisterId};
pub use self::disasm::{CapstoneDisassembler, Disassembler};
pub use self::engine::{Engine, FaultKind, Permissions};
pub use self::error::{EmulationFault, Error, Result};
pub use self::session::{EmulationSession, HaltReason, RunLimits, SessionState, StopHandle};
