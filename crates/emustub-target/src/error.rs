use crate::target::TargetState;

/// Error type of this crate.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// Error from the emulation session.
    #[error(transparent)]
    Session(#[from] emustub_session::Error),

    /// The session can't back a debug target.
    #[error("invalid target configuration: {0}")]
    Configuration(&'static str),

    /// A register context has the wrong length.
    #[error("malformed register context: expected {expected} bytes, got {actual}")]
    MalformedContext {
        /// Expected length in bytes.
        expected: usize,

        /// Actual length in bytes.
        actual: usize,
    },

    /// The register index is out of the register layout.
    #[error("unknown register index {0}")]
    UnknownRegister(usize),

    /// The operation is not allowed in the current target state.
    #[error("operation not allowed while the target is {0:?}")]
    InvalidState(TargetState),

    /// The target description couldn't be generated.
    #[error("failed to generate target description: {0}")]
    TargetDescription(String),
}

/// Result type of this crate.
pub type Result<T> = core::result::Result<T, Error>;
