//! Error types shared across the harness.

use std::fmt::{Display, Formatter};
use std::time::Duration;

/// Shared harness result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Harness error enumeration covering all failure modes.
///
/// Malformed lines on the protocol stream are deliberately *not* represented
/// here: they are decode noise, silently skipped by the correlator.  Teardown
/// failures are likewise swallowed inside [`crate::driver::ServerHandle::shutdown`]
/// because they only ever represent a race with a process that already exited.
#[derive(Debug)]
pub enum AppError {
    /// Bad arguments, missing workspace directory, or server binary not
    /// found.  Reported before any process is spawned; maps to exit code 2.
    Setup(String),
    /// The server executable was located but could not be started.
    Spawn(String),
    /// Line-framing failure (oversized line) or serialisation failure.
    Codec(String),
    /// No response with the awaited correlation id arrived in time.
    Timeout {
        /// The request id that went unanswered.
        id: u64,
        /// How long the correlator waited before giving up.
        waited: Duration,
    },
    /// A correlated response was structurally not what the step requires.
    Shape(String),
    /// Pipe or file-system I/O failure.
    Io(String),
}

impl AppError {
    /// Process exit code for this failure category.
    ///
    /// Setup problems (bad usage, missing binary or directory) exit with 2,
    /// matching conventional usage-error semantics; every protocol-level
    /// failure exits with 1.
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::Setup(_) => 2,
            _ => 1,
        }
    }
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Setup(msg) => write!(f, "setup: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Codec(msg) => write!(f, "codec: {msg}"),
            Self::Timeout { id, waited } => {
                write!(f, "timeout: no response for id={id} within {waited:?}")
            }
            Self::Shape(msg) => write!(f, "shape: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

// Required by `tokio_util::codec::Decoder`, whose error type must absorb
// underlying transport failures.
impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}
