//! Error taxonomy shared across the workspace.
//!
//! Every failure surfaced to a caller maps onto one of these variants
//! with a stable reason string; none of them crash the host process.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// Bad input before any side effect: malformed locator, empty command.
    #[error("validation failed: {0}")]
    Validation(String),

    /// Unknown or inactive container id.
    #[error("container not found: {0}")]
    NotFound(String),

    /// Denylisted command, disallowed argument, disallowed file
    /// extension, or archive size over the configured maximum.
    #[error("policy violation: {0}")]
    Policy(String),

    /// Execution or dependency install exceeded its wall-clock bound.
    #[error("timed out after {0} ms")]
    Timeout(u64),

    /// Per-stream output ceiling exceeded.
    #[error("resource limit exceeded: {0}")]
    ResourceLimit(String),

    /// Process could not be spawned or was terminated at the OS level.
    #[error("execution failed: {0}")]
    Execution(String),

    /// Archive, workspace, or metadata store I/O failure.
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Storage(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
