//! Error taxonomy for the runner. Expected game-ending conditions (handshake
//! failure, a dead connection, an exhausted clock) are caught at the turn
//! engine boundary and turned into a [`crate::result::ResultCode`]; they never
//! escape as a `ConnectionError`/`SandboxError` past that point.

use thiserror::Error;

/// Errors a [`crate::connection::Connection`] can raise.
#[derive(Debug, Error)]
pub enum ConnectionError {
    /// The stream reached `END` or EOF; no further operations are possible.
    #[error("connection is no longer active")]
    NotActive,
    /// The calling budget (or the sandbox's own wall clock) ran out.
    #[error("connection timed out")]
    TimedOut,
    /// The peer never sent a handshake key before the stream ended. Carries
    /// whatever lines were printed before the stream gave out, so a caller
    /// can still attribute them to the player.
    #[error("handshake failed, {} lines of output captured", .0.len())]
    HandshakeFailed(Vec<String>),
    #[error("underlying stream error: {0}")]
    Io(String),
}

/// Errors raised while provisioning or tearing down a sandbox.
#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("submission id {0:?} is not a valid hex identifier")]
    InvalidSubmission(String),
    #[error("submission archive not found on host: {0}")]
    MissingArchive(String),
    #[error("container engine error: {0}")]
    ContainerEngine(String),
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

/// Errors raised by a single matchmaker tick.
#[derive(Debug, Error)]
pub enum MatchmakerError {
    #[error("persistence layer error: {0}")]
    Persistence(String),
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
}
