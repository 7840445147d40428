//! Errors in the library.
use thiserror::Error;

/// Errors raised while building or training the agent.
///
/// All of these are fatal to the current run; the only resilience mechanism
/// is restarting from the last saved checkpoint.
#[derive(Error, Debug)]
pub enum DqnError {
    /// Invalid configuration, e.g. an action-space size that does not fit
    /// the controller mapping table.
    #[error("Configuration error: {0}")]
    Config(String),

    /// A batch was requested from an empty replay buffer.
    #[error("Replay buffer is empty")]
    EmptyBuffer,

    /// The native environment failed on reset or step, or produced a
    /// malformed frame. Resuming a corrupted game state is unsafe.
    #[error("Environment failure: {0}")]
    Environment(String),

    /// Stored checkpoint parameters disagree with the current network
    /// architecture.
    #[error("Checkpoint mismatch: {0}")]
    CheckpointMismatch(String),
}
