//! Adapter errors.

use thiserror::Error;

pub type Result<T, E = DebugError> = std::result::Result<T, E>;

/// Errors raised by the protocol engine, the transport, or a debug target.
#[derive(Debug, Error)]
pub enum DebugError {
    /// Transport read/write failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed JSON payload.
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),

    /// Malformed wire envelope.
    #[error("framing error: {0}")]
    Framing(String),

    /// Request arguments did not match the command's shape.
    #[error("invalid {command} args: {reason}")]
    InvalidArguments { command: String, reason: String },

    /// Command requires an active stop.
    #[error("not stopped")]
    NotStopped,

    /// The stop ended before the request could be served.
    #[error("stop has ended")]
    StopEnded,

    /// A continuation was already chosen for the current stop.
    #[error("continuation already set")]
    ContinuationAlreadySet,

    /// `launch`/`attach` was issued twice.
    #[error("start mode already set")]
    StartModeAlreadySet,

    /// `configurationDone` arrived before `launch`/`attach`.
    #[error("start mode not set")]
    StartModeMissing,

    /// Frame id unknown to the current stop.
    #[error("unknown frame id {0}")]
    UnknownFrame(u32),

    /// Variables reference unknown to the current stop.
    #[error("unknown variables reference {0}")]
    UnknownVariable(u32),

    /// The debug target failed to start.
    #[error("launch failed: {0}")]
    Launch(String),

    /// Invalid configuration file or value.
    #[error("invalid config: {0}")]
    Config(String),
}

impl DebugError {
    pub(crate) fn invalid_arguments(command: &str, reason: impl ToString) -> Self {
        Self::InvalidArguments {
            command: command.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Contract violations are answered with an error response but keep the session open.
    #[must_use]
    pub fn is_contract_violation(&self) -> bool {
        matches!(
            self,
            Self::NotStopped
                | Self::StopEnded
                | Self::ContinuationAlreadySet
                | Self::StartModeAlreadySet
                | Self::StartModeMissing
                | Self::UnknownFrame(_)
                | Self::UnknownVariable(_)
        )
    }
}
