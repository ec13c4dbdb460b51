//! Error types for the session host.

use thiserror::Error;

/// Errors produced while validating and applying session commands.
///
/// The reject-class variants ([`IllegalPhase`](SessionError::IllegalPhase),
/// [`TurnViolation`](SessionError::TurnViolation),
/// [`MalformedPayload`](SessionError::MalformedPayload),
/// [`DomainViolation`](SessionError::DomainViolation)) are surfaced to the
/// offending client as a `msg` notice and never mutate state.
/// [`Fault`](SessionError::Fault) is terminal: the session loop logs the full
/// state plus the triggering command and halts permanently.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The command kind is not legal in the session's current phase.
    #[error("{0}")]
    IllegalPhase(&'static str),

    /// The sender does not own the current turn.
    #[error("Not your turn yet")]
    TurnViolation,

    /// The command payload could not be decoded into the expected shape.
    #[error("couldn't decode payload: {0}")]
    MalformedPayload(#[from] serde_json::Error),

    /// A game-rule violation: insufficient resources, duplicate district,
    /// invalid index, roster full, and the like.
    #[error("{0}")]
    DomainViolation(String),

    /// An invariant break that no command sequence should be able to reach.
    /// Halts the session loop; the session is left permanently unresponsive.
    #[error("session fault: {0}")]
    Fault(String),

    /// The session loop has already stopped or faulted; the command channel
    /// is closed.
    #[error("session is not running")]
    Stopped,

    /// No session is registered under the requested id.
    #[error("unknown session")]
    UnknownSession,
}

impl SessionError {
    /// Build a [`DomainViolation`](SessionError::DomainViolation) from any
    /// message.
    pub fn domain(msg: impl Into<String>) -> Self {
        SessionError::DomainViolation(msg.into())
    }

    /// Build a [`Fault`](SessionError::Fault) from any message.
    pub fn fault(msg: impl Into<String>) -> Self {
        SessionError::Fault(msg.into())
    }

    /// Returns `true` for the terminal fault class. Everything else is a
    /// per-command rejection.
    pub fn is_fault(&self) -> bool {
        matches!(self, SessionError::Fault(_))
    }
}

/// A specialized [`Result`] type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;
