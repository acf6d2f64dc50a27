//! Domain error model.

use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Domain-level error.
///
/// Keep this focused on deterministic failures of the scheduling core
/// (validation, terminal-state misuse, version races, malformed stored
/// payloads). Store and transport failures belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// Creation input failed validation. Never retried.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An operation was attempted against a task that can no longer change.
    #[error("terminal state: {0}")]
    TerminalState(String),

    /// The stored version moved on since it was read.
    ///
    /// The caller must re-read and retry the whole read-modify-write cycle.
    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),

    /// A stored payload could not be decoded (e.g. malformed headers text).
    #[error("serialization failed: {0}")]
    Serialization(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A requested record was not found (domain-level).
    #[error("not found")]
    NotFound,
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn terminal(msg: impl Into<String>) -> Self {
        Self::TerminalState(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::ConcurrentModification(msg.into())
    }

    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found() -> Self {
        Self::NotFound
    }

    /// Whether re-running the full read-modify-write cycle may succeed.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrentModification(_))
    }
}
