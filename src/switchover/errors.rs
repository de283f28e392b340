//! Switchover Error Types
//!
//! Operational failures (no candidate, long writes, a node refusing a
//! statement) are not errors: they end up in the `SwitchoverReport`.
//! A `SwitchoverError` means the orchestrator itself was misused, such as
//! a stage transition the protocol forbids.

use std::fmt;

/// Switchover error type
#[derive(Debug, Clone)]
pub struct SwitchoverError {
    /// Error kind
    pub kind: SwitchoverErrorKind,
    /// Error message
    pub message: String,
}

/// Switchover error kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchoverErrorKind {
    /// Stage transition not allowed by the protocol
    ForbiddenTransition,

    /// A switchover is already running on this instance
    AlreadyInProgress,
}

impl SwitchoverError {
    /// Create a new switchover error.
    pub fn new(kind: SwitchoverErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Create a forbidden transition error.
    pub fn forbidden_transition(from: &str, to: &str) -> Self {
        Self::new(
            SwitchoverErrorKind::ForbiddenTransition,
            format!("forbidden transition: {} -> {}", from, to),
        )
    }

    /// Create an already-in-progress error.
    pub fn already_in_progress() -> Self {
        Self::new(
            SwitchoverErrorKind::AlreadyInProgress,
            "a switchover is already in progress",
        )
    }
}

impl fmt::Display for SwitchoverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SwitchoverError({:?}): {}", self.kind, self.message)
    }
}

impl std::error::Error for SwitchoverError {}

/// Result type for switchover operations
pub type SwitchoverResult<T> = Result<T, SwitchoverError>;
