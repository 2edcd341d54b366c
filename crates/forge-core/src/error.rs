//! Error types for Forge Core
//!
//! Only conditions that abort a whole request are errors. Everything a
//! candidate does wrong is a [`FailureCategory`](crate::FailureCategory)
//! captured in its attempt record.

use crate::attempt::AttemptHistory;
use crate::state_machine::RunState;
use forge_policy::PolicyError;
use forge_validator::SandboxError;
use std::path::PathBuf;

/// Request-level error
#[derive(Debug, thiserror::Error)]
pub enum ForgeError {
    /// Request failed validation before any attempt
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Backend failed to respond; no attempt was consumed
    #[error("generative backend unavailable after {attempts_completed} attempt(s): {message}")]
    BackendUnavailable {
        /// Backend error text
        message: String,
        /// Attempts fully recorded before the failure
        attempts_completed: u32,
        /// Those attempts
        history: Box<AttemptHistory>,
    },

    /// Sandbox could not run at all
    #[error("sandbox unavailable: {source}")]
    SandboxUnavailable {
        /// Infrastructure failure
        #[source]
        source: SandboxError,
        /// Attempts fully recorded before the failure
        history: Box<AttemptHistory>,
    },

    /// Policy configuration is unusable
    #[error("policy configuration error: {0}")]
    Policy(#[from] PolicyError),

    /// Orchestrator attempted an illegal state change
    #[error(transparent)]
    StateMachine(#[from] StateMachineError),

    /// Attempt history refused an entry
    #[error(transparent)]
    History(#[from] HistoryError),
}

impl ForgeError {
    /// Create backend unavailable error
    pub fn backend_unavailable(err: &BackendError, history: AttemptHistory) -> Self {
        Self::BackendUnavailable {
            message: err.to_string(),
            attempts_completed: history.len(),
            history: Box::new(history),
        }
    }

    /// Create sandbox unavailable error
    pub fn sandbox_unavailable(source: SandboxError, history: AttemptHistory) -> Self {
        Self::SandboxUnavailable {
            source,
            history: Box::new(history),
        }
    }

    /// Attempts recorded before a mid-run failure
    #[must_use]
    pub fn history(&self) -> Option<&AttemptHistory> {
        match self {
            Self::BackendUnavailable { history, .. } | Self::SandboxUnavailable { history, .. } => {
                Some(history)
            }
            _ => None,
        }
    }

    /// Whether the error aborted a request that had already started
    ///
    /// `InvalidRequest` and `Policy` are raised before the first backend call.
    #[inline]
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::InvalidRequest(_) | Self::Policy(_))
    }
}

/// Generative backend errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackendError {
    /// Backend could not be reached or answered with a failure status
    #[error("backend unavailable: {0}")]
    Unavailable(String),

    /// Backend answered with a body that carries no candidate text
    #[error("malformed backend response: {0}")]
    Malformed(String),
}

/// Illegal orchestrator transition
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum StateMachineError {
    /// Transition not in the allowed table
    #[error("illegal transition {from:?} -> {to:?}")]
    IllegalTransition {
        /// Current state
        from: RunState,
        /// Requested state
        to: RunState,
    },
}

/// Attempt history errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HistoryError {
    /// History already holds `max_attempts` entries
    #[error("attempt history is full ({max} attempts)")]
    Full {
        /// Bound
        max: u32,
    },

    /// Entry does not continue the 1-based sequence
    #[error("attempt {got} out of order, expected {expected}")]
    OutOfOrder {
        /// Index the history expected next
        expected: u32,
        /// Index of the rejected entry
        got: u32,
    },
}

/// History sink errors
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// File system failure
    #[error("failed to write {path}: {source}")]
    Io {
        /// Path being written
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// History could not be serialized
    #[error("failed to serialize history: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Target id cannot be used as a directory name
    #[error("target id `{0}` is not a safe path component")]
    UnsafeTarget(String),
}

impl SinkError {
    /// Create I/O error
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_unavailable_is_fatal() {
        let err = ForgeError::backend_unavailable(
            &BackendError::Unavailable("connection refused".into()),
            AttemptHistory::new(3),
        );
        assert!(err.is_fatal());
        assert!(err.to_string().contains("after 0 attempt(s)"));
        assert_eq!(err.history().map(AttemptHistory::max_attempts), Some(3));
        assert!(err.to_string().contains("connection refused"));
    }

    #[test]
    fn invalid_request_is_not_fatal() {
        let err = ForgeError::InvalidRequest("empty description".into());
        assert!(!err.is_fatal());
        assert!(err.history().is_none());
    }

    #[test]
    fn history_error_display() {
        let err = HistoryError::OutOfOrder {
            expected: 2,
            got: 4,
        };
        assert_eq!(err.to_string(), "attempt 4 out of order, expected 2");
    }
}
