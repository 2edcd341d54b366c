//! Error types for validation and sandboxing

/// Sandbox infrastructure errors
///
/// Misbehaving candidates are not errors; they are reported through
/// `SandboxOutcome`.
#[derive(Debug, thiserror::Error)]
pub enum SandboxError {
    /// Request was cancelled while the candidate was running
    #[error("sandbox run cancelled")]
    Cancelled,

    /// Interpreter could not be started
    #[error("failed to spawn sandbox interpreter `{program}`: {source}")]
    Spawn {
        /// Program that failed
        program: String,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Scratch directory or pipe I/O failed
    #[error("sandbox I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Sandbox configuration is unusable
    #[error("invalid sandbox configuration: {0}")]
    Config(String),
}

impl SandboxError {
    /// Create spawn error
    pub fn spawn(program: impl Into<String>, source: std::io::Error) -> Self {
        Self::Spawn {
            program: program.into(),
            source,
        }
    }
}

/// Errors returned instead of a report
#[derive(Debug, thiserror::Error)]
pub enum ValidatorError {
    /// Request was cancelled mid-validation
    #[error("validation cancelled")]
    Cancelled,

    /// Sandbox could not run at all; no verdict about the candidate
    #[error("sandbox unavailable: {0}")]
    SandboxUnavailable(#[source] SandboxError),
}

impl From<SandboxError> for ValidatorError {
    fn from(err: SandboxError) -> Self {
        match err {
            SandboxError::Cancelled => Self::Cancelled,
            other => Self::SandboxUnavailable(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancellation_maps_to_cancelled() {
        assert!(matches!(
            ValidatorError::from(SandboxError::Cancelled),
            ValidatorError::Cancelled
        ));
        assert!(matches!(
            ValidatorError::from(SandboxError::Config("empty interpreter".into())),
            ValidatorError::SandboxUnavailable(_)
        ));
    }
}
