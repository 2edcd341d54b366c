//! Error types for the policy engine

use crate::violation::Violation;
use forge_source::ParseError;

/// Policy engine errors
#[derive(Debug, Clone, thiserror::Error)]
pub enum PolicyError {
    /// Error-class violations remain after sanitization
    #[error("policy rejected candidate: {}", summarize(.violations))]
    Rejected {
        /// Full post-sanitization violation list
        violations: Vec<Violation>,
    },

    /// Candidate did not parse; reported as a syntax stage failure
    #[error("candidate is unparseable: {0}")]
    Unparseable(#[from] ParseError),

    /// Configured secret heuristic failed to compile
    #[error("invalid secret pattern `{id}`: {message}")]
    InvalidPattern {
        /// Pattern id
        id: String,
        /// Regex compiler message
        message: String,
    },
}

impl PolicyError {
    /// Create invalid pattern error
    pub fn invalid_pattern(id: &str, err: impl std::fmt::Display) -> Self {
        Self::InvalidPattern {
            id: id.to_string(),
            message: err.to_string(),
        }
    }

    /// Violations carried by a rejection
    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        match self {
            Self::Rejected { violations } => violations,
            _ => &[],
        }
    }
}

fn summarize(violations: &[Violation]) -> String {
    let errors: Vec<_> = violations
        .iter()
        .filter(|v| v.is_error())
        .map(Violation::id)
        .collect();
    format!("{} error(s): {}", errors.len(), errors.join(", "))
}
