//! Textual secret heuristics
//!
//! Language independent: operates on string literal values only, never on
//! the tree structure.

use crate::error::PolicyError;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Named secret heuristic as configured
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecretPattern {
    /// Heuristic name reported in messages
    pub id: String,
    /// Regular expression matched against the whole literal
    pub pattern: String,
}

impl SecretPattern {
    /// Create pattern
    pub fn new(id: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            pattern: pattern.into(),
        }
    }
}

/// Default heuristics: base64-like, hex digest, `sk_` key, all-caps token
#[must_use]
pub fn default_patterns() -> Vec<SecretPattern> {
    vec![
        SecretPattern::new("base64_like", r"^[A-Za-z0-9+/]{20,}={0,2}$"),
        SecretPattern::new("hex_digest", r"^[a-f0-9]{32,}$"),
        SecretPattern::new("prefixed_key", r"^sk_[a-z0-9]{20,}$"),
        SecretPattern::new("all_caps_token", r"^[A-Z0-9]{20,}$"),
    ]
}

/// Compiled heuristics
#[derive(Debug, Clone)]
pub struct SecretScanner {
    patterns: Vec<(String, Regex)>,
    min_length: usize,
}

impl SecretScanner {
    /// Compile configured patterns
    ///
    /// # Errors
    /// `PolicyError::InvalidPattern` naming the first pattern that fails to
    /// compile.
    pub fn new(patterns: &[SecretPattern], min_length: usize) -> Result<Self, PolicyError> {
        let patterns = patterns
            .iter()
            .map(|p| {
                Regex::new(&p.pattern)
                    .map(|re| (p.id.clone(), re))
                    .map_err(|e| PolicyError::invalid_pattern(&p.id, e))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            patterns,
            min_length,
        })
    }

    /// Name of the first heuristic the literal matches
    ///
    /// Literals shorter than the minimum length never match.
    #[must_use]
    pub fn matches(&self, literal: &str) -> Option<&str> {
        if literal.chars().count() < self.min_length {
            return None;
        }
        self.patterns
            .iter()
            .find(|(_, re)| re.is_match(literal))
            .map(|(id, _)| id.as_str())
    }
}
