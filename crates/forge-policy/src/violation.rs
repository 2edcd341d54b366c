//! Policy violations

use forge_artifact::SourceLocation;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Violation severity
///
/// Ordered so that `Error > Warning > Info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational only
    Info,
    /// Recorded, may be auto-fixed, never blocks
    Warning,
    /// Blocks the candidate
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Info => "info",
            Self::Warning => "warning",
            Self::Error => "error",
        })
    }
}

/// Rule that produced a violation
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyRule {
    /// Denylisted module imported
    ForbiddenImport,
    /// Denylisted callee invoked
    ForbiddenCall,
    /// Attribute call sharing its last segment with a denylisted callee
    UnsafeAttributeCall,
    /// String literal shaped like a secret
    HardcodedSecret,
    /// Credential variable assigned a string literal
    HardcodedCredential,
    /// Required structural marker absent
    MissingRequiredMarker,
    /// Line over the length threshold
    LineLength,
    /// Async function with no try/except in its body
    MissingFailureContainment,
    /// Credentials referenced but not loaded from the environment
    CredentialHandling,
}

impl PolicyRule {
    /// Stable identifier used in reports and feedback
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::ForbiddenImport => "forbidden_import",
            Self::ForbiddenCall => "forbidden_call",
            Self::UnsafeAttributeCall => "unsafe_attribute_call",
            Self::HardcodedSecret => "hardcoded_secret",
            Self::HardcodedCredential => "hardcoded_credential",
            Self::MissingRequiredMarker => "missing_required_marker",
            Self::LineLength => "line_length",
            Self::MissingFailureContainment => "missing_failure_containment",
            Self::CredentialHandling => "credential_handling",
        }
    }
}

impl fmt::Display for PolicyRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// One finding of the policy engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Violation {
    /// Rule that fired
    pub rule: PolicyRule,
    /// Offending name or marker id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Severity
    pub severity: Severity,
    /// Human-readable message
    pub message: String,
    /// Position in the candidate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
    /// Suggested fix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Violation {
    /// Create violation without subject, location or suggestion
    pub fn new(rule: PolicyRule, severity: Severity, message: impl Into<String>) -> Self {
        Self {
            rule,
            subject: None,
            severity,
            message: message.into(),
            location: None,
            suggestion: None,
        }
    }

    /// Shorthand for an `error` violation
    pub fn error(rule: PolicyRule, message: impl Into<String>) -> Self {
        Self::new(rule, Severity::Error, message)
    }

    /// Shorthand for a `warning` violation
    pub fn warning(rule: PolicyRule, message: impl Into<String>) -> Self {
        Self::new(rule, Severity::Warning, message)
    }

    /// Attach subject
    #[inline]
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Attach location
    #[inline]
    #[must_use]
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Attach suggestion
    #[inline]
    #[must_use]
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Whether this violation blocks the candidate
    #[inline]
    #[must_use]
    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    /// Rule id plus subject, used for failure signatures
    #[must_use]
    pub fn id(&self) -> String {
        match &self.subject {
            Some(subject) => format!("{}:{}", self.rule, subject),
            None => self.rule.id().to_string(),
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.severity, self.rule)?;
        if let Some(location) = &self.location {
            write!(f, " at {location}")?;
        }
        write!(f, ": {}", self.message)
    }
}

/// Whether any violation in the list is an error
#[must_use]
pub fn has_errors(violations: &[Violation]) -> bool {
    violations.iter().any(Violation::is_error)
}
