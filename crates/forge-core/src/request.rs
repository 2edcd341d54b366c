//! Generation requests

use crate::error::ForgeError;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Default attempt budget
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// Largest accepted attempt budget
pub const MAX_ATTEMPTS_LIMIT: u32 = 100;

const REDACTED: &str = "<redacted>";

/// Opaque credential value
///
/// Never printed or serialized. Candidates read credentials from the
/// environment variable named by the map key in
/// [`GenerationRequest::credential_refs`].
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialRef(String);

impl CredentialRef {
    /// Wrap a credential value
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// Raw value, for handing to deployment
    #[inline]
    #[must_use]
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for CredentialRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CredentialRef({REDACTED})")
    }
}

impl Serialize for CredentialRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(REDACTED)
    }
}

impl<'de> Deserialize<'de> for CredentialRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self)
    }
}

/// What to generate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    /// Target platform id (`github`, `slack`, ...), also the history directory
    pub target_id: String,
    /// Natural-language description of the server
    pub description: String,
    /// Credential env var name -> value
    #[serde(default)]
    pub credential_refs: BTreeMap<String, CredentialRef>,
    /// Summaries of earlier versions, oldest first
    #[serde(default)]
    pub prior_version_summaries: Vec<serde_json::Value>,
    /// Attempt budget
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_max_attempts() -> u32 {
    DEFAULT_MAX_ATTEMPTS
}

impl GenerationRequest {
    /// Create request with the default budget
    pub fn new(target_id: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            description: description.into(),
            credential_refs: BTreeMap::new(),
            prior_version_summaries: Vec::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Set attempt budget
    #[inline]
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Add a credential
    #[inline]
    #[must_use]
    pub fn with_credential(mut self, env_var: impl Into<String>, value: CredentialRef) -> Self {
        self.credential_refs.insert(env_var.into(), value);
        self
    }

    /// Add a prior version summary
    #[inline]
    #[must_use]
    pub fn with_prior_version(mut self, summary: serde_json::Value) -> Self {
        self.prior_version_summaries.push(summary);
        self
    }

    /// Environment variable names the candidate may read credentials from
    pub fn credential_env(&self) -> impl Iterator<Item = &str> {
        self.credential_refs.keys().map(String::as_str)
    }

    /// Check the request before any work starts
    ///
    /// # Errors
    /// `ForgeError::InvalidRequest` for an empty or path-unsafe target id, an
    /// empty description, a budget outside `1..=MAX_ATTEMPTS_LIMIT` or a
    /// malformed credential name.
    pub fn validate(&self) -> Result<(), ForgeError> {
        if !is_safe_target(&self.target_id) {
            return Err(ForgeError::InvalidRequest(format!(
                "target_id `{}` must be non-empty and use only [A-Za-z0-9_.-]",
                self.target_id
            )));
        }
        if self.description.trim().is_empty() {
            return Err(ForgeError::InvalidRequest("description is empty".into()));
        }
        if self.max_attempts == 0 || self.max_attempts > MAX_ATTEMPTS_LIMIT {
            return Err(ForgeError::InvalidRequest(format!(
                "max_attempts must be between 1 and {MAX_ATTEMPTS_LIMIT}, got {}",
                self.max_attempts
            )));
        }
        if let Some(bad) = self.credential_env().find(|name| !is_env_name(name)) {
            return Err(ForgeError::InvalidRequest(format!(
                "credential name `{bad}` is not a valid environment variable name"
            )));
        }
        Ok(())
    }
}

/// Whether `id` can be used as a single path component
pub(crate) fn is_safe_target(id: &str) -> bool {
    !id.is_empty()
        && !id.starts_with('.')
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'))
}

fn is_env_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> GenerationRequest {
        GenerationRequest::new("github", "GitHub repositories and issues")
            .with_credential("OAUTH_CLIENT_SECRET", CredentialRef::new("s3cr3t-value"))
    }

    #[test]
    fn credential_never_printed() {
        let req = request();
        let debug = format!("{req:?}");
        assert!(!debug.contains("s3cr3t-value"));
        assert!(debug.contains("<redacted>"));

        let json = serde_json::to_string(&req).unwrap();
        assert!(!json.contains("s3cr3t-value"));
        assert!(json.contains("OAUTH_CLIENT_SECRET"));
    }

    #[test]
    fn credential_deserializes_from_plain_value() {
        let req: GenerationRequest = serde_json::from_str(
            r#"{"target_id":"slack","description":"x","credential_refs":{"OAUTH_CLIENT_ID":"abc"}}"#,
        )
        .unwrap();
        assert_eq!(req.credential_refs["OAUTH_CLIENT_ID"].expose(), "abc");
        assert_eq!(req.max_attempts, DEFAULT_MAX_ATTEMPTS);
    }

    #[test]
    fn validate_accepts_well_formed_request() {
        assert!(request().validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_fields() {
        let cases = [
            GenerationRequest::new("", "x"),
            GenerationRequest::new("../etc", "x"),
            GenerationRequest::new("github", "   "),
            GenerationRequest::new("github", "x").with_max_attempts(0),
            GenerationRequest::new("github", "x").with_credential("1BAD", CredentialRef::new("v")),
        ];
        for req in cases {
            assert!(
                matches!(req.validate(), Err(ForgeError::InvalidRequest(_))),
                "{req:?}"
            );
        }
    }

    #[test]
    fn validate_bounds_attempt_budget() {
        let at_limit = GenerationRequest::new("github", "x").with_max_attempts(MAX_ATTEMPTS_LIMIT);
        assert!(at_limit.validate().is_ok());

        for budget in [MAX_ATTEMPTS_LIMIT + 1, u32::MAX] {
            let err = GenerationRequest::new("github", "x")
                .with_max_attempts(budget)
                .validate()
                .unwrap_err();
            assert!(matches!(err, ForgeError::InvalidRequest(_)), "{budget}");
        }
    }

    #[test]
    fn safe_target_rules() {
        assert!(is_safe_target("google-drive_v2"));
        assert!(!is_safe_target(".hidden"));
        assert!(!is_safe_target("a/b"));
    }
}
