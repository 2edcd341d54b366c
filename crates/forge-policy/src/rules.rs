//! Policy rule set
//!
//! Loaded once at startup (defaults or the `[policy]` table of the config
//! file) and shared read-only as `Arc<PolicyRuleSet>`.

use crate::markers::RequiredMarker;
use crate::secrets::{default_patterns, SecretPattern};
use serde::{Deserialize, Serialize};

/// Whitelisted credential rewrite: `name = "<literal>"` → `name = os.getenv("env_var")`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRewrite {
    /// Variable name (matched case-insensitively)
    pub name: String,
    /// Environment variable to load from
    pub env_var: String,
}

impl CredentialRewrite {
    /// Create rewrite
    pub fn new(name: impl Into<String>, env_var: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            env_var: env_var.into(),
        }
    }
}

/// All guardrail configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PolicyRuleSet {
    /// Modules that may not be imported (exact dotted match)
    pub forbidden_imports: Vec<String>,
    /// Callees that may not be invoked (exact dotted match)
    pub forbidden_calls: Vec<String>,
    /// Markers every candidate must carry
    pub required_markers: Vec<RequiredMarker>,
    /// Secret heuristics applied to string literals
    pub secret_patterns: Vec<SecretPattern>,
    /// Literals shorter than this are never secrets
    pub secret_min_length: usize,
    /// Names that must never be bound to a string literal
    pub credential_names: Vec<String>,
    /// Rewrites applied by sanitization
    pub credential_rewrites: Vec<CredentialRewrite>,
    /// Longest allowed line, in characters
    pub max_line_length: usize,
    /// Warn on async functions without try/except
    pub require_async_containment: bool,
    /// Apply whitelisted rewrites during sanitization
    pub auto_fix: bool,
}

impl Default for PolicyRuleSet {
    fn default() -> Self {
        Self {
            forbidden_imports: to_strings(&[
                "subprocess",
                "os.system",
                "eval",
                "exec",
                "compile",
                "__import__",
                "open",
                "file",
                "input",
                "raw_input",
            ]),
            forbidden_calls: to_strings(&[
                "eval",
                "exec",
                "compile",
                "globals",
                "locals",
                "setattr",
                "delattr",
                "hasattr",
                "__import__",
                "os.system",
            ]),
            required_markers: vec![
                RequiredMarker::import_from("mcp_types_import", "mcp", "types"),
                RequiredMarker::import_from("mcp_server_import", "mcp.server", "Server"),
            ],
            secret_patterns: default_patterns(),
            secret_min_length: 10,
            credential_names: to_strings(&[
                "CLIENT_SECRET",
                "CLIENT_ID",
                "api_key",
                "password",
                "token",
            ]),
            credential_rewrites: vec![
                CredentialRewrite::new("CLIENT_SECRET", "OAUTH_CLIENT_SECRET"),
                CredentialRewrite::new("CLIENT_ID", "OAUTH_CLIENT_ID"),
                CredentialRewrite::new("api_key", "API_KEY"),
            ],
            max_line_length: 120,
            require_async_containment: true,
            auto_fix: true,
        }
    }
}

impl PolicyRuleSet {
    /// Whether `module` is denylisted
    #[must_use]
    pub fn is_forbidden_import(&self, module: &str) -> bool {
        self.forbidden_imports.iter().any(|m| m == module)
    }

    /// Whether `callee` is denylisted
    #[must_use]
    pub fn is_forbidden_call(&self, callee: &str) -> bool {
        self.forbidden_calls.iter().any(|c| c == callee)
    }

    /// Whether `name` is a credential variable
    #[must_use]
    pub fn is_credential_name(&self, name: &str) -> bool {
        self.credential_names
            .iter()
            .any(|c| c.eq_ignore_ascii_case(name))
    }

    /// Rewrite for `name`, if whitelisted
    #[must_use]
    pub fn rewrite_for(&self, name: &str) -> Option<&CredentialRewrite> {
        self.credential_rewrites
            .iter()
            .find(|r| r.name.eq_ignore_ascii_case(name))
    }

    /// Disable rewrites
    #[inline]
    #[must_use]
    pub fn without_auto_fix(mut self) -> Self {
        self.auto_fix = false;
        self
    }
}

fn to_strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_string()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_cover_known_denylist() {
        let rules = PolicyRuleSet::default();
        assert!(rules.is_forbidden_import("subprocess"));
        assert!(!rules.is_forbidden_import("os"));
        assert!(rules.is_forbidden_call("eval"));
        assert!(!rules.is_forbidden_call("re.compile"));
        assert_eq!(rules.max_line_length, 120);
    }

    #[test]
    fn credential_lookup_is_case_insensitive() {
        let rules = PolicyRuleSet::default();
        assert!(rules.is_credential_name("client_secret"));
        assert!(rules.is_credential_name("TOKEN"));
        assert_eq!(
            rules.rewrite_for("API_KEY").map(|r| r.env_var.as_str()),
            Some("API_KEY")
        );
        assert!(rules.rewrite_for("password").is_none());
    }

    #[test]
    fn empty_toml_yields_defaults() {
        let rules: PolicyRuleSet = toml::from_str("").unwrap();
        assert_eq!(rules, PolicyRuleSet::default());
    }

    #[test]
    fn toml_overrides_single_field() {
        let rules: PolicyRuleSet = toml::from_str(
            r#"
            max_line_length = 100
            auto_fix = false
            forbidden_imports = ["subprocess", "ctypes"]
            "#,
        )
        .unwrap();
        assert_eq!(rules.max_line_length, 100);
        assert!(!rules.auto_fix);
        assert!(rules.is_forbidden_import("ctypes"));
        assert_eq!(rules.secret_min_length, 10);
    }

    #[test]
    fn toml_markers_are_tagged_tables() {
        let rules: PolicyRuleSet = toml::from_str(
            r#"
            [[required_markers]]
            id = "main"
            description = "async def main"
            rule = { kind = "async_function", name = "main" }
            "#,
        )
        .unwrap();
        assert_eq!(rules.required_markers.len(), 1);
        assert_eq!(rules.required_markers[0].id, "main");
    }
}
