//! Backend configuration (`[backend]` table)

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Environment variable overriding [`BackendConfig::endpoint`]
pub const ENDPOINT_ENV: &str = "LLM_ENDPOINT";
/// Environment variable overriding [`BackendConfig::model`]
pub const MODEL_ENV: &str = "FORGE_MODEL";

/// HTTP backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL; `/api/generate` is appended
    pub endpoint: String,
    /// Model name sent with each request
    pub model: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
    /// Sampling temperature
    pub temperature: Option<f64>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "codellama".to_string(),
            timeout_secs: 120,
            temperature: Some(0.2),
        }
    }
}

impl BackendConfig {
    /// Apply `LLM_ENDPOINT` and `FORGE_MODEL` if set
    #[must_use]
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides(
            std::env::var(ENDPOINT_ENV).ok(),
            std::env::var(MODEL_ENV).ok(),
        )
    }

    /// Apply explicit overrides, ignoring blank values
    #[must_use]
    pub fn with_overrides(mut self, endpoint: Option<String>, model: Option<String>) -> Self {
        if let Some(endpoint) = endpoint.filter(|v| !v.trim().is_empty()) {
            self.endpoint = endpoint;
        }
        if let Some(model) = model.filter(|v| !v.trim().is_empty()) {
            self.model = model;
        }
        self
    }

    /// Request timeout
    #[inline]
    #[must_use]
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Full generate URL
    #[must_use]
    pub fn generate_url(&self) -> String {
        format!("{}/api/generate", self.endpoint.trim_end_matches('/'))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_table_is_default() {
        let config: BackendConfig = toml::from_str("").unwrap();
        assert_eq!(config, BackendConfig::default());
        assert_eq!(config.generate_url(), "http://localhost:11434/api/generate");
    }

    #[test]
    fn overrides_skip_blank_values() {
        let config = BackendConfig::default()
            .with_overrides(Some("http://gpu-box:11434/".into()), Some("  ".into()));
        assert_eq!(config.generate_url(), "http://gpu-box:11434/api/generate");
        assert_eq!(config.model, "codellama");
    }
}
