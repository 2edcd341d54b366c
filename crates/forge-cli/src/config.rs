//! `forge.toml` loading
//!
//! Every table is optional; a missing or empty file yields the defaults.

use anyhow::{Context, Result};
use forge_backend::BackendConfig;
use forge_core::{OrchestratorConfig, PlatformCatalog, PlatformProfile};
use forge_policy::PolicyRuleSet;
use forge_validator::{SandboxConfig, ValidatorRules};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// File looked up in the working directory when `--config` is absent
pub(crate) const DEFAULT_CONFIG_FILE: &str = "forge.toml";

/// `[sandbox]` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct SandboxSection {
    /// Attach the process sandbox (stage F)
    pub(crate) enabled: bool,
    #[serde(flatten)]
    pub(crate) process: SandboxConfig,
}

impl Default for SandboxSection {
    fn default() -> Self {
        Self {
            enabled: true,
            process: SandboxConfig::default(),
        }
    }
}

/// Whole configuration file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub(crate) struct ForgeConfig {
    pub(crate) orchestrator: OrchestratorConfig,
    pub(crate) policy: PolicyRuleSet,
    pub(crate) validator: ValidatorRules,
    pub(crate) sandbox: SandboxSection,
    pub(crate) backend: BackendConfig,
    /// `[platforms.<id>]` profiles added to or replacing the built-in ones
    pub(crate) platforms: BTreeMap<String, PlatformProfile>,
    /// Directory for `attempts.json` histories; none disables persistence
    pub(crate) history_dir: Option<PathBuf>,
}

impl ForgeConfig {
    /// Parse TOML text
    pub(crate) fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).context("invalid forge configuration")
    }

    /// Built-in platform profiles with the configured ones merged over them
    pub(crate) fn platform_catalog(&self) -> PlatformCatalog {
        PlatformCatalog::builtin().merged(self.platforms.clone().into())
    }

    /// Load an explicit path, or `forge.toml` if present, or the defaults
    pub(crate) fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let fallback = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !fallback.is_file() {
                    tracing::debug!("no {} found, using defaults", DEFAULT_CONFIG_FILE);
                    return Ok(Self::default());
                }
                fallback
            }
        };

        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config =
            Self::from_toml(&text).with_context(|| format!("in {}", path.display()))?;
        tracing::info!("Loaded configuration from {}", path.display());
        Ok(config)
    }
}
