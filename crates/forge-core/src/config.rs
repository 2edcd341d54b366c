//! Orchestrator configuration (`[orchestrator]` table)

use crate::request::DEFAULT_MAX_ATTEMPTS;
use serde::{Deserialize, Serialize};

/// Orchestrator settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Budget for requests built from the command line
    pub max_attempts: u32,
    /// Stop after two consecutive attempts with the same failure signature
    pub stop_on_repeated_failure: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            stop_on_repeated_failure: false,
        }
    }
}

impl OrchestratorConfig {
    /// Create default config
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable early exit on repeated failures
    #[inline]
    #[must_use]
    pub fn with_stop_on_repeated_failure(mut self, enabled: bool) -> Self {
        self.stop_on_repeated_failure = enabled;
        self
    }
}
