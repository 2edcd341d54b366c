//! Sandboxed execution seam
//!
//! The validator never loads a candidate into its own process. A [`Sandbox`]
//! runs it elsewhere and reports back through a narrow JSON boundary.

use crate::cancel::CancelToken;
use crate::error::SandboxError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What to exercise in a candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxProbe {
    /// Capability-listing entrypoint (`list_tools`)
    pub listing_entrypoint: String,
    /// Capability-invocation entrypoint (`call_tool`)
    pub invocation_entrypoint: String,
    /// Capability invoked with empty arguments (`authenticate`)
    pub bootstrap_capability: String,
    /// Extra environment variables set to placeholder values
    pub placeholder_env: Vec<String>,
}

/// Verdict of one sandboxed run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SandboxOutcome {
    /// Listing and bootstrap invocation conformed
    Passed {
        /// Capability names returned by the listing entrypoint
        capabilities: Vec<String>,
    },
    /// Candidate raised or returned a non-conforming response
    RuntimeError {
        /// What went wrong
        message: String,
    },
    /// Candidate was killed after exceeding the wall-clock limit
    Timeout {
        /// Limit that was exceeded
        after: Duration,
    },
}

/// Out-of-process executor for untrusted candidates
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Run the probe against `source`
    ///
    /// Must return within the sandbox's timeout (plus teardown), and promptly
    /// with `SandboxError::Cancelled` once `cancel` fires.
    ///
    /// # Errors
    /// `SandboxError` only for infrastructure problems or cancellation.
    async fn exercise(
        &self,
        source: &str,
        probe: &SandboxProbe,
        cancel: &CancelToken,
    ) -> Result<SandboxOutcome, SandboxError>;
}

/// One capability as described by the harness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessTool {
    /// Capability name
    #[serde(default)]
    pub name: Option<String>,
    /// Declared input schema
    #[serde(default, rename = "inputSchema")]
    pub input_schema: Option<serde_json::Value>,
}

/// JSON line printed by the harness
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HarnessReport {
    /// Whether every phase completed without raising
    pub ok: bool,
    /// Phase that raised (`load`, the listing or the invocation entrypoint)
    #[serde(default)]
    pub phase: Option<String>,
    /// Exception text
    #[serde(default)]
    pub error: Option<String>,
    /// Listing result
    #[serde(default)]
    pub tools: Vec<HarnessTool>,
    /// Number of items in the bootstrap response
    #[serde(default)]
    pub response_items: usize,
}

impl HarnessReport {
    /// Judge the report against the probe
    #[must_use]
    pub fn evaluate(&self, probe: &SandboxProbe) -> SandboxOutcome {
        if !self.ok {
            let phase = self.phase.as_deref().unwrap_or("run");
            let error = self.error.as_deref().unwrap_or("unknown error");
            return runtime_error(format!("{phase} failed: {error}"));
        }

        if self.tools.is_empty() {
            return runtime_error(format!(
                "{}() returned no capabilities",
                probe.listing_entrypoint
            ));
        }

        let mut capabilities = Vec::with_capacity(self.tools.len());
        for (idx, tool) in self.tools.iter().enumerate() {
            let Some(name) = tool.name.as_deref().filter(|n| !n.is_empty()) else {
                return runtime_error(format!("capability #{idx} has no name"));
            };
            if let Err(problem) = check_input_schema(tool.input_schema.as_ref()) {
                return runtime_error(format!("capability `{name}` {problem}"));
            }
            capabilities.push(name.to_string());
        }

        if !capabilities.iter().any(|c| c == &probe.bootstrap_capability) {
            return runtime_error(format!(
                "{}() does not list the required `{}` capability",
                probe.listing_entrypoint, probe.bootstrap_capability
            ));
        }

        if self.response_items == 0 {
            return runtime_error(format!(
                "{}('{}', {{}}) returned an empty or non-list response",
                probe.invocation_entrypoint, probe.bootstrap_capability
            ));
        }

        SandboxOutcome::Passed { capabilities }
    }
}

fn runtime_error(message: String) -> SandboxOutcome {
    SandboxOutcome::RuntimeError { message }
}

fn check_input_schema(schema: Option<&serde_json::Value>) -> Result<(), String> {
    let Some(schema) = schema else {
        return Err("has no input schema".to_string());
    };
    if schema.get("type").and_then(serde_json::Value::as_str) != Some("object") {
        return Err("input schema is not of type object".to_string());
    }
    jsonschema::JSONSchema::compile(schema)
        .map(|_| ())
        .map_err(|e| format!("input schema is invalid: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn probe() -> SandboxProbe {
        SandboxProbe {
            listing_entrypoint: "list_tools".into(),
            invocation_entrypoint: "call_tool".into(),
            bootstrap_capability: "authenticate".into(),
            placeholder_env: Vec::new(),
        }
    }

    fn report(value: serde_json::Value) -> HarnessReport {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn conforming_report_passes() {
        let r = report(json!({
            "ok": true,
            "tools": [
                {"name": "authenticate", "inputSchema": {"type": "object", "properties": {}}},
                {"name": "list_repos", "inputSchema": {"type": "object"}}
            ],
            "response_items": 1
        }));
        assert_eq!(
            r.evaluate(&probe()),
            SandboxOutcome::Passed {
                capabilities: vec!["authenticate".into(), "list_repos".into()]
            }
        );
    }

    #[test]
    fn raised_phase_is_runtime_error() {
        let r = report(json!({"ok": false, "phase": "list_tools", "error": "KeyError: 'x'"}));
        assert_eq!(
            r.evaluate(&probe()),
            SandboxOutcome::RuntimeError {
                message: "list_tools failed: KeyError: 'x'".into()
            }
        );
    }

    #[test]
    fn missing_bootstrap_capability_fails() {
        let r = report(json!({
            "ok": true,
            "tools": [{"name": "ping", "inputSchema": {"type": "object"}}],
            "response_items": 1
        }));
        let SandboxOutcome::RuntimeError { message } = r.evaluate(&probe()) else {
            panic!("expected runtime error");
        };
        assert!(message.contains("`authenticate`"));
    }

    #[test]
    fn non_object_schema_fails() {
        let r = report(json!({
            "ok": true,
            "tools": [{"name": "authenticate", "inputSchema": {"type": "string"}}],
            "response_items": 1
        }));
        assert!(matches!(
            r.evaluate(&probe()),
            SandboxOutcome::RuntimeError { .. }
        ));
    }

    #[test]
    fn empty_bootstrap_response_fails() {
        let r = report(json!({
            "ok": true,
            "tools": [{"name": "authenticate", "inputSchema": {"type": "object"}}],
            "response_items": 0
        }));
        assert!(matches!(
            r.evaluate(&probe()),
            SandboxOutcome::RuntimeError { .. }
        ));
    }
}
