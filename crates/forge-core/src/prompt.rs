//! Prompt context handed to the generative backend
//!
//! Carries the request, the platform profile if the target is known, and
//! every prior failure. [`PromptContext::render`] turns it into plain prompt
//! text; failure messages are copied verbatim so the backend sees exactly
//! what the validator said.

use crate::attempt::{AttemptFailure, AttemptRecord};
use crate::platform::PlatformProfile;
use crate::request::GenerationRequest;
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::Arc;

/// One failed attempt, as fed back to the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedbackEntry {
    /// 1-based attempt index
    pub attempt_index: u32,
    /// What went wrong
    pub failure: AttemptFailure,
}

impl FeedbackEntry {
    /// Feedback for a failed record; `None` if it was accepted
    #[must_use]
    pub fn from_record(record: &AttemptRecord) -> Option<Self> {
        record.failure().map(|failure| Self {
            attempt_index: record.attempt_index(),
            failure: failure.clone(),
        })
    }
}

/// Input of one backend call
#[derive(Debug, Clone, Serialize)]
pub struct PromptContext {
    /// Original request
    pub request: Arc<GenerationRequest>,
    /// Attempt this call is for (1-based)
    pub attempt_index: u32,
    /// Failures of all earlier attempts, oldest first
    pub feedback: Vec<FeedbackEntry>,
    /// Reference data for the target, if it is a known platform
    pub platform: Option<Arc<PlatformProfile>>,
}

const GUARDRAILS: &[&str] = &[
    "SECURITY: never hardcode or log credentials; read them with os.getenv",
    "ERROR HANDLING: wrap every API call and tool handler in try/except",
    "HTTP: call raise_for_status() on every httpx response",
    "AUTHENTICATION: expose an `authenticate` tool that starts the OAuth flow",
    "MCP COMPLIANCE: use mcp.server.Server, @server.list_tools(), @server.call_tool() and stdio_server",
    "FORBIDDEN: subprocess, eval, exec, compile, __import__, open, input, os.system",
];

impl PromptContext {
    /// Create context
    #[must_use]
    pub fn new(
        request: Arc<GenerationRequest>,
        attempt_index: u32,
        feedback: Vec<FeedbackEntry>,
    ) -> Self {
        Self {
            request,
            attempt_index,
            feedback,
            platform: None,
        }
    }

    /// Attach the target's platform profile
    #[inline]
    #[must_use]
    pub fn with_platform(mut self, platform: Option<Arc<PlatformProfile>>) -> Self {
        self.platform = platform;
        self
    }

    /// Whether this is a retry
    #[inline]
    #[must_use]
    pub fn is_retry(&self) -> bool {
        !self.feedback.is_empty()
    }

    /// Render prompt text
    ///
    /// Credential values are never included, only the variable names.
    #[must_use]
    pub fn render(&self) -> String {
        let req = &self.request;
        let mut out = String::new();

        let _ = writeln!(
            out,
            "You are an expert MCP (Model Context Protocol) server developer. \
             Generate a complete, production-ready Python MCP server for the {} platform.",
            req.target_id
        );
        let _ = writeln!(out, "\nREQUIREMENTS:");
        let _ = writeln!(out, "- Platform: {}", req.target_id);
        let _ = writeln!(out, "- Description: {}", req.description);
        let env: Vec<_> = req.credential_env().collect();
        if !env.is_empty() {
            let _ = writeln!(out, "- Credentials are provided in: {}", env.join(", "));
        }

        render_platform(&mut out, self.platform.as_deref());

        let _ = writeln!(out, "\nGUARDRAILS:");
        for (idx, rule) in GUARDRAILS.iter().enumerate() {
            let _ = writeln!(out, "{}. {rule}", idx + 1);
        }

        if !req.prior_version_summaries.is_empty() {
            let _ = writeln!(out, "\nPREVIOUS VERSIONS TO IMPROVE UPON:");
            for (idx, summary) in req.prior_version_summaries.iter().enumerate() {
                let _ = writeln!(out, "Version {}: {}", idx + 1, summary_text(summary));
            }
        }

        if self.is_retry() {
            let _ = writeln!(out, "\nPREVIOUS ATTEMPTS FAILED WITH THESE ISSUES:");
            for entry in &self.feedback {
                let failure = &entry.failure;
                let _ = writeln!(
                    out,
                    "Attempt {} ({}): {}",
                    entry.attempt_index,
                    failure.category,
                    failure.ids.join(", ")
                );
                for message in &failure.messages {
                    let _ = writeln!(out, "  - {message}");
                }
            }
            let _ = writeln!(out, "Fix every issue above in this attempt.");
        }

        let _ = writeln!(
            out,
            "\nOUTPUT: one complete Python file in a single ```python code block."
        );
        out
    }
}

fn render_platform(out: &mut String, platform: Option<&PlatformProfile>) {
    let _ = writeln!(out, "\nPLATFORM REFERENCE:");
    let Some(profile) = platform else {
        let _ = writeln!(
            out,
            "- Unknown platform: look up its API documentation, OAuth endpoints and rate limits"
        );
        return;
    };

    let _ = writeln!(out, "- Base URL: {}", profile.base_url);
    if !profile.oauth_url.is_empty() {
        let _ = writeln!(out, "- OAuth authorize URL: {}", profile.oauth_url);
    }
    if !profile.token_url.is_empty() {
        let _ = writeln!(out, "- OAuth token URL: {}", profile.token_url);
    }
    if !profile.scopes.is_empty() {
        let _ = writeln!(out, "- Scopes: {}", profile.scopes.join(" "));
    }
    if !profile.documentation.is_empty() {
        let _ = writeln!(out, "- Documentation: {}", profile.documentation);
    }
    if !profile.endpoints.is_empty() {
        let _ = writeln!(out, "- Endpoints:");
        for endpoint in &profile.endpoints {
            let _ = writeln!(
                out,
                "  - {} {}: {}",
                endpoint.method, endpoint.path, endpoint.description
            );
        }
        let _ = writeln!(
            out,
            "- Recommended tools: {}",
            profile.recommended_tools().join(", ")
        );
    }
    if !profile.rate_limits.is_empty() {
        let limits: Vec<String> = profile
            .rate_limits
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect();
        let _ = writeln!(out, "- Rate limits: {}", limits.join(", "));
    }
}

fn summary_text(summary: &serde_json::Value) -> String {
    match summary.get("feedback").and_then(serde_json::Value::as_str) {
        Some(feedback) => feedback.to_string(),
        None => summary.to_string(),
    }
}
