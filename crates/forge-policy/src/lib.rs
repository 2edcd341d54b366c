//! Forge Policy Engine
//!
//! Guardrails applied to every candidate before it is allowed anywhere near
//! execution-based validation.
//!
//! # Core Operations
//!
//! - **Check**: [`PolicyEngine::check_violations`] walks a parsed candidate
//!   and reports [`Violation`]s (forbidden imports and calls, secret-shaped
//!   literals, hardcoded credentials, missing markers, quality issues)
//! - **Sanitize**: [`PolicyEngine::sanitize_and_validate`] applies only
//!   whitelisted rewrites for warning-class findings and rejects the
//!   candidate if any error remains
//!
//! Errors are never auto-fixed.

#![warn(missing_docs)]
#![warn(unreachable_pub)]

pub mod engine;
pub mod error;
pub mod markers;
pub mod rules;
pub mod secrets;
pub mod violation;

pub use engine::{AppliedFix, FixKind, PolicyEngine, Sanitized};
pub use error::PolicyError;
pub use markers::{MarkerRule, RequiredMarker};
pub use rules::{CredentialRewrite, PolicyRuleSet};
pub use secrets::{SecretPattern, SecretScanner};
pub use violation::{has_errors, PolicyRule, Severity, Violation};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
