//! Forge Core - generate, validate, refine
//!
//! The [`Orchestrator`] asks a [`GenerativeBackend`] for a candidate MCP
//! server, runs it through the policy engine and the compliance validator,
//! and feeds structured failures back into the next attempt until a
//! candidate is accepted or the attempt budget is spent.
//!
//! # Example
//!
//! ```rust,ignore
//! use forge_core::{GenerationRequest, Orchestrator};
//! use forge_validator::CancelToken;
//!
//! # async fn example(backend: std::sync::Arc<dyn forge_core::GenerativeBackend>) -> Result<(), forge_core::ForgeError> {
//! let orchestrator = Orchestrator::with_defaults(backend)?;
//! let request = GenerationRequest::new("github", "Repositories and issues");
//! let result = orchestrator.run(request, &CancelToken::never()).await?;
//!
//! println!("success={} after {} attempt(s)", result.success, result.attempts_used);
//! # Ok(())
//! # }
//! ```

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod attempt;
pub mod backend;
pub mod config;
pub mod error;
pub mod orchestrator;
pub mod platform;
pub mod prompt;
pub mod request;
pub mod result;
pub mod sink;
pub mod state_machine;

pub use attempt::{AttemptFailure, AttemptHistory, AttemptRecord, FailureCategory};
pub use backend::GenerativeBackend;
pub use config::OrchestratorConfig;
pub use error::{BackendError, ForgeError, HistoryError, SinkError, StateMachineError};
pub use orchestrator::Orchestrator;
pub use platform::{Endpoint, PlatformCatalog, PlatformProfile};
pub use prompt::{FeedbackEntry, PromptContext};
pub use request::{CredentialRef, GenerationRequest, DEFAULT_MAX_ATTEMPTS, MAX_ATTEMPTS_LIMIT};
pub use result::{ExhaustReason, GenerationResult, Terminal};
pub use sink::{HistorySink, JsonHistorySink};
pub use state_machine::{allowed_transitions, validate_transition, RunState};

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
