//! Forge HTTP Backend
//!
//! [`HttpBackend`] talks to an Ollama-compatible `/api/generate` endpoint and
//! pulls the candidate module out of the reply's Markdown fences.

#![warn(unreachable_pub)]
#![warn(missing_docs)]

pub mod config;
pub mod extract;
pub mod http;

pub use config::{BackendConfig, ENDPOINT_ENV, MODEL_ENV};
pub use extract::{extract_code, fenced_blocks, FencedBlock};
pub use http::HttpBackend;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
