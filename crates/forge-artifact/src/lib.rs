//! Forge Artifact Model
//!
//! Immutable candidate artifacts produced by a generative backend, one per
//! attempt, plus the small value types every other Forge crate shares.
//!
//! # Core Concepts
//!
//! - [`CandidateArtifact`]: raw source text for one attempt, never mutated
//! - [`Provenance`]: which backend call produced the candidate
//! - [`ContentHash`]: 32-byte Blake3 digest of the source text
//! - [`SourceLocation`]: 1-based line/column inside a candidate
//!
//! # Example
//!
//! ```rust,ignore
//! use forge_artifact::{CandidateArtifact, Provenance};
//!
//! let provenance = Provenance::new("ollama", 1, "github");
//! let candidate = CandidateArtifact::new(source, 1, provenance);
//! println!("attempt {} -> {}", candidate.attempt_index(), candidate.hash().short());
//! ```

#![warn(unreachable_pub)]
#![allow(missing_docs)]

mod artifact;
mod hash;
mod location;

pub use artifact::{CandidateArtifact, Provenance, RunId};
pub use hash::{ContentHash, HashError};
pub use location::SourceLocation;

/// Version of this crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
