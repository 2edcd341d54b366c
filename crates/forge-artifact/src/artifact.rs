//! Candidate artifacts
//!
//! A [`CandidateArtifact`] is created exactly once per attempt and is
//! superseded by the next attempt, never mutated. Sanitization produces a new
//! candidate through [`CandidateArtifact::derive`] so the original backend
//! output stays available for diagnostics.

use crate::hash::ContentHash;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Identifier of one orchestrator run (ULID for sortability)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(pub Ulid);

impl RunId {
    /// Generate new run ID
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Which backend call produced a candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    /// Backend name as reported by the backend
    pub backend: String,
    /// 1-based sequence number of the backend call within the run
    pub call_sequence: u32,
    /// Request target the candidate was generated for
    pub target_id: String,
    /// Run that issued the call
    pub run_id: RunId,
    /// Whether the text was rewritten by policy auto-fixes
    pub sanitized: bool,
}

impl Provenance {
    /// Create provenance for a fresh backend call
    #[must_use]
    pub fn new(backend: impl Into<String>, call_sequence: u32, target_id: impl Into<String>) -> Self {
        Self {
            backend: backend.into(),
            call_sequence,
            target_id: target_id.into(),
            run_id: RunId::new(),
            sanitized: false,
        }
    }

    /// Attach to an existing run
    #[inline]
    #[must_use]
    pub fn with_run(mut self, run_id: RunId) -> Self {
        self.run_id = run_id;
        self
    }
}

/// One generated source-text attempt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateArtifact {
    source: String,
    attempt_index: u32,
    provenance: Provenance,
    hash: ContentHash,
    created_at: DateTime<Utc>,
}

impl CandidateArtifact {
    /// Create a candidate from raw backend output
    #[must_use]
    pub fn new(source: impl Into<String>, attempt_index: u32, provenance: Provenance) -> Self {
        let source = source.into();
        let hash = ContentHash::compute(source.as_bytes());
        Self {
            source,
            attempt_index,
            provenance,
            hash,
            created_at: Utc::now(),
        }
    }

    /// Create a successor candidate carrying rewritten source
    ///
    /// Attempt index and backend provenance are inherited; the successor is
    /// marked as sanitized. Returns a clone of `self` when the text is
    /// unchanged.
    #[must_use]
    pub fn derive(&self, source: impl Into<String>) -> Self {
        let source = source.into();
        if source == self.source {
            return self.clone();
        }
        let mut provenance = self.provenance.clone();
        provenance.sanitized = true;
        Self::new(source, self.attempt_index, provenance)
    }

    /// Raw source text
    #[inline]
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// 1-based attempt index
    #[inline]
    #[must_use]
    pub fn attempt_index(&self) -> u32 {
        self.attempt_index
    }

    /// Backend, call sequence, target and run that produced this candidate
    #[inline]
    #[must_use]
    pub fn provenance(&self) -> &Provenance {
        &self.provenance
    }

    /// Blake3 digest of the source text
    #[inline]
    #[must_use]
    pub fn hash(&self) -> &ContentHash {
        &self.hash
    }

    /// When the candidate was constructed (UTC); a derived successor gets
    /// its own timestamp
    #[inline]
    #[must_use]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// Consume the candidate, returning its source
    #[inline]
    #[must_use]
    pub fn into_source(self) -> String {
        self.source
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_id_generation() {
        assert_ne!(RunId::new(), RunId::new());
    }

    #[test]
    fn candidate_hash_tracks_source() {
        let a = CandidateArtifact::new("print(1)\n", 1, Provenance::new("stub", 1, "github"));
        let b = CandidateArtifact::new("print(1)\n", 2, Provenance::new("stub", 2, "github"));
        assert_eq!(a.hash(), b.hash());
        assert_eq!(a.attempt_index(), 1);
        assert_eq!(b.provenance().call_sequence, 2);
    }

    #[test]
    fn derive_marks_sanitized_and_keeps_attempt() {
        let original = CandidateArtifact::new("x = 1\n", 3, Provenance::new("stub", 3, "slack"));
        let derived = original.derive("import os\nx = 1\n");

        assert_eq!(derived.attempt_index(), 3);
        assert!(derived.provenance().sanitized);
        assert!(!original.provenance().sanitized);
        assert_ne!(derived.hash(), original.hash());
    }

    #[test]
    fn derive_with_identical_source_is_noop() {
        let original = CandidateArtifact::new("x = 1\n", 1, Provenance::new("stub", 1, "slack"));
        let derived = original.derive("x = 1\n");
        assert_eq!(derived, original);
    }

    #[test]
    fn candidate_serde_roundtrip_preserves_hash() {
        let candidate = CandidateArtifact::new("pass\n", 1, Provenance::new("stub", 1, "notion"));
        let json = serde_json::to_string(&candidate).unwrap();
        let decoded: CandidateArtifact = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded.hash(), candidate.hash());
        assert_eq!(decoded.source(), "pass\n");
    }

    #[test]
    fn serialized_candidate_carries_hex_hash() {
        let candidate = CandidateArtifact::new("pass\n", 1, Provenance::new("stub", 1, "notion"));
        let value = serde_json::to_value(&candidate).unwrap();
        assert_eq!(value["hash"], candidate.hash().to_string());
        assert_eq!(value["hash"].as_str().map(str::len), Some(64));
    }

    #[test]
    fn derived_candidate_gets_fresh_timestamp() {
        let original = CandidateArtifact::new("x = 1\n", 1, Provenance::new("stub", 1, "slack"));
        let derived = original.derive("import os\nx = 1\n");
        assert!(derived.created_at() >= original.created_at());
        assert_eq!(derived.provenance().run_id, original.provenance().run_id);
    }
}
