//! Generation results

use crate::attempt::AttemptHistory;
use forge_artifact::CandidateArtifact;
use serde::Serialize;

/// Why a run ended without acceptance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExhaustReason {
    /// Every attempt in the budget failed
    BudgetSpent,
    /// Two consecutive attempts failed the same way
    RepeatedFailure,
}

/// Terminal state of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "state")]
pub enum Terminal {
    /// A candidate passed every mandatory stage
    Accepted,
    /// No candidate passed
    Exhausted {
        /// Why the loop stopped
        reason: ExhaustReason,
    },
    /// Caller cancelled; the in-flight attempt was not recorded
    Cancelled,
}

/// Outcome of one request
#[derive(Debug, Clone, Serialize)]
pub struct GenerationResult {
    /// Whether a candidate was accepted
    pub success: bool,
    /// How the run ended
    pub terminal: Terminal,
    /// Accepted candidate, or the last one attempted
    pub artifact: Option<CandidateArtifact>,
    /// Recorded attempts
    pub attempts_used: u32,
    /// Every recorded attempt, in order
    pub history: AttemptHistory,
    /// Warnings on the final candidate
    pub outstanding_warnings: Vec<String>,
}

impl GenerationResult {
    pub(crate) fn new(terminal: Terminal, history: AttemptHistory) -> Self {
        let last = history.last();
        Self {
            success: terminal == Terminal::Accepted,
            terminal,
            artifact: last.map(|r| r.artifact().clone()),
            attempts_used: history.len(),
            outstanding_warnings: last.map(|r| r.warnings()).unwrap_or_default(),
            history,
        }
    }

    /// Accepted source, only on success
    #[must_use]
    pub fn accepted_source(&self) -> Option<&str> {
        if self.success {
            self.artifact.as_ref().map(CandidateArtifact::source)
        } else {
            None
        }
    }
}
