//! Attempt records and the bounded, append-only attempt history

use crate::error::HistoryError;
use forge_artifact::CandidateArtifact;
use forge_policy::{AppliedFix, Violation};
use forge_validator::{FindingCode, Stage, ValidationReport};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Why an attempt was not accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// Candidate did not parse
    ParseError,
    /// Policy engine rejected the candidate
    PolicyViolation,
    /// Required imports missing
    ImportNonCompliance,
    /// Structural markers missing
    StructuralNonCompliance,
    /// Domain wiring missing
    DomainNonCompliance,
    /// Sandboxed run was killed at the time limit
    SandboxTimeout,
    /// Sandboxed run raised or returned a bad response
    SandboxRuntimeError,
}

impl FailureCategory {
    /// Stable identifier
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::ParseError => "parse_error",
            Self::PolicyViolation => "policy_violation",
            Self::ImportNonCompliance => "import_non_compliance",
            Self::StructuralNonCompliance => "structural_non_compliance",
            Self::DomainNonCompliance => "domain_non_compliance",
            Self::SandboxTimeout => "sandbox_timeout",
            Self::SandboxRuntimeError => "sandbox_runtime_error",
        }
    }

    /// Category for a failed report, from its first failing mandatory stage
    #[must_use]
    pub fn from_report(report: &ValidationReport) -> Option<Self> {
        if report.passed() {
            return None;
        }
        let stage = report
            .first_failed_stage()
            .or_else(|| report.failures().first().map(|f| f.stage))?;
        Some(match stage {
            Stage::Syntax => Self::ParseError,
            Stage::Imports => Self::ImportNonCompliance,
            Stage::Structural | Stage::Robustness => Self::StructuralNonCompliance,
            Stage::Domain => Self::DomainNonCompliance,
            Stage::Sandbox => {
                let timed_out = report
                    .failures_in(Stage::Sandbox)
                    .any(|f| f.code == FindingCode::SandboxTimeout);
                if timed_out {
                    Self::SandboxTimeout
                } else {
                    Self::SandboxRuntimeError
                }
            }
        })
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Failure summary fed back into the next prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptFailure {
    /// Category
    pub category: FailureCategory,
    /// Failed rule or finding ids (`forbidden_import:subprocess`)
    pub ids: Vec<String>,
    /// Messages, verbatim, in the same order as `ids`
    pub messages: Vec<String>,
}

impl AttemptFailure {
    /// Summarize a policy rejection (error-class violations only)
    #[must_use]
    pub fn from_violations(violations: &[Violation]) -> Self {
        let errors: Vec<_> = violations.iter().filter(|v| v.is_error()).collect();
        Self {
            category: FailureCategory::PolicyViolation,
            ids: errors.iter().map(|v| v.id()).collect(),
            messages: errors.iter().map(|v| v.message.clone()).collect(),
        }
    }

    /// Summarize a failed report; `None` if it passed
    #[must_use]
    pub fn from_report(report: &ValidationReport) -> Option<Self> {
        let category = FailureCategory::from_report(report)?;
        Some(Self {
            category,
            ids: report.failures().iter().map(|f| f.id()).collect(),
            messages: report.failures().iter().map(|f| f.message.clone()).collect(),
        })
    }

    /// Category plus sorted ids, for repeated-failure detection
    #[must_use]
    pub fn signature(&self) -> (FailureCategory, Vec<String>) {
        let mut ids = self.ids.clone();
        ids.sort();
        (self.category, ids)
    }
}

/// Everything that happened to one candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    attempt_index: u32,
    artifact: CandidateArtifact,
    violations: Vec<Violation>,
    applied_fixes: Vec<AppliedFix>,
    report: Option<ValidationReport>,
    failure: Option<AttemptFailure>,
}

impl AttemptRecord {
    /// Start a record for `artifact`
    #[must_use]
    pub fn new(artifact: CandidateArtifact) -> Self {
        Self {
            attempt_index: artifact.attempt_index(),
            artifact,
            violations: Vec::new(),
            applied_fixes: Vec::new(),
            report: None,
            failure: None,
        }
    }

    /// Attach policy findings
    #[inline]
    #[must_use]
    pub fn with_violations(mut self, violations: Vec<Violation>) -> Self {
        self.violations = violations;
        self
    }

    /// Attach applied rewrites
    #[inline]
    #[must_use]
    pub fn with_fixes(mut self, fixes: Vec<AppliedFix>) -> Self {
        self.applied_fixes = fixes;
        self
    }

    /// Attach the validation report
    #[inline]
    #[must_use]
    pub fn with_report(mut self, report: ValidationReport) -> Self {
        self.report = Some(report);
        self
    }

    /// Mark the attempt as failed
    #[inline]
    #[must_use]
    pub fn failed(mut self, failure: AttemptFailure) -> Self {
        self.failure = Some(failure);
        self
    }

    /// 1-based attempt index
    #[inline]
    #[must_use]
    pub fn attempt_index(&self) -> u32 {
        self.attempt_index
    }

    /// Candidate as validated (after policy rewrites)
    #[inline]
    #[must_use]
    pub fn artifact(&self) -> &CandidateArtifact {
        &self.artifact
    }

    /// Policy findings
    #[inline]
    #[must_use]
    pub fn violations(&self) -> &[Violation] {
        &self.violations
    }

    /// Rewrites applied by the policy engine
    #[inline]
    #[must_use]
    pub fn applied_fixes(&self) -> &[AppliedFix] {
        &self.applied_fixes
    }

    /// Validation report; `None` when policy rejected the candidate first
    #[inline]
    #[must_use]
    pub fn report(&self) -> Option<&ValidationReport> {
        self.report.as_ref()
    }

    /// Failure summary; `None` for the accepted attempt
    #[inline]
    #[must_use]
    pub fn failure(&self) -> Option<&AttemptFailure> {
        self.failure.as_ref()
    }

    /// Whether this attempt was accepted
    #[inline]
    #[must_use]
    pub fn accepted(&self) -> bool {
        self.failure.is_none() && self.report.as_ref().is_some_and(ValidationReport::passed)
    }

    /// Non-blocking findings, policy first, then validator
    #[must_use]
    pub fn warnings(&self) -> Vec<String> {
        let policy = self
            .violations
            .iter()
            .filter(|v| !v.is_error())
            .map(ToString::to_string);
        let validator = self
            .report
            .iter()
            .flat_map(|r| r.warnings())
            .map(ToString::to_string);
        policy.chain(validator).collect()
    }
}

/// Ordered attempt records, bounded by the request's budget
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttemptHistory {
    max_attempts: u32,
    entries: Vec<AttemptRecord>,
}

impl AttemptHistory {
    /// Create empty history
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            entries: Vec::new(),
        }
    }

    /// Append the next record
    ///
    /// # Errors
    /// - `HistoryError::Full` once `max_attempts` records are held
    /// - `HistoryError::OutOfOrder` if the record's index is not `len + 1`
    pub fn push(&mut self, record: AttemptRecord) -> Result<(), HistoryError> {
        if self.len() >= self.max_attempts {
            return Err(HistoryError::Full {
                max: self.max_attempts,
            });
        }
        let expected = self.len() + 1;
        if record.attempt_index() != expected {
            return Err(HistoryError::OutOfOrder {
                expected,
                got: record.attempt_index(),
            });
        }
        self.entries.push(record);
        Ok(())
    }

    /// Number of recorded attempts
    #[inline]
    #[must_use]
    pub fn len(&self) -> u32 {
        u32::try_from(self.entries.len()).unwrap_or(u32::MAX)
    }

    /// Whether nothing was recorded
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether the budget is spent
    #[inline]
    #[must_use]
    pub fn is_full(&self) -> bool {
        self.len() >= self.max_attempts
    }

    /// Budget
    #[inline]
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Records in attempt order
    #[inline]
    #[must_use]
    pub fn entries(&self) -> &[AttemptRecord] {
        &self.entries
    }

    /// Most recent record
    #[inline]
    #[must_use]
    pub fn last(&self) -> Option<&AttemptRecord> {
        self.entries.last()
    }

    /// Record by 1-based index
    #[must_use]
    pub fn get(&self, attempt_index: u32) -> Option<&AttemptRecord> {
        let idx = usize::try_from(attempt_index.checked_sub(1)?).ok()?;
        self.entries.get(idx)
    }

    /// Iterate records
    pub fn iter(&self) -> std::slice::Iter<'_, AttemptRecord> {
        self.entries.iter()
    }
}

impl<'a> IntoIterator for &'a AttemptHistory {
    type Item = &'a AttemptRecord;
    type IntoIter = std::slice::Iter<'a, AttemptRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
