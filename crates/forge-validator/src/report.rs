//! Validation report
//!
//! Built once per attempt by the validator and read-only afterwards.

use forge_artifact::SourceLocation;
use forge_source::ParseError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Validator stage, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// A: candidate parses
    Syntax,
    /// B: required imports present
    Imports,
    /// C: structural contract
    Structural,
    /// D: domain contract
    Domain,
    /// E: robustness heuristics (never blocking)
    Robustness,
    /// F: sandboxed execution
    Sandbox,
}

impl Stage {
    /// All stages in execution order
    pub const ALL: [Stage; 6] = [
        Stage::Syntax,
        Stage::Imports,
        Stage::Structural,
        Stage::Domain,
        Stage::Robustness,
        Stage::Sandbox,
    ];

    /// Whether a failure here blocks acceptance
    #[must_use]
    pub const fn is_mandatory(self) -> bool {
        !matches!(self, Stage::Robustness)
    }

    /// Stable identifier
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::Syntax => "syntax",
            Self::Imports => "imports",
            Self::Structural => "structural",
            Self::Domain => "domain",
            Self::Robustness => "robustness",
            Self::Sandbox => "sandbox",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// Per-stage outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    /// Stage ran and found nothing blocking
    Passed,
    /// Stage ran and found problems
    Failed,
    /// Stage was skipped
    NotRun,
}

/// Finding code
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingCode {
    /// Candidate does not parse
    SyntaxError,
    /// Required import absent
    MissingImport,
    /// Import allowed but discouraged
    DiscouragedImport,
    /// Structural marker absent
    MissingMarker,
    /// Domain wiring absent
    MissingDomainWiring,
    /// Credential variable not loaded from the environment
    CredentialsNotFromEnv,
    /// No try/except anywhere
    NoErrorHandling,
    /// Async function without try/except
    AsyncWithoutContainment,
    /// `httpx` used without `raise_for_status`
    UncheckedHttp,
    /// Sandboxed run raised or returned a non-conforming response
    SandboxRuntimeError,
    /// Sandboxed run exceeded its wall-clock limit
    SandboxTimeout,
}

impl FindingCode {
    /// Stable identifier
    #[must_use]
    pub const fn id(self) -> &'static str {
        match self {
            Self::SyntaxError => "syntax_error",
            Self::MissingImport => "missing_import",
            Self::DiscouragedImport => "discouraged_import",
            Self::MissingMarker => "missing_marker",
            Self::MissingDomainWiring => "missing_domain_wiring",
            Self::CredentialsNotFromEnv => "credentials_not_from_env",
            Self::NoErrorHandling => "no_error_handling",
            Self::AsyncWithoutContainment => "async_without_containment",
            Self::UncheckedHttp => "unchecked_http",
            Self::SandboxRuntimeError => "sandbox_runtime_error",
            Self::SandboxTimeout => "sandbox_timeout",
        }
    }
}

impl fmt::Display for FindingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

/// One failure or warning
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Finding {
    /// Stage that produced it
    pub stage: Stage,
    /// What was found
    pub code: FindingCode,
    /// Marker id, import, variable or function concerned
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Human-readable message, passed verbatim into retry feedback
    pub message: String,
    /// Position in the candidate
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<SourceLocation>,
}

impl Finding {
    /// Create finding
    pub fn new(stage: Stage, code: FindingCode, message: impl Into<String>) -> Self {
        Self {
            stage,
            code,
            subject: None,
            message: message.into(),
            location: None,
        }
    }

    /// Attach subject
    #[inline]
    #[must_use]
    pub fn with_subject(mut self, subject: impl Into<String>) -> Self {
        self.subject = Some(subject.into());
        self
    }

    /// Attach location
    #[inline]
    #[must_use]
    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    /// Code plus subject, used for failure signatures
    #[must_use]
    pub fn id(&self) -> String {
        match &self.subject {
            Some(subject) => format!("{}:{}", self.code, subject),
            None => self.code.id().to_string(),
        }
    }
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.stage, self.message)
    }
}

/// Stage outcome entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageResult {
    /// Stage
    pub stage: Stage,
    /// Outcome
    pub outcome: StageOutcome,
}

/// Result of validating one candidate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    stages: Vec<StageResult>,
    failures: Vec<Finding>,
    warnings: Vec<Finding>,
    passed: bool,
}

impl ValidationReport {
    /// Report for a candidate that does not parse
    ///
    /// Syntax failed, every other stage not run.
    #[must_use]
    pub fn syntax_failure(err: &ParseError) -> Self {
        let mut finding = Finding::new(Stage::Syntax, FindingCode::SyntaxError, err.to_string());
        if let Some(location) = err.location() {
            finding = finding.at(location);
        }
        let mut builder = ReportBuilder::new();
        builder.record(Stage::Syntax, StageOutcome::Failed);
        builder.fail(finding);
        builder.finish(false)
    }

    /// Outcome of one stage
    #[must_use]
    pub fn outcome(&self, stage: Stage) -> StageOutcome {
        self.stages
            .iter()
            .find(|s| s.stage == stage)
            .map_or(StageOutcome::NotRun, |s| s.outcome)
    }

    /// All stage outcomes in execution order
    #[inline]
    #[must_use]
    pub fn stages(&self) -> &[StageResult] {
        &self.stages
    }

    /// Blocking findings in the order they were found
    #[inline]
    #[must_use]
    pub fn failures(&self) -> &[Finding] {
        &self.failures
    }

    /// Non-blocking findings in the order they were found
    #[inline]
    #[must_use]
    pub fn warnings(&self) -> &[Finding] {
        &self.warnings
    }

    /// Overall pass flag
    #[inline]
    #[must_use]
    pub fn passed(&self) -> bool {
        self.passed
    }

    /// Whether Stage A passed
    #[must_use]
    pub fn syntax_valid(&self) -> bool {
        self.outcome(Stage::Syntax) == StageOutcome::Passed
    }

    /// First mandatory stage that failed
    #[must_use]
    pub fn first_failed_stage(&self) -> Option<Stage> {
        Stage::ALL
            .into_iter()
            .filter(|s| s.is_mandatory())
            .find(|s| self.outcome(*s) == StageOutcome::Failed)
    }

    /// Failures produced by one stage
    pub fn failures_in(&self, stage: Stage) -> impl Iterator<Item = &Finding> {
        self.failures.iter().filter(move |f| f.stage == stage)
    }
}

/// Accumulates stage outcomes and findings
#[derive(Debug)]
pub(crate) struct ReportBuilder {
    stages: Vec<StageResult>,
    failures: Vec<Finding>,
    warnings: Vec<Finding>,
}

impl ReportBuilder {
    pub(crate) fn new() -> Self {
        Self {
            stages: Stage::ALL
                .into_iter()
                .map(|stage| StageResult {
                    stage,
                    outcome: StageOutcome::NotRun,
                })
                .collect(),
            failures: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub(crate) fn record(&mut self, stage: Stage, outcome: StageOutcome) {
        if let Some(entry) = self.stages.iter_mut().find(|s| s.stage == stage) {
            entry.outcome = outcome;
        }
    }

    pub(crate) fn fail(&mut self, finding: Finding) {
        self.failures.push(finding);
    }

    pub(crate) fn warn(&mut self, finding: Finding) {
        self.warnings.push(finding);
    }

    pub(crate) fn finish(self, passed: bool) -> ValidationReport {
        ValidationReport {
            stages: self.stages,
            failures: self.failures,
            warnings: self.warnings,
            passed,
        }
    }
}
