//! Compliance validator
//!
//! Stages run in a fixed order and each one records its outcome. Only a
//! syntax failure stops the run early. The sandbox stage needs the
//! structural contract (stage C) to hold, so a candidate missing imports or
//! domain wiring still gets runtime feedback.

use crate::cancel::CancelToken;
use crate::error::ValidatorError;
use crate::report::{Finding, FindingCode, ReportBuilder, Stage, StageOutcome, ValidationReport};
use crate::rules::ValidatorRules;
use crate::sandbox::{Sandbox, SandboxOutcome, SandboxProbe};
use forge_policy::markers;
use forge_source::{NodeTree, PythonParser, SourceParser};
use std::sync::Arc;

/// Per-request context
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ValidationContext {
    /// Request target, for logging
    pub target_id: String,
    /// Credential environment variables the candidate may read
    pub credential_env: Vec<String>,
}

impl ValidationContext {
    /// Create context
    pub fn new(target_id: impl Into<String>) -> Self {
        Self {
            target_id: target_id.into(),
            credential_env: Vec::new(),
        }
    }

    /// Attach credential environment variable names
    #[inline]
    #[must_use]
    pub fn with_credential_env(mut self, names: impl IntoIterator<Item = String>) -> Self {
        self.credential_env = names.into_iter().collect();
        self
    }
}

/// Multi-stage validator
#[derive(Clone)]
pub struct ComplianceValidator {
    rules: Arc<ValidatorRules>,
    parser: Arc<dyn SourceParser>,
    sandbox: Option<Arc<dyn Sandbox>>,
}

impl std::fmt::Debug for ComplianceValidator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComplianceValidator")
            .field("rules", &self.rules)
            .field("language", &self.parser.language())
            .field("sandbox", &self.sandbox.is_some())
            .finish()
    }
}

impl ComplianceValidator {
    /// Static-only validator (Stage F reported as not run)
    #[must_use]
    pub fn new(rules: Arc<ValidatorRules>) -> Self {
        Self {
            rules,
            parser: Arc::new(PythonParser::new()),
            sandbox: None,
        }
    }

    /// Attach a sandbox; Stage F becomes mandatory
    #[inline]
    #[must_use]
    pub fn with_sandbox(mut self, sandbox: Arc<dyn Sandbox>) -> Self {
        self.sandbox = Some(sandbox);
        self
    }

    /// Use a different parser
    #[inline]
    #[must_use]
    pub fn with_parser(mut self, parser: Arc<dyn SourceParser>) -> Self {
        self.parser = parser;
        self
    }

    /// Requirements in use
    #[inline]
    #[must_use]
    pub fn rules(&self) -> &ValidatorRules {
        &self.rules
    }

    /// Validate one candidate
    ///
    /// # Errors
    /// - `ValidatorError::Cancelled` if `cancel` fires before or during the
    ///   sandbox run
    /// - `ValidatorError::SandboxUnavailable` if the sandbox cannot run at all
    pub async fn validate(
        &self,
        source: &str,
        context: &ValidationContext,
        cancel: &CancelToken,
    ) -> Result<ValidationReport, ValidatorError> {
        if cancel.is_cancelled() {
            return Err(ValidatorError::Cancelled);
        }

        let tree = match self.parser.parse(source) {
            Ok(tree) => tree,
            Err(err) => {
                tracing::debug!("{}: stage A failed: {}", context.target_id, err);
                return Ok(ValidationReport::syntax_failure(&err));
            }
        };

        let mut report = ReportBuilder::new();
        report.record(Stage::Syntax, StageOutcome::Passed);

        let imports = self.check_imports(&tree, &mut report);
        let structural = check_markers(
            &tree,
            &mut report,
            Stage::Structural,
            &self.rules.structural_markers,
            FindingCode::MissingMarker,
        );
        let domain = self.check_domain(&tree, &mut report);
        self.check_robustness(&tree, &mut report);

        let static_passed = imports && structural && domain;
        let sandbox_passed = match &self.sandbox {
            Some(sandbox) if structural => {
                self.run_sandbox(sandbox.as_ref(), source, context, cancel, &mut report)
                    .await?
            }
            Some(_) => false,
            None => true,
        };

        let passed = static_passed && sandbox_passed;
        tracing::debug!(
            "{}: validation {}",
            context.target_id,
            if passed { "passed" } else { "failed" }
        );
        Ok(report.finish(passed))
    }

    fn check_imports(&self, tree: &NodeTree, report: &mut ReportBuilder) -> bool {
        let mut passed = true;
        for marker in markers::missing(&self.rules.required_imports, tree) {
            passed = false;
            report.fail(
                Finding::new(
                    Stage::Imports,
                    FindingCode::MissingImport,
                    format!("missing required import `{}`", marker.description),
                )
                .with_subject(marker.id.clone()),
            );
        }

        for import in tree.imports() {
            if let Some(module) = self
                .rules
                .discouraged_imports
                .iter()
                .find(|m| **m == import.module || import.module.starts_with(&format!("{m}.")))
            {
                report.warn(
                    Finding::new(
                        Stage::Imports,
                        FindingCode::DiscouragedImport,
                        format!("import of `{}` is discouraged", import.module),
                    )
                    .with_subject(module.clone())
                    .at(import.location),
                );
            }
        }

        report.record(Stage::Imports, outcome(passed));
        passed
    }

    fn check_domain(&self, tree: &NodeTree, report: &mut ReportBuilder) -> bool {
        let mut passed = check_markers(
            tree,
            report,
            Stage::Domain,
            &self.rules.domain_markers,
            FindingCode::MissingDomainWiring,
        );

        for name in &self.rules.env_credentials {
            for assignment in tree.assignments_to(name) {
                let from_env = matches!(
                    assignment.value_callee.as_deref(),
                    Some("os.getenv" | "os.environ.get")
                );
                if !from_env {
                    passed = false;
                    report.fail(
                        Finding::new(
                            Stage::Domain,
                            FindingCode::CredentialsNotFromEnv,
                            format!("credential `{name}` must be loaded with os.getenv"),
                        )
                        .with_subject(name.clone())
                        .at(assignment.location),
                    );
                }
            }
        }

        report.record(Stage::Domain, outcome(passed));
        passed
    }

    fn check_robustness(&self, tree: &NodeTree, report: &mut ReportBuilder) {
        let mut clean = true;
        let mut warn = |finding: Finding| {
            clean = false;
            report.warn(finding);
        };

        if !tree.try_statements().any(|t| t.has_except) {
            warn(Finding::new(
                Stage::Robustness,
                FindingCode::NoErrorHandling,
                "no error handling detected; add try/except blocks",
            ));
        }

        for function in tree.functions().filter(|f| f.is_async && !f.has_failure_containment) {
            warn(
                Finding::new(
                    Stage::Robustness,
                    FindingCode::AsyncWithoutContainment,
                    format!("async function `{}` should include error handling", function.name),
                )
                .with_subject(function.name.clone())
                .at(function.location),
            );
        }

        let http = &self.rules.http_client_module;
        let uses_http = tree.imports().any(|i| i.module == *http);
        if uses_http && !tree.calls().any(|c| c.name() == "raise_for_status") {
            warn(
                Finding::new(
                    Stage::Robustness,
                    FindingCode::UncheckedHttp,
                    format!("`{http}` responses should be checked with raise_for_status()"),
                )
                .with_subject(http.clone()),
            );
        }

        report.record(Stage::Robustness, outcome(clean));
    }

    async fn run_sandbox(
        &self,
        sandbox: &dyn Sandbox,
        source: &str,
        context: &ValidationContext,
        cancel: &CancelToken,
        report: &mut ReportBuilder,
    ) -> Result<bool, ValidatorError> {
        let probe = SandboxProbe {
            listing_entrypoint: self.rules.listing_entrypoint.clone(),
            invocation_entrypoint: self.rules.invocation_entrypoint.clone(),
            bootstrap_capability: self.rules.bootstrap_capability.clone(),
            placeholder_env: context.credential_env.clone(),
        };

        let finding = match sandbox.exercise(source, &probe, cancel).await? {
            SandboxOutcome::Passed { capabilities } => {
                tracing::debug!(
                    "{}: sandbox listed {} capabilities",
                    context.target_id,
                    capabilities.len()
                );
                report.record(Stage::Sandbox, StageOutcome::Passed);
                return Ok(true);
            }
            SandboxOutcome::RuntimeError { message } => Finding::new(
                Stage::Sandbox,
                FindingCode::SandboxRuntimeError,
                format!("sandboxed run failed: {message}"),
            ),
            SandboxOutcome::Timeout { after } => Finding::new(
                Stage::Sandbox,
                FindingCode::SandboxTimeout,
                format!(
                    "sandboxed run exceeded the {}s timeout and was terminated",
                    after.as_secs_f64()
                ),
            ),
        };

        tracing::warn!("{}: {}", context.target_id, finding.message);
        report.fail(finding);
        report.record(Stage::Sandbox, StageOutcome::Failed);
        Ok(false)
    }
}

fn check_markers(
    tree: &NodeTree,
    report: &mut ReportBuilder,
    stage: Stage,
    required: &[forge_policy::RequiredMarker],
    code: FindingCode,
) -> bool {
    let mut passed = true;
    for marker in markers::missing(required, tree) {
        passed = false;
        report.fail(
            Finding::new(
                stage,
                code,
                format!("missing marker `{}`: {}", marker.id, marker.description),
            )
            .with_subject(marker.id.clone()),
        );
    }
    if stage == Stage::Structural {
        report.record(stage, outcome(passed));
    }
    passed
}

fn outcome(passed: bool) -> StageOutcome {
    if passed {
        StageOutcome::Passed
    } else {
        StageOutcome::Failed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn validator() -> ComplianceValidator {
        ComplianceValidator::new(Arc::new(ValidatorRules::default()))
    }

    async fn validate(source: &str) -> ValidationReport {
        validator()
            .validate(source, &ValidationContext::new("test"), &CancelToken::never())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn unparseable_stops_at_syntax() {
        let report = validate("def broken(:\n").await;
        assert!(!report.passed());
        assert_eq!(report.outcome(Stage::Syntax), StageOutcome::Failed);
        assert_eq!(report.outcome(Stage::Imports), StageOutcome::NotRun);
    }

    #[tokio::test]
    async fn empty_module_fails_each_static_stage() {
        let report = validate("x = 1\n").await;
        assert_eq!(report.outcome(Stage::Syntax), StageOutcome::Passed);
        assert_eq!(report.outcome(Stage::Imports), StageOutcome::Failed);
        assert_eq!(report.outcome(Stage::Structural), StageOutcome::Failed);
        assert_eq!(report.outcome(Stage::Domain), StageOutcome::Failed);
        assert_eq!(report.failures_in(Stage::Imports).count(), 3);
        assert_eq!(report.failures_in(Stage::Structural).count(), 11);
        assert_eq!(report.first_failed_stage(), Some(Stage::Imports));
    }

    #[tokio::test]
    async fn discouraged_import_is_only_a_warning() {
        let report = validate("import requests\n").await;
        let warning = report
            .warnings()
            .iter()
            .find(|w| w.code == FindingCode::DiscouragedImport)
            .unwrap();
        assert_eq!(warning.subject.as_deref(), Some("requests"));
        assert!(!report
            .failures()
            .iter()
            .any(|f| f.code == FindingCode::DiscouragedImport));
    }

    #[tokio::test]
    async fn literal_credential_fails_domain() {
        let report = validate("CLIENT_ID = 'abc'\n").await;
        assert!(report
            .failures_in(Stage::Domain)
            .any(|f| f.code == FindingCode::CredentialsNotFromEnv
                && f.subject.as_deref() == Some("CLIENT_ID")));
    }

    #[tokio::test]
    async fn httpx_without_status_check_warns() {
        let report = validate("import httpx\n").await;
        assert!(report
            .warnings()
            .iter()
            .any(|w| w.code == FindingCode::UncheckedHttp));
        assert_eq!(report.outcome(Stage::Robustness), StageOutcome::Failed);
    }

    #[tokio::test]
    async fn cancelled_before_start() {
        let (handle, token) = crate::cancel::cancel_pair();
        handle.cancel();
        let err = validator()
            .validate("x = 1\n", &ValidationContext::new("test"), &token)
            .await
            .unwrap_err();
        assert!(matches!(err, ValidatorError::Cancelled));
    }
}
