//! ComplianceValidator Stage Tests

use async_trait::async_trait;
use forge_validator::{
    cancel_pair, CancelToken, ComplianceValidator, FindingCode, Sandbox, SandboxError,
    SandboxOutcome, SandboxProbe, Stage, StageOutcome, ValidationContext, ValidatorError,
    ValidatorRules,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

const COMPLIANT: &str = include_str!("../../forge-test-utils/fixtures/compliant_server.py");

struct FixedSandbox {
    outcome: SandboxOutcome,
    runs: AtomicUsize,
}

impl FixedSandbox {
    fn new(outcome: SandboxOutcome) -> Arc<Self> {
        Arc::new(Self {
            outcome,
            runs: AtomicUsize::new(0),
        })
    }
}

#[async_trait]
impl Sandbox for FixedSandbox {
    async fn exercise(
        &self,
        _source: &str,
        _probe: &SandboxProbe,
        _cancel: &CancelToken,
    ) -> Result<SandboxOutcome, SandboxError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        Ok(self.outcome.clone())
    }
}

struct HangingSandbox;

#[async_trait]
impl Sandbox for HangingSandbox {
    async fn exercise(
        &self,
        _source: &str,
        _probe: &SandboxProbe,
        cancel: &CancelToken,
    ) -> Result<SandboxOutcome, SandboxError> {
        cancel.cancelled().await;
        Err(SandboxError::Cancelled)
    }
}

fn validator_with(sandbox: Arc<dyn Sandbox>) -> ComplianceValidator {
    ComplianceValidator::new(Arc::new(ValidatorRules::default())).with_sandbox(sandbox)
}

fn ctx() -> ValidationContext {
    ValidationContext::new("github")
}

fn passing() -> SandboxOutcome {
    SandboxOutcome::Passed {
        capabilities: vec!["authenticate".into(), "get_user_info".into()],
    }
}

#[tokio::test]
async fn test_compliant_fixture_passes_every_stage() {
    let sandbox = FixedSandbox::new(passing());
    let report = validator_with(sandbox.clone())
        .validate(COMPLIANT, &ctx(), &CancelToken::never())
        .await
        .unwrap();

    assert!(report.passed(), "failures: {:?}", report.failures());
    for stage in Stage::ALL {
        assert_eq!(report.outcome(stage), StageOutcome::Passed, "{stage}");
    }
    assert!(report.warnings().is_empty(), "{:?}", report.warnings());
    assert_eq!(sandbox.runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_missing_listing_entrypoint_is_named_marker() {
    let source = COMPLIANT.replace("async def list_tools(", "async def list_capabilities(");
    let sandbox = FixedSandbox::new(passing());
    let report = validator_with(sandbox.clone())
        .validate(&source, &ctx(), &CancelToken::never())
        .await
        .unwrap();

    assert!(!report.passed());
    let structural: Vec<_> = report.failures_in(Stage::Structural).collect();
    assert_eq!(structural.len(), 1);
    assert_eq!(structural[0].code, FindingCode::MissingMarker);
    assert_eq!(structural[0].subject.as_deref(), Some("list_tools_entrypoint"));
    assert!(structural[0].message.contains("list_tools_entrypoint"));

    // structural failure means the candidate is never executed
    assert_eq!(report.outcome(Stage::Sandbox), StageOutcome::NotRun);
    assert_eq!(sandbox.runs.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_sandbox_timeout_is_reported() {
    let sandbox = FixedSandbox::new(SandboxOutcome::Timeout {
        after: Duration::from_secs(30),
    });
    let report = validator_with(sandbox)
        .validate(COMPLIANT, &ctx(), &CancelToken::never())
        .await
        .unwrap();

    assert!(!report.passed());
    assert_eq!(report.first_failed_stage(), Some(Stage::Sandbox));
    assert_eq!(report.failures()[0].code, FindingCode::SandboxTimeout);
    assert!(report.failures()[0].message.contains("30s"));
}

#[tokio::test]
async fn test_sandbox_runtime_error_is_reported() {
    let sandbox = FixedSandbox::new(SandboxOutcome::RuntimeError {
        message: "load failed: ModuleNotFoundError: No module named 'mcp'".into(),
    });
    let report = validator_with(sandbox)
        .validate(COMPLIANT, &ctx(), &CancelToken::never())
        .await
        .unwrap();

    assert_eq!(report.failures()[0].code, FindingCode::SandboxRuntimeError);
    assert!(report.failures()[0].message.contains("ModuleNotFoundError"));
}

#[tokio::test]
async fn test_missing_authenticate_tool_fails_domain() {
    let source = COMPLIANT.replace("\"authenticate\"", "\"login\"");
    let report = ComplianceValidator::new(Arc::new(ValidatorRules::default()))
        .validate(&source, &ctx(), &CancelToken::never())
        .await
        .unwrap();

    let ids: Vec<_> = report.failures_in(Stage::Domain).map(|f| f.id()).collect();
    assert_eq!(ids, vec!["missing_domain_wiring:authenticate_capability"]);
}

#[tokio::test]
async fn test_sandbox_runs_when_only_domain_fails() {
    let source = COMPLIANT.replace("\"authenticate\"", "\"login\"");
    let sandbox = FixedSandbox::new(SandboxOutcome::RuntimeError {
        message: "bootstrap capability `authenticate` not listed".into(),
    });
    let report = validator_with(sandbox.clone())
        .validate(&source, &ctx(), &CancelToken::never())
        .await
        .unwrap();

    assert!(!report.passed());
    assert_eq!(report.outcome(Stage::Structural), StageOutcome::Passed);
    assert_eq!(report.outcome(Stage::Domain), StageOutcome::Failed);
    assert_eq!(report.outcome(Stage::Sandbox), StageOutcome::Failed);
    assert_eq!(report.first_failed_stage(), Some(Stage::Domain));
    assert_eq!(sandbox.runs.load(Ordering::SeqCst), 1);
    assert!(report
        .failures_in(Stage::Sandbox)
        .any(|f| f.code == FindingCode::SandboxRuntimeError));
}

#[tokio::test]
async fn test_missing_import_still_reaches_sandbox() {
    let source = COMPLIANT.replace("from mcp.server.stdio import stdio_server\n", "");
    let sandbox = FixedSandbox::new(passing());
    let report = validator_with(sandbox.clone())
        .validate(&source, &ctx(), &CancelToken::never())
        .await
        .unwrap();

    assert!(!report.passed());
    assert_eq!(report.outcome(Stage::Imports), StageOutcome::Failed);
    assert_eq!(report.outcome(Stage::Sandbox), StageOutcome::Passed);
    assert_eq!(sandbox.runs.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_warnings_never_block() {
    let source = COMPLIANT.replace("response.raise_for_status()", "pass");
    let report = ComplianceValidator::new(Arc::new(ValidatorRules::default()))
        .validate(&source, &ctx(), &CancelToken::never())
        .await
        .unwrap();

    assert!(report.passed());
    assert_eq!(report.outcome(Stage::Robustness), StageOutcome::Failed);
    assert_eq!(report.outcome(Stage::Sandbox), StageOutcome::NotRun);
    assert!(report
        .warnings()
        .iter()
        .any(|w| w.code == FindingCode::UncheckedHttp));
}

#[tokio::test]
async fn test_cancellation_during_sandbox() {
    let (handle, token) = cancel_pair();
    let validator = validator_with(Arc::new(HangingSandbox));

    let run = tokio::spawn(async move { validator.validate(COMPLIANT, &ctx(), &token).await });
    tokio::time::sleep(Duration::from_millis(20)).await;
    handle.cancel();

    let result = tokio::time::timeout(Duration::from_secs(2), run)
        .await
        .unwrap()
        .unwrap();
    assert!(matches!(result, Err(ValidatorError::Cancelled)));
}
