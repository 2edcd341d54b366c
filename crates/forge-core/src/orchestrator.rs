//! Generate, police, validate, refine
//!
//! # Workflow
//! 1. Ask the backend for a candidate, with feedback from every failed attempt
//! 2. Run the policy engine; rejected or unparseable candidates fail here
//! 3. Run the compliance validator on the sanitized candidate
//! 4. Accept, retry with feedback, or stop when the budget is spent
//!
//! Both awaits (backend call and sandboxed validation) race the caller's
//! cancellation token. A cancelled attempt is never recorded.

use crate::attempt::{AttemptFailure, AttemptHistory, AttemptRecord};
use crate::backend::GenerativeBackend;
use crate::config::OrchestratorConfig;
use crate::error::{BackendError, ForgeError, HistoryError, StateMachineError};
use crate::platform::{PlatformCatalog, PlatformProfile};
use crate::prompt::{FeedbackEntry, PromptContext};
use crate::request::GenerationRequest;
use crate::result::{ExhaustReason, GenerationResult, Terminal};
use crate::sink::HistorySink;
use crate::state_machine::{validate_transition, RunState};
use forge_artifact::{CandidateArtifact, Provenance, RunId};
use forge_policy::{AppliedFix, PolicyEngine, PolicyError, PolicyRuleSet, Violation};
use forge_validator::{
    CancelToken, ComplianceValidator, SandboxError, ValidationContext, ValidationReport,
    ValidatorError, ValidatorRules,
};
use std::sync::Arc;

/// Drives one request at a time; cheap to share behind an `Arc`
pub struct Orchestrator {
    backend: Arc<dyn GenerativeBackend>,
    policy: PolicyEngine,
    validator: ComplianceValidator,
    config: OrchestratorConfig,
    platforms: PlatformCatalog,
    sink: Option<Arc<dyn HistorySink>>,
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("backend", &self.backend.name())
            .field("policy", &self.policy)
            .field("validator", &self.validator)
            .field("config", &self.config)
            .field("platforms", &self.platforms.len())
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl Orchestrator {
    /// Create orchestrator
    #[must_use]
    pub fn new(
        backend: Arc<dyn GenerativeBackend>,
        policy: PolicyEngine,
        validator: ComplianceValidator,
    ) -> Self {
        Self {
            backend,
            policy,
            validator,
            config: OrchestratorConfig::default(),
            platforms: PlatformCatalog::builtin(),
            sink: None,
        }
    }

    /// Default rule sets and a static-only validator
    ///
    /// # Errors
    /// `ForgeError::Policy` if the default secret patterns fail to compile.
    pub fn with_defaults(backend: Arc<dyn GenerativeBackend>) -> Result<Self, ForgeError> {
        let policy = PolicyEngine::new(Arc::new(PolicyRuleSet::default()))?;
        let validator = ComplianceValidator::new(Arc::new(ValidatorRules::default()));
        Ok(Self::new(backend, policy, validator))
    }

    /// Set configuration
    #[inline]
    #[must_use]
    pub fn with_config(mut self, config: OrchestratorConfig) -> Self {
        self.config = config;
        self
    }

    /// Replace the platform profiles used to enrich prompts
    #[inline]
    #[must_use]
    pub fn with_platforms(mut self, platforms: PlatformCatalog) -> Self {
        self.platforms = platforms;
        self
    }

    /// Offer every terminated run's history to `sink`
    #[inline]
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn HistorySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Get configuration
    #[inline]
    #[must_use]
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// Run the attempt loop for `request`
    ///
    /// # Errors
    /// - `ForgeError::InvalidRequest` before any work starts
    /// - `ForgeError::BackendUnavailable` as soon as the backend fails; the
    ///   failed call does not consume an attempt
    /// - `ForgeError::SandboxUnavailable` if the sandbox cannot run at all
    ///
    /// Both mid-run errors carry the attempts recorded so far, and those
    /// attempts are offered to the sink before the error is returned.
    pub async fn run(
        &self,
        request: GenerationRequest,
        cancel: &CancelToken,
    ) -> Result<GenerationResult, ForgeError> {
        request.validate()?;
        let platform = self.platforms.lookup(&request.target_id).cloned();
        if platform.is_none() {
            tracing::debug!("{}: no platform profile", request.target_id);
        }
        let mut run = Run::new(Arc::new(request), platform);
        tracing::info!(
            "Generating {} server: budget {} attempt(s)",
            run.request.target_id,
            run.request.max_attempts
        );

        let terminal = match self.drive(&mut run, cancel).await {
            Ok(terminal) => terminal,
            Err(halt) => {
                self.offer(&run.request.target_id, &run.history).await;
                return Err(halt.into_error(run.history));
            }
        };
        let result = GenerationResult::new(terminal, run.history);

        match result.terminal {
            Terminal::Accepted => tracing::info!(
                "{}: accepted after {} attempt(s)",
                run.request.target_id,
                result.attempts_used
            ),
            Terminal::Exhausted { reason } => tracing::warn!(
                "{}: exhausted after {} attempt(s) ({:?})",
                run.request.target_id,
                result.attempts_used,
                reason
            ),
            Terminal::Cancelled => tracing::info!(
                "{}: cancelled after {} attempt(s)",
                run.request.target_id,
                result.attempts_used
            ),
        }

        self.offer(&run.request.target_id, &result.history).await;
        Ok(result)
    }

    async fn drive(&self, run: &mut Run, cancel: &CancelToken) -> Result<Terminal, Halt> {
        loop {
            if cancel.is_cancelled() {
                return run.cancel();
            }
            run.transition(RunState::Generating)?;

            let attempt_index = run.history.len() + 1;
            tracing::info!(
                "{}: attempt {}/{}",
                run.request.target_id,
                attempt_index,
                run.request.max_attempts
            );
            let prompt =
                PromptContext::new(Arc::clone(&run.request), attempt_index, run.feedback.clone())
                    .with_platform(run.platform.clone());

            let text = tokio::select! {
                biased;
                () = cancel.cancelled() => return run.cancel(),
                text = self.backend.generate(&prompt) => text,
            };
            let text = text.map_err(|err| {
                tracing::error!("{}: backend failed: {}", run.request.target_id, err);
                Halt::Backend(err)
            })?;

            run.calls += 1;
            let provenance = Provenance::new(self.backend.name(), run.calls, &run.request.target_id)
                .with_run(run.run_id);
            let artifact = CandidateArtifact::new(text, attempt_index, provenance);

            run.transition(RunState::PolicyChecking)?;
            let record = match self.police(artifact)? {
                Policed::Failed(record) => record,
                Policed::Clean {
                    artifact,
                    violations,
                    fixes,
                } => {
                    run.transition(RunState::Validating)?;
                    let context = ValidationContext::new(&run.request.target_id)
                        .with_credential_env(run.request.credential_env().map(String::from));

                    let report = match self
                        .validator
                        .validate(artifact.source(), &context, cancel)
                        .await
                    {
                        Ok(report) => report,
                        Err(ValidatorError::Cancelled) => return run.cancel(),
                        Err(ValidatorError::SandboxUnavailable(err)) => {
                            tracing::error!("{}: {}", run.request.target_id, err);
                            return Err(Halt::Sandbox(err));
                        }
                    };

                    validated_record(artifact, violations, fixes, report)
                }
            };

            if let Some(terminal) = self.conclude(run, record)? {
                return Ok(terminal);
            }
        }
    }

    fn police(&self, artifact: CandidateArtifact) -> Result<Policed, PolicyError> {
        match self.policy.sanitize_and_validate(artifact.source()) {
            Ok(sanitized) => {
                for fix in &sanitized.applied_fixes {
                    tracing::info!(
                        "attempt {}: applied rewrite on line {}: {}",
                        artifact.attempt_index(),
                        fix.line,
                        fix.description
                    );
                }
                let artifact = artifact.derive(sanitized.source);
                Ok(Policed::Clean {
                    artifact,
                    violations: sanitized.violations,
                    fixes: sanitized.applied_fixes,
                })
            }
            Err(PolicyError::Unparseable(err)) => {
                tracing::debug!("attempt {}: unparseable: {}", artifact.attempt_index(), err);
                let report = ValidationReport::syntax_failure(&err);
                Ok(Policed::Failed(validated_record(
                    artifact,
                    Vec::new(),
                    Vec::new(),
                    report,
                )))
            }
            Err(PolicyError::Rejected { violations }) => {
                let failure = AttemptFailure::from_violations(&violations);
                Ok(Policed::Failed(
                    AttemptRecord::new(artifact)
                        .with_violations(violations)
                        .failed(failure),
                ))
            }
            Err(err @ PolicyError::InvalidPattern { .. }) => Err(err),
        }
    }

    /// Append `record` and decide whether the run is over
    fn conclude(&self, run: &mut Run, record: AttemptRecord) -> Result<Option<Terminal>, Halt> {
        let target = &run.request.target_id;

        let Some(failure) = record.failure().cloned() else {
            run.history.push(record)?;
            run.transition(RunState::Accepted)?;
            return Ok(Some(Terminal::Accepted));
        };

        tracing::warn!(
            "{}: attempt {} failed: {} ({})",
            target,
            record.attempt_index(),
            failure.category,
            failure.ids.join(", ")
        );

        let repeated = self.config.stop_on_repeated_failure
            && run
                .history
                .last()
                .and_then(AttemptRecord::failure)
                .is_some_and(|prev| prev.signature() == failure.signature());

        if let Some(entry) = FeedbackEntry::from_record(&record) {
            run.feedback.push(entry);
        }
        run.history.push(record)?;

        let reason = if run.history.is_full() {
            ExhaustReason::BudgetSpent
        } else if repeated {
            tracing::warn!("{}: same failure twice in a row, stopping early", target);
            ExhaustReason::RepeatedFailure
        } else {
            return Ok(None);
        };

        run.transition(RunState::Exhausted)?;
        Ok(Some(Terminal::Exhausted { reason }))
    }

    async fn offer(&self, target_id: &str, history: &AttemptHistory) {
        if let Some(sink) = &self.sink {
            if let Err(err) = sink.persist(target_id, history).await {
                tracing::warn!("{}: history sink failed: {}", target_id, err);
            }
        }
    }
}

/// Why a run stopped without a terminal state
enum Halt {
    Backend(BackendError),
    Sandbox(SandboxError),
    Fault(ForgeError),
}

impl Halt {
    fn into_error(self, history: AttemptHistory) -> ForgeError {
        match self {
            Self::Backend(err) => ForgeError::backend_unavailable(&err, history),
            Self::Sandbox(err) => ForgeError::sandbox_unavailable(err, history),
            Self::Fault(err) => err,
        }
    }
}

impl From<StateMachineError> for Halt {
    fn from(err: StateMachineError) -> Self {
        Self::Fault(err.into())
    }
}

impl From<HistoryError> for Halt {
    fn from(err: HistoryError) -> Self {
        Self::Fault(err.into())
    }
}

impl From<PolicyError> for Halt {
    fn from(err: PolicyError) -> Self {
        Self::Fault(err.into())
    }
}

/// Policy verdict for one candidate
enum Policed {
    /// Rejected or unparseable; record is final
    Failed(AttemptRecord),
    /// May proceed to validation
    Clean {
        artifact: CandidateArtifact,
        violations: Vec<Violation>,
        fixes: Vec<AppliedFix>,
    },
}

fn validated_record(
    artifact: CandidateArtifact,
    violations: Vec<Violation>,
    fixes: Vec<AppliedFix>,
    report: ValidationReport,
) -> AttemptRecord {
    let failure = AttemptFailure::from_report(&report);
    let record = AttemptRecord::new(artifact)
        .with_violations(violations)
        .with_fixes(fixes)
        .with_report(report);
    match failure {
        Some(failure) => record.failed(failure),
        None => record,
    }
}

/// Mutable state of one run, owned by `Orchestrator::run`
struct Run {
    request: Arc<GenerationRequest>,
    platform: Option<Arc<PlatformProfile>>,
    run_id: RunId,
    state: RunState,
    history: AttemptHistory,
    feedback: Vec<FeedbackEntry>,
    calls: u32,
}

impl Run {
    fn new(request: Arc<GenerationRequest>, platform: Option<PlatformProfile>) -> Self {
        Self {
            history: AttemptHistory::new(request.max_attempts),
            request,
            platform: platform.map(Arc::new),
            run_id: RunId::new(),
            state: RunState::Idle,
            feedback: Vec::new(),
            calls: 0,
        }
    }

    fn transition(&mut self, to: RunState) -> Result<(), StateMachineError> {
        validate_transition(self.state, to)?;
        tracing::debug!("{}: {:?} -> {:?}", self.request.target_id, self.state, to);
        self.state = to;
        Ok(())
    }

    fn cancel(&mut self) -> Result<Terminal, Halt> {
        self.transition(RunState::Cancelled)?;
        Ok(Terminal::Cancelled)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::BackendError;
    use async_trait::async_trait;

    struct Fixed(&'static str);

    #[async_trait]
    impl GenerativeBackend for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn generate(&self, _prompt: &PromptContext) -> Result<String, BackendError> {
            Ok(self.0.to_string())
        }
    }

    #[tokio::test]
    async fn invalid_request_rejected_before_backend() {
        let orchestrator = Orchestrator::with_defaults(Arc::new(Fixed("x = 1\n"))).unwrap();
        let err = orchestrator
            .run(GenerationRequest::new("", "x"), &CancelToken::never())
            .await
            .unwrap_err();
        assert!(matches!(err, ForgeError::InvalidRequest(_)));
    }

    #[tokio::test]
    async fn policy_rejection_skips_validation() {
        let orchestrator =
            Orchestrator::with_defaults(Arc::new(Fixed("import subprocess\n"))).unwrap();
        let result = orchestrator
            .run(
                GenerationRequest::new("github", "x").with_max_attempts(1),
                &CancelToken::never(),
            )
            .await
            .unwrap();

        let record = &result.history.entries()[0];
        assert!(record.report().is_none());
        assert_eq!(
            record.failure().map(|f| f.category),
            Some(crate::FailureCategory::PolicyViolation)
        );
    }

    #[tokio::test]
    async fn pre_cancelled_run_records_nothing() {
        let orchestrator = Orchestrator::with_defaults(Arc::new(Fixed("x = 1\n"))).unwrap();
        let (handle, token) = forge_validator::cancel_pair();
        handle.cancel();

        let result = orchestrator
            .run(GenerationRequest::new("github", "x"), &token)
            .await
            .unwrap();
        assert_eq!(result.terminal, Terminal::Cancelled);
        assert_eq!(result.attempts_used, 0);
        assert!(result.artifact.is_none());
    }
}
