//! Testing utilities for the Forge workspace
//!
//! Scripted backends, stub sandboxes and source fixtures.

#![allow(missing_docs)]

use async_trait::async_trait;
use forge_core::{BackendError, GenerativeBackend, PromptContext};
use forge_validator::{CancelToken, Sandbox, SandboxError, SandboxOutcome, SandboxProbe};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const COMPLIANT_SERVER: &str = include_str!("../fixtures/compliant_server.py");

/// Fully compliant GitHub OAuth server
pub fn compliant_server() -> &'static str {
    COMPLIANT_SERVER
}

/// Compliant server without the capability-listing entrypoint
pub fn missing_listing_entrypoint() -> String {
    COMPLIANT_SERVER.replace("async def list_tools(", "async def list_capabilities(")
}

/// Compliant server with a literal client secret
pub fn hardcoded_client_secret() -> String {
    COMPLIANT_SERVER.replace(
        "CLIENT_SECRET = os.getenv(\"OAUTH_CLIENT_SECRET\")",
        "CLIENT_SECRET = \"sk_abcdef0123456789abcdef\"",
    )
}

/// Compliant server that also imports a denylisted module
pub fn with_forbidden_import() -> String {
    COMPLIANT_SERVER.replace("import asyncio\n", "import asyncio\nimport subprocess\n")
}

/// Source that never parses
pub fn unparseable() -> &'static str {
    "Here is your server:\ndef broken(:\n    pass\n"
}

/// Backend returning scripted responses in order, then repeating the last
#[derive(Debug)]
pub struct ScriptedBackend {
    responses: Mutex<VecDeque<Result<String, BackendError>>>,
    last: Mutex<Option<Result<String, BackendError>>>,
    prompts: Mutex<Vec<PromptContext>>,
}

impl ScriptedBackend {
    pub fn new<I, S>(responses: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_results(responses.into_iter().map(|s| Ok(s.into())))
    }

    pub fn with_results(
        responses: impl IntoIterator<Item = Result<String, BackendError>>,
    ) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into_iter().collect()),
            last: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// Every prompt received, in call order
    pub fn prompts(&self) -> Vec<PromptContext> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl GenerativeBackend for ScriptedBackend {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &PromptContext) -> Result<String, BackendError> {
        self.prompts.lock().unwrap().push(prompt.clone());
        let next = self.responses.lock().unwrap().pop_front();
        let mut last = self.last.lock().unwrap();
        match next {
            Some(response) => {
                *last = Some(response.clone());
                response
            }
            None => last
                .clone()
                .unwrap_or_else(|| Err(BackendError::Malformed("script is empty".into()))),
        }
    }
}

/// Wraps a backend and keeps every rendered prompt
pub struct RecordingBackend {
    inner: Arc<dyn GenerativeBackend>,
    rendered: Mutex<Vec<String>>,
}

impl RecordingBackend {
    pub fn new(inner: Arc<dyn GenerativeBackend>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            rendered: Mutex::new(Vec::new()),
        })
    }

    pub fn rendered(&self) -> Vec<String> {
        self.rendered.lock().unwrap().clone()
    }
}

#[async_trait]
impl GenerativeBackend for RecordingBackend {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn generate(&self, prompt: &PromptContext) -> Result<String, BackendError> {
        self.rendered.lock().unwrap().push(prompt.render());
        self.inner.generate(prompt).await
    }
}

/// Backend that always fails
#[derive(Debug)]
pub struct FailingBackend {
    error: BackendError,
    calls: AtomicUsize,
}

impl FailingBackend {
    pub fn new(error: BackendError) -> Arc<Self> {
        Arc::new(Self {
            error,
            calls: AtomicUsize::new(0),
        })
    }

    pub fn unavailable() -> Arc<Self> {
        Self::new(BackendError::Unavailable("connection refused".into()))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerativeBackend for FailingBackend {
    fn name(&self) -> &str {
        "failing"
    }

    async fn generate(&self, _prompt: &PromptContext) -> Result<String, BackendError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(self.error.clone())
    }
}

/// Backend that never answers
#[derive(Debug, Default)]
pub struct PendingBackend;

#[async_trait]
impl GenerativeBackend for PendingBackend {
    fn name(&self) -> &str {
        "pending"
    }

    async fn generate(&self, _prompt: &PromptContext) -> Result<String, BackendError> {
        std::future::pending().await
    }
}

/// Sandbox returning scripted outcomes, repeating the last
#[derive(Debug)]
pub struct StubSandbox {
    outcomes: Mutex<VecDeque<SandboxOutcome>>,
    fallback: SandboxOutcome,
    runs: AtomicUsize,
}

impl StubSandbox {
    pub fn new(outcomes: impl IntoIterator<Item = SandboxOutcome>) -> Arc<Self> {
        let outcomes: VecDeque<_> = outcomes.into_iter().collect();
        let fallback = outcomes.back().cloned().unwrap_or_else(Self::passing);
        Arc::new(Self {
            outcomes: Mutex::new(outcomes),
            fallback,
            runs: AtomicUsize::new(0),
        })
    }

    pub fn always_passing() -> Arc<Self> {
        Self::new([Self::passing()])
    }

    pub fn passing() -> SandboxOutcome {
        SandboxOutcome::Passed {
            capabilities: vec!["authenticate".into(), "get_user_info".into()],
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sandbox for StubSandbox {
    async fn exercise(
        &self,
        _source: &str,
        _probe: &SandboxProbe,
        cancel: &CancelToken,
    ) -> Result<SandboxOutcome, SandboxError> {
        if cancel.is_cancelled() {
            return Err(SandboxError::Cancelled);
        }
        self.runs.fetch_add(1, Ordering::SeqCst);
        let next = self.outcomes.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }
}

/// Sandbox that runs until cancelled
#[derive(Debug, Default)]
pub struct BlockingSandbox {
    started: AtomicUsize,
}

impl BlockingSandbox {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn started(&self) -> usize {
        self.started.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Sandbox for BlockingSandbox {
    async fn exercise(
        &self,
        _source: &str,
        _probe: &SandboxProbe,
        cancel: &CancelToken,
    ) -> Result<SandboxOutcome, SandboxError> {
        self.started.fetch_add(1, Ordering::SeqCst);
        cancel.cancelled().await;
        Err(SandboxError::Cancelled)
    }
}
