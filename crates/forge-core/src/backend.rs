//! Generative backend seam

use crate::error::BackendError;
use crate::prompt::PromptContext;
use async_trait::async_trait;

/// Produces candidate source text from a prompt
///
/// How the text is produced is the implementation's business. Any error is
/// fatal to the request; the orchestrator does not retry a dead backend.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Name recorded in each candidate's provenance
    fn name(&self) -> &str;

    /// Generate one candidate
    ///
    /// The future may be dropped mid-flight when the request is cancelled.
    ///
    /// # Errors
    /// `BackendError` if the backend cannot produce text.
    async fn generate(&self, prompt: &PromptContext) -> Result<String, BackendError>;
}
