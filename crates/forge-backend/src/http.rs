//! Ollama-style HTTP backend

use crate::config::BackendConfig;
use crate::extract::extract_code;
use async_trait::async_trait;
use forge_core::{BackendError, GenerativeBackend, PromptContext};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};

const ERROR_BODY_LIMIT: usize = 320;

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Backend that POSTs the rendered prompt to `{endpoint}/api/generate`
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: Client,
    config: BackendConfig,
    name: String,
}

impl HttpBackend {
    /// Create backend
    ///
    /// # Errors
    /// `BackendError::Unavailable` if the HTTP client cannot be built.
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| BackendError::Unavailable(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            name: format!("http:{}", config.model),
            config,
        })
    }

    /// Settings in use
    #[inline]
    #[must_use]
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    fn payload(&self, prompt: &PromptContext) -> Value {
        let mut payload = json!({
            "model": self.config.model,
            "prompt": prompt.render(),
            "stream": false,
        });
        if let Some(temperature) = self.config.temperature {
            payload["options"] = json!({ "temperature": temperature });
        }
        payload
    }
}

#[async_trait]
impl GenerativeBackend for HttpBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn generate(&self, prompt: &PromptContext) -> Result<String, BackendError> {
        let url = self.config.generate_url();
        tracing::debug!("POST {} (attempt {})", url, prompt.attempt_index);

        let response = self
            .client
            .post(&url)
            .json(&self.payload(prompt))
            .send()
            .await
            .map_err(|e| BackendError::Unavailable(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Unavailable(format!(
                "backend returned {status}: {}",
                truncate(&body, ERROR_BODY_LIMIT)
            )));
        }

        let body: GenerateResponse = response
            .json()
            .await
            .map_err(|e| BackendError::Malformed(format!("invalid generate response: {e}")))?;

        if body.response.trim().is_empty() {
            return Err(BackendError::Malformed("empty response".into()));
        }
        Ok(extract_code(&body.response))
    }
}

fn truncate(text: &str, limit: usize) -> &str {
    match text.char_indices().nth(limit) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
