//! Grounded reply generation.
//!
//! Mirrors [`crate::ocr`]: a narrow trait the conversation engine depends
//! on, with a production implementation over the shared Ollama client and
//! mocks in the test suite.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::ollama::OllamaClient;

/// Produces one assistant reply for a fully assembled prompt.
pub trait CompletionService: Send + Sync {
    fn generate(
        &self,
        prompt: &str,
    ) -> impl std::future::Future<Output = Result<String, EngineError>> + Send;
}

/// Completion backed by a text model on an Ollama-style endpoint.
#[derive(Debug, Clone)]
pub struct OllamaCompletion {
    client: OllamaClient,
    model: String,
    timeout_secs: u64,
}

impl OllamaCompletion {
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        Ok(Self {
            client: OllamaClient::new(&config.endpoint_url, config.completion_timeout_secs)?,
            model: config.completion_model.clone(),
            timeout_secs: config.completion_timeout_secs,
        })
    }
}

impl CompletionService for OllamaCompletion {
    async fn generate(&self, prompt: &str) -> Result<String, EngineError> {
        let text = self
            .client
            .generate("completion", &self.model, prompt, None, self.timeout_secs)
            .await?;
        Ok(text.trim().to_string())
    }
}
