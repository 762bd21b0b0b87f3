//! Page recognition service.
//!
//! [`Recognizer`] is the seam between the pipeline and the vision endpoint:
//! the pipeline drives retries and concurrency, implementations only turn
//! one PNG into text. Production uses [`OllamaOcr`]; tests swap in a local
//! mock so the pipeline is exercised without a live model.

use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::ollama::OllamaClient;
use crate::prompts::recognition_prompt;
use base64::Engine as _;

/// Turns one page image into its text.
///
/// A single call, no retry logic — transient-failure handling belongs to the
/// caller so every implementation gets it uniformly.
pub trait Recognizer: Send + Sync {
    fn recognize(
        &self,
        image_png: &[u8],
        language: &str,
    ) -> impl std::future::Future<Output = Result<String, EngineError>> + Send;
}

/// Recognition backed by a vision model on an Ollama-style endpoint.
#[derive(Debug, Clone)]
pub struct OllamaOcr {
    client: OllamaClient,
    model: String,
    timeout_secs: u64,
}

impl OllamaOcr {
    pub fn new(config: &EngineConfig) -> Result<Self, EngineError> {
        Ok(Self {
            client: OllamaClient::new(&config.endpoint_url, config.ocr_timeout_secs)?,
            model: config.ocr_model.clone(),
            timeout_secs: config.ocr_timeout_secs,
        })
    }
}

impl Recognizer for OllamaOcr {
    async fn recognize(&self, image_png: &[u8], language: &str) -> Result<String, EngineError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(image_png);
        let prompt = recognition_prompt(language);
        let text = self
            .client
            .generate(
                "recognition",
                &self.model,
                &prompt,
                Some(vec![encoded]),
                self.timeout_secs,
            )
            .await?;
        Ok(text.trim().to_string())
    }
}
