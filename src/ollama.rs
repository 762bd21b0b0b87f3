//! HTTP client for an Ollama-style `/api/generate` endpoint.
//!
//! Both services the engine talks to — vision recognition and text
//! completion — speak the same wire format: a single POST with the model
//! name, a prompt, optional base64 images, and `stream: false`, answered by
//! a JSON object whose `response` field is the generated text. This module
//! owns that format once; [`crate::ocr`] and [`crate::completion`] wrap it
//! with their respective prompts and timeouts.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    images: Option<Vec<String>>,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Client bound to one endpoint URL. Cheap to clone; the inner reqwest
/// client shares its connection pool across clones.
#[derive(Debug, Clone)]
pub struct OllamaClient {
    http: reqwest::Client,
    base_url: String,
}

impl OllamaClient {
    /// Build a client with a per-request timeout.
    ///
    /// `service` names the caller ("recognition" or "completion") in error
    /// messages, so upstream failures identify which dependency broke.
    pub fn new(base_url: &str, timeout_secs: u64) -> Result<Self, EngineError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| EngineError::Internal(format!("http client: {e}")))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// One non-streaming generate call. `images` carries base64-encoded page
    /// images for vision models and is omitted from the request entirely for
    /// plain text models.
    pub async fn generate(
        &self,
        service: &'static str,
        model: &str,
        prompt: &str,
        images: Option<Vec<String>>,
        timeout_secs: u64,
    ) -> Result<String, EngineError> {
        let url = format!("{}/api/generate", self.base_url);
        let body = GenerateRequest {
            model,
            prompt,
            images,
            stream: false,
        };

        debug!(service, model, url, "generate request");
        let response = self
            .http
            .post(&url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    EngineError::UpstreamTimeout {
                        service,
                        secs: timeout_secs,
                    }
                } else {
                    EngineError::Upstream {
                        service,
                        detail: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(EngineError::Upstream {
                service,
                detail: format!("HTTP {status}: {detail}"),
            });
        }

        let parsed: GenerateResponse = response.json().await.map_err(|e| {
            EngineError::Upstream {
                service,
                detail: format!("malformed response: {e}"),
            }
        })?;
        Ok(parsed.response)
    }
}
