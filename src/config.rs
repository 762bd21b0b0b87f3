//! Engine configuration.
//!
//! All behaviour is controlled through [`EngineConfig`], built via its
//! [`EngineConfigBuilder`] or loaded from the environment once at startup and
//! passed into the engine's constructors — there is no ambient global state.
//!
//! # Design choice: builder over constructor
//! A dozen-field constructor is unreadable and breaks on every new field.
//! The builder lets callers set only what they care about and rely on
//! documented defaults for the rest.

use crate::error::EngineError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Configuration for the docuchat engine.
///
/// Built via [`EngineConfig::builder()`], [`EngineConfig::from_env()`], or
/// [`EngineConfig::default()`].
///
/// # Example
/// ```rust
/// use docuchat::EngineConfig;
///
/// let config = EngineConfig::builder()
///     .concurrency(8)
///     .language("deu")
///     .completion_model("llama3")
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Root directory for the database and artifact store. Default: `./data`.
    pub data_dir: PathBuf,

    /// Default OCR language code when a processing call passes none.
    /// Default: `"eng"`.
    pub language: String,

    /// Number of pages recognised concurrently per run. Default: 4.
    ///
    /// Recognition is network-bound; a handful of in-flight pages cuts
    /// wall-clock time on scanned documents without overwhelming the
    /// recognition endpoint. Lower this if the endpoint rate-limits.
    pub concurrency: usize,

    /// Maximum rendered page dimension (width or height) in pixels.
    /// Default: 2000.
    ///
    /// A safety cap independent of page size: an A0 poster rendered naively
    /// could produce a 13 000 px image and exhaust memory. Either dimension is
    /// capped, the other scales proportionally.
    pub max_rendered_pixels: u32,

    /// Base URL of the Ollama-style endpoint serving both recognition and
    /// completion. Default: `http://ollama:11434`.
    pub endpoint_url: String,

    /// Vision model used for page recognition. Default: `"llava"`.
    pub ocr_model: String,

    /// Text model used for grounded replies. Default: `"llama3"`.
    pub completion_model: String,

    /// Per-recognition-call timeout in seconds. Default: 120.
    pub ocr_timeout_secs: u64,

    /// Per-completion-call timeout in seconds. Default: 60.
    ///
    /// A timed-out turn fails like any other completion failure: the user's
    /// message is kept and the error is surfaced.
    pub completion_timeout_secs: u64,

    /// Maximum retry attempts on a transient recognition failure. Default: 3.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds (exponential backoff).
    /// Default: 500.
    ///
    /// Doubles after each attempt: 500 ms → 1 s → 2 s, so N concurrent
    /// workers never retry in lockstep against a recovering endpoint.
    pub retry_backoff_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            language: "eng".to_string(),
            concurrency: 4,
            max_rendered_pixels: 2000,
            endpoint_url: "http://ollama:11434".to_string(),
            ocr_model: "llava".to_string(),
            completion_model: "llama3".to_string(),
            ocr_timeout_secs: 120,
            completion_timeout_secs: 60,
            max_retries: 3,
            retry_backoff_ms: 500,
        }
    }
}

impl EngineConfig {
    /// Create a new builder.
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder {
            config: Self::default(),
        }
    }

    /// Load configuration from the environment.
    ///
    /// Recognised variables: `OLLAMA_API_URL`, `OLLAMA_MODEL` (completion
    /// model), `DOCUCHAT_DATA_DIR`, `DOCUCHAT_OCR_MODEL`,
    /// `DOCUCHAT_LANGUAGE`. Unset variables keep their defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(url) = std::env::var("OLLAMA_API_URL") {
            if !url.is_empty() {
                config.endpoint_url = url;
            }
        }
        if let Ok(model) = std::env::var("OLLAMA_MODEL") {
            if !model.is_empty() {
                config.completion_model = model;
            }
        }
        if let Ok(model) = std::env::var("DOCUCHAT_OCR_MODEL") {
            if !model.is_empty() {
                config.ocr_model = model;
            }
        }
        if let Ok(dir) = std::env::var("DOCUCHAT_DATA_DIR") {
            if !dir.is_empty() {
                config.data_dir = PathBuf::from(dir);
            }
        }
        if let Ok(lang) = std::env::var("DOCUCHAT_LANGUAGE") {
            if !lang.is_empty() {
                config.language = lang;
            }
        }
        config
    }
}

/// Builder for [`EngineConfig`].
#[derive(Debug)]
pub struct EngineConfigBuilder {
    config: EngineConfig,
}

impl EngineConfigBuilder {
    pub fn data_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.data_dir = dir.into();
        self
    }

    pub fn language(mut self, lang: impl Into<String>) -> Self {
        self.config.language = lang.into();
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn endpoint_url(mut self, url: impl Into<String>) -> Self {
        self.config.endpoint_url = url.into();
        self
    }

    pub fn ocr_model(mut self, model: impl Into<String>) -> Self {
        self.config.ocr_model = model.into();
        self
    }

    pub fn completion_model(mut self, model: impl Into<String>) -> Self {
        self.config.completion_model = model.into();
        self
    }

    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_timeout_secs = secs;
        self
    }

    pub fn completion_timeout_secs(mut self, secs: u64) -> Self {
        self.config.completion_timeout_secs = secs;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<EngineConfig, EngineError> {
        let c = &self.config;
        if c.concurrency == 0 {
            return Err(EngineError::InvalidConfig("concurrency must be ≥ 1".into()));
        }
        if c.language.trim().is_empty() {
            return Err(EngineError::InvalidConfig("language must not be empty".into()));
        }
        if c.completion_timeout_secs == 0 || c.ocr_timeout_secs == 0 {
            return Err(EngineError::InvalidConfig(
                "service timeouts must be ≥ 1s".into(),
            ));
        }
        Ok(self.config)
    }
}
