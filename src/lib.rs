//! # docuchat
//!
//! Chat with your documents, locally. Upload a PDF or a page scan, extract
//! its text — embedded text layer when the PDF has one, a local vision model
//! when it doesn't — and hold grounded conversations about the content
//! against a local text model. Nothing leaves the machine.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Store      artifact written durably, document row `unprocessed`
//!  ├─ 2. Raster     embedded PDF text, or pdfium page renders (spawn_blocking)
//!  ├─ 3. Preprocess greyscale + contrast stretch + sharpen, per page
//!  ├─ 4. Recognize  vision model, bounded concurrency, retry/backoff
//!  ├─ 5. Assemble   page markers, failure placeholders, no-text sentinel
//!  └─ 6. Chat       grounded prompts over the extracted text
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docuchat::{DocEngine, EngineConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = EngineConfig::from_env();
//!     let engine = DocEngine::with_ollama(config)?;
//!
//!     let bytes = std::fs::read("invoice.pdf")?;
//!     let doc = engine.upload_document("me", "invoice.pdf", "application/pdf", &bytes)?;
//!     let doc = engine.process_document("me", doc.id, None).await?;
//!
//!     let conv = engine.create_conversation("me", doc.id)?;
//!     let turn = engine.send_message("me", conv.id, "What is the total?").await?;
//!     if let Some(reply) = turn.assistant_message {
//!         println!("{}", reply.content);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `docuchat` binary (clap + anyhow + tracing-subscriber) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! docuchat = { version = "0.3", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod artifact;
pub mod chat;
pub mod completion;
pub mod config;
pub mod db;
pub mod engine;
pub mod error;
pub mod model;
pub mod ocr;
pub mod ollama;
pub mod orchestrator;
pub mod pipeline;
pub mod prompts;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use artifact::ArtifactStore;
pub use completion::{CompletionService, OllamaCompletion};
pub use config::{EngineConfig, EngineConfigBuilder};
pub use engine::DocEngine;
pub use error::{EngineError, ErrorKind, PageError};
pub use model::{
    Conversation, ConversationSummary, ConversationView, Document, DocumentState, MediaType,
    Message, MessageRole, SendMessageOutcome,
};
pub use ocr::{OllamaOcr, Recognizer};
pub use pipeline::assemble::NO_TEXT_SENTINEL;
