//! Error types for the docuchat engine.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`EngineError`] — **Fatal**: the requested operation cannot proceed at
//!   all (missing or unauthorized resource, processing lease already held,
//!   unsupported upload type). Returned as `Err(EngineError)` from the
//!   engine's public operations.
//!
//! * [`PageError`] — **Non-fatal**: a single page of a processing run failed
//!   (rasterisation glitch, transient recognition error) but all other pages
//!   are fine. Carried inside per-page outcomes so the assembler can render an
//!   explicit placeholder rather than losing the whole document to one bad
//!   page.
//!
//! Every `EngineError` maps onto a coarse [`ErrorKind`] so callers (an HTTP
//! layer, the CLI) can translate failures uniformly without matching on each
//! variant. Missing and unauthorized resources are deliberately collapsed
//! into the same `NotFound` kind so ownership checks never leak existence.

use thiserror::Error;
use uuid::Uuid;

/// All fatal errors returned by the docuchat engine.
///
/// Page-level failures use [`PageError`] and are rendered into the assembled
/// text rather than propagated here.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Resource does not exist — or exists but belongs to another user.
    /// The two cases are indistinguishable on purpose.
    #[error("{resource} not found")]
    NotFound { resource: &'static str },

    /// A processing run is already in flight for this document.
    #[error("document {id} is already being processed")]
    ProcessingInFlight { id: Uuid },

    /// The declared media type is not one the pipeline can handle.
    #[error("unsupported media type '{declared}' (supported: application/pdf, image/jpeg, image/png, image/tiff)")]
    UnsupportedMediaType { declared: String },

    /// The request is well-formed but cannot be satisfied in the current
    /// state (e.g. messaging against a document with no extracted text).
    #[error("{0}")]
    BadRequest(String),

    /// An external service (recognition or completion endpoint) failed.
    #[error("{service} request failed: {detail}")]
    Upstream { service: &'static str, detail: String },

    /// An external service call exceeded its configured timeout.
    #[error("{service} request timed out after {secs}s")]
    UpstreamTimeout { service: &'static str, secs: u64 },

    /// Builder validation failed.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Artifact store or database failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// Unexpected internal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Coarse error taxonomy exposed to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    UnsupportedMediaType,
    BadRequest,
    Upstream,
    Internal,
}

impl EngineError {
    /// Classify this error for uniform handling at the API boundary.
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::NotFound { .. } => ErrorKind::NotFound,
            EngineError::ProcessingInFlight { .. } => ErrorKind::Conflict,
            EngineError::UnsupportedMediaType { .. } => ErrorKind::UnsupportedMediaType,
            EngineError::BadRequest(_) => ErrorKind::BadRequest,
            EngineError::Upstream { .. } | EngineError::UpstreamTimeout { .. } => {
                ErrorKind::Upstream
            }
            EngineError::InvalidConfig(_)
            | EngineError::Storage(_)
            | EngineError::Internal(_) => ErrorKind::Internal,
        }
    }
}

impl From<rusqlite::Error> for EngineError {
    fn from(e: rusqlite::Error) -> Self {
        EngineError::Storage(e.to_string())
    }
}

/// A non-fatal error for a single page of a processing run.
///
/// Stored in the page's outcome; the overall run continues and the assembler
/// renders an explicit placeholder for the page.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// Page rasterisation failed.
    #[error("page {page}: rasterisation failed: {detail}")]
    RasterFailed { page: usize, detail: String },

    /// Recognition failed after all retries.
    #[error("page {page}: recognition failed after {retries} retries: {detail}")]
    RecognitionFailed {
        page: usize,
        retries: u32,
        detail: String,
    },
}

impl PageError {
    /// 1-indexed page number this error belongs to.
    pub fn page(&self) -> usize {
        match self {
            PageError::RasterFailed { page, .. } => *page,
            PageError::RecognitionFailed { page, .. } => *page,
        }
    }
}
