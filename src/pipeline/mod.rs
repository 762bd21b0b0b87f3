//! Pipeline stages for document text extraction.
//!
//! Each submodule implements exactly one transformation step. Keeping stages
//! separate makes each independently testable and lets the orchestrator run
//! them against mock services.
//!
//! ## Data Flow
//!
//! ```text
//! raster ──▶ preprocess ──▶ recognize ──▶ assemble
//! (pdfium)   (greyscale,    (vision       (page markers,
//!             contrast,      model,        placeholders,
//!             sharpen)       retries)      sentinel)
//! ```
//!
//! 1. [`raster`]     — decompose the stored artifact into page units:
//!    embedded PDF text where available, rendered page images otherwise;
//!    pdfium work runs in `spawn_blocking`
//! 2. [`preprocess`] — clean up each page image for recognition; a failed
//!    cleanup falls back to the original image, never fails the page
//! 3. [`recognize`]  — drive the vision model over all pages with bounded
//!    concurrency and retry/backoff; the only stage with network I/O
//! 4. [`assemble`]   — join per-page outcomes into one document text with
//!    page markers and explicit failure placeholders

pub mod assemble;
pub mod preprocess;
pub mod raster;
pub mod recognize;
