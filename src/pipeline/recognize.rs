//! Drive recognition over all page units with bounded concurrency.
//!
//! Pages are independent, so they run through `buffer_unordered` with the
//! configured concurrency — enough parallelism to hide network latency
//! without overwhelming the endpoint. Embedded-text pages pass straight
//! through; rasterisation failures are carried through untouched.
//!
//! ## Retry Strategy
//!
//! Transient endpoint errors are frequent under concurrent load.
//! Exponential backoff (`retry_backoff_ms * 2^(attempt-1)`) avoids
//! thundering-herd: with 500 ms base and 3 retries the wait sequence is
//! 500 ms → 1 s → 2 s, totalling under 4 s of back-off per page.

use crate::config::EngineConfig;
use crate::error::PageError;
use crate::ocr::Recognizer;
use crate::pipeline::preprocess;
use crate::pipeline::raster::{PagePayload, PageUnit};
use futures::stream::{self, StreamExt};
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Text (or failure) for one page, still 0-indexed.
#[derive(Debug)]
pub struct PageOutcome {
    pub index: usize,
    pub text: Result<String, PageError>,
}

/// Recognise every page unit, at most `config.concurrency` in flight.
///
/// Always returns one outcome per input unit — a page never aborts the run.
pub async fn recognize_pages<R: Recognizer>(
    recognizer: &R,
    units: Vec<PageUnit>,
    language: &str,
    config: &EngineConfig,
) -> Vec<PageOutcome> {
    // buffer_unordered(0) never polls; a hand-built config may carry 0
    let concurrency = config.concurrency.max(1);
    stream::iter(units)
        .map(|unit| recognize_unit(recognizer, unit, language, config))
        .buffer_unordered(concurrency)
        .collect()
        .await
}

async fn recognize_unit<R: Recognizer>(
    recognizer: &R,
    unit: PageUnit,
    language: &str,
    config: &EngineConfig,
) -> PageOutcome {
    let index = unit.index;
    match unit.payload {
        PagePayload::Text(text) => PageOutcome {
            index,
            text: Ok(text),
        },
        PagePayload::Failed(error) => PageOutcome {
            index,
            text: Err(error),
        },
        PagePayload::Image(bytes) => {
            let image = prepare_with_fallback(bytes, index).await;
            let text = recognize_with_retry(recognizer, &image, index, language, config).await;
            PageOutcome { index, text }
        }
    }
}

/// Preprocess the page image, falling back to the raw bytes if cleanup
/// fails. Pixel loops are CPU-bound, so they run off the async threads.
async fn prepare_with_fallback(bytes: Vec<u8>, index: usize) -> Vec<u8> {
    let original = bytes.clone();
    let prepared =
        tokio::task::spawn_blocking(move || preprocess::prepare(&bytes)).await;

    match prepared {
        Ok(Ok(cleaned)) => cleaned,
        Ok(Err(e)) => {
            warn!(page = index + 1, "preprocess failed, using original image: {e}");
            original
        }
        Err(e) => {
            warn!(page = index + 1, "preprocess task panicked, using original image: {e}");
            original
        }
    }
}

async fn recognize_with_retry<R: Recognizer>(
    recognizer: &R,
    image_png: &[u8],
    index: usize,
    language: &str,
    config: &EngineConfig,
) -> Result<String, PageError> {
    let mut last_err: Option<String> = None;

    for attempt in 0..=config.max_retries {
        if attempt > 0 {
            let backoff = config.retry_backoff_ms * 2u64.pow(attempt - 1);
            warn!(
                page = index + 1,
                attempt,
                max = config.max_retries,
                "retrying recognition after {backoff}ms"
            );
            sleep(Duration::from_millis(backoff)).await;
        }

        match recognizer.recognize(image_png, language).await {
            Ok(text) => {
                debug!(page = index + 1, chars = text.len(), "page recognised");
                return Ok(text);
            }
            Err(e) => {
                warn!(page = index + 1, "recognition attempt {} failed: {e}", attempt + 1);
                last_err = Some(e.to_string());
            }
        }
    }

    Err(PageError::RecognitionFailed {
        page: index + 1,
        retries: config.max_retries,
        detail: last_err.unwrap_or_else(|| "unknown error".to_string()),
    })
}
