//! Decompose a stored artifact into page units.
//!
//! PDFs get a fast path: if the document carries an embedded text layer it
//! is digital-native and recognition is skipped entirely. Scanned PDFs (no
//! embedded text on any page) are rendered page by page via pdfium; a page
//! that fails to render becomes a `Failed` unit so the run continues.
//!
//! Single images are trivially one page unit wrapping the stored bytes.
//!
//! ## Why spawn_blocking?
//!
//! The `pdfium-render` crate wraps the pdfium C++ library, which uses
//! thread-local state internally and is not safe to call from async
//! contexts. `tokio::task::spawn_blocking` moves loading and rendering onto
//! the blocking thread pool so Tokio worker threads never stall on
//! CPU-heavy rasterisation.

use crate::config::EngineConfig;
use crate::error::{EngineError, PageError};
use crate::model::{MediaType, ProcessingStrategy};
use image::ImageFormat;
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// What a single page contributed to the run.
#[derive(Debug, Clone)]
pub enum PagePayload {
    /// Embedded text, recognition not needed.
    Text(String),
    /// PNG-encoded page image awaiting recognition.
    Image(Vec<u8>),
    /// The page could not be rasterised; carried through to the assembler.
    Failed(PageError),
}

/// One page of the document, 0-indexed in reading order.
#[derive(Debug, Clone)]
pub struct PageUnit {
    pub index: usize,
    pub payload: PagePayload,
}

/// Scratch directory for one processing run, removed on drop.
pub struct WorkArea {
    dir: TempDir,
}

impl WorkArea {
    pub fn new(document_id: Uuid) -> Result<Self, EngineError> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("docuchat-{document_id}-"))
            .tempdir()
            .map_err(|e| EngineError::Storage(format!("work area: {e}")))?;
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }
}

/// Turn the stored bytes into page units according to the media type.
///
/// Page indices are contiguous from 0 and every source page appears exactly
/// once, whether it yielded text, an image or a failure.
pub async fn rasterize(
    document_id: Uuid,
    bytes: Vec<u8>,
    media_type: MediaType,
    config: &EngineConfig,
) -> Result<Vec<PageUnit>, EngineError> {
    match media_type.strategy() {
        ProcessingStrategy::SingleImage => Ok(vec![PageUnit {
            index: 0,
            payload: PagePayload::Image(bytes),
        }]),
        ProcessingStrategy::PdfDocument => {
            let work = WorkArea::new(document_id)?;
            let pdf_path = work.path().join("source.pdf");
            tokio::fs::write(&pdf_path, &bytes)
                .await
                .map_err(|e| EngineError::Storage(format!("write work file: {e}")))?;

            let max_pixels = config.max_rendered_pixels;
            let units = tokio::task::spawn_blocking(move || {
                let units = rasterize_pdf_blocking(&pdf_path, max_pixels);
                drop(work); // scratch dir lives until rendering is done
                units
            })
            .await
            .map_err(|e| EngineError::Internal(format!("raster task panicked: {e}")))??;

            Ok(units)
        }
    }
}

fn rasterize_pdf_blocking(
    pdf_path: &PathBuf,
    max_pixels: u32,
) -> Result<Vec<PageUnit>, EngineError> {
    let pdfium = Pdfium::default();
    let document = pdfium
        .load_pdf_from_file(pdf_path, None)
        .map_err(|e| EngineError::Internal(format!("pdf load failed: {e:?}")))?;

    let pages = document.pages();
    let total = pages.len() as usize;
    info!(pages = total, "pdf loaded");

    // Fast path: digital-native PDFs carry their text; use it verbatim as
    // one synthetic unit, so the stored text equals the embedded text.
    if let Some(text) = embedded_text(&pages, total) {
        info!("embedded text layer found, skipping rasterisation");
        return Ok(vec![PageUnit {
            index: 0,
            payload: PagePayload::Text(text),
        }]);
    }

    let render_config = PdfRenderConfig::new()
        .set_target_width(max_pixels as i32)
        .set_maximum_height(max_pixels as i32);

    let mut units = Vec::with_capacity(total);
    for idx in 0..total {
        units.push(PageUnit {
            index: idx,
            payload: render_page(&pages, idx, &render_config),
        });
    }
    Ok(units)
}

/// The document's embedded text layer, or `None` when it has no usable one.
///
/// A PDF counts as digital-native only if the concatenated text of all pages
/// is non-empty; a scanned PDF typically reports empty text everywhere.
fn embedded_text(pages: &PdfPages<'_>, total: usize) -> Option<String> {
    let mut page_texts = Vec::with_capacity(total);
    for idx in 0..total {
        let text = pages
            .get(idx as u16)
            .ok()
            .and_then(|page| page.text().ok().map(|t| t.all()))
            .unwrap_or_default();
        page_texts.push(text.trim().to_string());
    }

    if page_texts.iter().all(|t| t.is_empty()) {
        return None;
    }
    Some(page_texts.join("\n\n").trim().to_string())
}

fn render_page(
    pages: &PdfPages<'_>,
    idx: usize,
    render_config: &PdfRenderConfig,
) -> PagePayload {
    let rendered = pages
        .get(idx as u16)
        .and_then(|page| page.render_with_config(render_config).map(|b| b.as_image()));

    let image = match rendered {
        Ok(image) => image,
        Err(e) => {
            warn!(page = idx + 1, "rasterisation failed: {e:?}");
            return PagePayload::Failed(PageError::RasterFailed {
                page: idx + 1,
                detail: format!("{e:?}"),
            });
        }
    };

    debug!(
        page = idx + 1,
        width = image.width(),
        height = image.height(),
        "page rendered"
    );

    let mut png = Vec::new();
    match image.write_to(&mut Cursor::new(&mut png), ImageFormat::Png) {
        Ok(()) => PagePayload::Image(png),
        Err(e) => PagePayload::Failed(PageError::RasterFailed {
            page: idx + 1,
            detail: format!("png encode: {e}"),
        }),
    }
}
