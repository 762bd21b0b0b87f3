//! Document processing orchestration.
//!
//! Owns the document state machine
//! (`unprocessed → processing → {processed, failed}`) and the single-flight
//! guarantee: at most one processing run per document at a time, enforced by
//! an in-process lease rather than the persisted state. A crashed run leaves
//! the row stuck at `processing`, but the lease dies with the process, so
//! the next call can always re-enter — the stale row is advisory, never a
//! lock.

use crate::artifact::ArtifactStore;
use crate::config::EngineConfig;
use crate::db::Database;
use crate::error::EngineError;
use crate::model::{Document, DocumentState, MediaType};
use crate::ocr::Recognizer;
use crate::pipeline::{assemble, raster, recognize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{error, info, warn};
use uuid::Uuid;

/// In-process set of documents with a live processing run.
#[derive(Debug, Default)]
pub struct LeaseSet {
    live: Mutex<HashSet<Uuid>>,
}

impl LeaseSet {
    /// Try to claim `id`. `None` means another run holds it.
    fn acquire(set: &Arc<Self>, id: Uuid) -> Option<Lease> {
        let mut live = set.live.lock().ok()?;
        if live.insert(id) {
            Some(Lease {
                set: Arc::clone(set),
                id,
            })
        } else {
            None
        }
    }
}

/// RAII claim on a document; released on drop, including on panic or early
/// return, so a failed run never wedges the document.
struct Lease {
    set: Arc<LeaseSet>,
    id: Uuid,
}

impl Drop for Lease {
    fn drop(&mut self) {
        if let Ok(mut live) = self.set.live.lock() {
            live.remove(&self.id);
        }
    }
}

/// Runs the extraction pipeline and keeps document state consistent.
pub struct Orchestrator<R: Recognizer> {
    db: Arc<Database>,
    store: Arc<ArtifactStore>,
    recognizer: Arc<R>,
    leases: Arc<LeaseSet>,
    config: EngineConfig,
}

impl<R: Recognizer> Orchestrator<R> {
    pub fn new(
        db: Arc<Database>,
        store: Arc<ArtifactStore>,
        recognizer: Arc<R>,
        config: EngineConfig,
    ) -> Self {
        Self {
            db,
            store,
            recognizer,
            leases: Arc::new(LeaseSet::default()),
            config,
        }
    }

    /// Process (or re-process) a document end to end.
    ///
    /// Re-processing discards the previous text entirely: the run re-reads
    /// the stored artifact, so the result is the same whether the document
    /// was processed before or not. Returns the updated document record.
    ///
    /// # Errors
    /// * `NotFound` — unknown id, or owned by someone else
    /// * `ProcessingInFlight` — another run holds the lease
    /// * `UnsupportedMediaType` — the stored type is outside the pipeline's set
    pub async fn process_document(
        &self,
        id: Uuid,
        user_id: &str,
        language: Option<&str>,
    ) -> Result<Document, EngineError> {
        let document = self
            .db
            .get_document(id)?
            .filter(|d| d.user_id == user_id)
            .ok_or(EngineError::NotFound {
                resource: "document",
            })?;

        let media_type = MediaType::from_mime(&document.media_type).ok_or_else(|| {
            EngineError::UnsupportedMediaType {
                declared: document.media_type.clone(),
            }
        })?;

        let _lease = LeaseSet::acquire(&self.leases, id)
            .ok_or(EngineError::ProcessingInFlight { id })?;

        let language = language.unwrap_or(&self.config.language);
        let start = Instant::now();
        info!(document = %id, media = %document.media_type, language, "processing started");

        self.db.update_document_state(id, DocumentState::Processing)?;

        match self.run_pipeline(&document, media_type, language).await {
            Ok(text) => {
                self.db.complete_document(id, &text)?;
                info!(
                    document = %id,
                    chars = text.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "processing finished"
                );
            }
            Err(e) => {
                error!(document = %id, "processing failed: {e}");
                if let Err(db_err) = self.db.fail_document(id) {
                    warn!(document = %id, "could not record failure: {db_err}");
                }
                return Err(e);
            }
        }

        self.db.get_document(id)?.ok_or(EngineError::Internal(
            "document vanished during processing".into(),
        ))
    }

    async fn run_pipeline(
        &self,
        document: &Document,
        media_type: MediaType,
        language: &str,
    ) -> Result<String, EngineError> {
        let bytes = match self.store.get(&document.storage_key) {
            Ok(bytes) => bytes,
            // the row exists, so a missing artifact is corruption, not a 404
            Err(EngineError::NotFound { .. }) => {
                return Err(EngineError::Internal(format!(
                    "artifact {} unreadable",
                    document.storage_key
                )))
            }
            Err(e) => return Err(e),
        };

        let units = raster::rasterize(document.id, bytes, media_type, &self.config).await?;
        let outcomes =
            recognize::recognize_pages(self.recognizer.as_ref(), units, language, &self.config)
                .await;

        let failed = outcomes.iter().filter(|o| o.text.is_err()).count();
        if failed > 0 {
            warn!(
                document = %document.id,
                failed,
                total = outcomes.len(),
                "some pages failed, placeholders emitted"
            );
        }

        Ok(assemble::assemble(outcomes))
    }
}
