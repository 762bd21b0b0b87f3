//! Public facade: one [`DocEngine`] owning storage, the processing
//! orchestrator and the conversation engine.
//!
//! The engine is generic over its two external services so callers (and the
//! test suite) can wire in any [`Recognizer`] / [`CompletionService`] pair;
//! [`DocEngine::with_ollama`] builds the production pairing from config.

use crate::artifact::ArtifactStore;
use crate::chat::ConversationEngine;
use crate::completion::{CompletionService, OllamaCompletion};
use crate::config::EngineConfig;
use crate::db::Database;
use crate::error::EngineError;
use crate::model::{
    Conversation, ConversationSummary, ConversationView, Document, MediaType,
    SendMessageOutcome,
};
use crate::ocr::{OllamaOcr, Recognizer};
use crate::orchestrator::Orchestrator;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// The document-chat engine.
///
/// All operations are keyed by the caller's `user_id`; a resource owned by
/// another user behaves exactly like one that does not exist.
pub struct DocEngine<R: Recognizer, C: CompletionService> {
    db: Arc<Database>,
    store: Arc<ArtifactStore>,
    orchestrator: Orchestrator<R>,
    conversations: ConversationEngine<C>,
}

impl DocEngine<OllamaOcr, OllamaCompletion> {
    /// Open an engine wired to the configured Ollama-style endpoint.
    pub fn with_ollama(config: EngineConfig) -> Result<Self, EngineError> {
        let recognizer = OllamaOcr::new(&config)?;
        let completion = OllamaCompletion::new(&config)?;
        Self::open(config, recognizer, completion)
    }
}

impl<R: Recognizer, C: CompletionService> DocEngine<R, C> {
    /// Open an engine with explicit services. Creates the data directory,
    /// the artifact store and the database under `config.data_dir`.
    pub fn open(config: EngineConfig, recognizer: R, completion: C) -> Result<Self, EngineError> {
        std::fs::create_dir_all(&config.data_dir)
            .map_err(|e| EngineError::Storage(format!("create data dir: {e}")))?;

        let db = Arc::new(Database::open(config.data_dir.join("docuchat.db"))?);
        let store = Arc::new(ArtifactStore::open(config.data_dir.join("artifacts"))?);
        let orchestrator = Orchestrator::new(
            Arc::clone(&db),
            Arc::clone(&store),
            Arc::new(recognizer),
            config,
        );
        let conversations = ConversationEngine::new(Arc::clone(&db), Arc::new(completion));

        Ok(Self {
            db,
            store,
            orchestrator,
            conversations,
        })
    }

    // ── Documents ────────────────────────────────────────────────────────

    /// Accept an upload: validate the declared media type, store the bytes,
    /// record the document as `unprocessed`.
    pub fn upload_document(
        &self,
        user_id: &str,
        file_name: &str,
        declared_mime: &str,
        bytes: &[u8],
    ) -> Result<Document, EngineError> {
        let media_type = MediaType::from_mime(declared_mime).ok_or_else(|| {
            EngineError::UnsupportedMediaType {
                declared: declared_mime.to_string(),
            }
        })?;
        if bytes.is_empty() {
            return Err(EngineError::BadRequest("uploaded file is empty".into()));
        }

        let storage_key = self.store.put(bytes)?;
        let document = Document::new(
            user_id,
            file_name,
            storage_key,
            bytes.len() as u64,
            media_type,
        );
        self.db.insert_document(&document)?;
        info!(document = %document.id, file = file_name, size = bytes.len(), "document uploaded");
        Ok(document)
    }

    /// All of the caller's documents, newest upload first.
    pub fn list_documents(&self, user_id: &str) -> Result<Vec<Document>, EngineError> {
        self.db.list_documents(user_id)
    }

    pub fn get_document(&self, user_id: &str, id: Uuid) -> Result<Document, EngineError> {
        self.db
            .get_document(id)?
            .filter(|d| d.user_id == user_id)
            .ok_or(EngineError::NotFound {
                resource: "document",
            })
    }

    /// Delete a document, its conversations and their messages, and its
    /// stored artifact. The artifact removal is best-effort; the records are
    /// gone either way.
    pub fn delete_document(&self, user_id: &str, id: Uuid) -> Result<(), EngineError> {
        let document = self.get_document(user_id, id)?;
        self.db.delete_document(id)?;
        if let Err(e) = self.store.delete(&document.storage_key) {
            warn!(document = %id, "artifact cleanup failed: {e}");
        }
        Ok(())
    }

    /// Run (or re-run) text extraction. See
    /// [`Orchestrator::process_document`] for the state machine and errors.
    pub async fn process_document(
        &self,
        user_id: &str,
        id: Uuid,
        language: Option<&str>,
    ) -> Result<Document, EngineError> {
        self.orchestrator.process_document(id, user_id, language).await
    }

    // ── Conversations ────────────────────────────────────────────────────

    pub fn create_conversation(
        &self,
        user_id: &str,
        document_id: Uuid,
    ) -> Result<Conversation, EngineError> {
        self.conversations.create_conversation(user_id, document_id)
    }

    pub fn list_conversations(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConversationSummary>, EngineError> {
        self.conversations.list_conversations(user_id)
    }

    pub fn get_conversation(
        &self,
        user_id: &str,
        id: Uuid,
    ) -> Result<ConversationView, EngineError> {
        self.conversations.get_conversation(user_id, id)
    }

    pub async fn send_message(
        &self,
        user_id: &str,
        conversation_id: Uuid,
        content: &str,
    ) -> Result<SendMessageOutcome, EngineError> {
        self.conversations
            .send_message(user_id, conversation_id, content)
            .await
    }

    pub fn delete_conversation(&self, user_id: &str, id: Uuid) -> Result<(), EngineError> {
        self.conversations.delete_conversation(user_id, id)
    }
}
