//! Record types shared across the engine: documents, conversations, messages.
//!
//! These are the shapes persisted by [`crate::db`] and returned from the
//! engine's public operations. They carry no behaviour beyond construction
//! helpers and the closed media-type mapping — all mutation goes through the
//! orchestrator and conversation engine.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ── Documents ────────────────────────────────────────────────────────────

/// Processing lifecycle of a document.
///
/// `Unprocessed → Processing → {Processed, Failed}`. Re-processing a
/// `Processed` or `Failed` document is always permitted and re-enters
/// `Processing`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentState {
    Unprocessed,
    Processing,
    Processed,
    Failed,
}

impl DocumentState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentState::Unprocessed => "unprocessed",
            DocumentState::Processing => "processing",
            DocumentState::Processed => "processed",
            DocumentState::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "unprocessed" => Some(DocumentState::Unprocessed),
            "processing" => Some(DocumentState::Processing),
            "processed" => Some(DocumentState::Processed),
            "failed" => Some(DocumentState::Failed),
            _ => None,
        }
    }
}

/// The closed set of media types the pipeline accepts.
///
/// Unknown types are rejected at upload intake, not deep in the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Pdf,
    Jpeg,
    Png,
    Tiff,
}

/// How a media type is decomposed into page units.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessingStrategy {
    /// Multi-page: extract embedded text or rasterise page by page.
    PdfDocument,
    /// Single page: the stored bytes are the one page image.
    SingleImage,
}

impl MediaType {
    /// Parse a declared MIME type. Returns `None` for anything outside the
    /// supported set.
    pub fn from_mime(mime: &str) -> Option<Self> {
        match mime {
            "application/pdf" => Some(MediaType::Pdf),
            "image/jpeg" => Some(MediaType::Jpeg),
            "image/png" => Some(MediaType::Png),
            "image/tiff" => Some(MediaType::Tiff),
            _ => None,
        }
    }

    pub fn as_mime(&self) -> &'static str {
        match self {
            MediaType::Pdf => "application/pdf",
            MediaType::Jpeg => "image/jpeg",
            MediaType::Png => "image/png",
            MediaType::Tiff => "image/tiff",
        }
    }

    /// Total mapping from media type to processing strategy.
    pub fn strategy(&self) -> ProcessingStrategy {
        match self {
            MediaType::Pdf => ProcessingStrategy::PdfDocument,
            MediaType::Jpeg | MediaType::Png | MediaType::Tiff => ProcessingStrategy::SingleImage,
        }
    }
}

/// An uploaded document and its processing state.
///
/// `media_type` holds the declared MIME string as uploaded; it is validated
/// against [`MediaType`] at intake and again when processing starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub user_id: String,
    pub file_name: String,
    /// Artifact store key for the uploaded bytes.
    pub storage_key: String,
    pub file_size: u64,
    pub media_type: String,
    pub state: DocumentState,
    /// Assembled, page-delimited text. `None` until a run completes.
    pub extracted_text: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Document {
    pub fn new(
        user_id: impl Into<String>,
        file_name: impl Into<String>,
        storage_key: impl Into<String>,
        file_size: u64,
        media_type: MediaType,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            file_name: file_name.into(),
            storage_key: storage_key.into(),
            file_size,
            media_type: media_type.as_mime().to_string(),
            state: DocumentState::Unprocessed,
            extracted_text: None,
            created_at: now,
            updated_at: now,
        }
    }
}

// ── Conversations ────────────────────────────────────────────────────────

/// Who authored a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            _ => None,
        }
    }
}

/// A chat thread bound to exactly one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: Uuid,
    pub user_id: String,
    pub document_id: Uuid,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Conversation {
    pub fn new(user_id: impl Into<String>, document_id: Uuid) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            document_id,
            created_at: now,
            updated_at: now,
        }
    }
}

/// One immutable turn in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: Uuid,
    pub conversation_id: Uuid,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
}

impl Message {
    pub fn new(conversation_id: Uuid, role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            conversation_id,
            role,
            content: content.into(),
            created_at: Utc::now(),
        }
    }
}

// ── Composite views ──────────────────────────────────────────────────────

/// List entry: a conversation with its latest message as a preview.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub conversation: Conversation,
    pub document_file_name: String,
    pub last_message: Option<Message>,
}

/// Full view: ordered history plus the linked document's text.
#[derive(Debug, Clone, Serialize)]
pub struct ConversationView {
    pub conversation: Conversation,
    pub document_file_name: String,
    pub extracted_text: Option<String>,
    pub messages: Vec<Message>,
}

/// Result of a `send_message` turn.
///
/// The user message is always present (and persisted). The assistant message
/// is absent when the completion service failed; `error` then describes the
/// failure without rolling the turn back.
#[derive(Debug, Clone, Serialize)]
pub struct SendMessageOutcome {
    pub user_message: Message,
    pub assistant_message: Option<Message>,
    pub error: Option<String>,
}
