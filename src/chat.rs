//! Conversations grounded in a processed document.
//!
//! Every operation takes the caller's `user_id` and collapses "does not
//! exist" and "not yours" into the same `NotFound`, so probing for other
//! users' resources reveals nothing.
//!
//! `send_message` turns run per-conversation serial: a small mutex map keyed
//! by conversation id queues concurrent sends so history never interleaves
//! mid-turn. Different conversations proceed in parallel.

use crate::completion::CompletionService;
use crate::db::Database;
use crate::error::EngineError;
use crate::model::{
    Conversation, ConversationSummary, ConversationView, Message, MessageRole,
    SendMessageOutcome,
};
use crate::prompts::grounded_prompt;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};
use uuid::Uuid;

/// Conversation operations over one database and completion service.
pub struct ConversationEngine<C: CompletionService> {
    db: Arc<Database>,
    completion: Arc<C>,
    turn_locks: Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>,
}

impl<C: CompletionService> ConversationEngine<C> {
    pub fn new(db: Arc<Database>, completion: Arc<C>) -> Self {
        Self {
            db,
            completion,
            turn_locks: Mutex::new(HashMap::new()),
        }
    }

    /// Start a conversation about one of the caller's documents.
    pub fn create_conversation(
        &self,
        user_id: &str,
        document_id: Uuid,
    ) -> Result<Conversation, EngineError> {
        self.db
            .get_document(document_id)?
            .filter(|d| d.user_id == user_id)
            .ok_or(EngineError::NotFound {
                resource: "document",
            })?;

        let conversation = Conversation::new(user_id, document_id);
        self.db.insert_conversation(&conversation)?;
        info!(conversation = %conversation.id, document = %document_id, "conversation created");
        Ok(conversation)
    }

    /// All of the caller's conversations, most recently active first.
    pub fn list_conversations(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConversationSummary>, EngineError> {
        self.db.list_conversations(user_id)
    }

    /// One conversation with its full ordered history and document context.
    pub fn get_conversation(
        &self,
        user_id: &str,
        id: Uuid,
    ) -> Result<ConversationView, EngineError> {
        let conversation = self.owned_conversation(user_id, id)?;
        let document = self
            .db
            .get_document(conversation.document_id)?
            .ok_or(EngineError::Internal("conversation without document".into()))?;
        let messages = self.db.messages_for(id)?;
        Ok(ConversationView {
            conversation,
            document_file_name: document.file_name,
            extracted_text: document.extracted_text,
            messages,
        })
    }

    /// One grounded turn: persist the user's message, ask the completion
    /// service, persist the reply.
    ///
    /// A completion failure is absorbed, not propagated: the user message
    /// stays in the history and the outcome carries the error string instead
    /// of an assistant message. Messaging a document that has no extracted
    /// text is rejected before anything is written.
    pub async fn send_message(
        &self,
        user_id: &str,
        conversation_id: Uuid,
        content: &str,
    ) -> Result<SendMessageOutcome, EngineError> {
        let turn_lock = self.turn_lock(conversation_id)?;
        let _turn = turn_lock.lock().await;

        let conversation = self.owned_conversation(user_id, conversation_id)?;
        let document = self
            .db
            .get_document(conversation.document_id)?
            .ok_or(EngineError::Internal("conversation without document".into()))?;

        let document_text = document
            .extracted_text
            .as_deref()
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                EngineError::BadRequest(
                    "document has no extracted text yet; process it first".into(),
                )
            })?;

        let user_message = Message::new(conversation_id, MessageRole::User, content);
        self.db.insert_message(&user_message)?;
        self.db.touch_conversation(conversation_id)?;

        // History includes the message just sent; the prompt ends on it.
        let history = self.db.messages_for(conversation_id)?;
        let prompt = grounded_prompt(document_text, &history);

        match self.completion.generate(&prompt).await {
            Ok(reply) => {
                let assistant_message =
                    Message::new(conversation_id, MessageRole::Assistant, reply);
                self.db.insert_message(&assistant_message)?;
                self.db.touch_conversation(conversation_id)?;
                Ok(SendMessageOutcome {
                    user_message,
                    assistant_message: Some(assistant_message),
                    error: None,
                })
            }
            Err(e) => {
                warn!(conversation = %conversation_id, "completion failed: {e}");
                Ok(SendMessageOutcome {
                    user_message,
                    assistant_message: None,
                    error: Some(e.to_string()),
                })
            }
        }
    }

    /// Delete a conversation and its messages.
    pub fn delete_conversation(&self, user_id: &str, id: Uuid) -> Result<(), EngineError> {
        self.owned_conversation(user_id, id)?;
        self.db.delete_conversation(id)?;
        if let Ok(mut locks) = self.turn_locks.lock() {
            locks.remove(&id);
        }
        info!(conversation = %id, "conversation deleted");
        Ok(())
    }

    fn owned_conversation(
        &self,
        user_id: &str,
        id: Uuid,
    ) -> Result<Conversation, EngineError> {
        self.db
            .get_conversation(id)?
            .filter(|c| c.user_id == user_id)
            .ok_or(EngineError::NotFound {
                resource: "conversation",
            })
    }

    fn turn_lock(&self, id: Uuid) -> Result<Arc<tokio::sync::Mutex<()>>, EngineError> {
        let mut locks = self
            .turn_locks
            .lock()
            .map_err(|_| EngineError::Internal("turn lock map poisoned".into()))?;
        Ok(Arc::clone(locks.entry(id).or_default()))
    }
}
