//! SQLite persistence for documents, conversations and messages.
//!
//! A single [`Database`] wraps one `rusqlite::Connection` behind a mutex.
//! Every method takes `&self`, acquires the lock, runs its statements and
//! returns plain model types — no connection or statement handles escape.
//! Timestamps are stored as fixed-width RFC 3339 strings (microsecond
//! precision, UTC `Z` suffix) so string comparison matches chronological
//! order; insertion order within a table is recovered from `rowid`.

use crate::error::EngineError;
use crate::model::{
    Conversation, ConversationSummary, Document, DocumentState, Message, MessageRole,
};
use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::Mutex;
use uuid::Uuid;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS documents (
    id              TEXT PRIMARY KEY,
    user_id         TEXT NOT NULL,
    file_name       TEXT NOT NULL,
    storage_key     TEXT NOT NULL,
    file_size       INTEGER NOT NULL,
    media_type      TEXT NOT NULL,
    state           TEXT NOT NULL,
    extracted_text  TEXT,
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_documents_user ON documents(user_id);

CREATE TABLE IF NOT EXISTS conversations (
    id              TEXT PRIMARY KEY,
    user_id         TEXT NOT NULL,
    document_id     TEXT NOT NULL REFERENCES documents(id),
    created_at      TEXT NOT NULL,
    updated_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_conversations_user ON conversations(user_id);

CREATE TABLE IF NOT EXISTS messages (
    id              TEXT PRIMARY KEY,
    conversation_id TEXT NOT NULL REFERENCES conversations(id),
    role            TEXT NOT NULL,
    content         TEXT NOT NULL,
    created_at      TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_messages_conversation ON messages(conversation_id);
";

/// Handle to the engine's SQLite database.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open (creating if needed) the database at `path` and apply the schema.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, EngineError> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL; PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// In-memory database, used by tests.
    pub fn open_in_memory() -> Result<Self, EngineError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, EngineError> {
        self.conn
            .lock()
            .map_err(|_| EngineError::Internal("database mutex poisoned".into()))
    }

    // ── Documents ────────────────────────────────────────────────────────

    pub fn insert_document(&self, doc: &Document) -> Result<(), EngineError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO documents
                 (id, user_id, file_name, storage_key, file_size, media_type,
                  state, extracted_text, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                doc.id.to_string(),
                doc.user_id,
                doc.file_name,
                doc.storage_key,
                doc.file_size as i64,
                doc.media_type,
                doc.state.as_str(),
                doc.extracted_text,
                fmt_ts(doc.created_at),
                fmt_ts(doc.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_document(&self, id: Uuid) -> Result<Option<Document>, EngineError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, user_id, file_name, storage_key, file_size, media_type,
                    state, extracted_text, created_at, updated_at
             FROM documents WHERE id = ?1",
            params![id.to_string()],
            row_to_document,
        )
        .optional()
        .map_err(Into::into)
    }

    /// All documents owned by `user_id`, newest upload first.
    pub fn list_documents(&self, user_id: &str) -> Result<Vec<Document>, EngineError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, file_name, storage_key, file_size, media_type,
                    state, extracted_text, created_at, updated_at
             FROM documents WHERE user_id = ?1 ORDER BY rowid DESC",
        )?;
        let rows = stmt.query_map(params![user_id], row_to_document)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }

    pub fn update_document_state(
        &self,
        id: Uuid,
        state: DocumentState,
    ) -> Result<(), EngineError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE documents SET state = ?2, updated_at = ?3 WHERE id = ?1",
            params![id.to_string(), state.as_str(), fmt_ts(Utc::now())],
        )?;
        Ok(())
    }

    /// Finish a processing run: set `processed` and overwrite the text in one
    /// statement, so no reader ever sees the new state with stale text.
    pub fn complete_document(&self, id: Uuid, text: &str) -> Result<(), EngineError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE documents
             SET state = 'processed', extracted_text = ?2, updated_at = ?3
             WHERE id = ?1",
            params![id.to_string(), text, fmt_ts(Utc::now())],
        )?;
        Ok(())
    }

    /// Mark a run as failed. Any text from a previous successful run is kept.
    pub fn fail_document(&self, id: Uuid) -> Result<(), EngineError> {
        self.update_document_state(id, DocumentState::Failed)
    }

    /// Delete a document together with its conversations and their messages
    /// in one transaction, so the foreign keys never block the delete.
    pub fn delete_document(&self, id: Uuid) -> Result<(), EngineError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM messages WHERE conversation_id IN
                 (SELECT id FROM conversations WHERE document_id = ?1)",
            params![id.to_string()],
        )?;
        tx.execute(
            "DELETE FROM conversations WHERE document_id = ?1",
            params![id.to_string()],
        )?;
        tx.execute("DELETE FROM documents WHERE id = ?1", params![id.to_string()])?;
        tx.commit()?;
        Ok(())
    }

    // ── Conversations ────────────────────────────────────────────────────

    pub fn insert_conversation(&self, conv: &Conversation) -> Result<(), EngineError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO conversations (id, user_id, document_id, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                conv.id.to_string(),
                conv.user_id,
                conv.document_id.to_string(),
                fmt_ts(conv.created_at),
                fmt_ts(conv.updated_at),
            ],
        )?;
        Ok(())
    }

    pub fn get_conversation(&self, id: Uuid) -> Result<Option<Conversation>, EngineError> {
        let conn = self.lock()?;
        conn.query_row(
            "SELECT id, user_id, document_id, created_at, updated_at
             FROM conversations WHERE id = ?1",
            params![id.to_string()],
            row_to_conversation,
        )
        .optional()
        .map_err(Into::into)
    }

    /// All conversations owned by `user_id`, most recently active first, each
    /// with the linked document's file name and the latest message as a
    /// preview.
    pub fn list_conversations(
        &self,
        user_id: &str,
    ) -> Result<Vec<ConversationSummary>, EngineError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT c.id, c.user_id, c.document_id, c.created_at, c.updated_at,
                    d.file_name
             FROM conversations c
             JOIN documents d ON d.id = c.document_id
             WHERE c.user_id = ?1
             ORDER BY c.updated_at DESC",
        )?;
        let rows = stmt.query_map(params![user_id], |row| {
            Ok((row_to_conversation(row)?, row.get::<_, String>(5)?))
        })?;
        let pairs = rows.collect::<Result<Vec<_>, _>>()?;

        let mut latest = conn.prepare(
            "SELECT id, conversation_id, role, content, created_at
             FROM messages WHERE conversation_id = ?1
             ORDER BY rowid DESC LIMIT 1",
        )?;
        let mut summaries = Vec::with_capacity(pairs.len());
        for (conversation, document_file_name) in pairs {
            let last_message = latest
                .query_row(params![conversation.id.to_string()], row_to_message)
                .optional()?;
            summaries.push(ConversationSummary {
                conversation,
                document_file_name,
                last_message,
            });
        }
        Ok(summaries)
    }

    /// Bump a conversation's activity timestamp.
    pub fn touch_conversation(&self, id: Uuid) -> Result<(), EngineError> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE conversations SET updated_at = ?2 WHERE id = ?1",
            params![id.to_string(), fmt_ts(Utc::now())],
        )?;
        Ok(())
    }

    /// Delete a conversation and its messages atomically.
    pub fn delete_conversation(&self, id: Uuid) -> Result<(), EngineError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM messages WHERE conversation_id = ?1",
            params![id.to_string()],
        )?;
        tx.execute(
            "DELETE FROM conversations WHERE id = ?1",
            params![id.to_string()],
        )?;
        tx.commit()?;
        Ok(())
    }

    // ── Messages ─────────────────────────────────────────────────────────

    pub fn insert_message(&self, msg: &Message) -> Result<(), EngineError> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO messages (id, conversation_id, role, content, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                msg.id.to_string(),
                msg.conversation_id.to_string(),
                msg.role.as_str(),
                msg.content,
                fmt_ts(msg.created_at),
            ],
        )?;
        Ok(())
    }

    /// Full history of a conversation in send order.
    pub fn messages_for(&self, conversation_id: Uuid) -> Result<Vec<Message>, EngineError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT id, conversation_id, role, content, created_at
             FROM messages WHERE conversation_id = ?1 ORDER BY rowid",
        )?;
        let rows = stmt.query_map(params![conversation_id.to_string()], row_to_message)?;
        rows.collect::<Result<Vec<_>, _>>().map_err(Into::into)
    }
}

// ── Row mapping ──────────────────────────────────────────────────────────

fn row_to_document(row: &Row<'_>) -> rusqlite::Result<Document> {
    Ok(Document {
        id: parse_uuid(row, 0)?,
        user_id: row.get(1)?,
        file_name: row.get(2)?,
        storage_key: row.get(3)?,
        file_size: row.get::<_, i64>(4)? as u64,
        media_type: row.get(5)?,
        state: {
            let s: String = row.get(6)?;
            DocumentState::parse(&s).ok_or_else(|| bad_column(6, &s))?
        },
        extracted_text: row.get(7)?,
        created_at: parse_ts_column(row, 8)?,
        updated_at: parse_ts_column(row, 9)?,
    })
}

fn row_to_conversation(row: &Row<'_>) -> rusqlite::Result<Conversation> {
    Ok(Conversation {
        id: parse_uuid(row, 0)?,
        user_id: row.get(1)?,
        document_id: parse_uuid(row, 2)?,
        created_at: parse_ts_column(row, 3)?,
        updated_at: parse_ts_column(row, 4)?,
    })
}

fn row_to_message(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: parse_uuid(row, 0)?,
        conversation_id: parse_uuid(row, 1)?,
        role: {
            let s: String = row.get(2)?;
            MessageRole::parse(&s).ok_or_else(|| bad_column(2, &s))?
        },
        content: row.get(3)?,
        created_at: parse_ts_column(row, 4)?,
    })
}

fn parse_uuid(row: &Row<'_>, idx: usize) -> rusqlite::Result<Uuid> {
    let s: String = row.get(idx)?;
    Uuid::parse_str(&s).map_err(|_| bad_column(idx, &s))
}

fn parse_ts_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<DateTime<Utc>> {
    let s: String = row.get(idx)?;
    parse_ts(&s).ok_or_else(|| bad_column(idx, &s))
}

fn bad_column(idx: usize, value: &str) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        idx,
        rusqlite::types::Type::Text,
        format!("invalid value '{value}'").into(),
    )
}

/// Fixed-width RFC 3339 with microseconds, e.g. `2024-06-01T12:00:00.000000Z`.
fn fmt_ts(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_ts(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
