//! End-to-end engine tests over mock recognition and completion services.
//!
//! Everything here is hermetic: an in-tempdir data directory, single-image
//! documents (so no pdfium library is needed) and in-process mocks. The one
//! test that exercises real PDF rasterisation is gated on `DOCUCHAT_E2E_PDF`
//! naming a PDF file, since it requires the pdfium shared library.

use docuchat::{
    CompletionService, DocEngine, DocumentState, EngineConfig, EngineError, ErrorKind,
    MessageRole, Recognizer,
};
use image::{DynamicImage, GrayImage, ImageFormat};
use std::io::Cursor;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ── Mock services ────────────────────────────────────────────────────────

#[derive(Default)]
struct MockRecognizer {
    calls: AtomicUsize,
    /// Text returned per call; the last entry repeats once exhausted.
    replies: Vec<String>,
    /// Hold each call open this long (single-flight tests).
    delay_ms: u64,
    fail: bool,
}

impl MockRecognizer {
    fn returning(text: &str) -> Self {
        Self {
            replies: vec![text.to_string()],
            ..Self::default()
        }
    }
}

impl Recognizer for MockRecognizer {
    async fn recognize(&self, _image: &[u8], _language: &str) -> Result<String, EngineError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail {
            return Err(EngineError::Upstream {
                service: "recognition",
                detail: "mock failure".into(),
            });
        }
        let idx = call.min(self.replies.len().saturating_sub(1));
        Ok(self
            .replies
            .get(idx)
            .cloned()
            .unwrap_or_else(|| "mock text".into()))
    }
}

#[derive(Default)]
struct MockCompletion {
    reply: String,
    fail: bool,
    /// Hold each call open this long (serialization tests).
    delay_ms: u64,
    /// Shared with the test so prompts can be inspected after the engine
    /// takes ownership of the mock.
    prompts: Arc<Mutex<Vec<String>>>,
}

impl MockCompletion {
    fn replying(reply: &str) -> Self {
        Self {
            reply: reply.to_string(),
            ..Self::default()
        }
    }

    fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    fn prompt_log(&self) -> Arc<Mutex<Vec<String>>> {
        Arc::clone(&self.prompts)
    }
}

impl CompletionService for MockCompletion {
    async fn generate(&self, prompt: &str) -> Result<String, EngineError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        if self.fail {
            return Err(EngineError::UpstreamTimeout {
                service: "completion",
                secs: 60,
            });
        }
        Ok(self.reply.clone())
    }
}

// ── Harness ──────────────────────────────────────────────────────────────

struct Harness {
    _dir: tempfile::TempDir,
    engine: DocEngine<MockRecognizer, MockCompletion>,
}

fn harness(recognizer: MockRecognizer, completion: MockCompletion) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let config = EngineConfig::builder()
        .data_dir(dir.path().join("data"))
        .max_retries(0)
        .retry_backoff_ms(1)
        .build()
        .unwrap();
    let engine = DocEngine::open(config, recognizer, completion).unwrap();
    Harness { _dir: dir, engine }
}

/// A small real PNG so the preprocessing stage has something to decode.
fn png_bytes() -> Vec<u8> {
    let image = DynamicImage::ImageLuma8(
        GrayImage::from_fn(8, 8, |x, y| image::Luma([((x + y) * 16) as u8])),
    );
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

// ── Document intake ──────────────────────────────────────────────────────

#[tokio::test]
async fn upload_rejects_unknown_media_type() {
    let h = harness(MockRecognizer::default(), MockCompletion::default());
    let err = h
        .engine
        .upload_document("alice", "archive.zip", "application/zip", b"PK")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedMediaType);
}

#[tokio::test]
async fn upload_rejects_empty_file() {
    let h = harness(MockRecognizer::default(), MockCompletion::default());
    let err = h
        .engine
        .upload_document("alice", "empty.png", "image/png", b"")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);
}

#[tokio::test]
async fn documents_are_scoped_to_their_owner() {
    let h = harness(MockRecognizer::default(), MockCompletion::default());
    let doc = h
        .engine
        .upload_document("alice", "scan.png", "image/png", &png_bytes())
        .unwrap();

    // Another user sees the same NotFound as for a random id.
    let err = h.engine.get_document("bob", doc.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = h
        .engine
        .get_document("bob", uuid::Uuid::new_v4())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(h.engine.list_documents("bob").unwrap().is_empty());
}

#[tokio::test]
async fn delete_document_removes_the_record() {
    let h = harness(MockRecognizer::default(), MockCompletion::default());
    let doc = h
        .engine
        .upload_document("alice", "scan.png", "image/png", &png_bytes())
        .unwrap();
    h.engine.delete_document("alice", doc.id).unwrap();
    let err = h.engine.get_document("alice", doc.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ── Processing ───────────────────────────────────────────────────────────

#[tokio::test]
async fn single_image_processes_to_extracted_text() {
    let h = harness(
        MockRecognizer::returning("Invoice total: $42"),
        MockCompletion::default(),
    );
    let doc = h
        .engine
        .upload_document("alice", "scan.png", "image/png", &png_bytes())
        .unwrap();
    assert_eq!(doc.state, DocumentState::Unprocessed);

    let doc = h.engine.process_document("alice", doc.id, None).await.unwrap();
    assert_eq!(doc.state, DocumentState::Processed);
    // one image page: no page marker
    assert_eq!(doc.extracted_text.as_deref(), Some("Invoice total: $42"));
}

#[tokio::test]
async fn reprocessing_overwrites_previous_text() {
    let h = harness(
        MockRecognizer {
            replies: vec!["first run".into(), "second run".into()],
            ..MockRecognizer::default()
        },
        MockCompletion::default(),
    );
    let doc = h
        .engine
        .upload_document("alice", "scan.png", "image/png", &png_bytes())
        .unwrap();

    let doc = h.engine.process_document("alice", doc.id, None).await.unwrap();
    assert_eq!(doc.extracted_text.as_deref(), Some("first run"));

    let doc = h.engine.process_document("alice", doc.id, None).await.unwrap();
    assert_eq!(doc.state, DocumentState::Processed);
    assert_eq!(doc.extracted_text.as_deref(), Some("second run"));
}

#[tokio::test]
async fn processing_a_foreign_document_is_not_found() {
    let h = harness(MockRecognizer::default(), MockCompletion::default());
    let doc = h
        .engine
        .upload_document("alice", "scan.png", "image/png", &png_bytes())
        .unwrap();
    let err = h
        .engine
        .process_document("bob", doc.id, None)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn concurrent_processing_conflicts() {
    let h = harness(
        MockRecognizer {
            replies: vec!["slow text".into()],
            delay_ms: 300,
            ..MockRecognizer::default()
        },
        MockCompletion::default(),
    );
    let doc = h
        .engine
        .upload_document("alice", "scan.png", "image/png", &png_bytes())
        .unwrap();

    let engine = Arc::new(h.engine);
    let first = {
        let engine = Arc::clone(&engine);
        let id = doc.id;
        tokio::spawn(async move { engine.process_document("alice", id, None).await })
    };
    // let the first run claim its lease
    tokio::time::sleep(Duration::from_millis(100)).await;

    let second = engine.process_document("alice", doc.id, None).await;
    assert_eq!(second.unwrap_err().kind(), ErrorKind::Conflict);

    let first = first.await.unwrap().unwrap();
    assert_eq!(first.state, DocumentState::Processed);
    assert_eq!(first.extracted_text.as_deref(), Some("slow text"));

    // lease released: a follow-up run is allowed again
    let again = engine.process_document("alice", doc.id, None).await.unwrap();
    assert_eq!(again.state, DocumentState::Processed);
}

#[tokio::test]
async fn all_pages_failing_still_completes_with_placeholder() {
    let h = harness(
        MockRecognizer {
            fail: true,
            ..MockRecognizer::default()
        },
        MockCompletion::default(),
    );
    let doc = h
        .engine
        .upload_document("alice", "scan.png", "image/png", &png_bytes())
        .unwrap();

    // page failures degrade the text, they don't fail the run
    let doc = h.engine.process_document("alice", doc.id, None).await.unwrap();
    assert_eq!(doc.state, DocumentState::Processed);
    let text = doc.extracted_text.unwrap();
    assert!(text.contains("could not be processed"), "got: {text}");
}

// ── Conversations ────────────────────────────────────────────────────────

async fn processed_doc(h: &Harness) -> docuchat::Document {
    let doc = h
        .engine
        .upload_document("alice", "scan.png", "image/png", &png_bytes())
        .unwrap();
    h.engine.process_document("alice", doc.id, None).await.unwrap()
}

#[tokio::test]
async fn conversation_requires_an_owned_document() {
    let h = harness(MockRecognizer::default(), MockCompletion::default());
    let doc = h
        .engine
        .upload_document("alice", "scan.png", "image/png", &png_bytes())
        .unwrap();

    let err = h.engine.create_conversation("bob", doc.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(h.engine.create_conversation("alice", doc.id).is_ok());
}

#[tokio::test]
async fn send_message_on_unprocessed_document_writes_nothing() {
    let h = harness(MockRecognizer::default(), MockCompletion::replying("hi"));
    let doc = h
        .engine
        .upload_document("alice", "scan.png", "image/png", &png_bytes())
        .unwrap();
    let conv = h.engine.create_conversation("alice", doc.id).unwrap();

    let err = h
        .engine
        .send_message("alice", conv.id, "anyone there?")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::BadRequest);

    // rejected before persisting: the history stays empty
    let view = h.engine.get_conversation("alice", conv.id).unwrap();
    assert!(view.messages.is_empty());
}

#[tokio::test]
async fn send_message_round_trip_grounds_the_prompt() {
    let completion = MockCompletion::replying("The invoice total is $42.");
    let prompt_log = completion.prompt_log();
    let h = harness(
        MockRecognizer::returning("The total is $42. Due 2024-06-01."),
        completion,
    );
    let doc = processed_doc(&h).await;
    let conv = h.engine.create_conversation("alice", doc.id).unwrap();

    let outcome = h
        .engine
        .send_message("alice", conv.id, "What is the total?")
        .await
        .unwrap();
    assert_eq!(outcome.user_message.content, "What is the total?");
    let reply = outcome.assistant_message.unwrap();
    assert_eq!(reply.content, "The invoice total is $42.");
    assert!(outcome.error.is_none());

    // the prompt carried the document text and the user's turn
    let prompts = prompt_log.lock().unwrap();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains("The total is $42."));
    assert!(prompts[0].contains("User: What is the total?"));
    assert!(prompts[0].ends_with("Assistant: "));
    drop(prompts);

    let view = h.engine.get_conversation("alice", conv.id).unwrap();
    let roles: Vec<_> = view.messages.iter().map(|m| m.role).collect();
    assert_eq!(roles, [MessageRole::User, MessageRole::Assistant]);
}

#[tokio::test]
async fn completion_failure_keeps_the_user_message() {
    let h = harness(
        MockRecognizer::returning("document body"),
        MockCompletion::failing(),
    );
    let doc = processed_doc(&h).await;
    let conv = h.engine.create_conversation("alice", doc.id).unwrap();

    let outcome = h
        .engine
        .send_message("alice", conv.id, "hello?")
        .await
        .unwrap();
    assert!(outcome.assistant_message.is_none());
    assert!(outcome.error.as_deref().unwrap().contains("timed out"));

    let view = h.engine.get_conversation("alice", conv.id).unwrap();
    assert_eq!(view.messages.len(), 1);
    assert_eq!(view.messages[0].role, MessageRole::User);
    assert_eq!(view.messages[0].content, "hello?");
}

#[tokio::test]
async fn history_stays_in_send_order_across_turns() {
    let h = harness(
        MockRecognizer::returning("document body"),
        MockCompletion::replying("ack"),
    );
    let doc = processed_doc(&h).await;
    let conv = h.engine.create_conversation("alice", doc.id).unwrap();

    for question in ["one", "two", "three"] {
        h.engine.send_message("alice", conv.id, question).await.unwrap();
    }

    let view = h.engine.get_conversation("alice", conv.id).unwrap();
    let contents: Vec<_> = view.messages.iter().map(|m| m.content.as_str()).collect();
    assert_eq!(contents, ["one", "ack", "two", "ack", "three", "ack"]);
}

#[tokio::test]
async fn concurrent_sends_are_serialized_per_conversation() {
    let h = harness(
        MockRecognizer::returning("document body"),
        MockCompletion {
            reply: "ack".into(),
            delay_ms: 150,
            ..MockCompletion::default()
        },
    );
    let doc = processed_doc(&h).await;
    let conv = h.engine.create_conversation("alice", doc.id).unwrap();

    let engine = Arc::new(h.engine);
    let mut turns = Vec::new();
    for question in ["first question", "second question"] {
        let engine = Arc::clone(&engine);
        let id = conv.id;
        turns.push(tokio::spawn(async move {
            engine.send_message("alice", id, question).await
        }));
    }
    for turn in turns {
        let outcome = turn.await.unwrap().unwrap();
        assert!(outcome.assistant_message.is_some());
    }

    // each user turn is followed directly by its reply, never interleaved
    let view = engine.get_conversation("alice", conv.id).unwrap();
    let roles: Vec<_> = view.messages.iter().map(|m| m.role).collect();
    assert_eq!(
        roles,
        [
            MessageRole::User,
            MessageRole::Assistant,
            MessageRole::User,
            MessageRole::Assistant,
        ]
    );
    let mut questions: Vec<_> = [0, 2]
        .iter()
        .map(|&i| view.messages[i].content.as_str())
        .collect();
    questions.sort_unstable();
    assert_eq!(questions, ["first question", "second question"]);
    assert!(view.messages[1].content == "ack" && view.messages[3].content == "ack");
}

#[tokio::test]
async fn delete_document_with_active_conversation() {
    let h = harness(
        MockRecognizer::returning("document body"),
        MockCompletion::replying("ack"),
    );
    let doc = processed_doc(&h).await;
    let conv = h.engine.create_conversation("alice", doc.id).unwrap();
    h.engine.send_message("alice", conv.id, "hi").await.unwrap();

    h.engine.delete_document("alice", doc.id).unwrap();

    let err = h.engine.get_document("alice", doc.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    let err = h.engine.get_conversation("alice", conv.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(h.engine.list_conversations("alice").unwrap().is_empty());
}

#[tokio::test]
async fn list_conversations_previews_and_scopes() {
    let h = harness(
        MockRecognizer::returning("document body"),
        MockCompletion::replying("latest reply"),
    );
    let doc = processed_doc(&h).await;
    let conv = h.engine.create_conversation("alice", doc.id).unwrap();
    h.engine.send_message("alice", conv.id, "question").await.unwrap();

    let summaries = h.engine.list_conversations("alice").unwrap();
    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].document_file_name, "scan.png");
    assert_eq!(
        summaries[0].last_message.as_ref().unwrap().content,
        "latest reply"
    );

    assert!(h.engine.list_conversations("bob").unwrap().is_empty());
}

#[tokio::test]
async fn delete_conversation_removes_history() {
    let h = harness(
        MockRecognizer::returning("document body"),
        MockCompletion::replying("ack"),
    );
    let doc = processed_doc(&h).await;
    let conv = h.engine.create_conversation("alice", doc.id).unwrap();
    h.engine.send_message("alice", conv.id, "hi").await.unwrap();

    let err = h.engine.delete_conversation("bob", conv.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    h.engine.delete_conversation("alice", conv.id).unwrap();
    let err = h.engine.get_conversation("alice", conv.id).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
}

// ── Real-PDF end-to-end (opt-in) ─────────────────────────────────────────

/// Requires the pdfium shared library and `DOCUCHAT_E2E_PDF=<path to pdf>`.
#[tokio::test]
async fn e2e_pdf_processing() {
    let Ok(path) = std::env::var("DOCUCHAT_E2E_PDF") else {
        eprintln!("skipping: DOCUCHAT_E2E_PDF not set");
        return;
    };
    let bytes = std::fs::read(&path).unwrap();

    let h = harness(
        MockRecognizer::returning("scanned page text"),
        MockCompletion::default(),
    );
    let doc = h
        .engine
        .upload_document("alice", "sample.pdf", "application/pdf", &bytes)
        .unwrap();
    let doc = h.engine.process_document("alice", doc.id, None).await.unwrap();
    assert_eq!(doc.state, DocumentState::Processed);
    assert!(!doc.extracted_text.unwrap().is_empty());
}
