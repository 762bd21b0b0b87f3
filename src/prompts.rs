//! Prompt construction for the recognition and completion services.
//!
//! Centralising every prompt here serves two purposes:
//!
//! 1. **Single source of truth** — changing how replies are grounded in the
//!    document requires editing exactly one place.
//!
//! 2. **Testability** — unit tests can inspect the assembled prompt directly
//!    without a live endpoint, so prompt regressions are easy to catch.

use crate::model::{Message, MessageRole};

/// System preamble for grounded replies. `{document}` is substituted with the
/// full extracted text before use.
pub const GROUNDED_PREAMBLE: &str = "\
You are a helpful assistant analyzing a document.
Here is the document content that you should reference when answering questions:

{document}

When answering, refer to specific parts of the document if relevant.
If the question cannot be answered based on the document, politely explain that
the information is not available in the document.";

/// Instruction sent to the vision model for page recognition.
/// `{language}` is substituted with the requested language code.
pub const RECOGNITION_PROMPT: &str = "\
Extract all visible text from this page image, exactly as written, preserving \
line breaks and reading order. The text language is '{language}'. Output only \
the extracted text with no commentary.";

/// Build the completion prompt for one conversation turn.
///
/// Layout follows the transcript format the completion endpoint expects:
/// the grounding preamble with the full document text, then every prior turn
/// prefixed with its role, terminated with a bare `Assistant: ` cue.
pub fn grounded_prompt(document_text: &str, history: &[Message]) -> String {
    let mut prompt = GROUNDED_PREAMBLE.replace("{document}", document_text);
    prompt.push_str("\n\n");
    for message in history {
        let prefix = match message.role {
            MessageRole::User => "User: ",
            MessageRole::Assistant => "Assistant: ",
        };
        prompt.push_str(prefix);
        prompt.push_str(&message.content);
        prompt.push('\n');
    }
    prompt.push_str("Assistant: ");
    prompt
}

/// Build the recognition prompt for the given language code.
pub fn recognition_prompt(language: &str) -> String {
    RECOGNITION_PROMPT.replace("{language}", language)
}
