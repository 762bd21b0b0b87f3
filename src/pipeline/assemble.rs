//! Join per-page outcomes into one document text.
//!
//! Rules, in order:
//! * outcomes are sorted back into page order (recognition completes
//!   out of order under `buffer_unordered`)
//! * multi-page documents get a `--- Page N ---` marker before each page
//! * a failed page becomes an explicit bracketed placeholder, so readers
//!   (and the completion prompt) see that content is missing rather than
//!   silently losing it
//! * if not a single page produced text, the whole result collapses to
//!   [`NO_TEXT_SENTINEL`]

use crate::error::PageError;
use crate::pipeline::recognize::PageOutcome;
use once_cell::sync::Lazy;
use regex::Regex;

/// Stored when a run finishes without extracting any text at all.
pub const NO_TEXT_SENTINEL: &str = "No text could be extracted from the document.";

static EXCESS_BLANK_LINES: Lazy<Regex> = Lazy::new(|| {
    #[allow(clippy::unwrap_used)]
    Regex::new(r"\n{3,}").unwrap()
});

/// Assemble the final document text from page outcomes.
pub fn assemble(mut outcomes: Vec<PageOutcome>) -> String {
    outcomes.sort_by_key(|o| o.index);
    let multi_page = outcomes.len() > 1;

    let mut any_text = false;
    let mut sections = Vec::with_capacity(outcomes.len());

    for outcome in &outcomes {
        let body = match &outcome.text {
            Ok(text) => {
                let trimmed = text.trim();
                if !trimmed.is_empty() {
                    any_text = true;
                }
                trimmed.to_string()
            }
            Err(error) => placeholder(error),
        };

        if multi_page {
            sections.push(format!("--- Page {} ---\n\n{}", outcome.index + 1, body));
        } else {
            sections.push(body);
        }
    }

    if !any_text && outcomes.iter().all(|o| o.text.is_ok()) {
        return NO_TEXT_SENTINEL.to_string();
    }
    if outcomes.is_empty() {
        return NO_TEXT_SENTINEL.to_string();
    }

    let joined = sections.join("\n\n");
    EXCESS_BLANK_LINES.replace_all(&joined, "\n\n").into_owned()
}

fn placeholder(error: &PageError) -> String {
    format!("[This page could not be processed: {error}]")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(index: usize, text: &str) -> PageOutcome {
        PageOutcome {
            index,
            text: Ok(text.to_string()),
        }
    }

    fn failed(index: usize) -> PageOutcome {
        PageOutcome {
            index,
            text: Err(PageError::RecognitionFailed {
                page: index + 1,
                retries: 3,
                detail: "connection reset".into(),
            }),
        }
    }

    #[test]
    fn single_page_has_no_marker() {
        let text = assemble(vec![ok(0, "only page")]);
        assert_eq!(text, "only page");
    }

    #[test]
    fn multi_page_is_marked_and_ordered() {
        // arrival order is shuffled, output must be page order
        let text = assemble(vec![ok(2, "third"), ok(0, "first"), ok(1, "second")]);
        assert_eq!(
            text,
            "--- Page 1 ---\n\nfirst\n\n--- Page 2 ---\n\nsecond\n\n--- Page 3 ---\n\nthird"
        );
    }

    #[test]
    fn failed_page_becomes_placeholder() {
        let text = assemble(vec![ok(0, "fine"), failed(1)]);
        assert!(text.contains("--- Page 2 ---"));
        assert!(text.contains("[This page could not be processed:"));
        assert!(text.contains("fine"));
    }

    #[test]
    fn no_text_at_all_yields_sentinel() {
        let text = assemble(vec![ok(0, ""), ok(1, "   \n  ")]);
        assert_eq!(text, NO_TEXT_SENTINEL);
    }

    #[test]
    fn empty_run_yields_sentinel() {
        assert_eq!(assemble(Vec::new()), NO_TEXT_SENTINEL);
    }

    #[test]
    fn all_pages_failed_keeps_placeholders() {
        // placeholders are information; the sentinel would hide the cause
        let text = assemble(vec![failed(0), failed(1)]);
        assert!(text.contains("--- Page 1 ---"));
        assert!(text.contains("--- Page 2 ---"));
        assert_eq!(text.matches("could not be processed").count(), 2);
    }

    #[test]
    fn excess_blank_lines_are_collapsed() {
        let text = assemble(vec![ok(0, "a\n\n\n\n\nb"), ok(1, "c")]);
        assert!(!text.contains("\n\n\n"));
        assert!(text.contains("a\n\nb"));
    }
}
