//! Sentence assembly for streamed text
//!
//! Fragments are split where a lowercase ASCII letter and a full stop are
//! followed by a space or newline. Anything else (abbreviations, sentences
//! ending after a capital, digit or other punctuation) is not a boundary.
//! The trailing piece of a fragment that does not end on a boundary is carried
//! over and joined to the start of the next fragment.

use std::sync::LazyLock;

use regex::Regex;

/// A segment is complete when its last line ends in a lowercase letter and a full stop
static COMPLETE_SEGMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^.*[a-z]\.\n?$").expect("valid regex"));

/// Incrementally groups a text stream into complete sentences
#[derive(Debug, Default)]
pub struct SentenceChunker {
    pending: Option<String>,
}

impl SentenceChunker {
    #[must_use]
    pub const fn new() -> Self {
        Self { pending: None }
    }

    /// Feed one fragment, returning the sentence groups it completes
    pub fn feed(&mut self, fragment: &str) -> Vec<String> {
        let mut segments: Vec<String> = split_sentences(fragment)
            .into_iter()
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        if segments.is_empty() {
            return Vec::new();
        }

        if let Some(pending) = self.pending.take() {
            segments[0] = pending + &segments[0];
        }

        let complete = segments.last().is_some_and(|s| is_complete(s));
        let groups = if complete {
            vec![segments.join(" ")]
        } else if segments.len() > 1 {
            self.pending = segments.pop();
            vec![segments.join(" ")]
        } else {
            self.pending = segments.pop();
            Vec::new()
        };

        groups
            .into_iter()
            .map(|g| g.trim().to_string())
            .filter(|g| !g.is_empty())
            .collect()
    }

    /// Emit whatever is still held, complete or not
    pub fn flush(&mut self) -> Option<String> {
        let pending = self.pending.take()?;
        let trimmed = pending.trim();
        (!trimmed.is_empty()).then(|| trimmed.to_string())
    }

    /// Incomplete text held for the next fragment
    #[must_use]
    pub fn pending(&self) -> Option<&str> {
        self.pending.as_deref()
    }

    /// Drop any held text
    pub fn clear(&mut self) {
        self.pending = None;
    }
}

/// Split on `[ \n]` preceded by `[a-z].`, consuming the separator
fn split_sentences(text: &str) -> Vec<&str> {
    let bytes = text.as_bytes();
    let mut segments = Vec::new();
    let mut start = 0;

    for i in 2..bytes.len() {
        let separator = matches!(bytes[i], b' ' | b'\n');
        if separator && bytes[i - 1] == b'.' && bytes[i - 2].is_ascii_lowercase() {
            segments.push(&text[start..i]);
            start = i + 1;
        }
    }
    segments.push(&text[start..]);
    segments
}

fn is_complete(segment: &str) -> bool {
    COMPLETE_SEGMENT.is_match(segment)
}
