//! Offline heuristic summarizer
//!
//! Used when no LLM is configured. Output is deterministic, which also makes
//! it convenient for end-to-end tests.

use super::{parse_context, Summarizer};
use crate::error::Result;
use crate::types::file_name;

const TOPIC_PREVIEW_CHARS: usize = 50;
const REDUCED_MAX_CHARS: usize = 400;

/// Describes a note by its first line and size.
#[derive(Debug, Default, Clone, Copy)]
pub struct OutlineSummarizer;

impl OutlineSummarizer {
    pub fn new() -> Self {
        Self
    }
}

impl Summarizer for OutlineSummarizer {
    fn summarize(&self, text: &str, context: Option<&str>) -> Result<String> {
        let context = parse_context(context.unwrap_or("note"));

        if context.reduce {
            return Ok(reduce(text));
        }

        let lines: Vec<&str> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .collect();
        let Some(first) = lines.first() else {
            return Ok("Empty note.".to_string());
        };

        let topic: String = first
            .trim_start_matches('#')
            .trim()
            .chars()
            .take(TOPIC_PREVIEW_CHARS)
            .collect();

        Ok(format!(
            "Note '{}' update. Main topic seems to be about '{}...'. Contains {} lines of text.",
            file_name(context.identity),
            topic,
            lines.len()
        ))
    }
}

/// Keep the first sentence of each part, dropping repeats.
fn reduce(text: &str) -> String {
    let mut sentences: Vec<&str> = Vec::new();
    for part in text.split("\n\n") {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }
        let first = match part.find(". ") {
            Some(idx) => &part[..=idx],
            None => part,
        };
        if !sentences.contains(&first) {
            sentences.push(first);
        }
    }
    let joined = sentences.join(" ");
    super::truncate_chars(&joined, REDUCED_MAX_CHARS).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outline_describes_first_line() {
        let summary = OutlineSummarizer
            .summarize("# Roadmap\n\nShip the parser\n", Some("Projects/roadmap.md"))
            .unwrap();
        assert_eq!(
            summary,
            "Note 'roadmap.md' update. Main topic seems to be about 'Roadmap...'. Contains 2 lines of text."
        );
    }

    #[test]
    fn test_outline_uses_name_from_chunk_context() {
        let summary = OutlineSummarizer
            .summarize("hello", Some("Daily/2026-10-12.md (part 2 of 3)"))
            .unwrap();
        assert!(summary.starts_with("Note '2026-10-12.md' update."));
    }

    #[test]
    fn test_parenthesized_and_marker_like_names_are_outlined() {
        let summary = OutlineSummarizer
            .summarize("Agenda\nitems", Some("Meetings/combined summary.md"))
            .unwrap();
        assert!(summary.starts_with("Note 'combined summary.md' update."));

        let summary = OutlineSummarizer
            .summarize("Draft", Some("Projects/plan (draft).md (part 1 of 2)"))
            .unwrap();
        assert!(summary.starts_with("Note 'plan (draft).md' update."));
    }

    #[test]
    fn test_reduction_keeps_first_sentences() {
        let parts = "Note 'a.md' update. Main topic one.\n\nNote 'a.md' update. Main topic two.";
        let reduced = OutlineSummarizer
            .summarize(parts, Some("a.md (combined summary)"))
            .unwrap();
        assert_eq!(reduced, "Note 'a.md' update.");
    }
}
