//! Per-document summarization with bounded LLM input
//!
//! No single call to a [`Summarizer`] ever receives more than
//! `max_chunk_chars` characters of text:
//!
//! ```text
//! document ──► fits? ──yes──► summarize(document)
//!                │
//!                no
//!                ▼
//!   split into chunks ──► summarize(chunk_1) … summarize(chunk_n)
//!                                   │
//!                                   ▼
//!                  concatenate chunk summaries ──► (recurse)
//! ```
//!
//! Recursion stops at `max_reduce_depth`, after which the text is truncated
//! before the final call.

mod outline;

pub use outline::OutlineSummarizer;

use crate::config::SummarizerConfig;
use crate::error::{Error, Result};
use crate::types::{Document, SummaryRecord};
use chrono::{DateTime, Utc};

/// Suffix appended to the identity in the context of reduction calls.
pub const REDUCE_CONTEXT_SUFFIX: &str = " (combined summary)";

const EMPTY_NOTE_SUMMARY: &str = "Empty note.";

/// Text summarization collaborator.
pub trait Summarizer: Send + Sync {
    /// Summarize `text`; `context` names the document and chunk position.
    fn summarize(&self, text: &str, context: Option<&str>) -> Result<String>;
}

/// Summarize one changed document into a record stamped `created_at`.
///
/// The caller guarantees the document's fingerprint has no record yet. Any
/// collaborator failure or empty output is returned as an error and nothing
/// is recorded.
pub fn summarize_document(
    doc: &Document,
    summarizer: &dyn Summarizer,
    limits: &SummarizerConfig,
    created_at: DateTime<Utc>,
) -> Result<SummaryRecord> {
    let summary = if doc.content.trim().is_empty() {
        EMPTY_NOTE_SUMMARY.to_string()
    } else {
        summarize_bounded(summarizer, &doc.content, &doc.identity, limits, 0)?
    };

    Ok(SummaryRecord {
        identity: doc.identity.clone(),
        fingerprint: doc.fingerprint.clone(),
        summary,
        topics: Vec::new(),
        modified_at: doc.modified_at,
        created_at,
    })
}

fn summarize_bounded(
    summarizer: &dyn Summarizer,
    text: &str,
    identity: &str,
    limits: &SummarizerConfig,
    depth: usize,
) -> Result<String> {
    let max_chars = limits.max_chunk_chars.max(1);
    let context = if depth == 0 {
        identity.to_string()
    } else {
        format!("{identity}{REDUCE_CONTEXT_SUFFIX}")
    };

    if text.chars().count() <= max_chars {
        return call(summarizer, text, &context);
    }

    if depth >= limits.max_reduce_depth {
        tracing::warn!(
            identity = %identity,
            depth,
            "Reduction depth exhausted, truncating input"
        );
        return call(summarizer, truncate_chars(text, max_chars), &context);
    }

    let chunks = split_chunks(text, max_chars);
    let total = chunks.len();
    tracing::debug!(identity = %identity, depth, chunks = total, "Summarizing in chunks");

    let mut parts = Vec::with_capacity(total);
    for (i, chunk) in chunks.iter().enumerate() {
        let chunk_context = format!("{context} (part {} of {total})", i + 1);
        parts.push(call(summarizer, chunk, &chunk_context)?);
    }

    summarize_bounded(summarizer, &parts.join("\n\n"), identity, limits, depth + 1)
}

/// A call context split back into the parts [`summarize_document`] put in it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CallContext<'a> {
    pub identity: &'a str,
    /// Text is a set of earlier summaries, not note content
    pub reduce: bool,
    /// `(i, n)` for chunked calls
    pub part: Option<(usize, usize)>,
}

/// Parse a context string. Only the suffixes this module appends are
/// stripped, so parentheses inside a note name survive.
pub fn parse_context(context: &str) -> CallContext<'_> {
    let mut rest = context;
    let mut part = None;
    if let Some((head, tail)) = rest.rsplit_once(" (part ") {
        if let Some(position) = tail.strip_suffix(')').and_then(parse_part) {
            part = Some(position);
            rest = head;
        }
    }
    let (identity, reduce) = match rest.strip_suffix(REDUCE_CONTEXT_SUFFIX) {
        Some(identity) => (identity, true),
        None => (rest, false),
    };
    CallContext {
        identity,
        reduce,
        part,
    }
}

fn parse_part(text: &str) -> Option<(usize, usize)> {
    let (i, n) = text.split_once(" of ")?;
    Some((i.parse().ok()?, n.parse().ok()?))
}

fn call(summarizer: &dyn Summarizer, text: &str, context: &str) -> Result<String> {
    let output = summarizer.summarize(text, Some(context))?;
    let output = output.trim();
    if output.is_empty() {
        return Err(Error::Llm(format!("empty summary for {context}")));
    }
    Ok(output.to_string())
}

/// Split `text` into ordered chunks of at most `max_chars` characters.
///
/// A chunk ends at the last newline in its window when that newline is in
/// the window's second half; otherwise it is cut at the character limit.
pub fn split_chunks(text: &str, max_chars: usize) -> Vec<&str> {
    let max_chars = max_chars.max(1);
    let mut chunks = Vec::new();
    let mut rest = text;

    while !rest.is_empty() {
        let limit = match rest.char_indices().nth(max_chars) {
            Some((idx, _)) => idx,
            None => {
                chunks.push(rest);
                break;
            }
        };
        let cut = match rest[..limit].rfind('\n') {
            Some(nl) if nl + 1 >= limit / 2 => nl + 1,
            _ => limit,
        };
        chunks.push(&rest[..cut]);
        rest = &rest[cut..];
    }

    chunks
}

/// First `max_chars` characters of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
