//! Read-only preview of recently modified notes
//!
//! Lists what a scan would look at, with a short content snippet, without
//! touching the summary log or calling any collaborator.

use crate::error::Result;
use crate::ingest::{read_text, FsVault};
use chrono::{DateTime, Utc};
use std::fmt;

const SNIPPET_CHARS: usize = 500;
/// Creation and modification closer than this count as a new note.
const CREATED_WINDOW_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Created,
    Modified,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Created => f.write_str("Created"),
            ChangeKind::Modified => f.write_str("Modified"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PreviewEntry {
    pub identity: String,
    pub modified_at: DateTime<Utc>,
    pub kind: ChangeKind,
    /// Leading content with blank lines removed
    pub snippet: String,
}

impl PreviewEntry {
    pub fn render(&self) -> String {
        format!(
            "### [{}] {} ({})\nContent Snippet:\n{}\n",
            self.kind,
            self.identity,
            self.modified_at.format("%Y-%m-%d %H:%M:%S"),
            self.snippet
        )
    }
}

/// Notes modified after `since`, newest first.
pub fn preview(vault: &FsVault, since: DateTime<Utc>) -> Result<Vec<PreviewEntry>> {
    let mut entries = Vec::new();

    for entry in vault.discover()? {
        if entry.modified_at <= since {
            continue;
        }
        let kind = change_kind(entry.modified_at, entry.created_at);
        let snippet = match read_text(&entry.path) {
            Ok(text) => snippet(&text),
            Err(e) => format!("[Error reading content: {e}]"),
        };
        entries.push(PreviewEntry {
            identity: entry.identity,
            modified_at: entry.modified_at,
            kind,
            snippet,
        });
    }

    entries.sort_by(|a, b| {
        b.modified_at
            .cmp(&a.modified_at)
            .then_with(|| a.identity.cmp(&b.identity))
    });
    Ok(entries)
}

fn change_kind(modified_at: DateTime<Utc>, created_at: Option<DateTime<Utc>>) -> ChangeKind {
    match created_at {
        Some(created) if (modified_at - created).num_seconds().abs() < CREATED_WINDOW_SECS => {
            ChangeKind::Created
        }
        _ => ChangeKind::Modified,
    }
}

fn snippet(text: &str) -> String {
    let head = crate::summarize::truncate_chars(text, SNIPPET_CHARS).trim();
    let lines: Vec<&str> = head.lines().filter(|l| !l.trim().is_empty()).collect();
    if lines.is_empty() {
        "[Empty note]".to_string()
    } else {
        lines.join("\n")
    }
}
