//! Folder-based clustering for running without an LLM
//!
//! Topics are the vault's top-level folders. The narrative lists the busiest
//! folders with keywords pulled from their file names.

use super::{BatchEntry, TopicAssignment, TopicClusterer, UNCATEGORIZED};
use crate::error::Result;
use crate::types::{file_name, top_level_folder, Period, Topic};
use std::collections::BTreeSet;

const FOCUS_FOLDERS: usize = 3;
const KEYWORDS_PER_FOLDER: usize = 3;

const STOP_WORDS: &[&str] = &[
    "md", "txt", "the", "in", "of", "a", "to", "for", "on", "and", "with", "by", "is", "at",
    "file", "new", "update", "untitled",
];

/// Groups summaries by top-level folder.
#[derive(Debug, Default, Clone, Copy)]
pub struct FolderClusterer;

impl FolderClusterer {
    pub fn new() -> Self {
        Self
    }
}

impl TopicClusterer for FolderClusterer {
    fn aggregate_topics(&self, batch: &[BatchEntry]) -> Result<Vec<TopicAssignment>> {
        let mut topics: Vec<TopicAssignment> = Vec::new();
        for entry in batch {
            let folder = top_level_folder(&entry.identity).unwrap_or(UNCATEGORIZED);
            match topics.iter_mut().find(|t| t.label == folder) {
                Some(topic) => topic.members.push(entry.identity.clone()),
                None => topics.push(TopicAssignment {
                    label: folder.to_string(),
                    members: vec![entry.identity.clone()],
                }),
            }
        }
        Ok(topics)
    }

    fn render_report(&self, topics: &[Topic], _period: &Period) -> Result<String> {
        let total: usize = topics.iter().map(|t| t.records.len()).sum();

        let mut busiest: Vec<&Topic> = topics.iter().collect();
        busiest.sort_by(|a, b| b.records.len().cmp(&a.records.len()));

        let mut out = format!("{total} notes were created or modified. Main focus areas:\n\n");
        for topic in busiest.into_iter().take(FOCUS_FOLDERS) {
            let names: Vec<&str> = topic.records.iter().map(|r| file_name(&r.identity)).collect();
            out.push_str(&format!(
                "- **{}** ({} files): Focused on *{}*\n",
                topic.label,
                topic.records.len(),
                keywords(&names)
            ));
        }

        out.push_str("\n## Changed Notes\n");
        for topic in topics {
            out.push_str(&format!("\n### {}\n", topic.label));
            let names: BTreeSet<&str> = topic.records.iter().map(|r| file_name(&r.identity)).collect();
            for name in names {
                out.push_str(&format!("- {name}\n"));
            }
        }

        Ok(out)
    }
}

/// Most frequent words in file names, ignoring extensions and stop words.
fn keywords(file_names: &[&str]) -> String {
    let mut counts: Vec<(&str, usize)> = Vec::new();

    for &name in file_names {
        let stem = match name.rfind('.') {
            Some(idx) if idx > 0 => &name[..idx],
            _ => name,
        };
        let tokens = stem
            .split(|c: char| c.is_whitespace() || matches!(c, '-' | '_' | ',' | '.' | '，' | '。' | '：'))
            .map(str::trim)
            .filter(|t| is_keyword(t));
        for token in tokens {
            match counts.iter_mut().find(|(word, _)| *word == token) {
                Some((_, count)) => *count += 1,
                None => counts.push((token, 1)),
            }
        }
    }

    if counts.is_empty() {
        return "Miscellaneous".to_string();
    }

    // stable, so ties keep first-seen order
    counts.sort_by(|a, b| b.1.cmp(&a.1));
    counts
        .iter()
        .take(KEYWORDS_PER_FOLDER)
        .map(|(word, _)| *word)
        .collect::<Vec<_>>()
        .join(", ")
}

fn is_keyword(token: &str) -> bool {
    let lower = token.to_lowercase();
    lower.chars().count() > 1
        && !STOP_WORDS.contains(&lower.as_str())
        && !lower.chars().all(|c| c.is_ascii_digit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SummaryRecord;
    use chrono::{TimeZone, Utc};

    fn entry(identity: &str) -> BatchEntry {
        BatchEntry {
            identity: identity.to_string(),
            timestamp: Utc.with_ymd_and_hms(2026, 10, 12, 9, 0, 0).unwrap(),
            summary: String::new(),
        }
    }

    fn topic(label: &str, identities: &[&str]) -> Topic {
        Topic {
            label: label.to_string(),
            records: identities
                .iter()
                .map(|id| SummaryRecord {
                    identity: id.to_string(),
                    fingerprint: id.to_string(),
                    summary: "s".to_string(),
                    topics: vec![],
                    modified_at: Utc.with_ymd_and_hms(2026, 10, 12, 9, 0, 0).unwrap(),
                    created_at: Utc.with_ymd_and_hms(2026, 10, 12, 9, 0, 0).unwrap(),
                })
                .collect(),
        }
    }

    #[test]
    fn test_groups_by_top_level_folder() {
        let topics = FolderClusterer
            .aggregate_topics(&[
                entry("Projects/parser/notes.md"),
                entry("inbox.md"),
                entry("Projects/release.md"),
            ])
            .unwrap();

        assert_eq!(topics.len(), 2);
        assert_eq!(topics[0].label, "Projects");
        assert_eq!(
            topics[0].members,
            vec!["Projects/parser/notes.md", "Projects/release.md"]
        );
        assert_eq!(topics[1].label, UNCATEGORIZED);
    }

    #[test]
    fn test_keywords_skip_stop_words_and_extensions() {
        assert_eq!(
            keywords(&["parser-design.md", "parser_notes.md", "the new file.md"]),
            "parser, design, notes"
        );
        assert_eq!(keywords(&["untitled 2.md"]), "Miscellaneous");
    }

    #[test]
    fn test_render_lists_focus_and_unique_files() {
        let topics = vec![
            topic("Daily", &["Daily/standup.md", "Daily/standup.md", "Daily/retro.md"]),
            topic("Projects", &["Projects/roadmap.md"]),
        ];
        let period = Period::new(
            Utc.with_ymd_and_hms(2026, 10, 5, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 10, 12, 0, 0, 0).unwrap(),
        )
        .unwrap();

        let text = FolderClusterer.render_report(&topics, &period).unwrap();
        assert!(text.starts_with("4 notes were created or modified."));
        assert!(text.contains("- **Daily** (3 files): Focused on *standup, retro*"));
        assert!(text.contains("### Daily\n- retro.md\n- standup.md\n"));
    }
}
