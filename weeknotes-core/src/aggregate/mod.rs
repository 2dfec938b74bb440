//! Aggregation of logged summaries into a topic report
//!
//! ```text
//! window records ──► batch(es) ──► aggregate_topics ──► merge by label
//!                                                          │
//!                                                          ▼
//!                         normalize (first claim wins, Uncategorized)
//!                                                          │
//!                                                          ▼
//!                              order topics ──► render_report ──► Report
//! ```
//!
//! Membership is decided per identity, so every record of a document inside
//! the window lands in the same topic.

mod folders;

pub use folders::FolderClusterer;

use crate::config::SummarizerConfig;
use crate::error::{Error, Result};
use crate::store::{ReportStore, SummaryLog};
use crate::types::{window_digest, Period, Report, SummaryRecord, Topic};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;

/// Label of the catch-all topic for records no topic claimed.
pub const UNCATEGORIZED: &str = "Uncategorized";

/// One line of clustering input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchEntry {
    pub identity: String,
    pub timestamp: DateTime<Utc>,
    pub summary: String,
}

impl BatchEntry {
    pub fn from_record(record: &SummaryRecord) -> Self {
        Self {
            identity: record.identity.clone(),
            timestamp: record.created_at,
            summary: record.summary.clone(),
        }
    }

    /// `identity | timestamp | summary`, on a single line.
    pub fn to_line(&self) -> String {
        format!(
            "{} | {} | {}",
            self.identity,
            self.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.summary.replace('\n', " ")
        )
    }
}

/// A topic as proposed by the clustering collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicAssignment {
    pub label: String,
    /// Member identities
    #[serde(default)]
    pub members: Vec<String>,
}

/// Clustering and narration collaborator.
pub trait TopicClusterer: Send + Sync {
    /// Group a batch of summaries into labelled topics.
    fn aggregate_topics(&self, batch: &[BatchEntry]) -> Result<Vec<TopicAssignment>>;

    /// Write the narrative for already ordered topics.
    fn render_report(&self, topics: &[Topic], period: &Period) -> Result<String>;
}

/// Build the report for `records`, the window of `period` in append order.
pub fn aggregate(
    records: &[SummaryRecord],
    period: &Period,
    clusterer: &dyn TopicClusterer,
    limits: &SummarizerConfig,
    now: DateTime<Utc>,
) -> Result<Report> {
    let input_digest = window_digest(records);

    if records.is_empty() {
        tracing::info!(period = %period, "No activity in window");
        return Ok(Report {
            period: *period,
            topics: Vec::new(),
            narrative: format!(
                "No activity recorded between {} and {}.",
                period.start.format("%Y-%m-%d"),
                period.end.format("%Y-%m-%d")
            ),
            generated_at: now,
            input_digest,
            record_count: 0,
        });
    }

    let entries: Vec<BatchEntry> = records.iter().map(BatchEntry::from_record).collect();
    let batches = split_batches(&entries, limits.max_batch_chars);
    tracing::debug!(
        records = records.len(),
        batches = batches.len(),
        "Clustering window"
    );

    let mut proposed = Vec::new();
    for batch in &batches {
        proposed.extend(clusterer.aggregate_topics(batch)?);
    }

    let topics = order_topics(normalize(merge_by_label(proposed), records));

    let narrative = clusterer.render_report(&topics, period)?;
    let narrative = narrative.trim();
    if narrative.is_empty() {
        return Err(Error::Llm("empty report narrative".to_string()));
    }

    tracing::info!(
        period = %period,
        records = records.len(),
        topics = topics.len(),
        "Report aggregated"
    );

    Ok(Report {
        period: *period,
        topics,
        narrative: narrative.to_string(),
        generated_at: now,
        input_digest,
        record_count: records.len(),
    })
}

/// Split entries into ordered batches whose rendered size stays within
/// `max_chars`. An entry larger than the bound gets a batch of its own.
fn split_batches(entries: &[BatchEntry], max_chars: usize) -> Vec<&[BatchEntry]> {
    let mut batches = Vec::new();
    let mut start = 0;
    let mut size = 0;

    for (i, entry) in entries.iter().enumerate() {
        let line = entry.to_line().chars().count() + 1;
        if i > start && size + line > max_chars {
            batches.push(&entries[start..i]);
            start = i;
            size = 0;
        }
        size += line;
    }
    if start < entries.len() {
        batches.push(&entries[start..]);
    }
    batches
}

fn normalized_label(label: &str) -> String {
    let label = label.trim();
    if label.is_empty() {
        UNCATEGORIZED.to_lowercase()
    } else {
        label.to_lowercase()
    }
}

/// Merge topics from separate batches whose labels match after normalization.
/// The first spelling of a label wins.
fn merge_by_label(proposed: Vec<TopicAssignment>) -> Vec<TopicAssignment> {
    let mut merged: Vec<TopicAssignment> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for topic in proposed {
        let key = normalized_label(&topic.label);
        match index.get(&key) {
            Some(&i) => merged[i].members.extend(topic.members),
            None => {
                index.insert(key, merged.len());
                let label = match topic.label.trim() {
                    "" => UNCATEGORIZED.to_string(),
                    label => label.to_string(),
                };
                merged.push(TopicAssignment {
                    label,
                    members: topic.members,
                });
            }
        }
    }
    merged
}

/// Turn proposed assignments into topics over the actual records.
fn normalize(assignments: Vec<TopicAssignment>, records: &[SummaryRecord]) -> Vec<Topic> {
    let known: HashSet<&str> = records.iter().map(|r| r.identity.as_str()).collect();
    let mut labels: Vec<String> = assignments.iter().map(|a| a.label.clone()).collect();
    let mut owner: HashMap<&str, usize> = HashMap::new();

    for (i, assignment) in assignments.iter().enumerate() {
        for member in &assignment.members {
            let Some(&identity) = known.get(member.trim()) else {
                tracing::debug!(member = %member, "Ignoring unknown topic member");
                continue;
            };
            owner.entry(identity).or_insert(i);
        }
    }

    let unclaimed: Vec<&str> = records
        .iter()
        .map(|r| r.identity.as_str())
        .filter(|id| !owner.contains_key(id))
        .collect();
    if !unclaimed.is_empty() {
        let existing = labels
            .iter()
            .position(|l| normalized_label(l) == normalized_label(UNCATEGORIZED));
        let bucket = match existing {
            Some(i) => i,
            None => {
                labels.push(UNCATEGORIZED.to_string());
                labels.len() - 1
            }
        };
        for identity in unclaimed {
            owner.insert(identity, bucket);
        }
    }

    let mut topics: Vec<Topic> = labels
        .into_iter()
        .map(|label| Topic {
            label,
            records: Vec::new(),
        })
        .collect();
    for record in records {
        if let Some(&i) = owner.get(record.identity.as_str()) {
            topics[i].records.push(record.clone());
        }
    }
    topics.retain(|t| !t.records.is_empty());
    topics
}

/// Most recent activity first, then larger topics, then label.
fn order_topics(mut topics: Vec<Topic>) -> Vec<Topic> {
    topics.sort_by(|a, b| {
        Reverse(a.latest_at())
            .cmp(&Reverse(b.latest_at()))
            .then_with(|| b.records.len().cmp(&a.records.len()))
            .then_with(|| a.label.cmp(&b.label))
    });
    topics
}

/// Result of [`build_report`].
#[derive(Debug)]
pub struct ReportOutcome {
    pub report: Report,
    /// True when the stored artifact already matched the window
    pub reused: bool,
    pub path: PathBuf,
}

/// Produce the report for `period`, reusing the stored artifact when it was
/// built from exactly the same window.
pub fn build_report(
    log: &SummaryLog,
    period: &Period,
    clusterer: &dyn TopicClusterer,
    limits: &SummarizerConfig,
    store: &ReportStore,
    regenerate: bool,
    now: DateTime<Utc>,
) -> Result<ReportOutcome> {
    let window = log.window(period.start, period.end);
    let digest = window_digest(window);

    if !regenerate {
        if let Some(existing) = store.load(period)? {
            if existing.input_digest == digest {
                tracing::info!(period = %period, "Window unchanged, reusing stored report");
                return Ok(ReportOutcome {
                    path: store.markdown_path(period),
                    report: existing,
                    reused: true,
                });
            }
        }
    }

    let report = aggregate(window, period, clusterer, limits, now)?;
    let path = store.save(&report)?;
    Ok(ReportOutcome {
        report,
        reused: false,
        path,
    })
}
