//! Core domain types for weeknotes
//!
//! | Term | Definition |
//! |------|------------|
//! | **Document** | One note in the vault, identified by its vault-relative path |
//! | **Fingerprint** | SHA-256 of a document's raw content |
//! | **SummaryRecord** | One summary for one (identity, fingerprint) pair |
//! | **Watermark** | Time up to which the vault has been fully scanned |
//! | **Period** | Half-open `[start, end)` window a report covers |
//! | **Topic** | Derived cluster of related summaries, recomputed per report |
//! | **Report** | Ordered topics plus narrative for one period |

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::error::{Error, Result};

// ============================================
// Documents
// ============================================

/// Deterministic content digest (lowercase hex SHA-256).
pub fn fingerprint(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// A note as read from the document store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// Vault-relative path with `/` separators
    pub identity: String,
    /// Raw text content
    pub content: String,
    /// Last modification time reported by the store
    pub modified_at: DateTime<Utc>,
    /// SHA-256 of `content`
    pub fingerprint: String,
}

impl Document {
    pub fn new(
        identity: impl Into<String>,
        content: impl Into<String>,
        modified_at: DateTime<Utc>,
    ) -> Self {
        let content = content.into();
        Self {
            identity: identity.into(),
            fingerprint: fingerprint(content.as_bytes()),
            content,
            modified_at,
        }
    }

    /// Build from raw file bytes. The fingerprint covers the bytes as read;
    /// `content` is decoded lossily, so two invalid encodings of different
    /// text still differ.
    pub fn from_bytes(
        identity: impl Into<String>,
        bytes: Vec<u8>,
        modified_at: DateTime<Utc>,
    ) -> Self {
        let fingerprint = fingerprint(&bytes);
        let content = match String::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        };
        Self {
            identity: identity.into(),
            content,
            modified_at,
            fingerprint,
        }
    }
}

/// Last path component of a vault identity.
pub fn file_name(identity: &str) -> &str {
    identity.rsplit('/').next().unwrap_or(identity)
}

/// Top-level folder of a vault identity, `None` for files at the vault root.
pub fn top_level_folder(identity: &str) -> Option<&str> {
    identity
        .split_once('/')
        .map(|(folder, _)| folder)
        .filter(|folder| !folder.is_empty() && *folder != ".")
}

// ============================================
// Summary records
// ============================================

/// One summarized version of one document. Immutable once logged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRecord {
    pub identity: String,
    pub fingerprint: String,
    pub summary: String,
    /// Topic tags, only ever set at aggregation time
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub topics: Vec<String>,
    /// Document modification time when it was summarized
    pub modified_at: DateTime<Utc>,
    /// When the record was created; defines log order
    pub created_at: DateTime<Utc>,
}

// ============================================
// Periods and idempotency keys
// ============================================

/// Half-open time window `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Period {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Period {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<Self> {
        if start >= end {
            return Err(Error::InvalidPeriod(format!(
                "start {} is not before end {}",
                start.to_rfc3339(),
                end.to_rfc3339()
            )));
        }
        Ok(Self { start, end })
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts < self.end
    }

    /// Deterministic key used to deduplicate remote issues for this period.
    pub fn idempotency_key(&self) -> IdempotencyKey {
        let canonical = format!(
            "{}/{}",
            self.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.end.to_rfc3339_opts(SecondsFormat::Secs, true)
        );
        let digest = fingerprint(canonical.as_bytes());
        IdempotencyKey(format!("weeknotes-{}", &digest[..16]))
    }

    /// Compact form used in artifact file names.
    pub fn slug(&self) -> String {
        format!(
            "{}-{}",
            self.start.format("%Y%m%dT%H%M%SZ"),
            self.end.format("%Y%m%dT%H%M%SZ")
        )
    }

    /// ISO week label of the period's last instant, e.g. `2026-W41`.
    pub fn week_label(&self) -> String {
        let last = self.end - chrono::Duration::seconds(1);
        last.format("%G-W%V").to_string()
    }
}

impl fmt::Display for Period {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}, {})",
            self.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.end.to_rfc3339_opts(SecondsFormat::Secs, true)
        )
    }
}

/// Idempotency key derived from a report period.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(pub String);

impl IdempotencyKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Remote issue identifier returned by the tracker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueId {
    pub id: String,
    pub url: Option<String>,
}

// ============================================
// Topics and reports
// ============================================

/// A cluster of summary records sharing a theme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topic {
    pub label: String,
    /// Member records in log append order
    pub records: Vec<SummaryRecord>,
}

impl Topic {
    /// Most recent member creation time.
    pub fn latest_at(&self) -> Option<DateTime<Utc>> {
        self.records.iter().map(|r| r.created_at).max()
    }

    /// Unique member identities, in first-appearance order.
    pub fn identities(&self) -> Vec<&str> {
        let mut seen = Vec::new();
        for record in &self.records {
            if !seen.contains(&record.identity.as_str()) {
                seen.push(record.identity.as_str());
            }
        }
        seen
    }
}

/// The report for one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub period: Period,
    pub topics: Vec<Topic>,
    pub narrative: String,
    pub generated_at: DateTime<Utc>,
    /// Digest of the window this report was built from
    pub input_digest: String,
    pub record_count: usize,
}

impl Report {
    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    pub fn idempotency_key(&self) -> IdempotencyKey {
        self.period.idempotency_key()
    }

    pub fn title(&self) -> String {
        format!("Weekly Review: {}", self.period.week_label())
    }

    /// Topic labels with member identities; what idempotent re-runs must reproduce.
    pub fn membership(&self) -> Vec<(String, Vec<String>)> {
        self.topics
            .iter()
            .map(|t| {
                (
                    t.label.clone(),
                    t.identities().into_iter().map(str::to_string).collect(),
                )
            })
            .collect()
    }

    /// Render the report document with explicit period boundaries.
    pub fn to_markdown(&self) -> String {
        let mut out = String::new();
        out.push_str(&format!("# {}\n\n", self.title()));
        out.push_str(&format!(
            "Period: {} to {} (end exclusive)\n",
            self.period.start.to_rfc3339_opts(SecondsFormat::Secs, true),
            self.period.end.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
        out.push_str(&format!(
            "Generated: {}\n\n",
            self.generated_at.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
        out.push_str(self.narrative.trim_end());
        out.push('\n');

        if !self.topics.is_empty() {
            out.push_str("\n## Topics\n");
            for topic in &self.topics {
                out.push_str(&format!("\n### {}\n", topic.label));
                for record in &topic.records {
                    out.push_str(&format!(
                        "- **{}** ({}): {}\n",
                        record.identity,
                        record.created_at.format("%Y-%m-%d %H:%M"),
                        record.summary.replace('\n', " ")
                    ));
                }
            }
        }
        out
    }
}

/// Digest identifying a window's exact contents, in order.
pub fn window_digest(records: &[SummaryRecord]) -> String {
    let mut hasher = Sha256::new();
    for record in records {
        hasher.update(record.identity.as_bytes());
        hasher.update([0]);
        hasher.update(record.fingerprint.as_bytes());
        hasher.update([0]);
        hasher.update(record.created_at.to_rfc3339_opts(SecondsFormat::Nanos, true).as_bytes());
        hasher.update([b'\n']);
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts(day: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, day, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_fingerprint_tracks_content() {
        let a = Document::new("a.md", "hello", ts(1));
        let b = Document::new("a.md", "hello", ts(2));
        let c = Document::new("a.md", "hello!", ts(1));
        assert_eq!(a.fingerprint, b.fingerprint);
        assert_ne!(a.fingerprint, c.fingerprint);
        assert_eq!(a.fingerprint.len(), 64);
    }

    #[test]
    fn test_fingerprint_covers_raw_bytes() {
        let utf8 = Document::from_bytes("a.md", b"hello".to_vec(), ts(1));
        assert_eq!(utf8, Document::new("a.md", "hello", ts(1)));

        let e_acute = Document::from_bytes("a.md", b"caf\xe9".to_vec(), ts(1));
        let e_grave = Document::from_bytes("a.md", b"caf\xe8".to_vec(), ts(1));
        assert_eq!(e_acute.content, e_grave.content);
        assert_ne!(e_acute.fingerprint, e_grave.fingerprint);
    }

    #[test]
    fn test_identity_helpers() {
        assert_eq!(file_name("Projects/alpha/plan.md"), "plan.md");
        assert_eq!(file_name("inbox.md"), "inbox.md");
        assert_eq!(top_level_folder("Projects/alpha/plan.md"), Some("Projects"));
        assert_eq!(top_level_folder("inbox.md"), None);
    }

    #[test]
    fn test_period_rejects_empty_range() {
        assert!(Period::new(ts(2), ts(2)).is_err());
        assert!(Period::new(ts(3), ts(2)).is_err());
        let period = Period::new(ts(1), ts(8)).unwrap();
        assert!(period.contains(ts(1)));
        assert!(!period.contains(ts(8)));
    }

    #[test]
    fn test_idempotency_key_is_deterministic() {
        let p1 = Period::new(ts(1), ts(8)).unwrap();
        let p2 = Period::new(ts(1), ts(8)).unwrap();
        let p3 = Period::new(ts(2), ts(8)).unwrap();
        assert_eq!(p1.idempotency_key(), p2.idempotency_key());
        assert_ne!(p1.idempotency_key(), p3.idempotency_key());
        assert!(p1.idempotency_key().as_str().starts_with("weeknotes-"));
        assert_eq!(p1.idempotency_key().as_str().len(), "weeknotes-".len() + 16);
    }

    #[test]
    fn test_period_slug_and_week() {
        let period = Period::new(ts(5), ts(12)).unwrap();
        assert_eq!(period.slug(), "20261005T000000Z-20261012T000000Z");
        assert_eq!(period.week_label(), "2026-W41");
    }
}
