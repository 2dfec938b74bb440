//! Change detection
//!
//! A document is a change only if its content differs from everything already
//! logged for its identity. Modification time just narrows what is read.

use super::vault::{DocumentStore, StoreListing, Unreadable};
use crate::error::Result;
use crate::store::SummaryLog;
use chrono::{DateTime, Utc};

/// Why a listed document was not returned as a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unchanged {
    /// Same fingerprint as the latest record (timestamp-only touch)
    Touched { identity: String },
    /// Reverted to content that already has a record
    Reverted { identity: String },
}

/// Documents to summarize, plus what was filtered out.
#[derive(Debug, Default)]
pub struct ChangeSet {
    /// Changed documents, oldest modification first, ties by identity
    pub documents: Vec<crate::types::Document>,
    pub unchanged: Vec<Unchanged>,
    /// Changed documents the store failed to read
    pub unreadable: Vec<Unreadable>,
}

/// Produce the ordered set of documents whose content changed since `watermark`.
///
/// Read-only with respect to both the store and the log.
pub fn detect(
    store: &dyn DocumentStore,
    watermark: Option<DateTime<Utc>>,
    log: &SummaryLog,
) -> Result<ChangeSet> {
    let StoreListing {
        documents,
        unreadable,
    } = store.changed_since(watermark)?;

    let mut changes = ChangeSet {
        unreadable,
        ..Default::default()
    };

    for doc in documents {
        let latest = log.latest(&doc.identity);
        if latest.is_some_and(|r| r.fingerprint == doc.fingerprint) {
            tracing::debug!(identity = %doc.identity, "Content unchanged, skipping");
            changes.unchanged.push(Unchanged::Touched {
                identity: doc.identity,
            });
        } else if log.contains(&doc.identity, &doc.fingerprint) {
            tracing::debug!(identity = %doc.identity, "Content matches an older record, skipping");
            changes.unchanged.push(Unchanged::Reverted {
                identity: doc.identity,
            });
        } else {
            changes.documents.push(doc);
        }
    }

    changes.documents.sort_by(|a, b| {
        a.modified_at
            .cmp(&b.modified_at)
            .then_with(|| a.identity.cmp(&b.identity))
    });

    Ok(changes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Document, SummaryRecord};
    use chrono::TimeZone;
    use tempfile::TempDir;

    struct FixedStore(Vec<Document>);

    impl DocumentStore for FixedStore {
        fn changed_since(&self, since: Option<DateTime<Utc>>) -> Result<StoreListing> {
            Ok(StoreListing {
                documents: self
                    .0
                    .iter()
                    .filter(|d| since.map_or(true, |s| d.modified_at > s))
                    .cloned()
                    .collect(),
                unreadable: vec![],
            })
        }
    }

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 12, hour, 0, 0).unwrap()
    }

    fn logged(doc: &Document, hour: u32) -> SummaryRecord {
        SummaryRecord {
            identity: doc.identity.clone(),
            fingerprint: doc.fingerprint.clone(),
            summary: "s".to_string(),
            topics: vec![],
            modified_at: doc.modified_at,
            created_at: ts(hour),
        }
    }

    #[test]
    fn test_first_run_returns_everything_in_order() {
        let dir = TempDir::new().unwrap();
        let log = SummaryLog::open(&dir.path().join("log.jsonl")).unwrap();
        let store = FixedStore(vec![
            Document::new("b.md", "b", ts(3)),
            Document::new("c.md", "c", ts(1)),
            Document::new("a.md", "a", ts(3)),
        ]);

        let changes = detect(&store, None, &log).unwrap();
        let ids: Vec<_> = changes.documents.iter().map(|d| d.identity.as_str()).collect();
        assert_eq!(ids, vec!["c.md", "a.md", "b.md"]);
    }

    #[test]
    fn test_touched_and_reverted_documents_are_excluded() {
        let dir = TempDir::new().unwrap();
        let mut log = SummaryLog::open(&dir.path().join("log.jsonl")).unwrap();

        let a_v1 = Document::new("a.md", "alpha", ts(1));
        let b_v1 = Document::new("b.md", "beta", ts(1));
        let b_v2 = Document::new("b.md", "beta v2", ts(2));
        log.append(logged(&a_v1, 1)).unwrap();
        log.append(logged(&b_v1, 1)).unwrap();
        log.append(logged(&b_v2, 2)).unwrap();

        let store = FixedStore(vec![
            // re-saved without edits
            Document::new("a.md", "alpha", ts(5)),
            // reverted to its first version
            Document::new("b.md", "beta", ts(5)),
            Document::new("c.md", "gamma", ts(5)),
        ]);

        let changes = detect(&store, Some(ts(3)), &log).unwrap();
        let ids: Vec<_> = changes.documents.iter().map(|d| d.identity.as_str()).collect();
        assert_eq!(ids, vec!["c.md"]);
        assert_eq!(
            changes.unchanged,
            vec![
                Unchanged::Touched {
                    identity: "a.md".to_string()
                },
                Unchanged::Reverted {
                    identity: "b.md".to_string()
                },
            ]
        );
    }
}
