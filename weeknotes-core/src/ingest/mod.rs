//! Scan stage: detect changed notes and append their summaries to the log
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐     ┌──────────────────┐     ┌─────────────────┐
//! │  DocumentStore  │ ──► │  ScanCoordinator │ ──► │   SummaryLog    │
//! │    (FsVault)    │     │                  │     │ (summaries.jsonl│
//! └─────────────────┘     └──────────────────┘     └─────────────────┘
//!                               │        │
//!                               ▼        ▼
//!                      ┌────────────┐  ┌──────────────┐
//!                      │ Summarizer │  │  state.json  │
//!                      │ (LLM/...)  │  │  (watermark) │
//!                      └────────────┘  └──────────────┘
//! ```
//!
//! ## Watermark
//!
//! The watermark only moves forward, and never past a document that was
//! listed but not summarized (failure, unreadable, or cancellation). Those
//! documents are listed again on the next run; documents that did succeed are
//! filtered out by fingerprint.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use weeknotes_core::ingest::{FsVault, ScanCoordinator, ScanOptions};
//! use weeknotes_core::store::{RunState, SummaryLog};
//! use weeknotes_core::summarize::OutlineSummarizer;
//!
//! let mut log = SummaryLog::open(&Config::summary_log_path())?;
//! let coordinator = ScanCoordinator::new(
//!     Box::new(FsVault::new(vault_root, &config.vault)),
//!     Box::new(OutlineSummarizer::new()),
//!     config.summarizer.clone(),
//! );
//! let result = coordinator.scan(&mut log, &RunState::path_for(log.path()), &ScanOptions::default())?;
//! println!("Appended {} summaries", result.records_appended);
//! ```

mod detect;
mod vault;

pub use detect::{detect, ChangeSet, Unchanged};
pub use vault::{read_text, DocumentStore, FsVault, StoreListing, Unreadable, VaultEntry};

use crate::config::SummarizerConfig;
use crate::error::{Error, Result};
use crate::store::{RunState, SummaryLog};
use crate::summarize::{summarize_document, Summarizer};
use crate::types::Document;
use chrono::{DateTime, Duration, Utc};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Knobs for a single scan run.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Ignore the stored watermark and look back this far instead
    pub lookback: Option<Duration>,
    /// Checked before each document; set it to stop between documents
    pub cancel: Option<Arc<AtomicBool>>,
}

/// A document whose summarization failed this run.
#[derive(Debug, Clone)]
pub struct DocumentFailure {
    pub identity: String,
    pub modified_at: DateTime<Utc>,
    pub error: String,
    /// Timeout or 5xx style failure
    pub transient: bool,
}

/// Result of one scan run.
#[derive(Debug, Default)]
pub struct ScanResult {
    /// Documents with content not yet in the log
    pub documents_changed: usize,
    /// Listed documents whose content was already summarized
    pub documents_unchanged: usize,
    /// Records appended to the log
    pub records_appended: usize,
    /// Records that turned out to exist already
    pub duplicates_skipped: usize,
    /// Per-document failures, retried next run
    pub failures: Vec<DocumentFailure>,
    /// Documents the store could not read, retried next run
    pub unreadable: Vec<Unreadable>,
    /// Changed documents left untouched because the run was cancelled
    pub documents_pending: usize,
    pub cancelled: bool,
    pub previous_watermark: Option<DateTime<Utc>>,
    pub watermark: Option<DateTime<Utc>>,
}

impl ScanResult {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty() || !self.unreadable.is_empty()
    }
}

/// Runs the scan stage against one document store and one summarizer.
pub struct ScanCoordinator {
    store: Box<dyn DocumentStore>,
    summarizer: Box<dyn Summarizer>,
    limits: SummarizerConfig,
}

impl ScanCoordinator {
    pub fn new(
        store: Box<dyn DocumentStore>,
        summarizer: Box<dyn Summarizer>,
        limits: SummarizerConfig,
    ) -> Self {
        Self {
            store,
            summarizer,
            limits,
        }
    }

    /// Scan once, persisting the new watermark to `state_path`.
    pub fn scan(
        &self,
        log: &mut SummaryLog,
        state_path: &Path,
        options: &ScanOptions,
    ) -> Result<ScanResult> {
        self.scan_with_progress(log, state_path, options, |_, _, _| {})
    }

    /// Scan with a progress callback.
    ///
    /// The callback receives `(current_index, total_changed, identity)` before
    /// each changed document is summarized.
    pub fn scan_with_progress<F>(
        &self,
        log: &mut SummaryLog,
        state_path: &Path,
        options: &ScanOptions,
        mut on_progress: F,
    ) -> Result<ScanResult>
    where
        F: FnMut(usize, usize, &str),
    {
        let state = RunState::load(state_path)?;
        // Taken before listing so edits made during the run are seen next time
        let scan_started = Utc::now();
        let since = match options.lookback {
            Some(lookback) => Some(scan_started.checked_sub_signed(lookback).ok_or_else(|| {
                Error::Config(format!("lookback of {} days is out of range", lookback.num_days()))
            })?),
            None => state.watermark,
        };

        let changes = detect(self.store.as_ref(), since, log)?;
        let total = changes.documents.len();
        tracing::info!(
            since = ?since,
            changed = total,
            unchanged = changes.unchanged.len(),
            unreadable = changes.unreadable.len(),
            "Detected changed notes"
        );

        let mut result = ScanResult {
            documents_changed: total,
            documents_unchanged: changes.unchanged.len(),
            unreadable: changes.unreadable,
            previous_watermark: state.watermark,
            ..Default::default()
        };
        let mut held_back: Option<DateTime<Utc>> = result
            .unreadable
            .iter()
            .map(|u| u.modified_at)
            .min();

        for (i, doc) in changes.documents.iter().enumerate() {
            if is_cancelled(options) {
                tracing::warn!(remaining = total - i, "Scan cancelled");
                result.cancelled = true;
                result.documents_pending = total - i;
                held_back = earliest(held_back, doc.modified_at);
                break;
            }

            on_progress(i, total, &doc.identity);

            match self.process(doc, log) {
                Ok(true) => result.records_appended += 1,
                Ok(false) => result.duplicates_skipped += 1,
                Err(e) if is_document_failure(&e) => {
                    tracing::warn!(identity = %doc.identity, error = %e, "Failed to summarize note");
                    held_back = earliest(held_back, doc.modified_at);
                    result.failures.push(DocumentFailure {
                        identity: doc.identity.clone(),
                        modified_at: doc.modified_at,
                        error: e.to_string(),
                        transient: e.is_transient(),
                    });
                }
                Err(e) => return Err(e),
            }
        }

        let watermark = next_watermark(state.watermark, scan_started, held_back);
        if watermark != state.watermark {
            RunState { watermark }.save(state_path)?;
        }
        result.watermark = watermark;

        tracing::info!(
            appended = result.records_appended,
            failed = result.failures.len(),
            cancelled = result.cancelled,
            watermark = ?watermark,
            "Scan finished"
        );
        Ok(result)
    }

    /// Summarize and append one document. `Ok(false)` means it was already logged.
    fn process(&self, doc: &Document, log: &mut SummaryLog) -> Result<bool> {
        let created_at = log.next_created_at(Utc::now());
        let record = summarize_document(doc, self.summarizer.as_ref(), &self.limits, created_at)?;
        match log.append(record) {
            Ok(()) => {
                tracing::debug!(identity = %doc.identity, "Summary appended");
                Ok(true)
            }
            Err(Error::DuplicateRecord { .. }) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Collaborator failures are isolated per document; storage failures abort the run.
fn is_document_failure(error: &Error) -> bool {
    matches!(error, Error::TransientExternal(_) | Error::Llm(_))
}

fn is_cancelled(options: &ScanOptions) -> bool {
    options
        .cancel
        .as_ref()
        .is_some_and(|flag| flag.load(Ordering::SeqCst))
}

fn earliest(current: Option<DateTime<Utc>>, candidate: DateTime<Utc>) -> Option<DateTime<Utc>> {
    Some(current.map_or(candidate, |c| c.min(candidate)))
}

/// Advance to the scan start, stopping just short of any held-back document,
/// and never moving backwards.
fn next_watermark(
    previous: Option<DateTime<Utc>>,
    scan_started: DateTime<Utc>,
    held_back: Option<DateTime<Utc>>,
) -> Option<DateTime<Utc>> {
    let candidate = match held_back {
        Some(t) => scan_started.min(t - Duration::nanoseconds(1)),
        None => scan_started,
    };
    match previous {
        Some(prev) if prev >= candidate => Some(prev),
        _ => Some(candidate),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::sync::Mutex;
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

    /// Fails for any document whose text contains "boom".
    struct Flaky {
        calls: Mutex<usize>,
    }

    impl Summarizer for Flaky {
        fn summarize(&self, text: &str, _context: Option<&str>) -> Result<String> {
            *self.calls.lock().unwrap() += 1;
            if text.contains("boom") {
                Err(Error::TransientExternal("timed out".to_string()))
            } else {
                Ok(format!("summary: {text}"))
            }
        }
    }

    fn ts(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 12, hour, 0, 0).unwrap()
    }

    fn coordinator(docs: Vec<Document>) -> ScanCoordinator {
        ScanCoordinator::new(
            Box::new(FixedStore(docs)),
            Box::new(Flaky {
                calls: Mutex::new(0),
            }),
            SummarizerConfig::default(),
        )
    }

    #[test]
    fn test_failure_holds_watermark_before_failed_document() {
        let dir = TempDir::new().unwrap();
        let mut log = SummaryLog::open(&dir.path().join("summaries.jsonl")).unwrap();
        let state_path = RunState::path_for(log.path());

        let scan = coordinator(vec![
            Document::new("a.md", "alpha", ts(1)),
            Document::new("b.md", "boom", ts(2)),
            Document::new("c.md", "gamma", ts(3)),
        ]);
        let result = scan.scan(&mut log, &state_path, &ScanOptions::default()).unwrap();

        assert_eq!(result.records_appended, 2);
        assert_eq!(result.failures.len(), 1);
        assert!(result.failures[0].transient);
        assert_eq!(
            result.watermark,
            Some(ts(2) - Duration::nanoseconds(1))
        );
        assert_eq!(
            RunState::load(&state_path).unwrap().watermark,
            result.watermark
        );
        assert!(!log.contains("b.md", &crate::types::fingerprint(b"boom")));
    }

    #[test]
    fn test_cancelled_scan_keeps_remaining_documents() {
        let dir = TempDir::new().unwrap();
        let mut log = SummaryLog::open(&dir.path().join("summaries.jsonl")).unwrap();
        let state_path = RunState::path_for(log.path());
        let cancel = Arc::new(AtomicBool::new(false));

        let scan = coordinator(vec![
            Document::new("a.md", "alpha", ts(1)),
            Document::new("b.md", "beta", ts(2)),
        ]);
        let options = ScanOptions {
            cancel: Some(Arc::clone(&cancel)),
            ..Default::default()
        };
        let result = scan
            .scan_with_progress(&mut log, &state_path, &options, |i, _, _| {
                if i == 0 {
                    cancel.store(true, Ordering::SeqCst);
                }
            })
            .unwrap();

        assert!(result.cancelled);
        assert_eq!(result.records_appended, 1);
        assert_eq!(result.documents_pending, 1);
        assert_eq!(result.watermark, Some(ts(2) - Duration::nanoseconds(1)));
    }

    #[test]
    fn test_out_of_range_lookback_is_an_error() {
        let dir = TempDir::new().unwrap();
        let mut log = SummaryLog::open(&dir.path().join("summaries.jsonl")).unwrap();
        let state_path = RunState::path_for(log.path());

        let scan = coordinator(vec![Document::new("a.md", "alpha", ts(1))]);
        let options = ScanOptions {
            lookback: Some(Duration::days(i64::from(u32::MAX))),
            ..Default::default()
        };
        let err = scan.scan(&mut log, &state_path, &options).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
        assert!(log.is_empty());
        assert!(!state_path.exists());
    }

    #[test]
    fn test_watermark_never_moves_backwards() {
        let later = ts(10);
        assert_eq!(next_watermark(Some(later), ts(5), None), Some(later));
        assert_eq!(next_watermark(Some(ts(1)), ts(5), None), Some(ts(5)));
        assert_eq!(
            next_watermark(None, ts(5), Some(ts(3))),
            Some(ts(3) - Duration::nanoseconds(1))
        );
        assert_eq!(next_watermark(Some(ts(4)), ts(5), Some(ts(3))), Some(ts(4)));
    }
}
