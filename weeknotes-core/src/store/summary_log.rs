//! Append-only JSONL summary log
//!
//! One [`SummaryRecord`] per line. A record becomes visible only after its
//! full line, newline included, has been written and synced. Everything the
//! pipeline reads (`window`, `latest`) is served from the in-memory replay.
//!
//! # Recovery
//!
//! An interrupted append leaves at most one incomplete line at the end of the
//! file. On open that tail is dropped:
//!
//! - **Writable open** ([`SummaryLog::open`]): the file is truncated back to
//!   the last complete record so the next append starts on a clean line.
//! - **Read-only open** ([`SummaryLog::open_read_only`]): the tail is ignored
//!   but left on disk, since a writer may still be in the middle of it.
//!
//! A malformed line *followed by* valid lines is not a torn write; it is
//! reported as [`Error::CorruptLogEntry`].

use crate::error::{Error, Result};
use crate::types::SummaryRecord;
use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// The summary log, replayed into memory.
pub struct SummaryLog {
    path: PathBuf,
    /// Append handle; `None` for read-only opens
    file: Option<File>,
    /// Byte length of the valid prefix on disk
    len: u64,
    records: Vec<SummaryRecord>,
    keys: HashSet<(String, String)>,
    latest: HashMap<String, usize>,
}

/// Outcome of replaying the on-disk bytes.
struct Replay {
    records: Vec<SummaryRecord>,
    valid_len: u64,
    discarded_tail: bool,
}

impl SummaryLog {
    /// Open (creating if absent) the log for appending.
    ///
    /// Callers must hold the run lock: a torn trailing entry is truncated away.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;

        let bytes = fs::read(path)?;
        let replay = replay(&bytes)?;

        if replay.discarded_tail {
            tracing::warn!(
                path = %path.display(),
                file_len = bytes.len(),
                valid_len = replay.valid_len,
                "Discarding incomplete trailing summary log entry"
            );
            file.set_len(replay.valid_len)?;
            file.sync_all()?;
        }

        Ok(Self::from_replay(path, Some(file), replay))
    }

    /// Open the log for reading only. A missing file is an empty log.
    pub fn open_read_only(path: &Path) -> Result<Self> {
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        let replay = replay(&bytes)?;
        if replay.discarded_tail {
            tracing::debug!(path = %path.display(), "Ignoring incomplete trailing summary log entry");
        }
        Ok(Self::from_replay(path, None, replay))
    }

    fn from_replay(path: &Path, file: Option<File>, replay: Replay) -> Self {
        let mut log = Self {
            path: path.to_path_buf(),
            file,
            len: replay.valid_len,
            records: Vec::with_capacity(replay.records.len()),
            keys: HashSet::new(),
            latest: HashMap::new(),
        };
        for record in replay.records {
            log.index(record);
        }
        log
    }

    fn index(&mut self, record: SummaryRecord) {
        self.keys
            .insert((record.identity.clone(), record.fingerprint.clone()));
        self.latest
            .insert(record.identity.clone(), self.records.len());
        self.records.push(record);
    }

    /// Append a record durably.
    ///
    /// Fails with [`Error::DuplicateRecord`] if (identity, fingerprint) is
    /// already logged and [`Error::OutOfOrder`] if the record predates the
    /// last one.
    pub fn append(&mut self, record: SummaryRecord) -> Result<()> {
        if self.contains(&record.identity, &record.fingerprint) {
            return Err(Error::DuplicateRecord {
                identity: record.identity,
                fingerprint: record.fingerprint,
            });
        }
        if let Some(last) = self.records.last() {
            if record.created_at < last.created_at {
                return Err(Error::OutOfOrder {
                    identity: record.identity,
                });
            }
        }

        let file = self.file.as_mut().ok_or_else(|| {
            Error::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "summary log was opened read-only",
            ))
        })?;

        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        if let Err(e) = file.write_all(&line).and_then(|_| file.sync_data()) {
            roll_back(file, self.len, &self.path);
            return Err(e.into());
        }

        self.len += line.len() as u64;
        self.index(record);
        Ok(())
    }

    /// Records with `start <= created_at < end`, in append order.
    pub fn window(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> &[SummaryRecord] {
        if start >= end {
            return &[];
        }
        // created_at is non-decreasing in append order, so the window is contiguous.
        let lo = self.records.partition_point(|r| r.created_at < start);
        let hi = self.records.partition_point(|r| r.created_at < end);
        &self.records[lo..hi]
    }

    /// Most recently appended record for `identity`.
    pub fn latest(&self, identity: &str) -> Option<&SummaryRecord> {
        self.latest.get(identity).map(|&i| &self.records[i])
    }

    /// Whether a record exists for this exact (identity, fingerprint).
    pub fn contains(&self, identity: &str, fingerprint: &str) -> bool {
        self.keys
            .contains(&(identity.to_string(), fingerprint.to_string()))
    }

    /// Earliest creation time a new record may carry.
    pub fn next_created_at(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self.records.last() {
            Some(last) if last.created_at > now => last.created_at,
            _ => now,
        }
    }

    /// Full chronological replay.
    pub fn records(&self) -> &[SummaryRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Truncate whatever part of a failed append reached the file.
///
/// Returns whether the truncation succeeded. A failure is logged; the next
/// writable open drops the partial line.
fn roll_back(file: &File, valid_len: u64, path: &Path) -> bool {
    match file.set_len(valid_len) {
        Ok(()) => true,
        Err(e) => {
            tracing::error!(
                path = %path.display(),
                valid_len,
                error = %e,
                "Failed to roll back partial summary log append"
            );
            false
        }
    }
}

/// Parse the log bytes, separating a torn tail from real corruption.
fn replay(bytes: &[u8]) -> Result<Replay> {
    let mut records: Vec<SummaryRecord> = Vec::new();
    let mut keys: HashSet<(String, String)> = HashSet::new();
    let mut offset = 0usize;
    let mut valid_len = 0usize;
    let mut line_no = 0usize;
    // First bad complete line; only fatal if something valid follows it.
    let mut pending_bad: Option<(usize, String)> = None;

    while offset < bytes.len() {
        line_no += 1;
        let (line, next, complete) = match bytes[offset..].iter().position(|&b| b == b'\n') {
            Some(i) => (&bytes[offset..offset + i], offset + i + 1, true),
            None => (&bytes[offset..], bytes.len(), false),
        };
        offset = next;

        if line.iter().all(u8::is_ascii_whitespace) {
            if complete && pending_bad.is_none() {
                valid_len = next;
            }
            continue;
        }

        if !complete {
            // Newline is written last; without it the record never became visible.
            break;
        }

        match serde_json::from_slice::<SummaryRecord>(line) {
            Ok(record) => {
                if let Some((bad_line, message)) = pending_bad.take() {
                    return Err(Error::CorruptLogEntry {
                        line: bad_line,
                        message,
                    });
                }
                if !keys.insert((record.identity.clone(), record.fingerprint.clone())) {
                    return Err(Error::CorruptLogEntry {
                        line: line_no,
                        message: format!(
                            "duplicate record for {} at {}",
                            record.identity, record.fingerprint
                        ),
                    });
                }
                if let Some(last) = records.last() {
                    if record.created_at < last.created_at {
                        return Err(Error::CorruptLogEntry {
                            line: line_no,
                            message: "record predates its predecessor".to_string(),
                        });
                    }
                }
                records.push(record);
                valid_len = next;
            }
            Err(e) => {
                if pending_bad.is_none() {
                    pending_bad = Some((line_no, e.to_string()));
                }
            }
        }
    }

    Ok(Replay {
        records,
        valid_len: valid_len as u64,
        discarded_tail: valid_len < bytes.len(),
    })
}
