//! Storage layer for weeknotes
//!
//! All persistent state lives in plain files next to each other:
//! - `summaries.jsonl`: the append-only summary log
//! - `state.json`: the scan watermark
//! - `reports/`: rendered report artifacts with JSON sidecars

pub mod report_store;
pub mod run_state;
pub mod summary_log;

pub use report_store::ReportStore;
pub use run_state::RunState;
pub use summary_log::SummaryLog;

use crate::error::Result;
use std::fs::{self, File};
use std::io::Write;
use std::path::Path;

/// Write `bytes` to `path` so readers see either the old file or the new one.
pub(crate) fn write_atomic(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let file_name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let tmp = path.with_file_name(format!(".{file_name}.tmp"));

    let mut file = File::create(&tmp)?;
    file.write_all(bytes)?;
    file.sync_all()?;
    drop(file);

    fs::rename(&tmp, path)?;
    Ok(())
}
