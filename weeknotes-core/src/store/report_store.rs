//! Report artifacts on disk
//!
//! Each report is stored twice, keyed by its period:
//! - `report-<slug>.md`: the rendered document, ready to read or publish
//! - `report-<slug>.json`: the structured report, used for reuse checks
//!
//! The JSON sidecar is written last, so a report only counts as stored once
//! both files are in place.

use super::write_atomic;
use crate::error::Result;
use crate::types::{Period, Report};
use std::fs;
use std::path::PathBuf;

/// Directory of report artifacts.
pub struct ReportStore {
    dir: PathBuf,
}

impl ReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn markdown_path(&self, period: &Period) -> PathBuf {
        self.dir.join(format!("report-{}.md", period.slug()))
    }

    fn json_path(&self, period: &Period) -> PathBuf {
        self.dir.join(format!("report-{}.json", period.slug()))
    }

    /// Persist a report, replacing any earlier artifact for the same period.
    pub fn save(&self, report: &Report) -> Result<PathBuf> {
        let md_path = self.markdown_path(&report.period);
        write_atomic(&md_path, report.to_markdown().as_bytes())?;
        write_atomic(
            &self.json_path(&report.period),
            &serde_json::to_vec_pretty(report)?,
        )?;
        tracing::info!(
            path = %md_path.display(),
            period = %report.period,
            topics = report.topics.len(),
            "Report artifact written"
        );
        Ok(md_path)
    }

    /// Load the stored report for `period`, if any.
    pub fn load(&self, period: &Period) -> Result<Option<Report>> {
        match fs::read(self.json_path(period)) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn period() -> Period {
        Period::new(
            Utc.with_ymd_and_hms(2026, 10, 5, 0, 0, 0).unwrap(),
            Utc.with_ymd_and_hms(2026, 10, 12, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let store = ReportStore::new(dir.path());
        assert!(store.load(&period()).unwrap().is_none());

        let report = Report {
            period: period(),
            topics: vec![],
            narrative: "No activity recorded.".to_string(),
            generated_at: Utc.with_ymd_and_hms(2026, 10, 12, 9, 0, 0).unwrap(),
            input_digest: "abc".to_string(),
            record_count: 0,
        };
        let md_path = store.save(&report).unwrap();

        assert!(md_path.ends_with("report-20261005T000000Z-20261012T000000Z.md"));
        let markdown = fs::read_to_string(&md_path).unwrap();
        assert!(markdown.contains("2026-10-05T00:00:00Z to 2026-10-12T00:00:00Z"));
        assert_eq!(store.load(&period()).unwrap(), Some(report));
    }
}
