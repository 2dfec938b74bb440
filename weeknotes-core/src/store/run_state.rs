//! Persisted scan watermark

use super::write_atomic;
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

const STATE_FILE: &str = "state.json";

/// State carried between scan runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunState {
    /// Time up to which the vault has been fully scanned
    #[serde(default)]
    pub watermark: Option<DateTime<Utc>>,
}

impl RunState {
    /// State file that sits beside the given summary log.
    pub fn path_for(log_path: &Path) -> PathBuf {
        log_path
            .parent()
            .map(|dir| dir.join(STATE_FILE))
            .unwrap_or_else(|| PathBuf::from(STATE_FILE))
    }

    /// Load state, treating a missing file as the first run.
    pub fn load(path: &Path) -> Result<Self> {
        match fs::read(path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e.into()),
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let bytes = serde_json::to_vec_pretty(self)?;
        write_atomic(path, &bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tempfile::TempDir;

    #[test]
    fn test_missing_state_is_first_run() {
        let dir = TempDir::new().unwrap();
        let state = RunState::load(&dir.path().join(STATE_FILE)).unwrap();
        assert!(state.watermark.is_none());
    }

    #[test]
    fn test_state_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = RunState::path_for(&dir.path().join("summaries.jsonl"));
        assert_eq!(path, dir.path().join("state.json"));

        let state = RunState {
            watermark: Some(Utc.with_ymd_and_hms(2026, 10, 12, 8, 30, 0).unwrap()),
        };
        state.save(&path).unwrap();
        assert_eq!(RunState::load(&path).unwrap(), state);
    }
}
