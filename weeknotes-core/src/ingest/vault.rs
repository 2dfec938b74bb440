//! Document store abstraction and the filesystem vault
//!
//! The pipeline only needs one primitive from a store: "documents changed
//! since T". [`FsVault`] implements it for a directory of Markdown notes,
//! filtering on modification time before reading any content.

use crate::config::VaultConfig;
use crate::error::{Error, Result};
use crate::types::Document;
use chrono::{DateTime, Utc};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Component, Path, PathBuf};

/// Documents returned by a store, plus the ones it could not read.
#[derive(Debug, Default)]
pub struct StoreListing {
    pub documents: Vec<Document>,
    pub unreadable: Vec<Unreadable>,
}

/// A changed document whose content could not be read this time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unreadable {
    pub identity: String,
    pub modified_at: DateTime<Utc>,
    pub reason: String,
}

/// Source of documents for the change detector.
pub trait DocumentStore: Send + Sync {
    /// Documents modified strictly after `since`, or all documents when `None`.
    fn changed_since(&self, since: Option<DateTime<Utc>>) -> Result<StoreListing>;
}

/// File metadata for one vault note, without content.
#[derive(Debug, Clone)]
pub struct VaultEntry {
    pub identity: String,
    pub path: PathBuf,
    pub modified_at: DateTime<Utc>,
    /// Creation time where the platform reports it
    pub created_at: Option<DateTime<Utc>>,
}

/// A directory of notes on the local filesystem.
pub struct FsVault {
    root: PathBuf,
    patterns: Vec<String>,
    ignore_hidden: bool,
    excluded: Vec<PathBuf>,
}

impl FsVault {
    /// Create a vault rooted at `root` with the configured patterns.
    pub fn new(root: impl Into<PathBuf>, config: &VaultConfig) -> Self {
        Self {
            root: root.into(),
            patterns: config.patterns.clone(),
            ignore_hidden: config.ignore_hidden,
            excluded: Vec::new(),
        }
    }

    /// Skip everything under `dir` (e.g. a report directory inside the vault).
    pub fn exclude(mut self, dir: impl Into<PathBuf>) -> Self {
        self.excluded.push(dir.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Discover all matching notes, sorted by identity.
    pub fn discover(&self) -> Result<Vec<VaultEntry>> {
        if !self.root.is_dir() {
            return Err(Error::Config(format!(
                "vault path is not a directory: {}",
                self.root.display()
            )));
        }

        let root = glob::Pattern::escape(&self.root.to_string_lossy());
        let mut paths = BTreeSet::new();
        for pattern in &self.patterns {
            let full = format!("{}/{}", root.trim_end_matches('/'), pattern);
            let matches = glob::glob(&full)
                .map_err(|e| Error::Config(format!("invalid vault pattern {pattern:?}: {e}")))?;
            for entry in matches {
                match entry {
                    Ok(path) if path.is_file() => {
                        paths.insert(path);
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to read vault path");
                    }
                }
            }
        }

        let mut entries = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(identity) = self.identity_for(&path) else {
                continue;
            };
            let metadata = match fs::metadata(&path) {
                Ok(m) => m,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to stat note");
                    continue;
                }
            };
            let modified_at = metadata
                .modified()
                .ok()
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(Utc::now);
            let created_at = metadata.created().ok().map(DateTime::<Utc>::from);

            entries.push(VaultEntry {
                identity,
                path,
                modified_at,
                created_at,
            });
        }

        Ok(entries)
    }

    /// Vault-relative identity, or `None` if the path is filtered out.
    fn identity_for(&self, path: &Path) -> Option<String> {
        if self.excluded.iter().any(|dir| path.starts_with(dir)) {
            return None;
        }
        let relative = path.strip_prefix(&self.root).ok()?;
        let mut parts = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(part) => {
                    let part = part.to_string_lossy();
                    if self.ignore_hidden && part.starts_with('.') {
                        return None;
                    }
                    parts.push(part.into_owned());
                }
                Component::CurDir => {}
                _ => return None,
            }
        }
        if parts.is_empty() {
            return None;
        }
        Some(parts.join("/"))
    }
}

/// Read a note as text, replacing invalid UTF-8 rather than failing.
pub fn read_text(path: &Path) -> Result<String> {
    let bytes = fs::read(path)?;
    Ok(match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    })
}

impl DocumentStore for FsVault {
    fn changed_since(&self, since: Option<DateTime<Utc>>) -> Result<StoreListing> {
        let mut listing = StoreListing::default();

        for entry in self.discover()? {
            if let Some(since) = since {
                if entry.modified_at <= since {
                    continue;
                }
            }
            match fs::read(&entry.path) {
                Ok(bytes) => listing.documents.push(Document::from_bytes(
                    entry.identity,
                    bytes,
                    entry.modified_at,
                )),
                Err(e) => {
                    tracing::warn!(path = %entry.path.display(), error = %e, "Failed to read note");
                    listing.unreadable.push(Unreadable {
                        identity: entry.identity,
                        modified_at: entry.modified_at,
                        reason: e.to_string(),
                    });
                }
            }
        }

        tracing::debug!(
            root = %self.root.display(),
            changed = listing.documents.len(),
            "Listed vault changes"
        );
        Ok(listing)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn write(root: &Path, rel: &str, content: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
    }

    #[test]
    fn test_discover_skips_hidden_and_other_extensions() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "inbox.md", "hi");
        write(dir.path(), "Projects/alpha.md", "alpha");
        write(dir.path(), ".obsidian/workspace.md", "ui state");
        write(dir.path(), "Projects/.trash/old.md", "gone");
        write(dir.path(), "image.png", "binary");

        let vault = FsVault::new(dir.path(), &VaultConfig::default());
        let ids: Vec<_> = vault
            .discover()
            .unwrap()
            .into_iter()
            .map(|e| e.identity)
            .collect();
        assert_eq!(ids, vec!["Projects/alpha.md", "inbox.md"]);
    }

    #[test]
    fn test_excluded_directory_is_skipped() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "note.md", "n");
        write(dir.path(), "Reports/report-1.md", "r");

        let vault =
            FsVault::new(dir.path(), &VaultConfig::default()).exclude(dir.path().join("Reports"));
        let listing = vault.changed_since(None).unwrap();
        assert_eq!(listing.documents.len(), 1);
        assert_eq!(listing.documents[0].identity, "note.md");
    }

    #[test]
    fn test_changed_since_filters_on_mtime() {
        let dir = TempDir::new().unwrap();
        write(dir.path(), "a.md", "a");

        let vault = FsVault::new(dir.path(), &VaultConfig::default());
        let future = Utc::now() + chrono::Duration::hours(1);
        assert!(vault.changed_since(Some(future)).unwrap().documents.is_empty());

        let past = Utc::now() - chrono::Duration::hours(1);
        let listing = vault.changed_since(Some(past)).unwrap();
        assert_eq!(listing.documents.len(), 1);
        assert_eq!(listing.documents[0].content, "a");
    }

    #[test]
    fn test_invalid_utf8_is_read_lossily() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("latin.md"), b"caf\xe9").unwrap();

        let text = read_text(&dir.path().join("latin.md")).unwrap();
        assert!(text.starts_with("caf"));
    }

    #[test]
    fn test_non_utf8_edit_changes_fingerprint() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("latin.md");
        let vault = FsVault::new(dir.path(), &VaultConfig::default());

        fs::write(&path, b"caf\xe9").unwrap();
        let before = vault.changed_since(None).unwrap().documents.remove(0);
        fs::write(&path, b"caf\xe8").unwrap();
        let after = vault.changed_since(None).unwrap().documents.remove(0);

        assert_eq!(before.content, after.content);
        assert_ne!(before.fingerprint, after.fingerprint);
        assert_eq!(before.fingerprint, crate::types::fingerprint(b"caf\xe9"));
    }

    #[test]
    fn test_missing_root_is_config_error() {
        let vault = FsVault::new("/definitely/not/here", &VaultConfig::default());
        assert!(matches!(vault.discover(), Err(Error::Config(_))));
    }
}
