//! Process-level run lock.
//!
//! Any command that appends to the summary log, moves the watermark or
//! writes a report holds an advisory OS file lock (flock) on
//! `<summary log>.lock` for its whole lifetime. A second run against the same
//! log fails fast instead of interleaving appends.

use anyhow::{Context, Result};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Seek, SeekFrom, Write};
use std::os::fd::AsRawFd;
use std::path::{Path, PathBuf};

/// Held for the duration of a run; unlocks on drop.
pub struct RunLock {
    file: File,
    path: PathBuf,
}

impl RunLock {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        // The lock file itself stays; removing it would let a waiting
        // process lock an unlinked inode.
        let _ = unlock_file(&self.file);
    }
}

/// Lock file that guards the given summary log.
pub fn lock_path_for(log_path: &Path) -> PathBuf {
    let mut name = log_path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_else(|| "summaries.jsonl".into());
    name.push(".lock");
    log_path.with_file_name(name)
}

/// Acquire the run lock for `log_path`, failing if another run holds it.
pub fn acquire_run_lock(log_path: &Path) -> Result<RunLock> {
    match try_acquire_run_lock(log_path)? {
        Some(lock) => Ok(lock),
        None => anyhow::bail!(
            "another weeknotes run is already using {} (lock: {})",
            log_path.display(),
            lock_path_for(log_path).display()
        ),
    }
}

fn try_acquire_run_lock(log_path: &Path) -> Result<Option<RunLock>> {
    let path = lock_path_for(log_path);
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir)
            .with_context(|| format!("failed to create data directory: {}", dir.display()))?;
    }

    let mut file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(&path)
        .with_context(|| format!("failed to open lock file: {}", path.display()))?;

    match lock_file_nonblocking(&file) {
        Ok(()) => {
            // Write basic owner info for debugging.
            let _ = file.set_len(0);
            let _ = file.seek(SeekFrom::Start(0));
            let _ = writeln!(file, "pid={}", std::process::id());
            let _ = file.flush();

            Ok(Some(RunLock { file, path }))
        }
        Err(e) if is_lock_busy(&e) => Ok(None),
        Err(e) => Err(e).with_context(|| format!("failed to lock file: {}", path.display())),
    }
}

fn is_lock_busy(error: &io::Error) -> bool {
    matches!(error.kind(), io::ErrorKind::WouldBlock)
        || matches!(error.raw_os_error(), Some(11) | Some(35))
}

#[cfg(unix)]
fn lock_file_nonblocking(file: &File) -> io::Result<()> {
    const LOCK_EX: i32 = 2;
    const LOCK_NB: i32 = 4;
    let fd = file.as_raw_fd();
    // SAFETY: flock is called with a valid file descriptor and constant flags.
    let rc = unsafe { flock(fd, LOCK_EX | LOCK_NB) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(unix)]
fn unlock_file(file: &File) -> io::Result<()> {
    const LOCK_UN: i32 = 8;
    let fd = file.as_raw_fd();
    // SAFETY: flock is called with a valid file descriptor and constant flags.
    let rc = unsafe { flock(fd, LOCK_UN) };
    if rc == 0 {
        Ok(())
    } else {
        Err(io::Error::last_os_error())
    }
}

#[cfg(unix)]
extern "C" {
    fn flock(fd: i32, operation: i32) -> i32;
}

#[cfg(not(unix))]
compile_error!("weeknotes run locks currently require Unix (macOS/Linux)");
