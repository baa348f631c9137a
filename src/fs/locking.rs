//! Process-exclusivity lock
//!
//! A single `fs2` advisory lock held for the daemon's entire lifetime.
//! A second instance must fail to acquire it and exit immediately without
//! touching any shared state; this is the only locking the daemon needs,
//! because the state directory has exactly one writer.

use anyhow::{Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Holds the daemon lock for as long as the value lives.
pub struct ProcessLock {
    file: File,
    path: PathBuf,
}

impl ProcessLock {
    /// Acquire the lock, failing immediately if another instance holds it.
    ///
    /// The holder's PID is written into the lock file for diagnostics;
    /// the lock itself is the advisory flock, not the file contents.
    pub fn acquire(path: &Path) -> Result<ProcessLock> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create lock directory: {}", parent.display())
            })?;
        }

        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;

        file.try_lock_exclusive().with_context(|| {
            format!(
                "Another instance is already running (lock held: {})",
                path.display()
            )
        })?;

        file.set_len(0)
            .with_context(|| format!("Failed to truncate lock file: {}", path.display()))?;
        writeln!(file, "{}", std::process::id())
            .with_context(|| format!("Failed to write lock file: {}", path.display()))?;

        Ok(ProcessLock {
            file,
            path: path.to_path_buf(),
        })
    }
}

impl Drop for ProcessLock {
    fn drop(&mut self) {
        let _ = fs2::FileExt::unlock(&self.file);
        let _ = std::fs::remove_file(&self.path);
    }
}
