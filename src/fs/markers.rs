//! Sentinel marker files
//!
//! External collaborators signal the daemon through file presence: a
//! shutdown marker checked once per cycle, and a force-reinstall marker
//! that makes every candidate discovered that cycle reprocess
//! unconditionally. Both are consumed (removed) when observed.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

pub const SHUTDOWN_MARKER: &str = "STOP";
pub const FORCE_REINSTALL_MARKER: &str = "REINSTALL";

fn marker_path(state_dir: &Path, name: &str) -> PathBuf {
    state_dir.join(name)
}

/// Create a marker file (used by the CLI to signal the daemon).
fn place(state_dir: &Path, name: &str) -> Result<PathBuf> {
    std::fs::create_dir_all(state_dir)
        .with_context(|| format!("Failed to create state directory: {}", state_dir.display()))?;
    let path = marker_path(state_dir, name);
    std::fs::write(&path, b"")
        .with_context(|| format!("Failed to create marker: {}", path.display()))?;
    Ok(path)
}

/// Observe and consume a marker. Returns whether it was present.
fn take(state_dir: &Path, name: &str) -> Result<bool> {
    let path = marker_path(state_dir, name);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => {
            Err(e).with_context(|| format!("Failed to remove marker: {}", path.display()))
        }
    }
}

pub fn request_shutdown(state_dir: &Path) -> Result<PathBuf> {
    place(state_dir, SHUTDOWN_MARKER)
}

pub fn take_shutdown(state_dir: &Path) -> Result<bool> {
    take(state_dir, SHUTDOWN_MARKER)
}

pub fn request_force_reinstall(state_dir: &Path) -> Result<PathBuf> {
    place(state_dir, FORCE_REINSTALL_MARKER)
}

pub fn take_force_reinstall(state_dir: &Path) -> Result<bool> {
    take(state_dir, FORCE_REINSTALL_MARKER)
}
