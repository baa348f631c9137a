//! Queue record I/O
//!
//! Handles reading and writing the persisted per-title records at
//! `<state_dir>/queue/{title_id}.yaml`. One record per title, written on
//! every state transition and reloaded at startup; this is what lets the
//! daemon resume a half-finished install after a crash instead of
//! silently skipping it.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::models::QueueEntry;

/// Get the queue record directory
pub fn queue_dir(state_dir: &Path) -> PathBuf {
    state_dir.join("queue")
}

/// Get the path to a specific title's record
pub fn entry_path(state_dir: &Path, title_id: &str) -> PathBuf {
    queue_dir(state_dir).join(format!("{title_id}.yaml"))
}

/// Ensure the queue record directory exists
pub fn ensure_queue_dir(state_dir: &Path) -> Result<PathBuf> {
    let dir = queue_dir(state_dir);
    if !dir.exists() {
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create queue directory: {}", dir.display()))?;
    }
    Ok(dir)
}

/// Write a title's record
pub fn write_entry(state_dir: &Path, entry: &QueueEntry) -> Result<PathBuf> {
    ensure_queue_dir(state_dir)?;
    let path = entry_path(state_dir, &entry.title_id);

    let yaml = serde_yaml::to_string(entry).context("Failed to serialize queue entry to YAML")?;

    fs::write(&path, yaml)
        .with_context(|| format!("Failed to write queue record: {}", path.display()))?;

    Ok(path)
}

/// Read a title's record
pub fn read_entry(state_dir: &Path, title_id: &str) -> Result<QueueEntry> {
    let path = entry_path(state_dir, title_id);

    let content = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read queue record: {}", path.display()))?;

    let entry: QueueEntry = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse queue record: {}", path.display()))?;

    Ok(entry)
}

/// Read a title's record, or `None` if it doesn't exist
pub fn read_entry_if_exists(state_dir: &Path, title_id: &str) -> Result<Option<QueueEntry>> {
    let path = entry_path(state_dir, title_id);
    if !path.exists() {
        return Ok(None);
    }
    read_entry(state_dir, title_id).map(Some)
}

/// Delete a title's record (used when an entry is skipped out of the queue)
pub fn delete_entry(state_dir: &Path, title_id: &str) -> Result<()> {
    let path = entry_path(state_dir, title_id);
    if path.exists() {
        fs::remove_file(&path)
            .with_context(|| format!("Failed to delete queue record: {}", path.display()))?;
    }
    Ok(())
}

/// List all persisted records. Corrupt records are logged and skipped so
/// one bad file cannot block startup.
pub fn list_entries(state_dir: &Path) -> Result<Vec<QueueEntry>> {
    let dir = queue_dir(state_dir);

    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut entries = Vec::new();
    let dir_entries = fs::read_dir(&dir)
        .with_context(|| format!("Failed to read queue directory: {}", dir.display()))?;

    for dir_entry in dir_entries {
        let dir_entry = dir_entry?;
        let path = dir_entry.path();

        if path.extension().and_then(|s| s.to_str()) != Some("yaml") {
            continue;
        }

        match fs::read_to_string(&path) {
            Ok(content) => match serde_yaml::from_str::<QueueEntry>(&content) {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unparseable queue record");
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Skipping unreadable queue record");
            }
        }
    }

    entries.sort_by(|a, b| a.title_id.cmp(&b.title_id));
    Ok(entries)
}
