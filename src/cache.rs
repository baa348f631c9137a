//! Candidate cache
//!
//! Deduplicates discovered directories by path so the metadata reader runs
//! at most once per directory while its entry stays valid. Entries whose
//! backing path disappears are invalidated, not deleted, and become
//! eligible for re-discovery if the path comes back.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::metadata::MetadataReader;
use crate::models::Candidate;
use crate::paths::ScanPath;

#[derive(Debug, Clone)]
pub struct CacheEntry {
    pub candidate: Candidate,
    pub valid: bool,
}

/// Path-keyed cache of discovered candidates.
#[derive(Default)]
pub struct CandidateCache {
    entries: HashMap<PathBuf, CacheEntry>,
}

impl CandidateCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Invalidate every valid entry whose backing path no longer exists.
    /// Returns how many entries were invalidated.
    pub fn invalidate_missing(&mut self) -> usize {
        let mut invalidated = 0;
        for (path, entry) in self.entries.iter_mut() {
            if entry.valid && !path.exists() {
                debug!(path = %path.display(), "Cache entry invalidated, path gone");
                entry.valid = false;
                invalidated += 1;
            }
        }
        invalidated
    }

    /// Whether a path already has a live cache entry.
    pub fn contains_valid(&self, path: &Path) -> bool {
        self.entries.get(path).map(|e| e.valid).unwrap_or(false)
    }

    pub fn valid_count(&self) -> usize {
        self.entries.values().filter(|e| e.valid).count()
    }

    /// Enumerate immediate child directories of every scan path, in order,
    /// and return the candidates discovered this pass.
    ///
    /// Dot-named entries are skipped. Already-cached valid paths are skipped
    /// silently. Directories the reader rejects are NOT cached, so they are
    /// re-probed on every future cycle.
    pub fn scan(&mut self, paths: &[ScanPath], reader: &dyn MetadataReader) -> Vec<Candidate> {
        let mut discovered = Vec::new();

        for scan_path in paths {
            let entries = match std::fs::read_dir(&scan_path.dir) {
                Ok(entries) => entries,
                Err(e) => {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        debug!(dir = %scan_path.dir.display(), error = %e, "Scan path unreadable");
                    }
                    continue;
                }
            };

            for entry in entries.flatten() {
                let name = entry.file_name();
                if name.to_string_lossy().starts_with('.') {
                    continue;
                }

                let child = canonical(&scan_path.dir.join(&name));
                if !child.is_dir() || self.contains_valid(&child) {
                    continue;
                }

                let Some(meta) = reader.read(&child) else {
                    continue;
                };

                let candidate = Candidate::new(child.clone(), meta);
                debug!(
                    path = %child.display(),
                    title_id = %candidate.title_id(),
                    "Discovered candidate"
                );
                self.entries.insert(
                    child,
                    CacheEntry {
                        candidate: candidate.clone(),
                        valid: true,
                    },
                );
                discovered.push(candidate);
            }
        }

        discovered
    }
}

/// Canonicalize so trailing slashes and symlinks cannot produce two entries
/// for the same physical directory. Falls back to the raw path when the
/// path cannot be resolved.
fn canonical(path: &Path) -> PathBuf {
    std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
