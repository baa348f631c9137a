//! Scan path enumeration
//!
//! Produces the ordered list of directories to scan: builtin defaults
//! covering internal storage and the external volume slots, followed by
//! lines from an optional supplementary list file. No deduplication or
//! existence checks happen here; the cache dedups by resulting path and
//! unreadable directories are skipped at scan time.

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::Config;

/// Number of external USB volume slots probed by the defaults.
pub const USB_SLOTS: usize = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    Default,
    Custom,
}

/// A directory to scan, tagged by where it came from. Immutable after load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPath {
    pub dir: PathBuf,
    pub kind: PathKind,
}

pub struct PathSource {
    defaults: Vec<PathBuf>,
    extra_file: PathBuf,
}

impl PathSource {
    pub fn new(config: &Config) -> Self {
        let defaults = if config.scan_paths.is_empty() {
            builtin_defaults()
        } else {
            config.scan_paths.clone()
        };
        Self {
            defaults,
            extra_file: config.extra_paths_file.clone(),
        }
    }

    /// The ordered scan list: defaults first, then supplementary entries.
    ///
    /// Supplementary lines are trimmed and blank lines skipped. A missing
    /// or unreadable list file contributes nothing.
    pub fn list_paths(&self) -> Vec<ScanPath> {
        let mut paths: Vec<ScanPath> = self
            .defaults
            .iter()
            .map(|dir| ScanPath {
                dir: dir.clone(),
                kind: PathKind::Default,
            })
            .collect();

        for dir in read_extra_paths(&self.extra_file) {
            paths.push(ScanPath {
                dir,
                kind: PathKind::Custom,
            });
        }

        paths
    }
}

/// Builtin scan roots: internal storage first, then the external slots.
pub fn builtin_defaults() -> Vec<PathBuf> {
    let mut paths = vec![
        PathBuf::from("/data/homebrew"),
        PathBuf::from("/data/etaHEN/games"),
    ];

    for slot in 0..USB_SLOTS {
        paths.push(PathBuf::from(format!("/mnt/usb{slot}/homebrew")));
    }
    for slot in 0..USB_SLOTS {
        paths.push(PathBuf::from(format!("/mnt/usb{slot}/etaHEN/games")));
    }
    for slot in 0..USB_SLOTS {
        paths.push(PathBuf::from(format!("/mnt/usb{slot}")));
    }
    paths.push(PathBuf::from("/mnt/ext0"));
    paths.push(PathBuf::from("/mnt/ext1"));

    paths
}

fn read_extra_paths(file: &Path) -> Vec<PathBuf> {
    let content = match std::fs::read_to_string(file) {
        Ok(content) => content,
        Err(e) => {
            if e.kind() != std::io::ErrorKind::NotFound {
                debug!(file = %file.display(), error = %e, "Skipping unreadable path list");
            }
            return Vec::new();
        }
    };

    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(PathBuf::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn config_with_extra(extra: &Path) -> Config {
        Config {
            extra_paths_file: extra.to_path_buf(),
            ..Config::default()
        }
    }

    #[test]
    fn test_builtin_defaults_ordered() {
        let paths = builtin_defaults();
        assert_eq!(paths[0], PathBuf::from("/data/homebrew"));
        assert_eq!(paths[1], PathBuf::from("/data/etaHEN/games"));
        assert!(paths.contains(&PathBuf::from("/mnt/usb7/homebrew")));
        assert_eq!(paths.last().unwrap(), &PathBuf::from("/mnt/ext1"));
        // 2 internal + 3 groups of USB slots + 2 ext volumes
        assert_eq!(paths.len(), 2 + 3 * USB_SLOTS + 2);
    }

    #[test]
    fn test_missing_extra_file_is_ignored() {
        let temp = TempDir::new().unwrap();
        let source = PathSource::new(&config_with_extra(&temp.path().join("nope.txt")));
        let paths = source.list_paths();
        assert!(paths.iter().all(|p| p.kind == PathKind::Default));
    }

    #[test]
    fn test_extra_paths_appended_after_defaults() {
        let temp = TempDir::new().unwrap();
        let extra = temp.path().join("paths.txt");
        std::fs::write(&extra, "/mnt/nfs/games\n\n  /data/drop  \n").unwrap();

        let source = PathSource::new(&config_with_extra(&extra));
        let paths = source.list_paths();

        let customs: Vec<_> = paths
            .iter()
            .filter(|p| p.kind == PathKind::Custom)
            .collect();
        assert_eq!(customs.len(), 2);
        assert_eq!(customs[0].dir, PathBuf::from("/mnt/nfs/games"));
        assert_eq!(customs[1].dir, PathBuf::from("/data/drop"));

        // Customs come after every default
        let first_custom = paths.iter().position(|p| p.kind == PathKind::Custom);
        let last_default = paths.iter().rposition(|p| p.kind == PathKind::Default);
        assert!(first_custom.unwrap() > last_default.unwrap());
    }

    #[test]
    fn test_configured_scan_paths_replace_builtins() {
        let temp = TempDir::new().unwrap();
        let mut config = config_with_extra(&temp.path().join("paths.txt"));
        config.scan_paths = vec![temp.path().join("drop")];

        let source = PathSource::new(&config);
        let paths = source.list_paths();
        assert_eq!(paths.len(), 1);
        assert_eq!(paths[0].dir, temp.path().join("drop"));
    }
}
