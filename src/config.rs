//! Daemon configuration
//!
//! All tunables live in a single [`Config`] struct with sane defaults,
//! optionally overridden by a TOML file. Tests point every path at a
//! temp directory; the defaults match the console filesystem layout.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the external registration helper resolved via PATH by default.
pub const DEFAULT_REGISTER_COMMAND: &str = "appinst";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the lock file, queue records, markers, and logs.
    pub state_dir: PathBuf,

    /// Root under which per-title application directories are created.
    pub install_root: PathBuf,

    /// Root under which per-title read-only mount targets are created.
    pub mount_root: PathBuf,

    /// Optional supplementary scan path list, one directory per line.
    pub extra_paths_file: PathBuf,

    /// File the notifier appends toast lines to.
    pub notify_file: PathBuf,

    /// Explicit scan roots. Empty means use the builtin defaults.
    pub scan_paths: Vec<PathBuf>,

    /// Command invoked to register a title with the package manager.
    pub register_command: PathBuf,

    /// Seconds to sleep between poll cycles.
    pub poll_interval_secs: u64,

    /// Milliseconds between the two size probes of the stability gate.
    pub probe_wait_ms: u64,

    /// Consecutive unequal probes before the gate gives up for the cycle.
    pub max_probes: u32,

    /// Recursion depth cap when computing directory sizes.
    pub max_scan_depth: usize,

    /// Consecutive transaction failures before escalating to a decision.
    pub max_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        let state_dir = PathBuf::from("/data/sideload");
        Self {
            extra_paths_file: state_dir.join("paths.txt"),
            notify_file: state_dir.join("notify.txt"),
            state_dir,
            install_root: PathBuf::from("/user/app"),
            mount_root: PathBuf::from("/system_ex/app"),
            scan_paths: Vec::new(),
            register_command: PathBuf::from(DEFAULT_REGISTER_COMMAND),
            poll_interval_secs: 3,
            probe_wait_ms: 2000,
            max_probes: 100,
            max_scan_depth: 16,
            max_retries: 3,
        }
    }
}

impl Config {
    /// Load configuration from a TOML file, or defaults when `path` is `None`.
    pub fn load(path: Option<&Path>) -> Result<Config> {
        match path {
            None => Ok(Config::default()),
            Some(path) => {
                let content = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config file: {}", path.display()))?;
                toml::from_str(&content)
                    .with_context(|| format!("Failed to parse config file: {}", path.display()))
            }
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn probe_wait(&self) -> Duration {
        Duration::from_millis(self.probe_wait_ms)
    }

    pub fn lock_path(&self) -> PathBuf {
        self.state_dir.join("daemon.lock")
    }

    pub fn pid_path(&self) -> PathBuf {
        self.state_dir.join("daemon.pid")
    }

    pub fn log_path(&self) -> PathBuf {
        self.state_dir.join("daemon.log")
    }
}
