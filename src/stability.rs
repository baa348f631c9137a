//! Stability gate
//!
//! Defers action on a candidate directory until it stops changing, so a
//! package still being copied onto the volume is never half-installed.
//! The probe compares the recursive byte size of the directory across a
//! fixed wait; equal non-zero sizes mean stable.

use std::path::Path;
use std::time::Duration;
use tracing::debug;
use walkdir::WalkDir;

use crate::config::Config;

/// Decision seam between the engine and the size probe, so tests can
/// force either verdict without timing games.
pub trait StabilityProbe {
    /// Whether the directory has finished being written.
    ///
    /// `false` means "defer to the next cycle". It is never an error and
    /// must not feed retry accounting.
    fn is_stable(&self, dir: &Path) -> bool;
}

/// Size-probe gate: probes until two consecutive readings agree, bounded
/// by `max_probes` so a perpetually-growing directory cannot stall the
/// cycle forever.
pub struct SizeStabilityGate {
    probe_wait: Duration,
    max_probes: u32,
    max_depth: usize,
}

impl SizeStabilityGate {
    pub fn new(config: &Config) -> Self {
        Self {
            probe_wait: config.probe_wait(),
            max_probes: config.max_probes,
            max_depth: config.max_scan_depth,
        }
    }
}

impl StabilityProbe for SizeStabilityGate {
    fn is_stable(&self, dir: &Path) -> bool {
        let mut previous = dir_size(dir, self.max_depth);

        for probe in 0..self.max_probes {
            std::thread::sleep(self.probe_wait);
            let current = dir_size(dir, self.max_depth);

            if current == previous && current > 0 {
                return true;
            }

            debug!(
                dir = %dir.display(),
                probe,
                previous,
                current,
                "Directory still changing"
            );
            previous = current;
        }

        // Give up for this cycle; the candidate is re-gated next poll.
        false
    }
}

/// Recursive byte size of a directory, depth-capped. Unreadable entries
/// contribute nothing; an unreadable root yields zero, which the gate
/// treats as not-yet-stable.
pub fn dir_size(dir: &Path, max_depth: usize) -> u64 {
    WalkDir::new(dir)
        .max_depth(max_depth)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.metadata().ok())
        .filter(|meta| meta.is_file())
        .map(|meta| meta.len())
        .sum()
}
