//! Install transaction
//!
//! The mount → copy → register sequence for one title, with rollback on
//! any step's failure. Every failure path unwinds everything created by
//! earlier steps of the same attempt; no partial install survives.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::models::Candidate;
use crate::system::{Mounter, Registrar, ALREADY_REGISTERED, REGISTER_OK};

/// Metadata subtree copied from the package into the application directory.
pub const SCE_SYS: &str = "sce_sys";

/// Icon asset copied to the application directory root.
pub const ICON_FILE: &str = "icon0.png";

/// Tracker record naming the mounted source, written inside the
/// application directory; supports later remounts without recopying.
pub const TRACKER_FILE: &str = "mount.lnk";

/// Metadata file whose visibility under the mount target proves the
/// overlay mount is live.
const MOUNT_PROBE: &str = "sce_sys/param.json";

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("mount failed: {0}")]
    Mount(String),
    #[error("asset copy failed: {0}")]
    Copy(String),
    #[error("registration rejected with code {code:#010x}")]
    Registration { code: i32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Fresh install: assets copied and title newly registered.
    Installed,
    /// The package manager already knew the title; mount refreshed only.
    Remounted,
}

/// Executes install transactions against the mount and registration
/// primitives. Holds no per-title state; the caller owns the queue.
pub struct InstallOrchestrator {
    install_root: PathBuf,
    mount_root: PathBuf,
    mounter: Box<dyn Mounter>,
    registrar: Box<dyn Registrar>,
}

impl InstallOrchestrator {
    pub fn new(
        install_root: PathBuf,
        mount_root: PathBuf,
        mounter: Box<dyn Mounter>,
        registrar: Box<dyn Registrar>,
    ) -> Self {
        Self {
            install_root,
            mount_root,
            mounter,
            registrar,
        }
    }

    /// Per-title user-visible application directory.
    pub fn app_dir(&self, title_id: &str) -> PathBuf {
        self.install_root.join(title_id)
    }

    /// Per-title system mount target.
    pub fn mount_target(&self, title_id: &str) -> PathBuf {
        self.mount_root.join(title_id)
    }

    /// Whether the title's assets have already been copied.
    pub fn is_installed(&self, title_id: &str) -> bool {
        self.app_dir(title_id).exists()
    }

    /// Whether the title's package is currently visible at its mount target.
    pub fn is_mounted(&self, title_id: &str) -> bool {
        self.mount_target(title_id).join(MOUNT_PROBE).exists()
    }

    /// Run one install transaction.
    ///
    /// `remount` skips the asset copy for a title whose application
    /// directory already exists from an earlier attempt. On a remount,
    /// rollback leaves the pre-existing application directory alone and
    /// unwinds only what this attempt created.
    pub fn install_or_mount(
        &self,
        candidate: &Candidate,
        remount: bool,
    ) -> Result<InstallOutcome, InstallError> {
        let title_id = candidate.title_id();
        let target = self.mount_target(title_id);
        let app_dir = self.app_dir(title_id);

        // Step 1: mount target must exist before anything is bound onto it
        std::fs::create_dir_all(&target).map_err(|e| InstallError::Mount(e.to_string()))?;

        // Step 2: clear any stale mount, then bind the package read-only.
        // Nothing has been created yet, so a failure here needs no rollback.
        if let Err(e) = self.mounter.unmount(&target) {
            debug!(target = %target.display(), error = %e, "Stale unmount failed");
        }
        self.mounter
            .mount_ro(&candidate.path, &target)
            .map_err(|e| InstallError::Mount(e.to_string()))?;

        // Step 3: fresh installs copy the metadata subtree and icon
        if !remount {
            if let Err(e) = self.copy_assets(&candidate.path, &app_dir) {
                self.rollback(title_id, !remount);
                return Err(InstallError::Copy(e.to_string()));
            }
        } else {
            debug!(title_id, "Remount: assets already in place, skipping copy");
        }

        // Step 4: tracker record naming the mounted source
        if let Err(e) = std::fs::write(
            app_dir.join(TRACKER_FILE),
            candidate.path.display().to_string(),
        ) {
            self.rollback(title_id, !remount);
            return Err(InstallError::Copy(e.to_string()));
        }

        // Steps 5-6: register and interpret the result code
        let code = match self.registrar.register(title_id, &self.install_root) {
            Ok(code) => code,
            Err(e) => {
                debug!(title_id, error = %e, "Registrar invocation failed");
                self.rollback(title_id, !remount);
                return Err(InstallError::Registration { code: -1 });
            }
        };

        match code {
            REGISTER_OK => {
                info!(title_id, "Registered new title");
                Ok(InstallOutcome::Installed)
            }
            ALREADY_REGISTERED => {
                info!(title_id, "Title already registered, mount restored");
                Ok(InstallOutcome::Remounted)
            }
            code => {
                self.rollback(title_id, !remount);
                Err(InstallError::Registration { code })
            }
        }
    }

    /// Copy the package's metadata subtree and icon into the application
    /// directory. Any failure propagates so the caller can unwind.
    fn copy_assets(&self, source: &Path, app_dir: &Path) -> anyhow::Result<()> {
        let meta_src = source.join(SCE_SYS);
        let meta_dst = app_dir.join(SCE_SYS);
        copy_tree(&meta_src, &meta_dst)?;

        let icon_src = meta_src.join(ICON_FILE);
        if icon_src.exists() {
            std::fs::copy(&icon_src, app_dir.join(ICON_FILE))?;
        }
        Ok(())
    }

    /// Unwind everything this attempt created: the mount, and for fresh
    /// installs the application directory (tracker included).
    fn rollback(&self, title_id: &str, fresh: bool) {
        let target = self.mount_target(title_id);
        if let Err(e) = self.mounter.unmount(&target) {
            debug!(target = %target.display(), error = %e, "Rollback unmount failed");
        }

        let app_dir = self.app_dir(title_id);
        if fresh {
            if let Err(e) = std::fs::remove_dir_all(&app_dir) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    debug!(app_dir = %app_dir.display(), error = %e, "Rollback removal failed");
                }
            }
        } else {
            // Remount: the application directory predates this attempt;
            // only the rewritten tracker goes.
            let _ = std::fs::remove_file(app_dir.join(TRACKER_FILE));
        }
    }
}

/// Recursively copy a directory tree. The destination root is created;
/// any I/O failure propagates immediately, leaving the partial copy for
/// the caller to unwind.
fn copy_tree(src: &Path, dst: &Path) -> anyhow::Result<()> {
    std::fs::create_dir_all(dst)?;

    for entry in WalkDir::new(src).min_depth(1) {
        let entry = entry?;
        let rel = entry.path().strip_prefix(src)?;
        let target = dst.join(rel);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target)?;
        } else {
            std::fs::copy(entry.path(), &target)?;
        }
    }
    Ok(())
}
