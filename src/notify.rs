//! Notification collaborator
//!
//! The engine emits discrete semantic events through the [`Notifier`]
//! contract. Everything is fire-and-forget except the repair decision,
//! which blocks the calling cycle until an answer arrives; escalation is
//! rare (only after the retry budget is exhausted) so the blocking call
//! is an accepted trade-off.

use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::{info, warn};

/// Semantic events the engine reports. Rendering is the collaborator's
/// concern; the engine never formats user-facing text itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallEvent {
    Discovered {
        title_id: String,
        title_name: String,
    },
    InstallStarted {
        title_id: String,
        title_name: String,
    },
    InstallSucceeded {
        title_id: String,
        title_name: String,
        /// Remounts are not re-announced to the user.
        remount: bool,
    },
    InstallFailed {
        title_id: String,
        title_name: String,
        reason: String,
    },
    RetryScheduled {
        title_id: String,
        title_name: String,
        retry_count: u32,
    },
}

/// Outcome of the blocking repair prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RepairDecision {
    Retry,
    Skip,
}

pub trait Notifier {
    /// Fire-and-forget event delivery.
    fn event(&self, event: &InstallEvent);

    /// Free-form startup/summary announcement.
    fn announce(&self, message: &str);

    /// Blocking request for a repair decision on a repeatedly failing
    /// title. Returns once the operator has decided.
    fn request_decision(&self, title_name: &str) -> RepairDecision;
}

/// Production notifier: appends toast lines to the notify file for the
/// rendering collaborator to pick up, and prompts on stdin for repair
/// decisions.
pub struct ToastNotifier {
    notify_file: PathBuf,
}

impl ToastNotifier {
    pub fn new(notify_file: PathBuf) -> Self {
        Self { notify_file }
    }

    /// Toast line format consumed by the renderer: `id|name|message`.
    fn toast(&self, title_id: &str, title_name: &str, message: &str) {
        let line = format!("{title_id}|{title_name}|{message}\n");
        let result = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.notify_file)
            .and_then(|mut f| f.write_all(line.as_bytes()));

        if let Err(e) = result {
            warn!(file = %self.notify_file.display(), error = %e, "Toast write failed");
        }
    }
}

impl Notifier for ToastNotifier {
    fn event(&self, event: &InstallEvent) {
        match event {
            InstallEvent::Discovered {
                title_id,
                title_name,
            } => {
                info!(title_id, title_name, "Discovered");
            }
            InstallEvent::InstallStarted {
                title_id,
                title_name,
            } => {
                info!(title_id, title_name, "Installing");
                self.toast(title_id, title_name, "Installing...");
            }
            InstallEvent::InstallSucceeded {
                title_id,
                title_name,
                remount,
            } => {
                info!(title_id, title_name, remount, "Install succeeded");
                // Remounts stay silent to avoid toast spam on every boot.
                if !remount {
                    self.toast(title_id, title_name, "Installed");
                }
            }
            InstallEvent::InstallFailed {
                title_id,
                title_name,
                reason,
            } => {
                warn!(title_id, title_name, reason, "Install failed");
                self.toast(title_id, title_name, "Install failed");
            }
            InstallEvent::RetryScheduled {
                title_id,
                title_name,
                retry_count,
            } => {
                info!(title_id, title_name, retry_count, "Retry scheduled");
            }
        }
    }

    fn announce(&self, message: &str) {
        info!(message, "Announce");
        self.toast("", "", message);
    }

    fn request_decision(&self, title_name: &str) -> RepairDecision {
        println!("'{title_name}' keeps failing to install. [r]etry or [s]kip?");
        let _ = std::io::stdout().flush();

        let mut line = String::new();
        match std::io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => RepairDecision::Skip,
            Ok(_) => match line.trim().to_lowercase().as_str() {
                "r" | "retry" => RepairDecision::Retry,
                _ => RepairDecision::Skip,
            },
        }
    }
}
