use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::models::Candidate;

/// Lifecycle state of a queued title.
///
/// State machine transitions:
/// - `Pending` → `Installing` (transaction begins)
/// - `Installing` → `Done` (transaction succeeded)
/// - `Installing` → `Pending` (transaction failed, retry budget remains)
/// - `Installing` → `Error` (transaction failed, retry budget exhausted)
/// - `Error` → `Pending` (retry decision, retry count reset)
/// - `Done` → `Pending` (forced reinstall)
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum QueueState {
    /// Waiting for the next drain to attempt an install.
    #[serde(rename = "pending")]
    Pending,

    /// An install transaction is in flight for this title.
    /// Seeing this state at startup means the daemon died mid-transaction.
    #[serde(rename = "installing")]
    Installing,

    /// Installed and registered.
    #[serde(rename = "done")]
    Done,

    /// Retry budget exhausted; waiting on an operator decision.
    #[serde(rename = "error")]
    Error,
}

impl std::fmt::Display for QueueState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueState::Pending => write!(f, "Pending"),
            QueueState::Installing => write!(f, "Installing"),
            QueueState::Done => write!(f, "Done"),
            QueueState::Error => write!(f, "Error"),
        }
    }
}

impl QueueState {
    /// Check if transitioning from the current state to the new state is valid.
    ///
    /// Transitions are monotonic forward except the two explicit resets:
    /// `Error` → `Pending` (retry decision) and `Done` → `Pending`
    /// (forced reinstall).
    pub fn can_transition_to(&self, new_state: &QueueState) -> bool {
        // Same state is always valid (no-op)
        if self == new_state {
            return true;
        }

        match self {
            QueueState::Pending => matches!(new_state, QueueState::Installing),
            QueueState::Installing => matches!(
                new_state,
                QueueState::Done | QueueState::Pending | QueueState::Error
            ),
            QueueState::Done => matches!(new_state, QueueState::Pending),
            QueueState::Error => matches!(new_state, QueueState::Pending),
        }
    }

    /// Attempt to transition to a new state, returning an error if invalid.
    pub fn try_transition(&self, new_state: QueueState) -> Result<QueueState> {
        if self.can_transition_to(&new_state) {
            Ok(new_state)
        } else {
            bail!("Invalid queue state transition: {self} -> {new_state}")
        }
    }
}

/// The persisted lifecycle record for one title.
///
/// One record per `title_id`, reloaded at startup; this is the
/// crash-recovery anchor for the whole daemon.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    pub title_id: String,
    pub title_name: String,
    pub path: PathBuf,
    pub state: QueueState,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub force_reinstall: bool,
    pub last_update: DateTime<Utc>,
}

impl QueueEntry {
    pub fn new(candidate: &Candidate) -> Self {
        Self {
            title_id: candidate.meta.title_id.clone(),
            title_name: candidate.meta.title_name.clone(),
            path: candidate.path.clone(),
            state: QueueState::Pending,
            retry_count: 0,
            force_reinstall: false,
            last_update: Utc::now(),
        }
    }

    /// Apply a validated state transition and bump the update timestamp.
    pub fn transition(&mut self, new_state: QueueState) -> Result<()> {
        self.state = self.state.try_transition(new_state)?;
        self.last_update = Utc::now();
        Ok(())
    }

    /// Reset to `Pending` with a cleared retry budget. Used for the
    /// operator retry decision and for forced reinstalls.
    pub fn reset_for_retry(&mut self) -> Result<()> {
        self.transition(QueueState::Pending)?;
        self.retry_count = 0;
        Ok(())
    }

    /// Mark a `Done` entry for unconditional reprocessing.
    pub fn force_reinstall(&mut self) -> Result<()> {
        self.reset_for_retry()?;
        self.force_reinstall = true;
        Ok(())
    }
}
