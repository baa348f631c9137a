//! Install engine poll loop
//!
//! One cycle: observe shutdown, consume the force-reinstall marker,
//! invalidate the cache, rescan all paths, gate and enqueue candidates,
//! then drain eligible entries one at a time. Strictly single-threaded;
//! the mount and registration primitives are not safe to invoke
//! concurrently across titles sharing the same install root.

use anyhow::Result;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::cache::CandidateCache;
use crate::config::Config;
use crate::engine::install::{InstallError, InstallOrchestrator, InstallOutcome};
use crate::engine::retry::{RetryDisposition, RetryPolicy};
use crate::fs::{markers, queue_state};
use crate::metadata::MetadataReader;
use crate::models::{Candidate, QueueEntry, QueueState, TitleMeta};
use crate::notify::{InstallEvent, Notifier, RepairDecision};
use crate::paths::PathSource;
use crate::stability::StabilityProbe;
use crate::system::{Mounter, Registrar};

pub struct Engine {
    config: Config,
    paths: PathSource,
    cache: CandidateCache,
    queue: BTreeMap<String, QueueEntry>,
    reader: Box<dyn MetadataReader>,
    gate: Box<dyn StabilityProbe>,
    orchestrator: InstallOrchestrator,
    notifier: Box<dyn Notifier>,
    policy: RetryPolicy,
    shutdown: Arc<AtomicBool>,
}

impl Engine {
    /// Build an engine and reload the persisted queue. Reloading is what
    /// makes a restart resume a half-finished install instead of
    /// reinitializing it.
    pub fn new(
        config: Config,
        reader: Box<dyn MetadataReader>,
        gate: Box<dyn StabilityProbe>,
        mounter: Box<dyn Mounter>,
        registrar: Box<dyn Registrar>,
        notifier: Box<dyn Notifier>,
    ) -> Result<Self> {
        std::fs::create_dir_all(&config.state_dir)?;

        let mut queue = BTreeMap::new();
        for entry in queue_state::list_entries(&config.state_dir)? {
            debug!(
                title_id = %entry.title_id,
                state = %entry.state,
                retry_count = entry.retry_count,
                "Reloaded queue record"
            );
            queue.insert(entry.title_id.clone(), entry);
        }

        let orchestrator = InstallOrchestrator::new(
            config.install_root.clone(),
            config.mount_root.clone(),
            mounter,
            registrar,
        );

        Ok(Self {
            paths: PathSource::new(&config),
            policy: RetryPolicy::new(config.max_retries),
            config,
            cache: CandidateCache::new(),
            queue,
            reader,
            gate,
            orchestrator,
            notifier,
            shutdown: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Cooperative shutdown flag, shared with the signal handler.
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.shutdown)
    }

    /// Current state of a queued title, if any. Primarily for inspection
    /// and tests.
    pub fn entry_state(&self, title_id: &str) -> Option<QueueState> {
        self.queue.get(title_id).map(|e| e.state)
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Main loop: initial synchronization pass, then poll until a
    /// shutdown is observed at the top of a cycle.
    pub fn run(&mut self) -> Result<()> {
        self.initial_sync()?;

        loop {
            if self.observe_shutdown()? {
                info!("Shutdown observed, persisting queue and exiting");
                self.persist_all();
                return Ok(());
            }

            std::thread::sleep(self.config.poll_interval());
            self.run_cycle()?;
        }
    }

    /// First pass at startup: announce what was found before processing,
    /// then announce completion once the backlog drains.
    fn initial_sync(&mut self) -> Result<()> {
        let force = markers::take_force_reinstall(&self.config.state_dir)?;
        self.discover(force);

        let pending = self
            .queue
            .values()
            .filter(|e| e.state != QueueState::Done)
            .count();

        if pending == 0 {
            self.notifier.announce("Library ready.");
            return Ok(());
        }

        self.notifier
            .announce(&format!("Found {pending} title(s), installing..."));
        self.drain();
        self.notifier.announce("Library synchronized.");
        Ok(())
    }

    /// One full poll cycle. Public so callers (and tests) can drive the
    /// engine without the sleep loop.
    pub fn run_cycle(&mut self) -> Result<()> {
        let force = markers::take_force_reinstall(&self.config.state_dir)?;
        self.discover(force);
        self.drain();
        Ok(())
    }

    /// Invalidate stale cache entries, rescan every path, and fold the
    /// discoveries into the queue.
    fn discover(&mut self, force: bool) {
        if force {
            self.force_reinstall_done_entries();
        }

        self.cache.invalidate_missing();
        let paths = self.paths.list_paths();
        let discovered = self.cache.scan(&paths, self.reader.as_ref());

        for candidate in discovered {
            self.enqueue(candidate, force);
        }
    }

    /// Fold one discovered candidate into the queue, keyed by title id.
    ///
    /// A second path resolving to an already-queued id is a remount
    /// candidate for the existing entry, never a duplicate entry.
    fn enqueue(&mut self, candidate: Candidate, force: bool) {
        let title_id = candidate.title_id().to_string();

        if let Some(entry) = self.queue.get_mut(&title_id) {
            if entry.path != candidate.path {
                debug!(
                    title_id,
                    old = %entry.path.display(),
                    new = %candidate.path.display(),
                    "Duplicate title id, treating as remount candidate"
                );
                entry.path = candidate.path;
                entry.last_update = chrono::Utc::now();
                self.persist(&title_id);
            }
            return;
        }

        let mut entry = match queue_state::read_entry_if_exists(&self.config.state_dir, &title_id)
        {
            Ok(Some(mut persisted)) => {
                // The package may have moved volumes since the record
                // was written; the discovery path is the current truth.
                persisted.path = candidate.path.clone();
                persisted
            }
            Ok(None) => QueueEntry::new(&candidate),
            Err(e) => {
                warn!(title_id, error = %e, "Ignoring unreadable queue record");
                QueueEntry::new(&candidate)
            }
        };

        // A title that is already installed and mounted needs no work;
        // record reality so the drain never touches it.
        if entry.state == QueueState::Pending
            && self.orchestrator.is_installed(&title_id)
            && self.orchestrator.is_mounted(&title_id)
        {
            entry.state = QueueState::Done;
        }

        if force && entry.state == QueueState::Done {
            if let Err(e) = entry.force_reinstall() {
                warn!(title_id, error = %e, "Force reinstall rejected");
            }
        }

        // Titles that turn out to need no work are recorded silently;
        // the event is for discoveries that will be acted on.
        if entry.state != QueueState::Done {
            self.notifier.event(&InstallEvent::Discovered {
                title_id: entry.title_id.clone(),
                title_name: entry.title_name.clone(),
            });
        }

        self.queue.insert(title_id.clone(), entry);
        self.persist(&title_id);
    }

    /// Send every completed entry back to `Pending` for the marker cycle.
    fn force_reinstall_done_entries(&mut self) {
        let done_ids: Vec<String> = self
            .queue
            .values()
            .filter(|e| e.state == QueueState::Done)
            .map(|e| e.title_id.clone())
            .collect();

        for title_id in done_ids {
            if let Some(entry) = self.queue.get_mut(&title_id) {
                if let Err(e) = entry.force_reinstall() {
                    warn!(title_id, error = %e, "Force reinstall rejected");
                    continue;
                }
            }
            info!(title_id, "Forced reinstall");
            self.persist(&title_id);
        }
    }

    /// Run every eligible entry's transaction to completion, one at a
    /// time. `Installing` entries are stale leftovers from a crash and
    /// resume here as well.
    fn drain(&mut self) {
        let eligible: Vec<String> = self
            .queue
            .values()
            .filter(|e| matches!(e.state, QueueState::Pending | QueueState::Installing))
            .map(|e| e.title_id.clone())
            .collect();

        for title_id in eligible {
            let Some(entry) = self.queue.get(&title_id) else {
                continue;
            };

            let fresh = !self.orchestrator.is_installed(&title_id) || entry.force_reinstall;

            // Fresh installs wait until the package stops changing.
            // Deferral is not an error and consumes no retry budget.
            if fresh && !self.gate.is_stable(&entry.path) {
                debug!(title_id, "Deferred, package still changing");
                continue;
            }

            self.run_transaction(&title_id, !fresh);
        }
    }

    /// One install transaction, with state persisted on every transition.
    fn run_transaction(&mut self, title_id: &str, remount: bool) {
        let Some(entry) = self.queue.get_mut(title_id) else {
            return;
        };

        if let Err(e) = entry.transition(QueueState::Installing) {
            warn!(title_id, error = %e, "Cannot start transaction");
            return;
        }
        let candidate = Candidate::new(
            entry.path.clone(),
            TitleMeta::new(entry.title_id.clone(), entry.title_name.clone()),
        );
        let title_name = entry.title_name.clone();
        self.persist(title_id);

        self.notifier.event(&InstallEvent::InstallStarted {
            title_id: title_id.to_string(),
            title_name: title_name.clone(),
        });

        match self.orchestrator.install_or_mount(&candidate, remount) {
            Ok(outcome) => self.complete(title_id, outcome),
            Err(err) => self.fail(title_id, &title_name, err),
        }
    }

    fn complete(&mut self, title_id: &str, outcome: InstallOutcome) {
        let Some(entry) = self.queue.get_mut(title_id) else {
            return;
        };

        if let Err(e) = entry.transition(QueueState::Done) {
            warn!(title_id, error = %e, "Completion transition rejected");
            return;
        }
        entry.retry_count = 0;
        entry.force_reinstall = false;
        let title_name = entry.title_name.clone();
        self.persist(title_id);

        self.notifier.event(&InstallEvent::InstallSucceeded {
            title_id: title_id.to_string(),
            title_name,
            remount: outcome == InstallOutcome::Remounted,
        });
    }

    fn fail(&mut self, title_id: &str, title_name: &str, err: InstallError) {
        self.notifier.event(&InstallEvent::InstallFailed {
            title_id: title_id.to_string(),
            title_name: title_name.to_string(),
            reason: err.to_string(),
        });

        let Some(entry) = self.queue.get_mut(title_id) else {
            return;
        };
        entry.retry_count += 1;
        let retry_count = entry.retry_count;

        match self.policy.disposition(retry_count) {
            RetryDisposition::Retry => {
                if let Err(e) = entry.transition(QueueState::Pending) {
                    warn!(title_id, error = %e, "Retry transition rejected");
                    return;
                }
                self.persist(title_id);
                self.notifier.event(&InstallEvent::RetryScheduled {
                    title_id: title_id.to_string(),
                    title_name: title_name.to_string(),
                    retry_count,
                });
            }
            RetryDisposition::Escalate => {
                if let Err(e) = entry.transition(QueueState::Error) {
                    warn!(title_id, error = %e, "Error transition rejected");
                    return;
                }
                self.persist(title_id);

                // Blocks the cycle until the operator decides; escalation
                // only happens after the full retry budget burned.
                match self.notifier.request_decision(title_name) {
                    RepairDecision::Retry => {
                        if let Some(entry) = self.queue.get_mut(title_id) {
                            if let Err(e) = entry.reset_for_retry() {
                                warn!(title_id, error = %e, "Repair retry rejected");
                                return;
                            }
                        }
                        self.persist(title_id);
                    }
                    RepairDecision::Skip => {
                        info!(title_id, "Skipped by decision, dropping from queue");
                        self.queue.remove(title_id);
                        if let Err(e) =
                            queue_state::delete_entry(&self.config.state_dir, title_id)
                        {
                            warn!(title_id, error = %e, "Failed to drop queue record");
                        }
                    }
                }
            }
        }
    }

    /// Shutdown is observed only here, at a single safe point; never
    /// mid-transaction.
    fn observe_shutdown(&self) -> Result<bool> {
        if self.shutdown.load(Ordering::Relaxed) {
            return Ok(true);
        }
        markers::take_shutdown(&self.config.state_dir)
    }

    /// Persist one entry; write failures are logged, not fatal, at the
    /// cost of possibly losing the latest transition on a crash.
    fn persist(&self, title_id: &str) {
        let Some(entry) = self.queue.get(title_id) else {
            return;
        };
        if let Err(e) = queue_state::write_entry(&self.config.state_dir, entry) {
            warn!(title_id, error = %e, "Failed to persist queue record");
        }
    }

    /// Persist every entry; called once on graceful shutdown.
    pub fn persist_all(&self) {
        for title_id in self.queue.keys() {
            self.persist(title_id);
        }
    }
}
