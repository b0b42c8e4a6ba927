//! Background sync for queued field submissions.
//!
//! `SyncEngine` drains the queue in batches. `SyncDaemon` runs it every
//! 30 seconds, on a manual "sync now", and when connectivity comes back,
//! publishing a `SyncIndicator` for the UI.

pub mod engine;
pub mod status;

pub use engine::{ProgressFn, SubmissionClient, SyncEngine, SYNC_BATCH_SIZE};
pub use status::SyncIndicator;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::models::SyncResult;
use crate::queue::DEFAULT_RETENTION_DAYS;
use crate::storage::KeyValueStore;

/// Shortest accepted polling interval.
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Default polling interval (30 seconds).
pub const SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Why a pass was requested outside the regular tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    Manual,
    ConnectivityRestored,
}

/// Handle for poking a running daemon and watching its state.
///
/// The daemon stops once every handle has been dropped.
#[derive(Clone)]
pub struct SyncHandle {
    trigger_tx: mpsc::Sender<SyncTrigger>,
    status_rx: watch::Receiver<SyncIndicator>,
}

impl SyncHandle {
    /// Request an immediate pass. Returns `false` if one is already queued.
    pub fn sync_now(&self) -> bool {
        self.trigger_tx.try_send(SyncTrigger::Manual).is_ok()
    }

    /// Signal that the device is back online.
    pub fn connectivity_restored(&self) -> bool {
        self.trigger_tx
            .try_send(SyncTrigger::ConnectivityRestored)
            .is_ok()
    }

    pub fn status(&self) -> SyncIndicator {
        self.status_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncIndicator> {
        self.status_rx.clone()
    }
}

/// The background sync daemon.
///
/// Runs passes one at a time in a single task, so two passes never overlap.
pub struct SyncDaemon<S: KeyValueStore, C: SubmissionClient> {
    engine: SyncEngine<S>,
    client: Arc<C>,
    /// Poll interval (default 30s).
    poll_interval: Duration,
    /// Synced rows older than this are pruned after each pass.
    retention_days: u32,
    trigger_rx: mpsc::Receiver<SyncTrigger>,
    status_tx: watch::Sender<SyncIndicator>,
    /// Whether the last pass looked like lost connectivity.
    was_offline: bool,
}

impl<S: KeyValueStore, C: SubmissionClient> SyncDaemon<S, C> {
    pub fn new(engine: SyncEngine<S>, client: Arc<C>) -> (Self, SyncHandle) {
        let (trigger_tx, trigger_rx) = mpsc::channel(1);
        let (status_tx, status_rx) = watch::channel(SyncIndicator::Idle);
        let daemon = Self {
            engine,
            client,
            poll_interval: SYNC_INTERVAL,
            retention_days: DEFAULT_RETENTION_DAYS,
            trigger_rx,
            status_tx,
            was_offline: false,
        };
        (
            daemon,
            SyncHandle {
                trigger_tx,
                status_rx,
            },
        )
    }

    /// Zero is raised to `MIN_POLL_INTERVAL`.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval.max(MIN_POLL_INTERVAL);
        self
    }

    pub fn with_retention_days(mut self, retention_days: u32) -> Self {
        self.retention_days = retention_days;
        self
    }

    /// Main run loop. Call from a spawned tokio task.
    ///
    /// Waits on either the periodic tick or a trigger; returns when all
    /// `SyncHandle`s are gone.
    pub async fn run(mut self) {
        match self.engine.queue().recover_interrupted().await {
            Ok(0) => {}
            Ok(n) => log::info!("Requeued {} submissions interrupted by a previous run", n),
            Err(e) => log::warn!("Could not recover interrupted submissions: {}", e),
        }

        let mut ticker = tokio::time::interval(self.poll_interval);
        // The first tick fires immediately; the caller decides when to sync first.
        ticker.tick().await;

        log::info!(
            "Sync daemon started (interval: {}s)",
            self.poll_interval.as_secs()
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    self.sync_cycle().await;
                }
                trigger = self.trigger_rx.recv() => match trigger {
                    Some(SyncTrigger::Manual) => {
                        log::info!("Manual sync triggered");
                        self.sync_cycle().await;
                    }
                    Some(SyncTrigger::ConnectivityRestored) => {
                        log::info!("Connectivity restored, syncing");
                        self.sync_cycle().await;
                    }
                    None => break,
                },
            }
        }

        log::info!("Sync daemon stopped");
    }

    /// Execute one pass and publish the resulting state.
    async fn sync_cycle(&mut self) {
        self.status_tx.send_replace(SyncIndicator::Syncing);

        let result = match self.engine.sync_submissions(self.client.as_ref(), None).await {
            Ok(result) => result,
            Err(e) => {
                log::error!("Sync pass aborted: {}", e);
                self.status_tx.send_replace(SyncIndicator::Error(e.to_string()));
                return;
            }
        };

        if looks_offline(&result) {
            if !self.was_offline {
                log::info!("Network appears offline, pausing active sync");
                self.was_offline = true;
            }
            self.status_tx.send_replace(SyncIndicator::Offline);
            return;
        }

        if self.was_offline {
            log::info!("Connectivity restored, resuming sync");
            self.was_offline = false;
        }

        if let Err(e) = self
            .engine
            .queue()
            .clear_old_synced_submissions(self.retention_days)
            .await
        {
            log::warn!("Pruning synced submissions failed: {}", e);
        }

        let indicator = if result.failed == 0 {
            SyncIndicator::Synced
        } else {
            SyncIndicator::Error(format!("{} submission(s) failed", result.failed))
        };
        self.status_tx.send_replace(indicator);
    }
}

/// A pass that synced nothing and failed only with transport errors.
fn looks_offline(result: &SyncResult) -> bool {
    result.synced == 0
        && !result.errors.is_empty()
        && result.errors.iter().all(|f| is_network_error(&f.error))
}

/// Heuristic check for network-level errors vs application errors.
fn is_network_error(error: &str) -> bool {
    let network_patterns = [
        "dns error",
        "connect error",
        "connection refused",
        "connection reset",
        "network unreachable",
        "timed out",
        "timeout",
        "no route to host",
        "network is down",
        "couldn't resolve host",
        "error sending request",
    ];
    let lower = error.to_lowercase();
    network_patterns.iter().any(|p| lower.contains(p))
}
