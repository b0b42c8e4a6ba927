//! Durable submission queue.
//!
//! Rows move `pending -> syncing -> synced | failed`. A failed row is picked
//! up again automatically until it has been attempted `MAX_SYNC_ATTEMPTS`
//! times; after that only an explicit status update puts it back in line.
//! `synced` is terminal: the only way out is removal.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde_json::Value;

use crate::clock::SharedClock;
use crate::drafts::DraftManager;
use crate::error::StorageError;
use crate::models::{
    generate_client_submission_id, generate_id, queue_order, QueuedSubmission, SubmissionStatus,
    SubmissionType, DEFAULT_PRIORITY, MAX_PRIORITY, MIN_PRIORITY,
};
use crate::storage::{Collection, KeyValueStore};

/// Synced rows older than this many days are eligible for garbage collection.
pub const DEFAULT_RETENTION_DAYS: u32 = 7;

const DAY_MS: u64 = 24 * 60 * 60 * 1000;

/// Error recorded on rows found in `syncing` when no pass is running.
pub const INTERRUPTED_SYNC_ERROR: &str = "Sync interrupted before completion";

#[derive(Clone)]
pub struct SubmissionQueue<S: KeyValueStore> {
    store: S,
    drafts: DraftManager<S>,
    clock: SharedClock,
}

impl<S: KeyValueStore> SubmissionQueue<S> {
    pub fn new(store: S, drafts: DraftManager<S>, clock: SharedClock) -> Self {
        Self {
            store,
            drafts,
            clock,
        }
    }

    /// Queue a submission at the default priority.
    pub async fn add_to_queue(
        &self,
        submission_type: SubmissionType,
        election_id: &str,
        polling_unit_code: &str,
        data: Value,
    ) -> Result<String, StorageError> {
        self.enqueue(submission_type, election_id, polling_unit_code, data, DEFAULT_PRIORITY)
            .await
    }

    /// Create a `pending` row and drop the draft it was promoted from.
    ///
    /// `priority` is clamped to 1..=10. Returns the new row id.
    pub async fn enqueue(
        &self,
        submission_type: SubmissionType,
        election_id: &str,
        polling_unit_code: &str,
        data: Value,
        priority: u8,
    ) -> Result<String, StorageError> {
        let now = self.clock.now_ms();
        let submission = QueuedSubmission {
            id: generate_id(),
            client_submission_id: generate_client_submission_id(now),
            submission_type,
            election_id: election_id.to_string(),
            polling_unit_code: polling_unit_code.to_string(),
            data,
            status: SubmissionStatus::Pending,
            priority: priority.clamp(MIN_PRIORITY, MAX_PRIORITY),
            created_at: now,
            updated_at: now,
            synced_at: None,
            last_sync_attempt: None,
            sync_attempts: 0,
            error: None,
            server_submission_id: None,
        };

        self.store
            .set(Collection::SyncQueue, &submission.id, &submission, None)
            .await?;
        self.drafts
            .delete_matching(submission_type.as_str(), election_id)
            .await?;

        log::info!(
            "Submission queued: {} ({}, unit {})",
            submission.id,
            submission_type,
            polling_unit_code
        );
        Ok(submission.id)
    }

    pub async fn get_submission(&self, id: &str) -> Result<Option<QueuedSubmission>, StorageError> {
        self.store.get(Collection::SyncQueue, id).await
    }

    /// Every row, highest priority first, then oldest first.
    pub async fn get_queued_submissions(&self) -> Result<Vec<QueuedSubmission>, StorageError> {
        let mut rows: Vec<QueuedSubmission> = self.store.get_all(Collection::SyncQueue).await?;
        rows.sort_by(queue_order);
        Ok(rows)
    }

    /// Rows the next sync pass will attempt, in scheduling order.
    ///
    /// `pending` rows plus `failed` rows that still have automatic retries left.
    pub async fn get_pending_submissions(&self) -> Result<Vec<QueuedSubmission>, StorageError> {
        let mut rows = self.rows_with_status(SubmissionStatus::Pending).await?;
        let retryable = self
            .rows_with_status(SubmissionStatus::Failed)
            .await?
            .into_iter()
            .filter(QueuedSubmission::is_eligible);
        rows.extend(retryable);
        rows.sort_by(queue_order);
        Ok(rows)
    }

    pub async fn get_submissions_by_status(
        &self,
        status: SubmissionStatus,
    ) -> Result<Vec<QueuedSubmission>, StorageError> {
        let mut rows = self.rows_with_status(status).await?;
        rows.sort_by(queue_order);
        Ok(rows)
    }

    /// Failed rows that ran out of automatic retries.
    pub async fn get_exhausted_submissions(&self) -> Result<Vec<QueuedSubmission>, StorageError> {
        let mut rows: Vec<QueuedSubmission> = self
            .rows_with_status(SubmissionStatus::Failed)
            .await?
            .into_iter()
            .filter(QueuedSubmission::is_exhausted)
            .collect();
        rows.sort_by(queue_order);
        Ok(rows)
    }

    /// Move a row to `status`.
    ///
    /// * `syncing` is refused; only `begin_sync` claims a row for a send.
    /// * `synced` stamps `syncedAt`.
    /// * `pending` keeps `syncAttempts`; an exhausted row put back here is
    ///   attempted on the next pass regardless of the cap.
    ///
    /// `error` and `server_submission_id` overwrite the stored values when given.
    /// Unknown ids and transitions out of `synced` are logged no-ops; the
    /// returned row reflects what is stored.
    pub async fn update_submission_status(
        &self,
        id: &str,
        status: SubmissionStatus,
        error: Option<String>,
        server_submission_id: Option<String>,
    ) -> Result<Option<QueuedSubmission>, StorageError> {
        match status {
            SubmissionStatus::Draft => {
                log::warn!("Refusing to move submission {} back to draft", id);
                return self.get_submission(id).await;
            }
            SubmissionStatus::Syncing => {
                log::warn!("Refusing to mark submission {} syncing outside a sync pass", id);
                return self.get_submission(id).await;
            }
            _ => {}
        }

        let now = self.clock.now_ms();
        let updated = self
            .store
            .update(Collection::SyncQueue, id, move |row: &mut QueuedSubmission| {
                if row.status == SubmissionStatus::Synced {
                    if status != SubmissionStatus::Synced {
                        log::warn!(
                            "Submission {} already synced, ignoring transition to {}",
                            row.id,
                            status
                        );
                    }
                    return;
                }
                apply_transition(row, status, now, error, server_submission_id);
            })
            .await?;

        match &updated {
            Some(row) => log::debug!("Submission {} -> {}", id, row.status),
            None => log::warn!("Submission {} not found, status update to {} skipped", id, status),
        }
        Ok(updated)
    }

    /// Claim an eligible row for a sync attempt.
    ///
    /// The eligibility check, attempt increment, and status write happen in
    /// one store update. Returns `None` when the row is gone or no longer
    /// eligible.
    pub async fn begin_sync(&self, id: &str) -> Result<Option<QueuedSubmission>, StorageError> {
        let now = self.clock.now_ms();
        let claimed = Arc::new(AtomicBool::new(false));
        let flag = claimed.clone();
        let row = self
            .store
            .update(Collection::SyncQueue, id, move |row: &mut QueuedSubmission| {
                if row.is_eligible() {
                    apply_transition(row, SubmissionStatus::Syncing, now, None, None);
                    flag.store(true, Ordering::SeqCst);
                }
            })
            .await?;
        Ok(row.filter(|_| claimed.load(Ordering::SeqCst)))
    }

    /// Manual retry: put a failed row back to `pending`.
    pub async fn retry_submission(&self, id: &str) -> Result<Option<QueuedSubmission>, StorageError> {
        self.update_submission_status(id, SubmissionStatus::Pending, None, None)
            .await
    }

    /// Fail rows left in `syncing` by a pass that never finished (crash,
    /// forced quit). The normal retry policy then applies to them.
    pub async fn recover_interrupted(&self) -> Result<usize, StorageError> {
        let stuck = self.rows_with_status(SubmissionStatus::Syncing).await?;
        for row in &stuck {
            self.update_submission_status(
                &row.id,
                SubmissionStatus::Failed,
                Some(INTERRUPTED_SYNC_ERROR.to_string()),
                None,
            )
            .await?;
        }
        if !stuck.is_empty() {
            log::warn!("Recovered {} submissions interrupted mid-sync", stuck.len());
        }
        Ok(stuck.len())
    }

    /// Idempotent delete of any row.
    pub async fn remove_from_queue(&self, id: &str) -> Result<(), StorageError> {
        self.store.delete(Collection::SyncQueue, id).await?;
        log::debug!("Submission {} removed from queue", id);
        Ok(())
    }

    /// Remove synced rows whose `syncedAt` is more than `days_old` days ago.
    pub async fn clear_old_synced_submissions(&self, days_old: u32) -> Result<usize, StorageError> {
        let cutoff = self
            .clock
            .now_ms()
            .saturating_sub(u64::from(days_old) * DAY_MS);
        let synced = self.rows_with_status(SubmissionStatus::Synced).await?;

        let mut removed = 0;
        for row in synced {
            if row.synced_at.is_some_and(|at| at < cutoff) {
                self.store.delete(Collection::SyncQueue, &row.id).await?;
                removed += 1;
            }
        }
        if removed > 0 {
            log::info!("Cleared {} synced submissions older than {} days", removed, days_old);
        }
        Ok(removed)
    }

    pub async fn clear_queue(&self) -> Result<(), StorageError> {
        self.store.clear(Collection::SyncQueue).await
    }

    async fn rows_with_status(
        &self,
        status: SubmissionStatus,
    ) -> Result<Vec<QueuedSubmission>, StorageError> {
        self.store
            .get_by_index(Collection::SyncQueue, "status", &Value::from(status.as_str()))
            .await
    }
}

fn apply_transition(
    row: &mut QueuedSubmission,
    status: SubmissionStatus,
    now: u64,
    error: Option<String>,
    server_submission_id: Option<String>,
) {
    row.status = status;
    row.updated_at = now;
    match status {
        SubmissionStatus::Syncing => {
            row.sync_attempts += 1;
            row.last_sync_attempt = Some(now);
        }
        SubmissionStatus::Synced => {
            row.synced_at = Some(now);
        }
        _ => {}
    }
    if let Some(error) = error {
        row.error = Some(error);
    }
    if let Some(server_id) = server_submission_id {
        row.server_submission_id = Some(server_id);
    }
}
