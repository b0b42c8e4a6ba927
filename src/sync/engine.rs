//! Batched drain of the submission queue.
//!
//! Eligible rows are split into fixed-size batches in scheduling order. Rows
//! within a batch are posted concurrently; the next batch starts only after
//! every member of the previous one has settled.

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::join_all;
use serde_json::Value;

use crate::api::types::SubmitResponse;
use crate::error::{ClientError, StorageError};
use crate::models::{QueuedSubmission, SubmissionStatus, SyncFailure, SyncResult, MAX_SYNC_ATTEMPTS};
use crate::queue::SubmissionQueue;
use crate::storage::KeyValueStore;

/// Maximum number of submissions in flight at once.
pub const SYNC_BATCH_SIZE: usize = 10;

/// Recorded when the server says no without saying why.
pub const DEFAULT_REJECTION: &str = "Submission rejected by server";

/// Network side of a sync pass.
///
/// In production `ApiClient` posts over HTTP. In tests a mock controls
/// success and failure per call.
pub trait SubmissionClient: Send + Sync {
    /// POST `payload` to `endpoint`.
    ///
    /// `Err` means the request never produced a usable answer (transport
    /// failure, unreadable body). A server refusal is `Ok` with
    /// `success: false`.
    fn post_submission(
        &self,
        endpoint: &str,
        payload: &Value,
    ) -> impl Future<Output = Result<SubmitResponse, ClientError>> + Send;
}

/// Progress callback: `(started, total, submission)`.
///
/// `started` counts submissions that have entered `syncing` in this pass,
/// across batches, so it only ever increases.
pub type ProgressFn<'a> = dyn Fn(usize, usize, &QueuedSubmission) + Send + Sync + 'a;

enum Outcome {
    Synced,
    Failed(SyncFailure),
    Skipped,
}

#[derive(Clone)]
pub struct SyncEngine<S: KeyValueStore> {
    queue: SubmissionQueue<S>,
    batch_size: usize,
}

impl<S: KeyValueStore> SyncEngine<S> {
    pub fn new(queue: SubmissionQueue<S>) -> Self {
        Self::with_batch_size(queue, SYNC_BATCH_SIZE)
    }

    pub fn with_batch_size(queue: SubmissionQueue<S>, batch_size: usize) -> Self {
        Self {
            queue,
            batch_size: batch_size.max(1),
        }
    }

    pub fn queue(&self) -> &SubmissionQueue<S> {
        &self.queue
    }

    /// Run one sync pass over every eligible submission.
    ///
    /// Per-submission failures are recorded on the row and in the result;
    /// they never abort the pass. `Err` only when the eligible set cannot
    /// be read. Must not be called concurrently with itself.
    pub async fn sync_submissions<C: SubmissionClient>(
        &self,
        client: &C,
        on_progress: Option<&ProgressFn<'_>>,
    ) -> Result<SyncResult, StorageError> {
        let eligible = self.queue.get_pending_submissions().await?;
        if eligible.is_empty() {
            return Ok(SyncResult::default());
        }

        let total = eligible.len();
        let started = AtomicUsize::new(0);
        let mut result = SyncResult::default();
        log::info!("Sync pass started: {} submissions", total);

        for (index, batch) in eligible.chunks(self.batch_size).enumerate() {
            log::debug!("Sync batch {} ({} submissions)", index + 1, batch.len());
            let outcomes = join_all(
                batch
                    .iter()
                    .map(|submission| self.sync_one(client, submission, total, &started, on_progress)),
            )
            .await;

            for outcome in outcomes {
                match outcome {
                    Outcome::Synced => result.synced += 1,
                    Outcome::Failed(failure) => {
                        result.failed += 1;
                        result.errors.push(failure);
                    }
                    Outcome::Skipped => {}
                }
            }
        }

        log::info!(
            "Sync pass finished: {} synced, {} failed",
            result.synced,
            result.failed
        );
        Ok(result)
    }

    async fn sync_one<C: SubmissionClient>(
        &self,
        client: &C,
        submission: &QueuedSubmission,
        total: usize,
        started: &AtomicUsize,
        on_progress: Option<&ProgressFn<'_>>,
    ) -> Outcome {
        let claimed = match self.queue.begin_sync(&submission.id).await {
            Ok(Some(row)) => row,
            Ok(None) => {
                log::debug!("Submission {} no longer eligible, skipped", submission.id);
                return Outcome::Skipped;
            }
            Err(e) => {
                log::error!("Failed to mark submission {} syncing: {}", submission.id, e);
                return Outcome::Failed(SyncFailure {
                    id: submission.id.clone(),
                    error: e.to_string(),
                });
            }
        };

        let count = started.fetch_add(1, Ordering::SeqCst) + 1;
        if let Some(report) = on_progress {
            report(count, total, &claimed);
        }

        let endpoint = claimed.submission_type.endpoint();
        let error = match client.post_submission(endpoint, &claimed.payload()).await {
            Ok(response) if response.success => {
                let server_id = response.submission_id().map(str::to_string);
                return self.finish_synced(&claimed, server_id).await;
            }
            Ok(response) => response
                .message
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| DEFAULT_REJECTION.to_string()),
            Err(e) => e.message(),
        };

        self.finish_failed(&claimed, error).await
    }

    async fn finish_synced(&self, submission: &QueuedSubmission, server_id: Option<String>) -> Outcome {
        match self
            .queue
            .update_submission_status(&submission.id, SubmissionStatus::Synced, None, server_id)
            .await
        {
            Ok(_) => {
                log::info!(
                    "Queued submission synced: {} ({})",
                    submission.id,
                    submission.submission_type
                );
                Outcome::Synced
            }
            Err(e) => {
                // Accepted upstream but not recorded; the row stays `syncing`
                // until recovery and the server deduplicates the resend.
                log::error!("Failed to record sync of {}: {}", submission.id, e);
                Outcome::Failed(SyncFailure {
                    id: submission.id.clone(),
                    error: e.to_string(),
                })
            }
        }
    }

    async fn finish_failed(&self, submission: &QueuedSubmission, error: String) -> Outcome {
        log::warn!(
            "Queued submission failed: {} ({}, attempt {}) - {}",
            submission.id,
            submission.submission_type,
            submission.sync_attempts,
            error
        );
        if let Err(e) = self
            .queue
            .update_submission_status(
                &submission.id,
                SubmissionStatus::Failed,
                Some(error.clone()),
                None,
            )
            .await
        {
            log::error!("Failed to record failure of {}: {}", submission.id, e);
        } else if submission.sync_attempts >= MAX_SYNC_ATTEMPTS {
            log::warn!(
                "Submission {} exhausted {} automatic attempts, waiting for manual retry",
                submission.id,
                submission.sync_attempts
            );
        }
        Outcome::Failed(SyncFailure {
            id: submission.id.clone(),
            error,
        })
    }
}
