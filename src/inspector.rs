//! Read-side views over the queue. Nothing here is cached; every call
//! recomputes from the store.

use crate::error::StorageError;
use crate::models::{queue_order, QueueStats, QueuedSubmission, SubmissionStatus, SubmissionType};
use crate::storage::{Collection, KeyValueStore};

/// Optional predicates for `QueueInspector::filter`. `None` matches anything.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmissionFilter {
    pub status: Option<SubmissionStatus>,
    pub submission_type: Option<SubmissionType>,
    pub election_id: Option<String>,
}

impl SubmissionFilter {
    pub fn matches(&self, row: &QueuedSubmission) -> bool {
        self.status.map_or(true, |s| row.status == s)
            && self.submission_type.map_or(true, |t| row.submission_type == t)
            && self
                .election_id
                .as_deref()
                .map_or(true, |e| row.election_id == e)
    }
}

#[derive(Clone)]
pub struct QueueInspector<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> QueueInspector<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Counts by status over one read of the queue, plus the draft count.
    ///
    /// The four status counts always sum to `total`.
    pub async fn get_queue_stats(&self) -> Result<QueueStats, StorageError> {
        let rows: Vec<QueuedSubmission> = self.store.get_all(Collection::SyncQueue).await?;
        let mut stats = QueueStats {
            total: rows.len(),
            ..QueueStats::default()
        };
        for row in &rows {
            match row.status {
                SubmissionStatus::Pending => stats.pending += 1,
                SubmissionStatus::Syncing => stats.syncing += 1,
                SubmissionStatus::Synced => stats.synced += 1,
                SubmissionStatus::Failed => stats.failed += 1,
                SubmissionStatus::Draft => {
                    // Not a valid queue state; count it as pending so the sum holds.
                    log::warn!("Queue row {} has draft status", row.id);
                    stats.pending += 1;
                }
            }
        }
        stats.draft = self.store.count(Collection::Drafts).await?;
        Ok(stats)
    }

    /// Queue rows matching `filter`, in scheduling order.
    pub async fn filter(
        &self,
        filter: &SubmissionFilter,
    ) -> Result<Vec<QueuedSubmission>, StorageError> {
        let rows: Vec<QueuedSubmission> = match filter.status {
            Some(status) => {
                self.store
                    .get_by_index(Collection::SyncQueue, "status", &status.as_str().into())
                    .await?
            }
            None => self.store.get_all(Collection::SyncQueue).await?,
        };
        let mut rows: Vec<QueuedSubmission> =
            rows.into_iter().filter(|r| filter.matches(r)).collect();
        rows.sort_by(queue_order);
        Ok(rows)
    }

    /// Whether anything is waiting to be sent (pending, syncing, or retryable).
    pub async fn has_pending(&self) -> Result<bool, StorageError> {
        let rows: Vec<QueuedSubmission> = self.store.get_all(Collection::SyncQueue).await?;
        Ok(rows
            .iter()
            .any(|r| r.is_eligible() || r.status == SubmissionStatus::Syncing))
    }
}
