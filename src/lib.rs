//! Offline persistence and sync engine for election field agents.
//!
//! Field reports are drafted, queued, and delivered to the monitoring API
//! whenever connectivity allows. Everything is persisted in one local
//! SQLite store so nothing is lost across restarts.

pub mod api;
pub mod cache;
pub mod clock;
pub mod config;
pub mod drafts;
pub mod error;
pub mod inspector;
pub mod models;
pub mod queue;
pub mod storage;
pub mod sync;

use std::path::Path;
use std::time::Duration;

use serde_json::Value;

use crate::cache::ResponseCache;
use crate::clock::SharedClock;
use crate::drafts::{AutoSaveHandle, DraftManager};
use crate::error::StorageError;
use crate::inspector::QueueInspector;
use crate::models::{
    DraftSubmission, QueueStats, QueuedSubmission, SubmissionStatus, SubmissionType, SyncResult,
};
use crate::queue::SubmissionQueue;
use crate::storage::{Collection, KeyValueStore, SqliteStore};
use crate::sync::{ProgressFn, SubmissionClient, SyncEngine};

/// One store handle plus every manager built on it.
///
/// This is the command/query surface the UI talks to. Open it once at
/// startup and pass it (or clones of its managers) where needed.
#[derive(Clone)]
pub struct OfflineStore<S: KeyValueStore = SqliteStore> {
    store: S,
    drafts: DraftManager<S>,
    queue: SubmissionQueue<S>,
    inspector: QueueInspector<S>,
    cache: ResponseCache<S>,
    engine: SyncEngine<S>,
}

impl OfflineStore<SqliteStore> {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let store = SqliteStore::open(path)?;
        let clock = store.clock();
        Ok(Self::new(store, clock))
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        let store = SqliteStore::open_in_memory()?;
        let clock = store.clock();
        Ok(Self::new(store, clock))
    }
}

impl<S: KeyValueStore> OfflineStore<S> {
    pub fn new(store: S, clock: SharedClock) -> Self {
        let drafts = DraftManager::new(store.clone(), clock.clone());
        let queue = SubmissionQueue::new(store.clone(), drafts.clone(), clock);
        Self {
            inspector: QueueInspector::new(store.clone()),
            cache: ResponseCache::new(store.clone()),
            engine: SyncEngine::new(queue.clone()),
            store,
            drafts,
            queue,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn drafts(&self) -> &DraftManager<S> {
        &self.drafts
    }

    pub fn queue(&self) -> &SubmissionQueue<S> {
        &self.queue
    }

    pub fn inspector(&self) -> &QueueInspector<S> {
        &self.inspector
    }

    pub fn cache(&self) -> &ResponseCache<S> {
        &self.cache
    }

    pub fn engine(&self) -> &SyncEngine<S> {
        &self.engine
    }

    // ── Commands ─────────────────────────────────────────────────────────

    pub async fn save_draft(
        &self,
        form_type: &str,
        election_id: &str,
        data: Value,
    ) -> Result<String, StorageError> {
        self.drafts.save_draft(form_type, election_id, data).await
    }

    pub async fn delete_draft(&self, draft_id: &str) -> Result<(), StorageError> {
        self.drafts.delete_draft(draft_id).await
    }

    pub fn setup_auto_save<F>(
        &self,
        form_type: &str,
        election_id: &str,
        get_form_data: F,
        interval: Duration,
    ) -> AutoSaveHandle
    where
        F: Fn() -> Value + Send + 'static,
    {
        self.drafts
            .setup_auto_save(form_type, election_id, get_form_data, interval)
    }

    pub async fn add_to_queue(
        &self,
        submission_type: SubmissionType,
        election_id: &str,
        polling_unit_code: &str,
        data: Value,
    ) -> Result<String, StorageError> {
        self.queue
            .add_to_queue(submission_type, election_id, polling_unit_code, data)
            .await
    }

    pub async fn update_submission_status(
        &self,
        id: &str,
        status: SubmissionStatus,
        error: Option<String>,
        server_submission_id: Option<String>,
    ) -> Result<Option<QueuedSubmission>, StorageError> {
        self.queue
            .update_submission_status(id, status, error, server_submission_id)
            .await
    }

    pub async fn remove_from_queue(&self, id: &str) -> Result<(), StorageError> {
        self.queue.remove_from_queue(id).await
    }

    pub async fn clear_old_synced_submissions(&self, days_old: u32) -> Result<usize, StorageError> {
        self.queue.clear_old_synced_submissions(days_old).await
    }

    pub async fn sync_submissions<C: SubmissionClient>(
        &self,
        client: &C,
        on_progress: Option<&ProgressFn<'_>>,
    ) -> Result<SyncResult, StorageError> {
        self.engine.sync_submissions(client, on_progress).await
    }

    /// Wipe every collection (logout).
    pub async fn clear_all(&self) -> Result<(), StorageError> {
        for collection in Collection::ALL {
            self.store.clear(collection).await?;
        }
        log::info!("Offline store cleared");
        Ok(())
    }

    // ── Queries ──────────────────────────────────────────────────────────

    pub async fn get_draft(
        &self,
        form_type: &str,
        election_id: &str,
    ) -> Result<Option<DraftSubmission>, StorageError> {
        self.drafts.get_draft(form_type, election_id).await
    }

    pub async fn get_all_drafts(&self) -> Result<Vec<DraftSubmission>, StorageError> {
        self.drafts.get_all_drafts().await
    }

    pub async fn get_queued_submissions(&self) -> Result<Vec<QueuedSubmission>, StorageError> {
        self.queue.get_queued_submissions().await
    }

    pub async fn get_pending_submissions(&self) -> Result<Vec<QueuedSubmission>, StorageError> {
        self.queue.get_pending_submissions().await
    }

    pub async fn get_queue_stats(&self) -> Result<QueueStats, StorageError> {
        self.inspector.get_queue_stats().await
    }
}
