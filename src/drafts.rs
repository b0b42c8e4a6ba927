//! Auto-saved form drafts.
//!
//! At most one draft exists per (form type, election). Saving an existing
//! pair replaces its data in place and keeps its id and creation time.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::clock::SharedClock;
use crate::error::StorageError;
use crate::models::{generate_id, DraftSubmission};
use crate::storage::{Collection, KeyValueStore};

/// Default auto-save period (30 seconds).
pub const AUTO_SAVE_INTERVAL: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct DraftManager<S: KeyValueStore> {
    store: S,
    clock: SharedClock,
}

impl<S: KeyValueStore> DraftManager<S> {
    pub fn new(store: S, clock: SharedClock) -> Self {
        Self { store, clock }
    }

    /// Find-or-create the draft for `(form_type, election_id)` and store `data`.
    ///
    /// Returns the draft id, which is stable across saves of the same pair.
    pub async fn save_draft(
        &self,
        form_type: &str,
        election_id: &str,
        data: Value,
    ) -> Result<String, StorageError> {
        let now = self.clock.now_ms();
        let draft = match self.get_draft(form_type, election_id).await? {
            Some(mut existing) => {
                existing.data = data;
                existing.updated_at = now;
                existing
            }
            None => DraftSubmission {
                id: generate_id(),
                form_type: form_type.to_string(),
                election_id: election_id.to_string(),
                data,
                created_at: now,
                updated_at: now,
            },
        };
        self.store.set(Collection::Drafts, &draft.id, &draft, None).await?;
        log::debug!("Draft saved: {} ({}/{})", draft.id, form_type, election_id);
        Ok(draft.id)
    }

    pub async fn get_draft(
        &self,
        form_type: &str,
        election_id: &str,
    ) -> Result<Option<DraftSubmission>, StorageError> {
        let drafts: Vec<DraftSubmission> = self
            .store
            .get_by_index(Collection::Drafts, "formType", &Value::from(form_type))
            .await?;
        Ok(drafts.into_iter().find(|d| d.election_id == election_id))
    }

    /// All drafts, most recently edited first.
    pub async fn get_all_drafts(&self) -> Result<Vec<DraftSubmission>, StorageError> {
        let mut drafts: Vec<DraftSubmission> = self.store.get_all(Collection::Drafts).await?;
        drafts.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        Ok(drafts)
    }

    /// Idempotent.
    pub async fn delete_draft(&self, draft_id: &str) -> Result<(), StorageError> {
        self.store.delete(Collection::Drafts, draft_id).await
    }

    /// Delete the draft for a pair if one exists. Returns whether one did.
    pub async fn delete_matching(
        &self,
        form_type: &str,
        election_id: &str,
    ) -> Result<bool, StorageError> {
        match self.get_draft(form_type, election_id).await? {
            Some(draft) => {
                self.delete_draft(&draft.id).await?;
                log::debug!("Draft {} promoted, removed", draft.id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub async fn count(&self) -> Result<usize, StorageError> {
        self.store.count(Collection::Drafts).await
    }

    pub async fn clear_drafts(&self) -> Result<(), StorageError> {
        self.store.clear(Collection::Drafts).await
    }

    /// Persist `get_form_data()` every `interval` until the handle is stopped.
    ///
    /// Empty form data (null, `{}`, `[]`, `""`) is not saved. The first save
    /// happens one full interval after setup. A zero interval is raised to
    /// one millisecond. Must be called inside a tokio runtime.
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
        let drafts = self.clone();
        let form_type = form_type.to_string();
        let election_id = election_id.to_string();
        let interval = interval.max(Duration::from_millis(1));
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick fires immediately; the form has nothing to save yet.
            ticker.tick().await;

            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => {
                        let data = get_form_data();
                        if is_empty_form(&data) {
                            continue;
                        }
                        if let Err(e) = drafts.save_draft(&form_type, &election_id, data).await {
                            log::warn!(
                                "Auto-save failed for {}/{}: {}",
                                form_type,
                                election_id,
                                e
                            );
                        }
                    }
                }
            }
            log::debug!("Auto-save stopped for {}/{}", form_type, election_id);
        });

        AutoSaveHandle {
            stop_tx: Some(stop_tx),
            task: Some(task),
        }
    }
}

/// Cancellation handle for an auto-save timer.
///
/// Dropping the handle stops the timer as well. A save already in flight
/// finishes; no tick is scheduled afterwards.
pub struct AutoSaveHandle {
    stop_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl AutoSaveHandle {
    pub fn stop(mut self) {
        self.cancel();
    }

    /// Stop and wait for an in-flight save to finish.
    pub async fn stop_and_wait(mut self) {
        self.cancel();
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                log::warn!("Auto-save task ended abnormally: {}", e);
            }
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.as_ref().map_or(true, |task| task.is_finished())
    }

    fn cancel(&mut self) {
        if let Some(tx) = self.stop_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for AutoSaveHandle {
    fn drop(&mut self) {
        self.cancel();
    }
}

fn is_empty_form(data: &Value) -> bool {
    match data {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::String(s) => s.is_empty(),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::SqliteStore;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn manager() -> (DraftManager<SqliteStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let store = SqliteStore::open_in_memory_with_clock(clock.clone()).unwrap();
        (DraftManager::new(store, clock.clone()), clock)
    }

    #[tokio::test]
    async fn test_save_then_get() {
        let (drafts, _) = manager();
        let id = drafts
            .save_draft("incident_report", "e1", json!({"summary": "ballot box snatched"}))
            .await
            .unwrap();

        let draft = drafts.get_draft("incident_report", "e1").await.unwrap().unwrap();
        assert_eq!(draft.id, id);
        assert_eq!(draft.data["summary"], "ballot box snatched");
    }

    #[tokio::test]
    async fn test_save_twice_replaces_in_place() {
        let (drafts, clock) = manager();
        let first = drafts
            .save_draft("result_tracking", "e1", json!({"apc": 10}))
            .await
            .unwrap();
        clock.advance(5_000);
        let second = drafts
            .save_draft("result_tracking", "e1", json!({"apc": 12}))
            .await
            .unwrap();

        assert_eq!(first, second);
        let all = drafts.get_all_drafts().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].data, json!({"apc": 12}));
        assert_eq!(all[0].created_at, 1_700_000_000_000);
        assert_eq!(all[0].updated_at, 1_700_000_005_000);
    }

    #[tokio::test]
    async fn test_drafts_keyed_by_form_and_election() {
        let (drafts, _) = manager();
        drafts.save_draft("result_tracking", "e1", json!({"a": 1})).await.unwrap();
        drafts.save_draft("result_tracking", "e2", json!({"a": 2})).await.unwrap();
        drafts.save_draft("incident_report", "e1", json!({"a": 3})).await.unwrap();

        assert_eq!(drafts.count().await.unwrap(), 3);
        let e2 = drafts.get_draft("result_tracking", "e2").await.unwrap().unwrap();
        assert_eq!(e2.data, json!({"a": 2}));
        assert!(drafts.get_draft("officer_arrival", "e1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_get_all_newest_first() {
        let (drafts, clock) = manager();
        drafts.save_draft("a", "e1", json!({"n": 1})).await.unwrap();
        clock.advance(10);
        drafts.save_draft("b", "e1", json!({"n": 2})).await.unwrap();

        let all = drafts.get_all_drafts().await.unwrap();
        assert_eq!(all[0].form_type, "b");
        assert_eq!(all[1].form_type, "a");
    }

    #[tokio::test]
    async fn test_delete_draft_idempotent() {
        let (drafts, _) = manager();
        let id = drafts.save_draft("a", "e1", json!({"n": 1})).await.unwrap();
        drafts.delete_draft(&id).await.unwrap();
        drafts.delete_draft(&id).await.unwrap();
        assert!(drafts.get_draft("a", "e1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_delete_matching() {
        let (drafts, _) = manager();
        drafts.save_draft("a", "e1", json!({"n": 1})).await.unwrap();
        assert!(drafts.delete_matching("a", "e1").await.unwrap());
        assert!(!drafts.delete_matching("a", "e1").await.unwrap());
    }

    #[test]
    fn test_is_empty_form() {
        assert!(is_empty_form(&Value::Null));
        assert!(is_empty_form(&json!({})));
        assert!(is_empty_form(&json!([])));
        assert!(is_empty_form(&json!("")));
        assert!(!is_empty_form(&json!({"x": null})));
        assert!(!is_empty_form(&json!(0)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_save_persists_on_interval() {
        let (drafts, _) = manager();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let handle = drafts.setup_auto_save(
            "polling_unit_info",
            "e1",
            move || {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                json!({"tick": n})
            },
            Duration::from_millis(100),
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0, "no save before first interval");

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 2);

        let draft = drafts.get_draft("polling_unit_info", "e1").await.unwrap().unwrap();
        assert_eq!(draft.data, json!({"tick": 2}));
        assert_eq!(drafts.count().await.unwrap(), 1);

        handle.stop_and_wait().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_save_skips_empty_form() {
        let (drafts, _) = manager();
        let handle = drafts.setup_auto_save(
            "polling_unit_info",
            "e1",
            || json!({}),
            Duration::from_millis(100),
        );

        tokio::time::sleep(Duration::from_millis(350)).await;
        assert!(drafts.get_draft("polling_unit_info", "e1").await.unwrap().is_none());
        handle.stop();
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_save_zero_interval_still_runs() {
        let (drafts, _) = manager();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let handle = drafts.setup_auto_save(
            "incident_report",
            "e1",
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                json!({"note": "queue at gate"})
            },
            Duration::ZERO,
        );

        tokio::time::sleep(Duration::from_millis(20)).await;
        handle.stop_and_wait().await;

        assert!(calls.load(Ordering::SeqCst) >= 1);
        assert!(drafts.get_draft("incident_report", "e1").await.unwrap().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_auto_save_stops_after_cancel() {
        let (drafts, _) = manager();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let handle = drafts.setup_auto_save(
            "officer_arrival",
            "e1",
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                json!({"arrived": true})
            },
            Duration::from_millis(100),
        );

        tokio::time::sleep(Duration::from_millis(150)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        handle.stop_and_wait().await;
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 1, "no ticks after cancellation");
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_cancels() {
        let (drafts, _) = manager();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let handle = drafts.setup_auto_save(
            "officer_arrival",
            "e1",
            move || {
                counter.fetch_add(1, Ordering::SeqCst);
                json!({"arrived": true})
            },
            Duration::from_millis(100),
        );
        drop(handle);

        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
