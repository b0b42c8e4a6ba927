use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use super::{Collection, KeyValueStore, StorageItem};
use crate::clock::{self, SharedClock};
use crate::error::StorageError;

/// SQLite-backed `KeyValueStore`.
///
/// One database file holds every collection. The handle is cheap to clone;
/// clones share the same connection.
#[derive(Clone)]
pub struct SqliteStore {
    conn: Arc<Mutex<Connection>>,
    clock: SharedClock,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        Self::open_with_clock(path, clock::system())
    }

    pub fn open_with_clock(path: impl AsRef<Path>, clock: SharedClock) -> Result<Self, StorageError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                StorageError::Unavailable(format!("cannot create {}: {}", parent.display(), e))
            })?;
        }
        let conn = Connection::open(path).map_err(|e| {
            StorageError::Unavailable(format!("cannot open {}: {}", path.display(), e))
        })?;
        let store = Self::from_connection(conn, clock)?;
        log::info!("Offline store opened at {}", path.display());
        Ok(store)
    }

    pub fn open_in_memory() -> Result<Self, StorageError> {
        Self::open_in_memory_with_clock(clock::system())
    }

    pub fn open_in_memory_with_clock(clock: SharedClock) -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()
            .map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Self::from_connection(conn, clock)
    }

    fn from_connection(conn: Connection, clock: SharedClock) -> Result<Self, StorageError> {
        super::schema::init_schema(&conn).map_err(|e| StorageError::Unavailable(e.to_string()))?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            clock,
        })
    }

    /// Clock used for `timestamp`/`expiresAt`. Managers share it.
    pub fn clock(&self) -> SharedClock {
        self.clock.clone()
    }

    fn lock_conn(&self) -> Result<MutexGuard<'_, Connection>, StorageError> {
        self.conn
            .lock()
            .map_err(|_| StorageError::Unavailable("store handle poisoned".to_string()))
    }

    /// Run `f` against the connection on the blocking pool.
    ///
    /// Outside a tokio runtime `f` runs inline.
    async fn with_conn<R, F>(&self, f: F) -> Result<R, StorageError>
    where
        R: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<R, StorageError> + Send + 'static,
    {
        let store = self.clone();
        let task = move || {
            let mut conn = store.lock_conn()?;
            f(&mut conn)
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => handle
                .spawn_blocking(task)
                .await
                .map_err(|e| StorageError::Unavailable(format!("store task failed: {}", e)))?,
            Err(_) => task(),
        }
    }

    /// Decode live items; expired ones are skipped and queued for cleanup.
    fn decode_live<T: DeserializeOwned>(
        &self,
        collection: Collection,
        items: Vec<StorageItem<String>>,
    ) -> Result<Vec<T>, StorageError> {
        let now = self.clock.now_ms();
        let mut live = Vec::with_capacity(items.len());
        for item in items {
            if item.is_expired(now) {
                self.schedule_cleanup(collection, &item.key);
                continue;
            }
            live.push(serde_json::from_str(&item.value)?);
        }
        Ok(live)
    }

    /// Fire-and-forget removal of an expired row.
    ///
    /// The delete re-checks expiry, so a fresh write that lands first is kept.
    fn schedule_cleanup(&self, collection: Collection, key: &str) {
        let store = self.clone();
        let key = key.to_string();
        let cleanup = move || {
            let now = store.clock.now_ms();
            let result = store
                .lock_conn()
                .and_then(|mut conn| remove_if_expired(&mut conn, collection, &key, now));
            if let Err(e) = result {
                log::warn!(
                    "Expired item cleanup failed: {}/{} - {}",
                    collection.name(),
                    key,
                    e
                );
            }
        };
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn_blocking(cleanup);
            }
            Err(_) => cleanup(),
        }
    }
}

impl KeyValueStore for SqliteStore {
    async fn get<T>(&self, collection: Collection, key: &str) -> Result<Option<T>, StorageError>
    where
        T: DeserializeOwned + Send,
    {
        let owned_key = key.to_string();
        let item = self
            .with_conn(move |conn| fetch_item(conn, collection, &owned_key))
            .await?;
        match item {
            None => Ok(None),
            Some(item) if item.is_expired(self.clock.now_ms()) => {
                self.schedule_cleanup(collection, key);
                Ok(None)
            }
            Some(item) => Ok(Some(serde_json::from_str(&item.value)?)),
        }
    }

    async fn set<T>(
        &self,
        collection: Collection,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<(), StorageError>
    where
        T: Serialize + Sync,
    {
        let item = StorageItem::new(key, serde_json::to_value(value)?, self.clock.now_ms(), ttl);
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            write_item(&tx, collection, &item)?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn delete(&self, collection: Collection, key: &str) -> Result<(), StorageError> {
        let key = key.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute(
                "DELETE FROM items WHERE collection = ?1 AND key = ?2",
                params![collection.name(), key],
            )?;
            tx.execute(
                "DELETE FROM item_indexes WHERE collection = ?1 AND key = ?2",
                params![collection.name(), key],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn get_all<T>(&self, collection: Collection) -> Result<Vec<T>, StorageError>
    where
        T: DeserializeOwned + Send,
    {
        let items = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT key, value, timestamp, expires_at FROM items WHERE collection = ?1 ORDER BY rowid",
                )?;
                let items = stmt
                    .query_map(params![collection.name()], read_item)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(items)
            })
            .await?;
        self.decode_live(collection, items)
    }

    async fn get_by_index<T>(
        &self,
        collection: Collection,
        index: &str,
        index_value: &Value,
    ) -> Result<Vec<T>, StorageError>
    where
        T: DeserializeOwned + Send,
    {
        if !collection.has_index(index) {
            return Err(StorageError::UnknownIndex {
                collection: collection.name().to_string(),
                index: index.to_string(),
            });
        }
        let index = index.to_string();
        let wanted = serde_json::to_string(index_value)?;
        let items = self
            .with_conn(move |conn| {
                let mut stmt = conn.prepare(
                    "SELECT i.key, i.value, i.timestamp, i.expires_at
                     FROM item_indexes x
                     JOIN items i ON i.collection = x.collection AND i.key = x.key
                     WHERE x.collection = ?1 AND x.index_name = ?2 AND x.index_value = ?3
                     ORDER BY i.rowid",
                )?;
                let items = stmt
                    .query_map(params![collection.name(), index, wanted], read_item)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(items)
            })
            .await?;
        self.decode_live(collection, items)
    }

    async fn update<T, F>(
        &self,
        collection: Collection,
        key: &str,
        f: F,
    ) -> Result<Option<T>, StorageError>
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce(&mut T) + Send + 'static,
    {
        let now = self.clock.now_ms();
        let key = key.to_string();
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            let existing = match fetch_item(&tx, collection, &key)? {
                Some(item) if !item.is_expired(now) => item,
                _ => return Ok(None),
            };
            let mut value: T = serde_json::from_str(&existing.value)?;
            f(&mut value);
            let item = StorageItem {
                key,
                value: serde_json::to_value(&value)?,
                timestamp: now,
                expires_at: existing.expires_at,
            };
            write_item(&tx, collection, &item)?;
            tx.commit()?;
            Ok(Some(value))
        })
        .await
    }

    async fn clear(&self, collection: Collection) -> Result<(), StorageError> {
        self.with_conn(move |conn| {
            let tx = conn.transaction()?;
            tx.execute("DELETE FROM items WHERE collection = ?1", params![collection.name()])?;
            tx.execute(
                "DELETE FROM item_indexes WHERE collection = ?1",
                params![collection.name()],
            )?;
            tx.commit()?;
            Ok(())
        })
        .await
    }

    async fn count(&self, collection: Collection) -> Result<usize, StorageError> {
        let now = sql_time(self.clock.now_ms());
        self.with_conn(move |conn| {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM items
                 WHERE collection = ?1 AND (expires_at IS NULL OR expires_at >= ?2)",
                params![collection.name(), now],
                |row| row.get(0),
            )?;
            Ok(count as usize)
        })
        .await
    }

    async fn purge_expired(&self, collection: Collection) -> Result<usize, StorageError> {
        let now = sql_time(self.clock.now_ms());
        let removed = self
            .with_conn(move |conn| {
                let tx = conn.transaction()?;
                let removed = tx.execute(
                    "DELETE FROM items WHERE collection = ?1 AND expires_at IS NOT NULL AND expires_at < ?2",
                    params![collection.name(), now],
                )?;
                tx.execute(
                    "DELETE FROM item_indexes WHERE collection = ?1
                     AND key NOT IN (SELECT key FROM items WHERE collection = ?1)",
                    params![collection.name()],
                )?;
                tx.commit()?;
                Ok(removed)
            })
            .await?;
        if removed > 0 {
            log::debug!("Purged {} expired items from {}", removed, collection.name());
        }
        Ok(removed)
    }
}

/// Epoch ms as stored in SQLite's signed integer columns.
fn sql_time(ms: u64) -> i64 {
    i64::try_from(ms).unwrap_or(i64::MAX)
}

fn read_item(row: &rusqlite::Row) -> rusqlite::Result<StorageItem<String>> {
    let timestamp: i64 = row.get(2)?;
    let expires_at: Option<i64> = row.get(3)?;
    Ok(StorageItem {
        key: row.get(0)?,
        value: row.get(1)?,
        timestamp: timestamp as u64,
        expires_at: expires_at.map(|at| at as u64),
    })
}

fn fetch_item(
    conn: &Connection,
    collection: Collection,
    key: &str,
) -> Result<Option<StorageItem<String>>, StorageError> {
    let item = conn
        .query_row(
            "SELECT key, value, timestamp, expires_at FROM items WHERE collection = ?1 AND key = ?2",
            params![collection.name(), key],
            read_item,
        )
        .optional()?;
    Ok(item)
}

/// Upsert the row and rebuild its index entries.
fn write_item(
    conn: &Connection,
    collection: Collection,
    item: &StorageItem<Value>,
) -> Result<(), StorageError> {
    conn.execute(
        "INSERT INTO items (collection, key, value, timestamp, expires_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT (collection, key) DO UPDATE SET
             value = excluded.value,
             timestamp = excluded.timestamp,
             expires_at = excluded.expires_at",
        params![
            collection.name(),
            item.key,
            serde_json::to_string(&item.value)?,
            sql_time(item.timestamp),
            item.expires_at.map(sql_time),
        ],
    )?;
    conn.execute(
        "DELETE FROM item_indexes WHERE collection = ?1 AND key = ?2",
        params![collection.name(), item.key],
    )?;
    for index in collection.indexes() {
        let field = match item.value.get(*index) {
            Some(field) if !field.is_null() => field,
            _ => continue,
        };
        conn.execute(
            "INSERT INTO item_indexes (collection, index_name, index_value, key) VALUES (?1, ?2, ?3, ?4)",
            params![collection.name(), *index, serde_json::to_string(field)?, item.key],
        )?;
    }
    Ok(())
}

fn remove_if_expired(
    conn: &mut Connection,
    collection: Collection,
    key: &str,
    now: u64,
) -> Result<(), StorageError> {
    let tx = conn.transaction()?;
    let removed = tx.execute(
        "DELETE FROM items WHERE collection = ?1 AND key = ?2
         AND expires_at IS NOT NULL AND expires_at < ?3",
        params![collection.name(), key, sql_time(now)],
    )?;
    if removed > 0 {
        tx.execute(
            "DELETE FROM item_indexes WHERE collection = ?1 AND key = ?2",
            params![collection.name(), key],
        )?;
    }
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, ManualClock};
    use crate::storage::MAX_EXPIRES_AT;
    use serde_json::json;

    fn manual_store() -> (SqliteStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_700_000_000_000));
        let store = SqliteStore::open_in_memory_with_clock(clock.clone()).unwrap();
        (store, clock)
    }

    /// Rows physically present, expired or not.
    fn raw_rows(store: &SqliteStore, collection: Collection) -> i64 {
        store
            .lock_conn()
            .unwrap()
            .query_row(
                "SELECT COUNT(*) FROM items WHERE collection = ?1",
                params![collection.name()],
                |r| r.get::<_, i64>(0),
            )
            .unwrap()
    }

    #[tokio::test]
    async fn test_set_and_get() {
        let (store, _) = manual_store();
        store
            .set(Collection::Cache, "lga:02-01", &json!({"name": "Aguata"}), None)
            .await
            .unwrap();

        let value: Option<Value> = store.get(Collection::Cache, "lga:02-01").await.unwrap();
        assert_eq!(value, Some(json!({"name": "Aguata"})));
    }

    #[tokio::test]
    async fn test_get_missing_is_none() {
        let (store, _) = manual_store();
        let value: Option<Value> = store.get(Collection::Cache, "nope").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_set_replaces_without_merge() {
        let (store, _) = manual_store();
        store
            .set(Collection::Cache, "k", &json!({"a": 1, "b": 2}), None)
            .await
            .unwrap();
        store.set(Collection::Cache, "k", &json!({"c": 3}), None).await.unwrap();

        let value: Option<Value> = store.get(Collection::Cache, "k").await.unwrap();
        assert_eq!(value, Some(json!({"c": 3})));
        assert_eq!(store.count(Collection::Cache).await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let (store, _) = manual_store();
        store.set(Collection::Cache, "k", &1u32, None).await.unwrap();
        store.delete(Collection::Cache, "k").await.unwrap();
        store.delete(Collection::Cache, "k").await.unwrap();
        store.delete(Collection::Cache, "never-existed").await.unwrap();

        let value: Option<u32> = store.get(Collection::Cache, "k").await.unwrap();
        assert!(value.is_none());
    }

    #[tokio::test]
    async fn test_collections_are_isolated() {
        let (store, _) = manual_store();
        store.set(Collection::Drafts, "same-key", &"draft", None).await.unwrap();
        store.set(Collection::SyncQueue, "same-key", &"queued", None).await.unwrap();

        let draft: Option<String> = store.get(Collection::Drafts, "same-key").await.unwrap();
        let queued: Option<String> = store.get(Collection::SyncQueue, "same-key").await.unwrap();
        assert_eq!(draft.as_deref(), Some("draft"));
        assert_eq!(queued.as_deref(), Some("queued"));

        store.clear(Collection::Drafts).await.unwrap();
        let queued: Option<String> = store.get(Collection::SyncQueue, "same-key").await.unwrap();
        assert_eq!(queued.as_deref(), Some("queued"));
    }

    #[tokio::test]
    async fn test_ttl_expiry_hides_item() {
        let (store, clock) = manual_store();
        store
            .set(Collection::Cache, "k", &"v", Some(Duration::from_millis(10)))
            .await
            .unwrap();
        store.set(Collection::Cache, "keep", &"v", None).await.unwrap();

        clock.advance(10);
        let value: Option<String> = store.get(Collection::Cache, "k").await.unwrap();
        assert_eq!(value.as_deref(), Some("v"), "still live at exactly expiresAt");

        clock.advance(1);
        let value: Option<String> = store.get(Collection::Cache, "k").await.unwrap();
        assert!(value.is_none());

        let all: Vec<String> = store.get_all(Collection::Cache).await.unwrap();
        assert_eq!(all, vec!["v".to_string()]);
        assert_eq!(store.count(Collection::Cache).await.unwrap(), 1);
    }

    #[test]
    fn test_expired_get_removes_row_without_runtime() {
        let (store, clock) = manual_store();
        futures::executor::block_on(async {
            store
                .set(Collection::Cache, "k", &"v", Some(Duration::from_millis(10)))
                .await
                .unwrap();
            clock.advance(50);
            let value: Option<String> = store.get(Collection::Cache, "k").await.unwrap();
            assert!(value.is_none());
        });
        assert_eq!(raw_rows(&store, Collection::Cache), 0);
    }

    #[test]
    fn test_cleanup_keeps_rewritten_row() {
        let (store, clock) = manual_store();
        futures::executor::block_on(async {
            store
                .set(Collection::Cache, "k", &"old", Some(Duration::from_millis(10)))
                .await
                .unwrap();
            clock.advance(50);
            store.set(Collection::Cache, "k", &"new", None).await.unwrap();
        });
        let mut conn = store.lock_conn().unwrap();
        remove_if_expired(&mut conn, Collection::Cache, "k", clock.now_ms()).unwrap();
        drop(conn);
        assert_eq!(raw_rows(&store, Collection::Cache), 1);
    }

    #[tokio::test]
    async fn test_get_all_preserves_insertion_order_on_overwrite() {
        let (store, _) = manual_store();
        for key in ["a", "b", "c"] {
            store.set(Collection::Cache, key, &key, None).await.unwrap();
        }
        store.set(Collection::Cache, "a", &"a2", None).await.unwrap();

        let all: Vec<String> = store.get_all(Collection::Cache).await.unwrap();
        assert_eq!(all, vec!["a2", "b", "c"]);
    }

    #[tokio::test]
    async fn test_get_by_index() {
        let (store, _) = manual_store();
        store
            .set(Collection::Drafts, "d1", &json!({"formType": "incident_report", "electionId": "e1"}), None)
            .await
            .unwrap();
        store
            .set(Collection::Drafts, "d2", &json!({"formType": "result_tracking", "electionId": "e1"}), None)
            .await
            .unwrap();

        let hits: Vec<Value> = store
            .get_by_index(Collection::Drafts, "formType", &json!("incident_report"))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0]["formType"], "incident_report");

        let by_election: Vec<Value> = store
            .get_by_index(Collection::Drafts, "electionId", &json!("e1"))
            .await
            .unwrap();
        assert_eq!(by_election.len(), 2);
    }

    #[tokio::test]
    async fn test_index_follows_overwrite_and_delete() {
        let (store, _) = manual_store();
        store
            .set(Collection::SyncQueue, "s1", &json!({"status": "pending", "priority": 5}), None)
            .await
            .unwrap();
        store
            .set(Collection::SyncQueue, "s1", &json!({"status": "synced", "priority": 5}), None)
            .await
            .unwrap();

        let pending: Vec<Value> = store
            .get_by_index(Collection::SyncQueue, "status", &json!("pending"))
            .await
            .unwrap();
        assert!(pending.is_empty());

        let by_priority: Vec<Value> = store
            .get_by_index(Collection::SyncQueue, "priority", &json!(5))
            .await
            .unwrap();
        assert_eq!(by_priority.len(), 1);

        store.delete(Collection::SyncQueue, "s1").await.unwrap();
        let synced: Vec<Value> = store
            .get_by_index(Collection::SyncQueue, "status", &json!("synced"))
            .await
            .unwrap();
        assert!(synced.is_empty());
    }

    #[tokio::test]
    async fn test_get_by_undeclared_index_fails() {
        let (store, _) = manual_store();
        let result: Result<Vec<Value>, _> = store
            .get_by_index(Collection::Cache, "status", &json!("pending"))
            .await;
        assert!(matches!(result, Err(StorageError::UnknownIndex { .. })));
    }

    #[tokio::test]
    async fn test_update_read_modify_write() {
        let (store, clock) = manual_store();
        store
            .set(Collection::SyncQueue, "s1", &json!({"status": "pending", "syncAttempts": 0}), None)
            .await
            .unwrap();

        clock.advance(100);
        let updated: Option<Value> = store
            .update(Collection::SyncQueue, "s1", |v: &mut Value| {
                v["status"] = json!("syncing");
                v["syncAttempts"] = json!(v["syncAttempts"].as_u64().unwrap_or(0) + 1);
            })
            .await
            .unwrap();
        assert_eq!(updated.unwrap()["syncAttempts"], 1);

        let syncing: Vec<Value> = store
            .get_by_index(Collection::SyncQueue, "status", &json!("syncing"))
            .await
            .unwrap();
        assert_eq!(syncing.len(), 1);
    }

    #[tokio::test]
    async fn test_update_missing_is_none() {
        let (store, _) = manual_store();
        let called = Arc::new(std::sync::atomic::AtomicBool::new(false));
        let flag = Arc::clone(&called);
        let updated: Option<Value> = store
            .update(Collection::SyncQueue, "ghost", move |_v: &mut Value| {
                flag.store(true, std::sync::atomic::Ordering::SeqCst)
            })
            .await
            .unwrap();
        assert!(updated.is_none());
        assert!(!called.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_clear_removes_unexpired_and_expired() {
        let (store, _) = manual_store();
        store.set(Collection::Cache, "a", &1, None).await.unwrap();
        store
            .set(Collection::Cache, "b", &2, Some(Duration::from_secs(60)))
            .await
            .unwrap();
        store.clear(Collection::Cache).await.unwrap();
        assert_eq!(store.count(Collection::Cache).await.unwrap(), 0);
        assert_eq!(raw_rows(&store, Collection::Cache), 0);
    }

    #[tokio::test]
    async fn test_purge_expired() {
        let (store, clock) = manual_store();
        store
            .set(Collection::Cache, "short", &1, Some(Duration::from_millis(5)))
            .await
            .unwrap();
        store
            .set(Collection::Cache, "long", &2, Some(Duration::from_secs(60)))
            .await
            .unwrap();
        clock.advance(10);

        assert_eq!(store.purge_expired(Collection::Cache).await.unwrap(), 1);
        assert_eq!(raw_rows(&store, Collection::Cache), 1);
    }

    #[tokio::test]
    async fn test_huge_ttl_stays_live_everywhere() {
        let (store, _) = manual_store();
        store
            .set(Collection::Cache, "k", &"v", Some(Duration::from_secs(u64::MAX / 1000)))
            .await
            .unwrap();

        let value: Option<String> = store.get(Collection::Cache, "k").await.unwrap();
        assert_eq!(value.as_deref(), Some("v"));
        assert_eq!(store.count(Collection::Cache).await.unwrap(), 1);
        assert_eq!(store.purge_expired(Collection::Cache).await.unwrap(), 0);

        let value: Option<String> = store.get(Collection::Cache, "k").await.unwrap();
        assert_eq!(value.as_deref(), Some("v"));

        let expires_at: i64 = store
            .lock_conn()
            .unwrap()
            .query_row(
                "SELECT expires_at FROM items WHERE collection = 'cache' AND key = 'k'",
                [],
                |r| r.get(0),
            )
            .unwrap();
        assert_eq!(expires_at as u64, MAX_EXPIRES_AT);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_operations_from_spawned_tasks() {
        let (store, _) = manual_store();
        let tasks: Vec<_> = (0..8)
            .map(|i| {
                let store = store.clone();
                tokio::spawn(async move {
                    store
                        .set(Collection::Cache, &format!("k{i}"), &i, None)
                        .await
                        .unwrap();
                })
            })
            .collect();
        for task in tasks {
            task.await.unwrap();
        }
        assert_eq!(store.count(Collection::Cache).await.unwrap(), 8);
    }

    #[tokio::test]
    async fn test_persists_across_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("offline.db");

        {
            let store = SqliteStore::open(&path).unwrap();
            store
                .set(Collection::SyncQueue, "s1", &json!({"status": "pending"}), None)
                .await
                .unwrap();
        }

        let store = SqliteStore::open(&path).unwrap();
        let pending: Vec<Value> = store
            .get_by_index(Collection::SyncQueue, "status", &json!("pending"))
            .await
            .unwrap();
        assert_eq!(pending.len(), 1);
    }

    #[test]
    fn test_open_directory_is_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let result = SqliteStore::open(dir.path());
        assert!(matches!(result, Err(StorageError::Unavailable(_))));
    }
}
