//! Persistent response cache backed by the `cache` collection.
//!
//! Keeps reference data (polling unit lists, election metadata) readable
//! while offline. Entries expire after `DEFAULT_CACHE_TTL` unless stored with
//! an explicit TTL; stale entries read as absent.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::StorageError;
use crate::storage::{Collection, KeyValueStore};

/// Time-to-live for cached responses (5 minutes).
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(5 * 60);

#[derive(Clone)]
pub struct ResponseCache<S: KeyValueStore> {
    store: S,
}

impl<S: KeyValueStore> ResponseCache<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Cached value for `key` if present and still fresh.
    pub async fn get<T>(&self, key: &str) -> Result<Option<T>, StorageError>
    where
        T: DeserializeOwned + Send,
    {
        self.store.get(Collection::Cache, key).await
    }

    /// Store with the default TTL.
    pub async fn set<T>(&self, key: &str, value: &T) -> Result<(), StorageError>
    where
        T: Serialize + Sync,
    {
        self.set_with_ttl(key, value, DEFAULT_CACHE_TTL).await
    }

    pub async fn set_with_ttl<T>(&self, key: &str, value: &T, ttl: Duration) -> Result<(), StorageError>
    where
        T: Serialize + Sync,
    {
        self.store.set(Collection::Cache, key, value, Some(ttl)).await
    }

    /// Remove a specific entry (used when the server copy is known to have changed).
    pub async fn invalidate(&self, key: &str) -> Result<(), StorageError> {
        self.store.delete(Collection::Cache, key).await
    }

    pub async fn clear(&self) -> Result<(), StorageError> {
        self.store.clear(Collection::Cache).await
    }

    /// Physically drop stale entries. Returns how many were removed.
    pub async fn purge_expired(&self) -> Result<usize, StorageError> {
        let removed = self.store.purge_expired(Collection::Cache).await?;
        if removed > 0 {
            log::debug!("Purged {} expired cache entries", removed);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::storage::SqliteStore;
    use serde_json::{json, Value};
    use std::sync::Arc;

    fn cache() -> (ResponseCache<SqliteStore>, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(1_000_000));
        let store = SqliteStore::open_in_memory_with_clock(clock.clone()).unwrap();
        (ResponseCache::new(store), clock)
    }

    #[tokio::test]
    async fn test_default_ttl() {
        let (cache, clock) = cache();
        cache
            .set("polling-units:lga-12", &json!(["02-01-01-001", "02-01-01-002"]))
            .await
            .unwrap();

        clock.advance(DEFAULT_CACHE_TTL.as_millis() as u64);
        let hit: Option<Value> = cache.get("polling-units:lga-12").await.unwrap();
        assert!(hit.is_some(), "entry is fresh up to and including its expiry instant");

        clock.advance(1);
        let miss: Option<Value> = cache.get("polling-units:lga-12").await.unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn test_custom_ttl_and_purge() {
        let (cache, clock) = cache();
        cache
            .set_with_ttl("short", &1u32, Duration::from_secs(1))
            .await
            .unwrap();
        cache.set("long", &2u32).await.unwrap();

        clock.advance(2_000);
        assert_eq!(cache.purge_expired().await.unwrap(), 1);
        assert_eq!(cache.get::<u32>("long").await.unwrap(), Some(2));
    }

    #[tokio::test]
    async fn test_invalidate_and_clear() {
        let (cache, _) = cache();
        cache.set("a", &"x").await.unwrap();
        cache.set("b", &"y").await.unwrap();

        cache.invalidate("a").await.unwrap();
        cache.invalidate("a").await.unwrap();
        assert_eq!(cache.get::<String>("a").await.unwrap(), None);

        cache.clear().await.unwrap();
        assert_eq!(cache.get::<String>("b").await.unwrap(), None);
    }
}
