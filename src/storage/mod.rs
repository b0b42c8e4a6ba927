//! Namespaced key-value store with per-item expiry.
//!
//! Four collections share one local database but never each other's keys:
//! the submission queue (`syncQueue`), drafts, a generic cache, and the
//! legacy `submissions` collection. Every row is wrapped in a `StorageItem`
//! envelope carrying its write time and optional expiry.

pub mod schema;
pub mod sqlite;

pub use sqlite::SqliteStore;

use std::future::Future;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StorageError;

/// Logical collection inside the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Submissions,
    Drafts,
    Cache,
    /// Physical home of the submission queue.
    SyncQueue,
}

impl Collection {
    pub const ALL: [Collection; 4] = [
        Collection::Submissions,
        Collection::Drafts,
        Collection::Cache,
        Collection::SyncQueue,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Collection::Submissions => "submissions",
            Collection::Drafts => "drafts",
            Collection::Cache => "cache",
            Collection::SyncQueue => "syncQueue",
        }
    }

    /// Secondary indices declared for this collection.
    ///
    /// Each name is a top-level field of the stored (camelCase) value.
    /// Lookups on any other field fail with `UnknownIndex`.
    pub fn indexes(&self) -> &'static [&'static str] {
        match self {
            Collection::Submissions => &["status", "type"],
            Collection::Drafts => &["formType", "electionId"],
            Collection::Cache => &[],
            Collection::SyncQueue => &["status", "type", "priority", "electionId"],
        }
    }

    pub fn has_index(&self, index: &str) -> bool {
        self.indexes().contains(&index)
    }
}

/// Latest representable expiry; the database stores it as a signed 64-bit integer.
pub const MAX_EXPIRES_AT: u64 = i64::MAX as u64;

/// Envelope persisted around every value.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct StorageItem<T> {
    pub key: String,
    pub value: T,
    /// Write time (epoch ms).
    pub timestamp: u64,
    /// Epoch ms after which the item is logically absent.
    pub expires_at: Option<u64>,
}

impl<T> StorageItem<T> {
    pub fn new(key: &str, value: T, now_ms: u64, ttl: Option<Duration>) -> Self {
        Self {
            key: key.to_string(),
            value,
            timestamp: now_ms,
            expires_at: ttl.map(|ttl| {
                let ttl_ms = u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX);
                now_ms.saturating_add(ttl_ms).min(MAX_EXPIRES_AT)
            }),
        }
    }

    pub fn is_expired(&self, now_ms: u64) -> bool {
        matches!(self.expires_at, Some(at) if at < now_ms)
    }
}

/// Durable storage used by the draft, queue, and cache managers.
///
/// Methods return `Send` futures so managers can be driven from spawned
/// tasks (auto-save, the sync daemon). Every operation fails with
/// `StorageError::Unavailable` when the engine cannot be used.
pub trait KeyValueStore: Clone + Send + Sync + 'static {
    /// Value under `key`, or `None` when missing or expired.
    ///
    /// An expired hit schedules a best-effort delete; cleanup failures are
    /// logged, never returned.
    fn get<T>(
        &self,
        collection: Collection,
        key: &str,
    ) -> impl Future<Output = Result<Option<T>, StorageError>> + Send
    where
        T: DeserializeOwned + Send;

    /// Upsert, replacing any existing value. `ttl` sets `expiresAt = now + ttl`.
    fn set<T>(
        &self,
        collection: Collection,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<(), StorageError>> + Send
    where
        T: Serialize + Sync;

    /// Idempotent delete.
    fn delete(
        &self,
        collection: Collection,
        key: &str,
    ) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// All live values in storage order.
    fn get_all<T>(
        &self,
        collection: Collection,
    ) -> impl Future<Output = Result<Vec<T>, StorageError>> + Send
    where
        T: DeserializeOwned + Send;

    /// Live values whose declared index field equals `index_value`.
    fn get_by_index<T>(
        &self,
        collection: Collection,
        index: &str,
        index_value: &Value,
    ) -> impl Future<Output = Result<Vec<T>, StorageError>> + Send
    where
        T: DeserializeOwned + Send;

    /// Read-modify-write of one live row as a single unit.
    ///
    /// `f` may run off the calling task, so it owns what it captures.
    ///
    /// Returns the updated value, or `None` (without calling `f`) when the
    /// row is missing or expired. The row keeps its expiry.
    fn update<T, F>(
        &self,
        collection: Collection,
        key: &str,
        f: F,
    ) -> impl Future<Output = Result<Option<T>, StorageError>> + Send
    where
        T: Serialize + DeserializeOwned + Send + 'static,
        F: FnOnce(&mut T) + Send + 'static;

    /// Remove every item, expired or not.
    fn clear(&self, collection: Collection) -> impl Future<Output = Result<(), StorageError>> + Send;

    /// Number of live items.
    fn count(&self, collection: Collection)
        -> impl Future<Output = Result<usize, StorageError>> + Send;

    /// Physically remove expired items. Returns how many were dropped.
    fn purge_expired(
        &self,
        collection: Collection,
    ) -> impl Future<Output = Result<usize, StorageError>> + Send;
}
