//! # Local Cache Store
//!
//! Last-known-good snapshot of every data category, kept in memory and
//! mirrored to durable storage so it can be served while offline or after a
//! restart.
//!
//! ## Features
//!
//! - **Write-Through**: every save is persisted immediately
//! - **Failure Tolerant**: storage and serialization failures are logged, never returned
//! - **Corruption Tolerant**: unreadable entries load as absent
//! - **Last Sync**: the time of the latest successful save is tracked separately
//!
//! ## Storage Layout
//!
//! Each category is stored under `"{namespace}{category}"` as
//! `{"category": .., "fetchedAt": <rfc3339>, "payload": <json>}`; the last sync time is stored
//! under `"{namespace}lastSync"`.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use community_sync::client::local_db::MemoryStorage;
//! use community_sync::client::offline::CacheStore;
//! use community_sync::shared::Category;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let cache = CacheStore::new(Arc::new(MemoryStorage::new()), "dashboard_");
//! cache.save(Category::Posts, &vec!["p1"]).await;
//! let posts: Option<Vec<String>> = cache.load(Category::Posts).await;
//! # }
//! ```

use crate::client::local_db::DurableStorage;
use crate::shared::models::Category;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

const LAST_SYNC_KEY: &str = "lastSync";

/// Cached payload of one category
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CachedSnapshot {
    pub category: Category,
    pub payload: Value,
    pub fetched_at: DateTime<Utc>,
}

impl CachedSnapshot {
    /// Decode the payload; `None` if it does not match `T`
    pub fn decode<T: DeserializeOwned>(&self) -> Option<T> {
        serde_json::from_value(self.payload.clone()).ok()
    }
}

/// Per-category snapshot cache backed by durable storage
#[derive(Debug)]
pub struct CacheStore {
    storage: Arc<dyn DurableStorage>,
    namespace: String,
    snapshots: RwLock<HashMap<Category, CachedSnapshot>>,
    last_sync: RwLock<Option<DateTime<Utc>>>,
}

impl CacheStore {
    /// Create an empty cache writing under `namespace`
    pub fn new(storage: Arc<dyn DurableStorage>, namespace: impl Into<String>) -> Self {
        Self {
            storage,
            namespace: namespace.into(),
            snapshots: RwLock::new(HashMap::new()),
            last_sync: RwLock::new(None),
        }
    }

    fn key(&self, name: &str) -> String {
        format!("{}{}", self.namespace, name)
    }

    /// Store `payload` as the snapshot of `category` and stamp the last sync
    /// time. Never fails; persistence problems only produce a warning.
    pub async fn save<T: Serialize + ?Sized>(&self, category: Category, payload: &T) {
        let payload = match serde_json::to_value(payload) {
            Ok(value) => value,
            Err(e) => {
                tracing::warn!(%category, error = %e, "failed to serialize cache payload");
                return;
            }
        };

        let now = Utc::now();
        let snapshot = CachedSnapshot {
            category,
            payload,
            fetched_at: now,
        };

        let encoded = serde_json::to_string(&snapshot);
        self.snapshots.write().await.insert(category, snapshot);
        *self.last_sync.write().await = Some(now);

        match encoded {
            Ok(json) => {
                if let Err(e) = self.storage.set_item(&self.key(category.as_str()), &json).await {
                    tracing::warn!(%category, error = %e, "failed to persist cache snapshot");
                }
            }
            Err(e) => tracing::warn!(%category, error = %e, "failed to encode cache snapshot"),
        }

        if let Err(e) = self
            .storage
            .set_item(&self.key(LAST_SYNC_KEY), &now.to_rfc3339())
            .await
        {
            tracing::warn!(error = %e, "failed to persist last sync time");
        }
    }

    /// Cached payload of `category` decoded as `T`.
    /// Missing or corrupt entries load as `None`.
    pub async fn load<T: DeserializeOwned>(&self, category: Category) -> Option<T> {
        let snapshot = self.load_snapshot(category).await?;
        let decoded = snapshot.decode();
        if decoded.is_none() {
            tracing::warn!(%category, "cached payload does not match the requested type");
        }
        decoded
    }

    /// Cached snapshot of `category`, read from durable storage when it is
    /// not in memory yet
    pub async fn load_snapshot(&self, category: Category) -> Option<CachedSnapshot> {
        if let Some(snapshot) = self.snapshots.read().await.get(&category) {
            return Some(snapshot.clone());
        }

        let snapshot = self.read_persisted(category).await?;
        self.snapshots
            .write()
            .await
            .insert(category, snapshot.clone());
        Some(snapshot)
    }

    /// Time of the latest successful save
    pub async fn last_sync_time(&self) -> Option<DateTime<Utc>> {
        *self.last_sync.read().await
    }

    /// Categories with a snapshot in memory
    pub async fn cached_categories(&self) -> Vec<Category> {
        let mut categories: Vec<_> = self.snapshots.read().await.keys().copied().collect();
        categories.sort();
        categories
    }

    /// Read every persisted category and the last sync time into memory.
    /// Returns the number of categories restored.
    pub async fn hydrate(&self) -> usize {
        let mut restored = 0;
        for category in Category::ALL {
            if let Some(snapshot) = self.read_persisted(category).await {
                self.snapshots.write().await.insert(category, snapshot);
                restored += 1;
            }
        }

        match self.storage.get_item(&self.key(LAST_SYNC_KEY)).await {
            Ok(Some(raw)) => match DateTime::parse_from_rfc3339(&raw) {
                Ok(time) => *self.last_sync.write().await = Some(time.with_timezone(&Utc)),
                Err(e) => tracing::warn!(error = %e, "ignoring corrupt last sync time"),
            },
            Ok(None) => {}
            Err(e) => tracing::warn!(error = %e, "failed to read last sync time"),
        }

        tracing::debug!(restored, "cache hydrated");
        restored
    }

    async fn read_persisted(&self, category: Category) -> Option<CachedSnapshot> {
        let raw = match self.storage.get_item(&self.key(category.as_str())).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(%category, error = %e, "failed to read cache snapshot");
                return None;
            }
        };

        match serde_json::from_str::<CachedSnapshot>(&raw) {
            Ok(mut snapshot) => {
                snapshot.category = category;
                Some(snapshot)
            }
            Err(e) => {
                tracing::warn!(%category, error = %e, "ignoring corrupt cache snapshot");
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::local_db::MemoryStorage;
    use pretty_assertions::assert_eq;

    fn store() -> (Arc<MemoryStorage>, CacheStore) {
        let storage = Arc::new(MemoryStorage::new());
        let cache = CacheStore::new(storage.clone(), "dashboard_");
        (storage, cache)
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let (_, cache) = store();
        cache.save(Category::Posts, &vec!["a", "b"]).await;

        let posts: Option<Vec<String>> = cache.load(Category::Posts).await;
        assert_eq!(posts, Some(vec!["a".to_string(), "b".to_string()]));
        assert!(cache.last_sync_time().await.is_some());
    }

    #[tokio::test]
    async fn test_save_is_idempotent() {
        let (_, cache) = store();
        cache.save(Category::Events, &vec![1, 2, 3]).await;
        cache.save(Category::Events, &vec![1, 2, 3]).await;

        let events: Option<Vec<i32>> = cache.load(Category::Events).await;
        assert_eq!(events, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_missing_category_is_absent() {
        let (_, cache) = store();
        let profile: Option<serde_json::Value> = cache.load(Category::Profile).await;
        assert!(profile.is_none());
        assert!(cache.last_sync_time().await.is_none());
    }

    #[tokio::test]
    async fn test_storage_layout() {
        let (storage, cache) = store();
        cache.save(Category::Connections, &vec!["c1"]).await;

        let raw = storage.get_item("dashboard_connections").await.unwrap().unwrap();
        let json: Value = serde_json::from_str(&raw).unwrap();
        assert_eq!(json["payload"], serde_json::json!(["c1"]));
        assert!(json["fetchedAt"].is_string());
        assert!(storage.get_item("dashboard_lastSync").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_hydrate_restores_and_skips_corrupt() {
        let storage = Arc::new(MemoryStorage::new());
        {
            let cache = CacheStore::new(storage.clone(), "dashboard_");
            cache.save(Category::Posts, &vec!["p1"]).await;
        }
        storage.set_item("dashboard_events", "{not json").await.unwrap();

        let cache = CacheStore::new(storage, "dashboard_");
        assert_eq!(cache.hydrate().await, 1);
        assert_eq!(cache.cached_categories().await, vec![Category::Posts]);
        assert!(cache.last_sync_time().await.is_some());

        let events: Option<Vec<String>> = cache.load(Category::Events).await;
        assert!(events.is_none());
    }

    #[tokio::test]
    async fn test_quota_failure_is_swallowed() {
        let storage = Arc::new(MemoryStorage::with_quota(8));
        let cache = CacheStore::new(storage.clone(), "dashboard_");

        cache.save(Category::Posts, &vec!["a long post body"]).await;

        // Still served from memory for this session
        let posts: Option<Vec<String>> = cache.load(Category::Posts).await;
        assert_eq!(posts, Some(vec!["a long post body".to_string()]));
        assert!(storage.is_empty().await);
    }

    #[tokio::test]
    async fn test_type_mismatch_loads_as_absent() {
        let (_, cache) = store();
        cache.save(Category::Profile, &"just a string").await;
        let profile: Option<Vec<u32>> = cache.load(Category::Profile).await;
        assert!(profile.is_none());
    }
}
