//! # Local Database Module
//!
//! Durable key/value storage for the offline layer. Every cached snapshot, the
//! persisted pending-action queue and the login lockout counters are stored as
//! string values under namespaced keys, the same shape a browser's local
//! storage offers.
//!
//! ## Backends
//!
//! - `LocalDatabase`: SQLite file (or in-memory database) through `sqlx`
//! - `MemoryStorage`: process-local map with an optional byte quota, used by
//!   tests and the demo to simulate full storage
//!
//! ## Usage
//!
//! ```rust,no_run
//! use community_sync::client::local_db::{DurableStorage, LocalDatabase};
//!
//! # async fn example() -> Result<(), community_sync::client::local_db::StorageError> {
//! let db = LocalDatabase::new().await?;
//! db.set_item("dashboard_posts", "[]").await?;
//! assert_eq!(db.get_item("dashboard_posts").await?.as_deref(), Some("[]"));
//! # Ok(())
//! # }
//! ```

pub mod schema;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tokio::sync::RwLock;

/// Durable storage failures
#[derive(Debug, Error)]
pub enum StorageError {
    /// Write rejected because the storage is full
    #[error("storage quota exceeded: {used} of {quota} bytes")]
    QuotaExceeded { used: usize, quota: usize },

    /// SQLite failure
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Filesystem failure while opening the database
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for local storage operations
pub type Result<T> = std::result::Result<T, StorageError>;

/// String key/value storage that survives restarts
#[async_trait]
pub trait DurableStorage: Send + Sync + Debug {
    /// Value stored under `key`, if any
    async fn get_item(&self, key: &str) -> Result<Option<String>>;

    /// Store `value` under `key`, replacing any previous value
    async fn set_item(&self, key: &str, value: &str) -> Result<()>;

    /// Remove `key`; removing a missing key is not an error
    async fn remove_item(&self, key: &str) -> Result<()>;
}

/// SQLite-backed durable storage
#[derive(Debug, Clone)]
pub struct LocalDatabase {
    pool: SqlitePool,
}

impl LocalDatabase {
    /// Open or create the local database in the platform data directory
    pub async fn new() -> Result<Self> {
        Self::open(Self::default_path()).await
    }

    /// Open or create the local database at `path`
    ///
    /// Uses WAL mode; the schema is created on first open.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(4)
            .connect_with(options)
            .await?;

        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;
        sqlx::query("PRAGMA synchronous=NORMAL").execute(&pool).await?;

        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// Fresh in-memory database, discarded when dropped
    pub async fn in_memory() -> Result<Self> {
        // Each in-memory connection is its own database, so keep exactly one.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.init_schema().await?;
        Ok(db)
    }

    /// Platform-specific default database path
    pub fn default_path() -> PathBuf {
        let mut path = dirs::data_dir().unwrap_or_else(std::env::temp_dir);
        path.push("community-sync");
        path.push("local.db");
        path
    }

    async fn init_schema(&self) -> Result<()> {
        for statement in schema::CREATE_STATEMENTS {
            sqlx::query(statement).execute(&self.pool).await?;
        }

        let version: Option<i64> =
            sqlx::query("SELECT version FROM schema_version LIMIT 1")
                .fetch_optional(&self.pool)
                .await?
                .map(|row| row.try_get("version"))
                .transpose()?;

        match version {
            None => {
                sqlx::query("INSERT INTO schema_version (version) VALUES (?)")
                    .bind(schema::CURRENT_SCHEMA_VERSION)
                    .execute(&self.pool)
                    .await?;
            }
            Some(v) if schema::needs_migration(v) => {
                tracing::info!(
                    from = v,
                    pending = ?schema::get_pending_migrations(v),
                    "migrating local database"
                );
                sqlx::query("UPDATE schema_version SET version = ?")
                    .bind(schema::CURRENT_SCHEMA_VERSION)
                    .execute(&self.pool)
                    .await?;
            }
            Some(_) => {}
        }
        Ok(())
    }

    /// Every key starting with `prefix`
    pub async fn keys_with_prefix(&self, prefix: &str) -> Result<Vec<String>> {
        let pattern = format!("{}%", prefix.replace('%', "\\%").replace('_', "\\_"));
        let rows = sqlx::query("SELECT key FROM kv_store WHERE key LIKE ? ESCAPE '\\' ORDER BY key")
            .bind(pattern)
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get("key").map_err(StorageError::from))
            .collect()
    }
}

#[async_trait]
impl DurableStorage for LocalDatabase {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        let row = sqlx::query("SELECT value FROM kv_store WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(Some(row.try_get("value")?)),
            None => Ok(None),
        }
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        sqlx::query(
            "INSERT OR REPLACE INTO kv_store (key, value, updated_at)
             VALUES (?, ?, ?)",
        )
        .bind(key)
        .bind(value)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = ?")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

/// In-memory durable storage with an optional quota in bytes
#[derive(Debug, Default)]
pub struct MemoryStorage {
    items: RwLock<HashMap<String, String>>,
    quota: Option<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage rejecting writes once keys and values exceed `quota` bytes
    pub fn with_quota(quota: usize) -> Self {
        Self {
            items: RwLock::new(HashMap::new()),
            quota: Some(quota),
        }
    }

    /// Number of stored keys
    pub async fn len(&self) -> usize {
        self.items.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.read().await.is_empty()
    }
}

#[async_trait]
impl DurableStorage for MemoryStorage {
    async fn get_item(&self, key: &str) -> Result<Option<String>> {
        Ok(self.items.read().await.get(key).cloned())
    }

    async fn set_item(&self, key: &str, value: &str) -> Result<()> {
        let mut items = self.items.write().await;
        if let Some(quota) = self.quota {
            let used: usize = items
                .iter()
                .filter(|(k, _)| k.as_str() != key)
                .map(|(k, v)| k.len() + v.len())
                .sum::<usize>()
                + key.len()
                + value.len();
            if used > quota {
                return Err(StorageError::QuotaExceeded { used, quota });
            }
        }
        items.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove_item(&self, key: &str) -> Result<()> {
        self.items.write().await.remove(key);
        Ok(())
    }
}
