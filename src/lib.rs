//! Community Sync - Offline-Resilient Data Layer
//!
//! The data layer of a community dashboard that keeps working while the
//! network comes and goes. Reads fall back to a local cache, writes are
//! applied optimistically and queued while offline, and the queue is replayed
//! in order once the remote service is reachable again.
//!
//! # Module Structure
//!
//! - **`shared`** - Types shared by every layer
//!   - Community data model and document-service vocabulary
//!   - Sync events, error types and configuration
//!
//! - **`client`** - The sync core
//!   - Local cache and durable pending-action queue
//!   - Connectivity monitor and reconnection scheduler
//!   - `SyncContext` façade and the dashboard controller
//!
//! # Usage
//!
//! ```rust,no_run
//! use community_sync::client::local_db::MemoryStorage;
//! use community_sync::client::remote::{MemoryDocumentStore, Session, StaticIdentity};
//! use community_sync::client::sync::SyncContext;
//! use community_sync::shared::SyncConfig;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), community_sync::shared::SyncError> {
//! let identity = Arc::new(StaticIdentity::signed_in(Session {
//!     uid: "u1".to_string(),
//!     email: "ada@example.com".to_string(),
//!     display_name: None,
//! }));
//! let context = SyncContext::builder(
//!     SyncConfig::default(),
//!     Arc::new(MemoryStorage::new()),
//!     Arc::new(MemoryDocumentStore::new()),
//!     identity,
//! )
//! .build()?;
//! context.init().await?;
//!
//! let posts = context.fetch_posts().await?;
//! context.toggle_like(&posts[0].id).await?;
//! # Ok(())
//! # }
//! ```
//!
//! # Thread Safety
//!
//! `SyncContext` is cheap to clone and safe to share between tasks. Shared
//! state sits behind `tokio::sync` locks and notifications go out on a
//! `broadcast` channel.
//!
//! # Error Handling
//!
//! - `RemoteError` classifies remote failures as transient or logical
//! - `SyncError` is what the façade returns to the view layer
//! - `StorageError` covers durable storage; cache writes log and continue

/// Shared types and data structures
pub mod shared;

/// Offline sync core
pub mod client;
