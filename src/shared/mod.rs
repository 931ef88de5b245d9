//! Shared Module
//!
//! Types shared by every layer of the client: the community data model, the
//! document-service vocabulary, sync events, errors and configuration.
//!
//! # Overview
//!
//! Nothing in this module performs I/O. All types are serializable so they
//! can be cached locally, queued for replay or sent to the remote service.

/// Community data model
pub mod models;

/// Remote document vocabulary
pub mod document;

/// Sync notifications
pub mod event;

/// Shared error types
pub mod error;

/// Sync configuration
pub mod config;

/// Re-export commonly used types for convenience
pub use config::{ConfigError, SyncConfig, SyncConfigBuilder};
pub use document::{Document, DocumentSnapshot, FieldUpdate, FieldUpdates, Query};
pub use error::{RemoteError, RemoteErrorKind, SyncError};
pub use event::{SyncEvent, SyncEventKind};
pub use models::Category;
