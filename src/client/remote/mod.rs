//! # Remote Collaborators
//!
//! Abstract interfaces of the hosted services the sync core talks to: the
//! document database, blob storage and the identity provider.
//!
//! ## Implementations
//!
//! - `http.rs`: `HttpDocumentStore`, a JSON-over-HTTP document service client
//! - `memory.rs`: in-process stores and a static identity, with switches to
//!   simulate an unreachable service
//!
//! Every method reports failures as a classified [`RemoteError`] so callers
//! can tell transient failures from logical rejections.

pub mod http;
pub mod memory;

pub use http::HttpDocumentStore;
pub use memory::{MemoryBlobStore, MemoryDocumentStore, StaticIdentity};

use crate::shared::document::{Document, DocumentSnapshot, FieldUpdates, Query};
use crate::shared::error::RemoteError;
use async_trait::async_trait;
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use tokio::sync::{mpsc, watch};

/// Result of a remote call
pub type RemoteResult<T> = Result<T, RemoteError>;

/// Hosted document database
#[async_trait]
pub trait DocumentStore: Send + Sync + Debug {
    /// Document `collection/id`, `None` if it does not exist
    async fn get_document(&self, collection: &str, id: &str) -> RemoteResult<Option<DocumentSnapshot>>;

    /// Write `data` to `collection/id`; with `merge` only the given fields change
    async fn set_document(&self, collection: &str, id: &str, data: Document, merge: bool) -> RemoteResult<()>;

    /// Apply field updates to an existing document; `NotFound` if it is missing
    async fn update_document(&self, collection: &str, id: &str, updates: FieldUpdates) -> RemoteResult<()>;

    /// Delete `collection/id`; deleting a missing document succeeds
    async fn delete_document(&self, collection: &str, id: &str) -> RemoteResult<()>;

    /// Create a document with a generated id and return the id
    async fn add_document(&self, collection: &str, data: Document) -> RemoteResult<String>;

    /// Documents matching `query`
    async fn query_collection(&self, query: &Query) -> RemoteResult<Vec<DocumentSnapshot>>;
}

/// Progress of a resumable upload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadProgress {
    pub bytes_transferred: u64,
    pub total_bytes: u64,
}

impl UploadProgress {
    /// Completion in percent, clamped to 0..=100
    pub fn percent(&self) -> u8 {
        if self.total_bytes == 0 {
            return 100;
        }
        let pct = self.bytes_transferred.saturating_mul(100) / self.total_bytes;
        pct.min(100) as u8
    }
}

/// Hosted object storage
#[async_trait]
pub trait BlobStore: Send + Sync + Debug {
    /// Upload `data` to `path`, reporting progress on `progress`, and return
    /// the public download URL
    async fn upload_resumable(
        &self,
        path: &str,
        data: Bytes,
        content_type: &str,
        progress: mpsc::Sender<UploadProgress>,
    ) -> RemoteResult<String>;
}

/// Signed-in member
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub uid: String,
    pub email: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

/// Hosted identity provider
#[async_trait]
pub trait IdentityProvider: Send + Sync + Debug {
    /// Stream of authentication state; `None` while signed out
    fn auth_state(&self) -> watch::Receiver<Option<Session>>;

    /// End the current session
    async fn sign_out(&self) -> RemoteResult<()>;

    /// Current session, if any
    fn current_session(&self) -> Option<Session> {
        let state = self.auth_state();
        let session = state.borrow().clone();
        session
    }
}
