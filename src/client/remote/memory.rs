//! In-process remote services
//!
//! Document store, blob store and identity provider kept entirely in memory.
//! They back the offline demo and the test suite: connectivity can be cut
//! with [`MemoryDocumentStore::set_reachable`], single failures can be
//! scripted with [`MemoryDocumentStore::fail_next`] and a write whose reply
//! never arrives with [`MemoryDocumentStore::lose_next_reply`]. Every document call is
//! recorded so tests can assert what actually reached the "server".

use super::{BlobStore, DocumentStore, IdentityProvider, RemoteResult, Session, UploadProgress};
use crate::shared::document::{apply_updates, Document, DocumentSnapshot, FieldUpdates, Query};
use crate::shared::error::RemoteError;
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use serde::Serialize;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use uuid::Uuid;

/// A call received by [`MemoryDocumentStore`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCall {
    /// `get`, `set`, `update`, `delete`, `add` or `query`
    pub op: &'static str,
    /// `collection/id`, or just the collection for `add` and `query`
    pub path: String,
}

/// Document database held in memory
#[derive(Debug)]
pub struct MemoryDocumentStore {
    collections: RwLock<HashMap<String, BTreeMap<String, Document>>>,
    reachable: AtomicBool,
    failures: Mutex<VecDeque<RemoteError>>,
    lost_replies: Mutex<VecDeque<RemoteError>>,
    calls: Mutex<Vec<RemoteCall>>,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            reachable: AtomicBool::new(true),
            failures: Mutex::new(VecDeque::new()),
            lost_replies: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate losing or regaining the connection to the service
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    pub fn is_reachable(&self) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    /// Make the next call fail with `error`
    pub async fn fail_next(&self, error: RemoteError) {
        self.failures.lock().await.push_back(error);
    }

    /// Apply the next write but answer it with `error`, as when the reply is
    /// lost on the way back
    pub async fn lose_next_reply(&self, error: RemoteError) {
        self.lost_replies.lock().await.push_back(error);
    }

    /// Seed `collection/id` with a serializable value
    pub async fn insert<T: Serialize>(&self, collection: &str, id: &str, value: &T) -> RemoteResult<()> {
        let data = crate::shared::document::to_document(value)?;
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.to_string(), data);
        Ok(())
    }

    /// Body of `collection/id` as stored, bypassing reachability and the call log
    pub async fn document(&self, collection: &str, id: &str) -> Option<Document> {
        self.collections
            .read()
            .await
            .get(collection)
            .and_then(|docs| docs.get(id))
            .cloned()
    }

    /// Number of documents in `collection`
    pub async fn count(&self, collection: &str) -> usize {
        self.collections
            .read()
            .await
            .get(collection)
            .map_or(0, BTreeMap::len)
    }

    /// Every call received so far, oldest first
    pub async fn calls(&self) -> Vec<RemoteCall> {
        self.calls.lock().await.clone()
    }

    /// Calls with operation `op`
    pub async fn calls_to(&self, op: &str) -> Vec<RemoteCall> {
        self.calls
            .lock()
            .await
            .iter()
            .filter(|call| call.op == op)
            .cloned()
            .collect()
    }

    pub async fn clear_calls(&self) {
        self.calls.lock().await.clear();
    }

    async fn enter(&self, op: &'static str, path: String) -> RemoteResult<()> {
        if !self.is_reachable() {
            return Err(RemoteError::unavailable("network unreachable"));
        }
        if let Some(error) = self.failures.lock().await.pop_front() {
            return Err(error);
        }
        self.calls.lock().await.push(RemoteCall { op, path });
        Ok(())
    }

    /// Reply to a write that was applied
    async fn reply(&self) -> RemoteResult<()> {
        match self.lost_replies.lock().await.pop_front() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get_document(&self, collection: &str, id: &str) -> RemoteResult<Option<DocumentSnapshot>> {
        self.enter("get", format!("{}/{}", collection, id)).await?;
        Ok(self
            .document(collection, id)
            .await
            .map(|data| DocumentSnapshot::new(id, data)))
    }

    async fn set_document(&self, collection: &str, id: &str, data: Document, merge: bool) -> RemoteResult<()> {
        self.enter("set", format!("{}/{}", collection, id)).await?;
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_string()).or_default();
        match docs.get_mut(id) {
            Some(existing) if merge => existing.extend(data),
            _ => {
                docs.insert(id.to_string(), data);
            }
        }
        drop(collections);
        self.reply().await
    }

    async fn update_document(&self, collection: &str, id: &str, updates: FieldUpdates) -> RemoteResult<()> {
        self.enter("update", format!("{}/{}", collection, id)).await?;
        let mut collections = self.collections.write().await;
        let document = collections
            .get_mut(collection)
            .and_then(|docs| docs.get_mut(id))
            .ok_or_else(|| RemoteError::not_found(collection, id))?;
        apply_updates(document, &updates, &Utc::now().to_rfc3339());
        drop(collections);
        self.reply().await
    }

    async fn delete_document(&self, collection: &str, id: &str) -> RemoteResult<()> {
        self.enter("delete", format!("{}/{}", collection, id)).await?;
        if let Some(docs) = self.collections.write().await.get_mut(collection) {
            docs.remove(id);
        }
        self.reply().await
    }

    async fn add_document(&self, collection: &str, mut data: Document) -> RemoteResult<String> {
        self.enter("add", collection.to_string()).await?;
        let id = Uuid::new_v4().simple().to_string();
        let now = Value::String(Utc::now().to_rfc3339());
        data.entry("createdAt".to_string()).or_insert(now);
        self.collections
            .write()
            .await
            .entry(collection.to_string())
            .or_default()
            .insert(id.clone(), data);
        self.reply().await?;
        Ok(id)
    }

    async fn query_collection(&self, query: &Query) -> RemoteResult<Vec<DocumentSnapshot>> {
        self.enter("query", query.collection.clone()).await?;
        let collections = self.collections.read().await;
        Ok(collections
            .get(&query.collection)
            .map(|docs| query.apply(docs.iter()))
            .unwrap_or_default())
    }
}

/// Object storage held in memory
#[derive(Debug)]
pub struct MemoryBlobStore {
    blobs: RwLock<HashMap<String, Bytes>>,
    reachable: AtomicBool,
    chunk_size: usize,
}

impl Default for MemoryBlobStore {
    fn default() -> Self {
        Self {
            blobs: RwLock::new(HashMap::new()),
            reachable: AtomicBool::new(true),
            chunk_size: 256 * 1024,
        }
    }
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store reporting progress every `chunk_size` bytes
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            ..Self::default()
        }
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Stored object at `path`
    pub async fn blob(&self, path: &str) -> Option<Bytes> {
        self.blobs.read().await.get(path).cloned()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn upload_resumable(
        &self,
        path: &str,
        data: Bytes,
        _content_type: &str,
        progress: mpsc::Sender<UploadProgress>,
    ) -> RemoteResult<String> {
        let total = data.len() as u64;
        let mut sent = 0u64;
        for chunk in data.chunks(self.chunk_size) {
            if !self.reachable.load(Ordering::SeqCst) {
                return Err(RemoteError::unavailable("upload interrupted"));
            }
            sent += chunk.len() as u64;
            // A dropped receiver only means nobody watches the progress
            let _ = progress
                .send(UploadProgress {
                    bytes_transferred: sent,
                    total_bytes: total,
                })
                .await;
        }
        if total == 0 && !self.reachable.load(Ordering::SeqCst) {
            return Err(RemoteError::unavailable("upload interrupted"));
        }

        self.blobs.write().await.insert(path.to_string(), data);
        Ok(format!("memory://blobs/{}", path))
    }
}

/// Identity provider with a session controlled by the caller
#[derive(Debug, Clone)]
pub struct StaticIdentity {
    state: Arc<watch::Sender<Option<Session>>>,
}

impl StaticIdentity {
    /// Provider with `session` signed in
    pub fn signed_in(session: Session) -> Self {
        let (tx, _rx) = watch::channel(Some(session));
        Self { state: Arc::new(tx) }
    }

    /// Provider with nobody signed in
    pub fn signed_out() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { state: Arc::new(tx) }
    }

    pub fn sign_in(&self, session: Session) {
        self.state.send_replace(Some(session));
    }
}

#[async_trait]
impl IdentityProvider for StaticIdentity {
    fn auth_state(&self) -> watch::Receiver<Option<Session>> {
        self.state.subscribe()
    }

    async fn sign_out(&self) -> RemoteResult<()> {
        self.state.send_replace(None);
        Ok(())
    }
}
