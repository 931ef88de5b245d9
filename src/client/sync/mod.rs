//! # Sync Context
//!
//! Single entry point the dashboard uses for every read and write. Owns the
//! cache, the pending action queue, the optimistic local state, the network
//! monitor and the reconnection scheduler, and talks to the remote services.
//!
//! ## Architecture
//!
//! The sync context coordinates multiple components:
//! - **Network Monitor**: online/offline state machine
//! - **Scheduler**: backoff-driven reconnection probes while offline
//! - **Executor**: translates actions into remote document writes
//! - **Loaders**: remote reads behind each data category
//! - **Sync State**: status snapshot for the view layer
//!
//! ## Key Features
//!
//! - **Cache Fallback**: failed reads serve the last-known-good snapshot
//! - **Offline Writes**: writes are applied locally and queued while offline or unreachable
//! - **Automatic Replay**: the queue is drained in order when connectivity returns
//! - **Rollback**: rejected writes revert their optimistic change
//!
//! ## Usage
//!
//! ```rust,no_run
//! use community_sync::client::local_db::MemoryStorage;
//! use community_sync::client::remote::{MemoryDocumentStore, Session, StaticIdentity};
//! use community_sync::client::sync::SyncContext;
//! use community_sync::shared::SyncConfig;
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let identity = StaticIdentity::signed_in(Session {
//!     uid: "u1".to_string(),
//!     email: "ada@example.com".to_string(),
//!     display_name: None,
//! });
//! let context = SyncContext::builder(
//!     SyncConfig::default(),
//!     Arc::new(MemoryStorage::new()),
//!     Arc::new(MemoryDocumentStore::new()),
//!     Arc::new(identity),
//! )
//! .online(true)
//! .build()?;
//!
//! context.init().await?;
//! let posts = context.fetch_posts().await?;
//! if let Some(post) = posts.first() {
//!     context.toggle_like(&post.id).await?;
//! }
//! context.dispose().await;
//! # Ok(())
//! # }
//! ```

pub mod executor;
pub mod loaders;
pub mod network_monitor;
pub mod scheduler;
pub mod sync_state;

pub use executor::{ActionExecutor, DocumentActionExecutor};
pub use network_monitor::{NetworkMonitor, NetworkSignal, NetworkStatus, Transition};
pub use scheduler::{ConnectivityProbe, ReconnectionScheduler, ReconnectionStatus, UserDocumentProbe};
pub use sync_state::SyncStatus;

use crate::client::local_db::DurableStorage;
use crate::client::media::{upload_path, MediaError, MediaFile};
use crate::client::offline::{
    Action, ActionKind, ActionReceipt, BackoffStrategy, CacheStore, DrainDecision, DrainReport,
    LocalState, PendingAction, PendingActionQueue, RetryPolicy, Target,
};
use crate::client::remote::{BlobStore, DocumentStore, IdentityProvider, Session, UploadProgress};
use crate::shared::config::SyncConfig;
use crate::shared::error::{RemoteError, SyncError};
use crate::shared::event::{SyncEvent, SyncEventKind};
use crate::shared::models::{
    Category, Comment, Connection, ConnectionStatus, Event, MediaKind, NewPost, Post,
    Recommendation, UserProfile,
};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashSet;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, mpsc, Mutex, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Result of a write
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationOutcome {
    /// The remote service applied the write
    Confirmed(ActionReceipt),
    /// Applied locally and queued until connectivity returns
    Queued { action_id: Uuid },
    /// A never-synced post was removed together with its queued actions
    Withdrawn { discarded: usize },
}

impl MutationOutcome {
    pub fn is_pending(&self) -> bool {
        matches!(self, MutationOutcome::Queued { .. })
    }
}

/// Media stored in the blob store, ready to attach to a post
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedMedia {
    pub url: String,
    pub kind: MediaKind,
}

/// Outcome of [`SyncContext::refresh_all`]
#[derive(Debug, Default)]
pub struct RefreshReport {
    /// Categories loaded, from the remote service or the cache
    pub loaded: Vec<Category>,
    pub failed: Vec<(Category, SyncError)>,
}

impl RefreshReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

#[derive(Debug)]
struct SyncInner {
    config: SyncConfig,
    session: Session,
    cache: CacheStore,
    queue: PendingActionQueue,
    state: RwLock<LocalState>,
    monitor: Arc<NetworkMonitor>,
    scheduler: ReconnectionScheduler,
    documents: Arc<dyn DocumentStore>,
    blobs: Option<Arc<dyn BlobStore>>,
    identity: Arc<dyn IdentityProvider>,
    executor: Arc<dyn ActionExecutor>,
    retry: RetryPolicy,
    events: broadcast::Sender<SyncEvent>,
    disposed: AtomicBool,
    redrain_scheduled: AtomicBool,
    supervisor: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for SyncInner {
    fn drop(&mut self) {
        if let Some(handle) = self.supervisor.get_mut().take() {
            handle.abort();
        }
    }
}

/// Builder for [`SyncContext`]
#[derive(Debug)]
pub struct SyncContextBuilder {
    config: SyncConfig,
    storage: Arc<dyn DurableStorage>,
    documents: Arc<dyn DocumentStore>,
    identity: Arc<dyn IdentityProvider>,
    blobs: Option<Arc<dyn BlobStore>>,
    executor: Option<Arc<dyn ActionExecutor>>,
    probe: Option<Arc<dyn ConnectivityProbe>>,
    online: bool,
}

impl SyncContextBuilder {
    /// Blob store used for post media
    pub fn blob_store(mut self, blobs: Arc<dyn BlobStore>) -> Self {
        self.blobs = Some(blobs);
        self
    }

    /// Replace the document-backed action executor
    pub fn executor(mut self, executor: Arc<dyn ActionExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// Replace the user-document reconnection probe
    pub fn probe(mut self, probe: Arc<dyn ConnectivityProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Connectivity reported by the platform at startup
    pub fn online(mut self, online: bool) -> Self {
        self.online = online;
        self
    }

    /// Build the context for the signed-in member
    pub fn build(self) -> Result<SyncContext, SyncError> {
        let session = self
            .identity
            .current_session()
            .ok_or(SyncError::NotAuthenticated)?;
        let uid = session.uid.clone();

        let executor: Arc<dyn ActionExecutor> = match self.executor {
            Some(executor) => executor,
            None => Arc::new(DocumentActionExecutor::new(self.documents.clone(), uid.clone())),
        };
        let probe: Arc<dyn ConnectivityProbe> = match self.probe {
            Some(probe) => probe,
            None => Arc::new(UserDocumentProbe::new(self.documents.clone(), uid.clone())),
        };

        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        let monitor = Arc::new(NetworkMonitor::new(self.online));
        let scheduler = ReconnectionScheduler::with_events(
            monitor.clone(),
            probe,
            self.config.reconnect.into(),
            events.clone(),
        );
        let queue = PendingActionQueue::persistent(
            self.storage.clone(),
            self.config.storage_key("pendingActions"),
        );

        Ok(SyncContext {
            inner: Arc::new(SyncInner {
                cache: CacheStore::new(self.storage, self.config.namespace.clone()),
                queue,
                state: RwLock::new(LocalState::new(Some(uid))),
                monitor,
                scheduler,
                documents: self.documents,
                blobs: self.blobs,
                identity: self.identity,
                executor,
                retry: self.config.fetch_retry.into(),
                events,
                disposed: AtomicBool::new(false),
                redrain_scheduled: AtomicBool::new(false),
                supervisor: Mutex::new(None),
                session,
                config: self.config,
            }),
        })
    }
}

/// Data synchronization façade shared by the dashboard
#[derive(Debug, Clone)]
pub struct SyncContext {
    inner: Arc<SyncInner>,
}

impl SyncContext {
    pub fn builder(
        config: SyncConfig,
        storage: Arc<dyn DurableStorage>,
        documents: Arc<dyn DocumentStore>,
        identity: Arc<dyn IdentityProvider>,
    ) -> SyncContextBuilder {
        SyncContextBuilder {
            config,
            storage,
            documents,
            identity,
            blobs: None,
            executor: None,
            probe: None,
            online: true,
        }
    }

    /// Load the cache and the persisted queue, seed the local state from
    /// them and start following connectivity changes. Calling it again is a
    /// no-op.
    pub async fn init(&self) -> Result<(), SyncError> {
        self.ensure_active()?;
        let mut supervisor = self.inner.supervisor.lock().await;
        if supervisor.is_some() {
            return Ok(());
        }

        let hydrated = self.inner.cache.hydrate().await;
        let restored = self.inner.queue.restore().await;
        self.seed_from_cache().await;

        let transitions = self.inner.monitor.subscribe();
        *supervisor = Some(tokio::spawn(supervise(
            Arc::downgrade(&self.inner),
            transitions,
        )));
        drop(supervisor);

        let online = self.inner.monitor.is_online();
        tracing::info!(
            uid = %self.inner.session.uid,
            hydrated,
            restored,
            online,
            "sync context initialized"
        );

        if !online {
            self.inner.scheduler.start().await;
            self.emit(SyncEventKind::WentOffline {
                pending_actions: self.inner.queue.size().await,
            });
        } else if restored > 0 {
            self.process_pending().await;
        }
        Ok(())
    }

    /// Stop background work. Every later operation fails with `Disposed`.
    pub async fn dispose(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return;
        }
        if let Some(handle) = self.inner.supervisor.lock().await.take() {
            handle.abort();
        }
        self.inner.scheduler.stop().await;
        tracing::info!(uid = %self.inner.session.uid, "sync context disposed");
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    pub fn session(&self) -> &Session {
        &self.inner.session
    }

    pub fn identity(&self) -> Arc<dyn IdentityProvider> {
        self.inner.identity.clone()
    }

    /// Stream of sync events from now on
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    pub fn is_online(&self) -> bool {
        self.inner.monitor.is_online()
    }

    /// Feed a platform connectivity signal to the monitor
    pub fn report_network(&self, signal: NetworkSignal) -> Option<Transition> {
        self.inner.monitor.signal(signal)
    }

    /// Copy of the optimistic local state
    pub async fn local_state(&self) -> LocalState {
        self.inner.state.read().await.clone()
    }

    pub async fn sync_status(&self) -> SyncStatus {
        SyncStatus {
            network: self.inner.monitor.status(),
            pending_actions: self.inner.queue.size().await,
            last_sync: self.inner.cache.last_sync_time().await,
            reconnection: self.inner.scheduler.status().await,
        }
    }

    pub async fn pending_count(&self) -> usize {
        self.inner.queue.size().await
    }

    /// Queued actions in replay order
    pub async fn pending_actions(&self) -> Vec<PendingAction> {
        self.inner.queue.snapshot().await
    }

    /// Probe the remote service now instead of waiting for the next
    /// scheduled attempt. Returns whether it is reachable.
    pub async fn retry_now(&self) -> Result<bool, SyncError> {
        self.ensure_active()?;
        Ok(self.inner.scheduler.retry_now().await)
    }

    // Reads

    /// Read `category` through `fetcher`.
    ///
    /// Online, transient failures are retried with the fetch retry policy;
    /// once retries are exhausted the remote service is reported unreachable
    /// and the cached snapshot is served. Offline, the cache is served
    /// without touching the network. Logical failures are returned as-is.
    pub async fn fetch<T, F, Fut>(&self, category: Category, fetcher: F) -> Result<T, SyncError>
    where
        T: Serialize + DeserializeOwned,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        self.ensure_active()?;
        if !self.inner.monitor.is_online() {
            return self
                .from_cache(category, RemoteError::unavailable("offline"))
                .await;
        }

        match self.inner.retry.run(fetcher).await {
            Ok(value) => {
                self.inner.cache.save(category, &value).await;
                self.emit(SyncEventKind::Refreshed { category });
                Ok(value)
            }
            Err(error) if error.is_transient() => {
                tracing::warn!(%category, %error, "remote read failed, falling back to cache");
                self.inner.monitor.signal(NetworkSignal::RemoteUnreachable);
                self.from_cache(category, error).await
            }
            Err(error) => {
                tracing::error!(%category, %error, "remote read rejected");
                Err(SyncError::Remote(error))
            }
        }
    }

    /// The member's profile, created remotely when missing
    pub async fn fetch_profile(&self) -> Result<UserProfile, SyncError> {
        let documents = self.inner.documents.as_ref();
        let session = &self.inner.session;
        let profile: UserProfile = self
            .fetch(Category::Profile, || loaders::load_profile(documents, session))
            .await?;
        self.inner.state.write().await.set_profile(profile.clone());
        Ok(profile)
    }

    /// The feed, newest first, with queued actions applied
    pub async fn fetch_posts(&self) -> Result<Vec<Post>, SyncError> {
        let documents = self.inner.documents.as_ref();
        let uid = self.inner.session.uid.as_str();
        let posts: Vec<Post> = self
            .fetch(Category::Posts, || loaders::load_posts(documents, uid))
            .await?;

        let pending = self.inner.queue.snapshot().await;
        let mut state = self.inner.state.write().await;
        state.rebase_posts(posts, &pending);
        state.settle(&pending);
        Ok(state.posts().to_vec())
    }

    /// Upcoming events, soonest first, with queued actions applied
    pub async fn fetch_events(&self) -> Result<Vec<Event>, SyncError> {
        let documents = self.inner.documents.as_ref();
        let uid = self.inner.session.uid.as_str();
        let events: Vec<Event> = self
            .fetch(Category::Events, || loaders::load_events(documents, uid, Utc::now()))
            .await?;

        let pending = self.inner.queue.snapshot().await;
        let mut state = self.inner.state.write().await;
        state.rebase_events(events, &pending);
        state.settle(&pending);
        Ok(state.events().to_vec())
    }

    /// The member's connections, with queued requests applied
    pub async fn fetch_connections(&self) -> Result<Vec<Connection>, SyncError> {
        let documents = self.inner.documents.as_ref();
        let uid = self.inner.session.uid.as_str();
        let connections: Vec<Connection> = self
            .fetch(Category::Connections, || loaders::load_connections(documents, uid))
            .await?;

        let pending = self.inner.queue.snapshot().await;
        let mut state = self.inner.state.write().await;
        state.rebase_connections(connections, &pending);
        state.settle(&pending);
        Ok(state.connections().to_vec())
    }

    /// Members to connect with, excluding existing connections
    pub async fn fetch_recommendations(&self) -> Result<Vec<Recommendation>, SyncError> {
        let connected: HashSet<String> = self
            .inner
            .state
            .read()
            .await
            .connections()
            .iter()
            .map(|c| c.connected_user_id.clone())
            .collect();

        let documents = self.inner.documents.as_ref();
        let uid = self.inner.session.uid.as_str();
        let recommendations: Vec<Recommendation> = self
            .fetch(Category::Recommendations, || {
                loaders::load_recommendations(documents, uid, &connected)
            })
            .await?;

        let pending = self.inner.queue.snapshot().await;
        let mut state = self.inner.state.write().await;
        state.rebase_recommendations(recommendations, &pending);
        Ok(state.recommendations().to_vec())
    }

    /// Reload every category in dashboard order. A failing category does not
    /// stop the others.
    pub async fn refresh_all(&self) -> RefreshReport {
        let mut report = RefreshReport::default();
        for category in Category::ALL {
            let result = match category {
                Category::Profile => self.fetch_profile().await.map(|_| ()),
                Category::Posts => self.fetch_posts().await.map(|_| ()),
                Category::Events => self.fetch_events().await.map(|_| ()),
                Category::Connections => self.fetch_connections().await.map(|_| ()),
                Category::Recommendations => self.fetch_recommendations().await.map(|_| ()),
            };
            match result {
                Ok(()) => report.loaded.push(category),
                Err(error) => {
                    tracing::warn!(%category, %error, "category refresh failed");
                    report.failed.push((category, error));
                }
            }
        }
        report
    }

    // Writes

    /// Send `action`, or queue it while offline.
    ///
    /// The local state changes immediately. Online, the action is executed
    /// with the fetch retry policy. Once transient failures exhaust the
    /// retries the service is reported unreachable and the action is queued;
    /// any other failure rolls the local change back. Offline, or when it
    /// targets a post whose creation is still queued, it is queued behind the
    /// actions it depends on.
    pub async fn mutate(&self, action: Action) -> Result<MutationOutcome, SyncError> {
        self.ensure_active()?;
        // Checked before resolving so a creation confirmed meanwhile is seen
        // through its alias
        let waits = self.waits_for_queued_post(&action).await;
        let action = self.inner.state.read().await.resolve(&action);

        if waits || !self.inner.monitor.is_online() {
            return self.enqueue(action).await;
        }

        if !self.inner.state.write().await.apply(&action) {
            return Err(unknown_target(&action));
        }

        let executor = self.inner.executor.as_ref();
        match self.inner.retry.run(|| executor.execute(&action)).await {
            Ok(receipt) => {
                let pending = self.inner.queue.snapshot().await;
                let mut state = self.inner.state.write().await;
                state.confirm(&action, &receipt);
                state.settle(&pending);
                Ok(MutationOutcome::Confirmed(receipt))
            }
            Err(error) if error.is_transient() => {
                tracing::warn!(kind = %action.kind(), %error, "write failed, queued for replay");
                self.inner.monitor.signal(NetworkSignal::RemoteUnreachable);
                let action_id = self.push_pending(action).await;
                Ok(MutationOutcome::Queued { action_id })
            }
            Err(error) => {
                tracing::warn!(kind = %action.kind(), %error, "write rejected, rolling back");
                self.inner.state.write().await.rollback(&action);
                Err(SyncError::Remote(error))
            }
        }
    }

    /// Publish a post with optional uploaded media
    pub async fn create_post(
        &self,
        content: &str,
        media: Option<UploadedMedia>,
    ) -> Result<MutationOutcome, SyncError> {
        let content = content.trim();
        if content.is_empty() && media.is_none() {
            return Err(SyncError::validation("content", "post cannot be empty"));
        }

        let (media_url, media_type) = match media {
            Some(media) => (Some(media.url), Some(media.kind)),
            None => (None, None),
        };
        let post = NewPost {
            author_id: self.inner.session.uid.clone(),
            author_name: self.display_name().await,
            content: content.to_string(),
            media_url,
            media_type,
        };
        self.mutate(Action::CreatePost {
            local_id: format!("local-{}", Uuid::new_v4()),
            post,
        })
        .await
    }

    /// Like or unlike a post
    pub async fn toggle_like(&self, post_id: &str) -> Result<MutationOutcome, SyncError> {
        let liked = !self
            .inner
            .state
            .read()
            .await
            .post(post_id)
            .is_some_and(|post| post.is_liked);
        self.mutate(Action::LikePost {
            post_id: post_id.to_string(),
            liked,
        })
        .await
    }

    /// Comment on a post
    pub async fn add_comment(&self, post_id: &str, content: &str) -> Result<MutationOutcome, SyncError> {
        let content = content.trim();
        if content.is_empty() {
            return Err(SyncError::validation("content", "comment cannot be empty"));
        }

        let photo = self
            .inner
            .state
            .read()
            .await
            .profile()
            .and_then(|p| p.photo_url.clone());
        let comment = Comment {
            id: Uuid::new_v4().to_string(),
            user_id: self.inner.session.uid.clone(),
            user_name: self.display_name().await,
            user_photo: photo,
            content: content.to_string(),
            timestamp: Utc::now(),
            pending: true,
        };
        self.mutate(Action::AddComment {
            post_id: post_id.to_string(),
            comment,
        })
        .await
    }

    /// RSVP to an event, or withdraw the RSVP
    pub async fn toggle_attendance(&self, event_id: &str) -> Result<MutationOutcome, SyncError> {
        let attending = !self
            .inner
            .state
            .read()
            .await
            .event(event_id)
            .is_some_and(|event| event.is_attending);
        self.mutate(Action::AttendEvent {
            event_id: event_id.to_string(),
            attending,
        })
        .await
    }

    /// Request a connection with another member
    pub async fn connect_user(&self, user_id: &str) -> Result<MutationOutcome, SyncError> {
        let uid = self.inner.session.uid.clone();
        if user_id == uid {
            return Err(SyncError::validation("user_id", "cannot connect with yourself"));
        }

        let card = {
            let state = self.inner.state.read().await;
            if state
                .connections()
                .iter()
                .any(|c| c.connected_user_id == user_id)
            {
                return Err(SyncError::validation("user_id", "already connected"));
            }
            state
                .recommendations()
                .iter()
                .find(|r| r.id == user_id)
                .map(Recommendation::card)
        };

        let connection = Connection {
            id: format!("local-{}", Uuid::new_v4()),
            user_id: uid,
            connected_user_id: user_id.to_string(),
            status: ConnectionStatus::Pending,
            created_at: Utc::now(),
            user: card,
            pending: true,
        };
        self.mutate(Action::ConnectUser {
            user_id: user_id.to_string(),
            connection,
        })
        .await
    }

    /// Delete one of the member's posts.
    ///
    /// A post whose creation is still queued never reaches the remote
    /// service: it is removed locally together with every queued action that
    /// targets it.
    pub async fn delete_post(&self, post_id: &str) -> Result<MutationOutcome, SyncError> {
        self.ensure_active()?;
        let (post_id, author_id, pending) = {
            let state = self.inner.state.read().await;
            let post = state
                .post(post_id)
                .ok_or_else(|| SyncError::validation("post_id", format!("unknown post {}", post_id)))?;
            (post.id.clone(), post.author_id.clone(), post.pending)
        };
        if author_id != self.inner.session.uid {
            return Err(SyncError::forbidden("only the author can delete a post"));
        }

        if pending {
            let discarded = self
                .inner
                .queue
                .discard_where(|queued| queued.action.touches_post(&post_id))
                .await;
            if !discarded.is_empty() {
                let mut state = self.inner.state.write().await;
                for queued in discarded.iter().rev() {
                    state.rollback(&queued.action);
                }
            }

            let withdrawn = discarded
                .iter()
                .any(|queued| queued.action.kind() == ActionKind::CreatePost);
            if withdrawn {
                tracing::info!(%post_id, discarded = discarded.len(), "unsynced post withdrawn");
                self.emit(SyncEventKind::QueueChanged {
                    pending_actions: self.inner.queue.size().await,
                });
                return Ok(MutationOutcome::Withdrawn {
                    discarded: discarded.len(),
                });
            }
        }

        self.mutate(Action::DeletePost { post_id }).await
    }

    /// Drop every queued action and revert its local effect
    pub async fn clear_pending(&self) -> Result<usize, SyncError> {
        self.ensure_active()?;
        let removed = self.inner.queue.clear().await;
        {
            let mut state = self.inner.state.write().await;
            for queued in removed.iter().rev() {
                state.rollback(&queued.action);
            }
            let remaining = self.inner.queue.snapshot().await;
            state.settle(&remaining);
        }
        self.emit(SyncEventKind::QueueChanged {
            pending_actions: self.inner.queue.size().await,
        });
        Ok(removed.len())
    }

    /// Upload post media. Needs connectivity; the file is validated first.
    pub async fn upload_media(
        &self,
        file: MediaFile,
        progress: mpsc::Sender<UploadProgress>,
    ) -> Result<UploadedMedia, MediaError> {
        let kind = file.validate()?;
        if !self.inner.monitor.is_online() {
            return Err(MediaError::Offline);
        }
        let blobs = self
            .inner
            .blobs
            .as_ref()
            .ok_or_else(|| RemoteError::unknown("no blob store configured"))?;

        let path = upload_path(&self.inner.session.uid, &file, Utc::now().timestamp_millis());
        tracing::debug!(%path, size = file.data.len(), "uploading media");
        match blobs
            .upload_resumable(&path, file.data, &file.content_type, progress)
            .await
        {
            Ok(url) => Ok(UploadedMedia { url, kind }),
            Err(error) => {
                if error.is_transient() {
                    self.inner.monitor.signal(NetworkSignal::RemoteUnreachable);
                }
                Err(MediaError::Upload(error))
            }
        }
    }

    // Replay

    /// Replay the queued actions in order through the action executor.
    ///
    /// Actions queued while a pass runs are picked up by another pass as long
    /// as the previous one made progress. Whatever is still left while online
    /// gets a later drain on the reconnection backoff.
    pub async fn process_pending(&self) -> DrainReport {
        let mut report = DrainReport::default();
        loop {
            if self.is_disposed() {
                return report;
            }
            let pass = self.inner.queue.drain(|pending| self.replay(pending)).await;
            report.merge(pass);
            if !pass.made_progress()
                || !self.inner.monitor.is_online()
                || self.inner.queue.is_empty().await
            {
                break;
            }
        }

        let remaining = self.inner.queue.snapshot().await;
        self.inner.state.write().await.settle(&remaining);
        if report.processed > 0 {
            self.emit(SyncEventKind::DrainFinished {
                completed: report.completed,
                retried: report.retried,
                discarded: report.discarded,
            });
            self.emit(SyncEventKind::QueueChanged {
                pending_actions: remaining.len(),
            });
        }
        if !remaining.is_empty() && self.inner.monitor.is_online() {
            let attempts = remaining.iter().map(|p| p.attempts).max().unwrap_or(0);
            self.schedule_redrain(attempts);
        }
        report
    }

    /// Drain again after the reconnection backoff for `attempts`. At most one
    /// drain is scheduled at a time.
    fn schedule_redrain(&self, attempts: u32) {
        if self.inner.redrain_scheduled.swap(true, Ordering::SeqCst) {
            return;
        }
        let delay = BackoffStrategy::from(self.inner.config.reconnect).delay(attempts);
        tracing::debug!(?delay, attempts, "pending actions left while online, draining later");

        let inner = Arc::downgrade(&self.inner);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(inner) = inner.upgrade() else { return };
            inner.redrain_scheduled.store(false, Ordering::SeqCst);
            let context = SyncContext { inner };
            if context.is_online() {
                context.process_pending().await;
            }
        });
    }

    async fn replay(&self, pending: PendingAction) -> DrainDecision {
        // Connectivity may have dropped while earlier actions ran
        if !self.inner.monitor.is_online() {
            return DrainDecision::Defer;
        }

        let action = self.inner.state.read().await.resolve(&pending.action);
        if let Action::CreatePost { local_id, .. } = &action {
            if !self.inner.state.read().await.has_post(local_id) {
                tracing::debug!(action_id = %pending.id, "local post vanished, dropping creation");
                return DrainDecision::Discard;
            }
        }

        match self.inner.executor.execute(&action).await {
            Ok(receipt) => {
                self.inner.state.write().await.confirm(&action, &receipt);
                if let ActionReceipt::Created {
                    local_id,
                    remote_id,
                } = &receipt
                {
                    self.inner
                        .queue
                        .rewrite(|queued| queued.retarget_post(local_id, remote_id))
                        .await;
                }
                tracing::debug!(action_id = %pending.id, kind = %action.kind(), "action replayed");
                DrainDecision::Completed
            }
            Err(error) if error.is_transient() => {
                tracing::warn!(action_id = %pending.id, %error, "replay interrupted");
                self.inner.monitor.signal(NetworkSignal::RemoteUnreachable);
                DrainDecision::Retry
            }
            Err(error) if error.is_logical() => {
                tracing::warn!(action_id = %pending.id, kind = %action.kind(), %error, "action rejected, rolling back");
                self.inner.state.write().await.rollback(&action);
                DrainDecision::Discard
            }
            Err(error) => {
                tracing::warn!(action_id = %pending.id, %error, "replay failed, keeping action");
                DrainDecision::Retry
            }
        }
    }

    // Internals

    async fn enqueue(&self, action: Action) -> Result<MutationOutcome, SyncError> {
        if !self.inner.state.write().await.apply(&action) {
            return Err(unknown_target(&action));
        }
        let action_id = self.push_pending(action).await;
        Ok(MutationOutcome::Queued { action_id })
    }

    /// Queue an action already applied locally. Online, a drain is started so
    /// it does not wait for the next reconnection.
    async fn push_pending(&self, action: Action) -> Uuid {
        let action_id = self.inner.queue.enqueue(action).await;
        self.emit(SyncEventKind::QueueChanged {
            pending_actions: self.inner.queue.size().await,
        });
        if self.inner.monitor.is_online() {
            let context = self.clone();
            tokio::spawn(async move {
                context.process_pending().await;
            });
        }
        action_id
    }

    /// Whether `action` targets a post whose creation is still queued
    async fn waits_for_queued_post(&self, action: &Action) -> bool {
        if action.kind() == ActionKind::CreatePost {
            return false;
        }
        let Target::Post(post_id) = action.target() else {
            return false;
        };
        self.inner.queue.snapshot().await.iter().any(|queued| {
            matches!(&queued.action, Action::CreatePost { local_id, .. } if *local_id == post_id)
        })
    }

    async fn seed_from_cache(&self) {
        let cache = &self.inner.cache;
        let pending = self.inner.queue.snapshot().await;
        let mut state = self.inner.state.write().await;

        if let Some(profile) = cache.load::<UserProfile>(Category::Profile).await {
            state.set_profile(profile);
        }
        if let Some(posts) = cache.load::<Vec<Post>>(Category::Posts).await {
            state.rebase_posts(posts, &pending);
        }
        if let Some(events) = cache.load::<Vec<Event>>(Category::Events).await {
            state.rebase_events(events, &pending);
        }
        if let Some(connections) = cache.load::<Vec<Connection>>(Category::Connections).await {
            state.rebase_connections(connections, &pending);
        }
        if let Some(recommendations) = cache
            .load::<Vec<Recommendation>>(Category::Recommendations)
            .await
        {
            state.rebase_recommendations(recommendations, &pending);
        }
        state.settle(&pending);
    }

    async fn from_cache<T: DeserializeOwned>(
        &self,
        category: Category,
        source: RemoteError,
    ) -> Result<T, SyncError> {
        match self.inner.cache.load::<T>(category).await {
            Some(value) => {
                tracing::info!(%category, "serving cached data");
                self.emit(SyncEventKind::ServedFromCache { category });
                Ok(value)
            }
            None => Err(SyncError::NoCachedData { category, source }),
        }
    }

    async fn display_name(&self) -> String {
        if let Some(profile) = self.inner.state.read().await.profile() {
            let name = profile.display_name();
            if !name.is_empty() {
                return name;
            }
        }
        self.inner
            .session
            .display_name
            .clone()
            .unwrap_or_else(|| "User".to_string())
    }

    async fn on_transition(&self, transition: Transition) {
        match transition.status {
            NetworkStatus::Offline => {
                self.inner.scheduler.start().await;
                self.emit(SyncEventKind::WentOffline {
                    pending_actions: self.inner.queue.size().await,
                });
            }
            NetworkStatus::Online => {
                self.inner.scheduler.stop().await;
                self.emit(SyncEventKind::Reconnected);
                self.process_pending().await;

                // Skip the refresh if connectivity changed again meanwhile
                if self.inner.monitor.epoch() == transition.epoch {
                    let report = self.refresh_all().await;
                    if !report.is_complete() {
                        tracing::warn!(failed = report.failed.len(), "refresh after reconnect incomplete");
                    }
                }
            }
        }
    }

    fn ensure_active(&self) -> Result<(), SyncError> {
        if self.is_disposed() {
            Err(SyncError::Disposed)
        } else {
            Ok(())
        }
    }

    fn emit(&self, kind: SyncEventKind) {
        // No subscribers is fine
        let _ = self.inner.events.send(SyncEvent::new(kind));
    }
}

fn unknown_target(action: &Action) -> SyncError {
    match action.target() {
        Target::Post(id) => SyncError::validation("post_id", format!("unknown post {}", id)),
        Target::Event(id) => SyncError::validation("event_id", format!("unknown event {}", id)),
        Target::User(id) => SyncError::validation("user_id", format!("unknown member {}", id)),
    }
}

/// Follow connectivity transitions for as long as the context lives
async fn supervise(inner: Weak<SyncInner>, mut transitions: broadcast::Receiver<Transition>) {
    loop {
        let transition = match transitions.recv().await {
            Ok(transition) => transition,
            Err(RecvError::Lagged(skipped)) => {
                tracing::warn!(skipped, "missed connectivity transitions");
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        let Some(inner) = inner.upgrade() else { break };
        let context = SyncContext { inner };
        if context.is_disposed() {
            break;
        }
        context.on_transition(transition).await;
    }
}
