//! Seeded stores and sync context harnesses

use community_sync::client::local_db::{DurableStorage, MemoryStorage};
use community_sync::client::remote::{MemoryDocumentStore, Session, StaticIdentity};
use community_sync::client::sync::{NetworkSignal, SyncContext};
use community_sync::shared::{SyncConfig, SyncEvent, SyncEventKind};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::{self, error::RecvError};

pub const USER_ID: &str = "u1";

/// Session of the member the tests act as
pub fn session() -> Session {
    Session {
        uid: USER_ID.to_string(),
        email: "ada@example.com".to_string(),
        display_name: Some("Ada Lovelace".to_string()),
    }
}

/// Configuration with millisecond retries so failures resolve quickly
pub fn fast_config() -> SyncConfig {
    SyncConfig::builder()
        .fetch_retry(2, Duration::from_millis(5))
        .reconnect(
            Duration::from_millis(20),
            Duration::from_millis(200),
            Duration::from_millis(5),
        )
        .build()
        .expect("valid test configuration")
}

/// Store with three members, one post by `u2` and one upcoming event
pub async fn seeded_store() -> Arc<MemoryDocumentStore> {
    let store = Arc::new(MemoryDocumentStore::new());
    for (id, first, last) in [("u1", "Ada", "Lovelace"), ("u2", "Grace", "Hopper"), ("u3", "Alan", "Turing")] {
        store
            .insert("users", id, &json!({"uid": id, "firstName": first, "lastName": last}))
            .await
            .expect("seed user");
    }
    store
        .insert(
            "posts",
            "p1",
            &json!({
                "authorId": "u2",
                "authorName": "Grace Hopper",
                "content": "Garden day on Saturday",
                "createdAt": "2024-05-01T09:00:00Z"
            }),
        )
        .await
        .expect("seed post");
    store
        .insert(
            "events",
            "e1",
            &json!({
                "title": "Park cleanup",
                "eventDate": "2099-06-01T10:00:00Z",
                "organizerId": "u2"
            }),
        )
        .await
        .expect("seed event");
    store
}

/// A sync context together with the collaborators the tests poke at
pub struct Harness {
    pub context: SyncContext,
    pub store: Arc<MemoryDocumentStore>,
    pub storage: Arc<dyn DurableStorage>,
}

impl Harness {
    /// Online context over a seeded store and fresh memory storage
    pub async fn online() -> Self {
        Self::with(seeded_store().await, Arc::new(MemoryStorage::new()), true).await
    }

    /// Context over `store` and `storage`, initialized
    pub async fn with(
        store: Arc<MemoryDocumentStore>,
        storage: Arc<dyn DurableStorage>,
        online: bool,
    ) -> Self {
        let context = SyncContext::builder(
            fast_config(),
            storage.clone(),
            store.clone(),
            Arc::new(StaticIdentity::signed_in(session())),
        )
        .online(online)
        .build()
        .expect("signed-in context");
        context.init().await.expect("init");
        Self {
            context,
            store,
            storage,
        }
    }

    /// Cut the connection: the service is unreachable and the platform says so
    pub fn go_offline(&self) {
        self.store.set_reachable(false);
        self.context.report_network(NetworkSignal::PlatformOffline);
    }

    /// Restore the connection and tell the context about it
    pub fn go_online(&self) {
        self.store.set_reachable(true);
        self.context.report_network(NetworkSignal::PlatformOnline);
    }

    /// Wait until every pending action was replayed
    pub async fn wait_for_drain(&self) {
        let context = self.context.clone();
        let drained = eventually(move || {
            let context = context.clone();
            async move { context.pending_count().await == 0 }
        })
        .await;
        assert!(drained, "pending actions were not replayed in time");
    }
}

/// Poll `check` until it holds, for at most two seconds
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    for _ in 0..200 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}

/// Receive events until one matches `predicate`, for at most two seconds
pub async fn wait_for_event<P>(
    events: &mut broadcast::Receiver<SyncEvent>,
    mut predicate: P,
) -> bool
where
    P: FnMut(&SyncEventKind) -> bool,
{
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    loop {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Ok(event)) if predicate(&event.kind) => return true,
            Ok(Ok(_)) | Ok(Err(RecvError::Lagged(_))) => continue,
            Ok(Err(RecvError::Closed)) | Err(_) => return false,
        }
    }
}
