//! Reconnection: probing with backoff and ordered replay of the queue

use crate::common::{
    eventually, fast_config, seeded_store, session, wait_for_event, Harness, USER_ID,
};
use crate::{assert_ok, assert_queued};
use async_trait::async_trait;
use community_sync::client::local_db::{DurableStorage, MemoryStorage};
use community_sync::client::offline::{Action, ActionKind, ActionReceipt};
use community_sync::client::remote::{DocumentStore, StaticIdentity};
use community_sync::client::sync::{ActionExecutor, DocumentActionExecutor, SyncContext};
use community_sync::shared::{RemoteError, SyncEventKind};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

/// Executor that takes its time over post creation
#[derive(Debug)]
struct SlowCreates {
    inner: DocumentActionExecutor,
}

#[async_trait]
impl ActionExecutor for SlowCreates {
    async fn execute(&self, action: &Action) -> Result<ActionReceipt, RemoteError> {
        if action.kind() == ActionKind::CreatePost {
            tokio::time::sleep(Duration::from_millis(300)).await;
        }
        self.inner.execute(action).await
    }
}

#[tokio::test]
async fn test_replay_follows_enqueue_order() {
    let h = Harness::online().await;
    h.context.refresh_all().await;
    h.go_offline();

    assert_queued!(h.context.create_post("Seedlings available", None).await);
    let local_id = h.context.local_state().await.posts()[0].id.clone();
    assert!(local_id.starts_with("local-"));
    assert_queued!(h.context.toggle_like(&local_id).await);
    assert_queued!(h.context.add_comment(&local_id, "I'll take two").await);
    assert_eq!(h.context.pending_count().await, 3);

    h.store.clear_calls().await;
    h.go_online();
    h.wait_for_drain().await;

    let ops: Vec<&str> = h
        .store
        .calls()
        .await
        .iter()
        .map(|call| call.op)
        .filter(|op| matches!(*op, "set" | "update"))
        .collect();
    assert_eq!(ops[..3], ["set", "update", "update"]);

    assert_eq!(h.store.count("posts").await, 2);
    let creates = h.store.calls_to("set").await;
    assert_eq!(creates.len(), 1);

    // The like and the comment landed on the id the service assigned
    let updates = h.store.calls_to("update").await;
    let remote_path = &updates[0].path;
    assert!(updates.iter().all(|call| &call.path == remote_path));
    let remote_id = remote_path.trim_start_matches("posts/");
    let post = h.store.document("posts", remote_id).await.unwrap();
    assert_eq!(post["content"], json!("Seedlings available"));
    assert_eq!(post["likesCount"], json!(1));
    assert_eq!(post["likes"][0]["userId"], json!(USER_ID));
    assert_eq!(post["comments"].as_array().map(Vec::len), Some(1));

    let context = h.context.clone();
    let remote = remote_id.to_string();
    let settled = eventually(move || {
        let context = context.clone();
        let remote = remote.clone();
        async move {
            let state = context.local_state().await;
            state.post(&remote).is_some_and(|p| !p.pending) && state.posts().iter().all(|p| !p.pending)
        }
    })
    .await;
    assert!(settled);
    h.context.dispose().await;
}

#[tokio::test]
async fn test_concurrent_drains_replay_each_action_once() {
    let h = Harness::online().await;
    h.context.refresh_all().await;
    h.go_offline();
    assert_queued!(h.context.toggle_like("p1").await);
    assert_queued!(h.context.toggle_attendance("e1").await);
    assert_queued!(h.context.add_comment("p1", "Count me in").await);

    h.store.clear_calls().await;
    let mut events = h.context.subscribe();
    // The supervisor drains on reconnect while two more drains race it
    h.go_online();
    let (first, second) = tokio::join!(h.context.process_pending(), h.context.process_pending());
    h.wait_for_drain().await;
    assert!(first.completed + second.completed <= 3);

    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    let mut replayed = 0;
    while replayed < 3 {
        match tokio::time::timeout_at(deadline, events.recv()).await {
            Ok(Ok(event)) => {
                if let SyncEventKind::DrainFinished { completed, .. } = event.kind {
                    replayed += completed;
                }
            }
            Ok(Err(_)) | Err(_) => break,
        }
    }
    assert_eq!(replayed, 3);

    let writes: Vec<String> = h
        .store
        .calls_to("update")
        .await
        .into_iter()
        .map(|call| call.path)
        .collect();
    assert_eq!(writes, ["posts/p1", "events/e1", "posts/p1"]);

    let post = h.store.document("posts", "p1").await.unwrap();
    assert_eq!(post["likesCount"], json!(1));
    assert_eq!(post["commentsCount"], json!(1));
    let event = h.store.document("events", "e1").await.unwrap();
    assert_eq!(event["attendeesCount"], json!(1));
    h.context.dispose().await;
}

#[tokio::test]
async fn test_action_queued_behind_running_creation_is_replayed_online() {
    let store = seeded_store().await;
    let storage: Arc<dyn DurableStorage> = Arc::new(MemoryStorage::new());
    let context = SyncContext::builder(
        fast_config(),
        storage.clone(),
        store.clone(),
        Arc::new(StaticIdentity::signed_in(session())),
    )
    .executor(Arc::new(SlowCreates {
        inner: DocumentActionExecutor::new(store.clone(), USER_ID),
    }))
    .build()
    .unwrap();
    assert_ok!(context.init().await);
    let h = Harness {
        context,
        store,
        storage,
    };

    h.context.refresh_all().await;
    h.go_offline();
    assert_queued!(h.context.create_post("Spare bike pump", None).await);
    let local_id = h.context.local_state().await.posts()[0].id.clone();

    h.go_online();
    // Give the reconnect drain time to start on the creation
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_queued!(h.context.toggle_like(&local_id).await);
    assert!(h.context.is_online());

    h.wait_for_drain().await;
    let remote_id = local_id.trim_start_matches("local-");
    let post = h.store.document("posts", remote_id).await.unwrap();
    assert_eq!(post["likesCount"], json!(1));
    assert_eq!(post["likes"][0]["userId"], json!(USER_ID));

    let context = h.context.clone();
    let remote = remote_id.to_string();
    let settled = eventually(move || {
        let context = context.clone();
        let remote = remote.clone();
        async move {
            let state = context.local_state().await;
            state.post(&remote).is_some_and(|p| p.is_liked && !p.pending)
        }
    })
    .await;
    assert!(settled);
    h.context.dispose().await;
}

#[tokio::test]
async fn test_write_failing_transiently_is_queued_and_replayed() {
    let h = Harness::online().await;
    assert_ok!(h.context.fetch_posts().await);

    // The platform still believes it is online
    h.store.set_reachable(false);
    assert_queued!(h.context.toggle_like("p1").await);
    assert!(!h.context.is_online());
    assert!(h.context.local_state().await.post("p1").unwrap().is_liked);
    assert_eq!(h.context.pending_count().await, 1);

    h.store.set_reachable(true);
    h.wait_for_drain().await;
    let post = h.store.document("posts", "p1").await.unwrap();
    assert_eq!(post["likesCount"], json!(1));
    assert_eq!(h.store.calls_to("update").await.len(), 1);
    h.context.dispose().await;
}

#[tokio::test]
async fn test_scheduler_reconnects_when_service_returns() {
    let store = seeded_store().await;
    store.set_reachable(false);
    let h = Harness::with(store, Arc::new(MemoryStorage::new()), false).await;
    let mut events = h.context.subscribe();

    let scheduled = wait_for_event(&mut events, |kind| {
        matches!(kind, SyncEventKind::ReconnectScheduled { attempt, .. } if *attempt >= 1)
    })
    .await;
    assert!(scheduled);
    assert!(!h.context.is_online());

    h.store.set_reachable(true);
    let reconnected = wait_for_event(&mut events, |kind| *kind == SyncEventKind::Reconnected).await;
    assert!(reconnected);
    assert!(h.context.is_online());

    let context = h.context.clone();
    let reset = eventually(move || {
        let context = context.clone();
        async move { context.sync_status().await.reconnection.attempt == 0 }
    })
    .await;
    assert!(reset);
    h.context.dispose().await;
}

#[tokio::test]
async fn test_retry_now_reconnects_immediately() {
    let store = seeded_store().await;
    store.set_reachable(false);
    let h = Harness::with(store, Arc::new(MemoryStorage::new()), false).await;

    assert!(!assert_ok!(h.context.retry_now().await));
    h.store.set_reachable(true);
    assert!(assert_ok!(h.context.retry_now().await));
    assert!(h.context.is_online());
    h.context.dispose().await;
}

#[tokio::test]
async fn test_replay_drops_action_the_service_rejects() {
    let h = Harness::online().await;
    assert_ok!(h.context.fetch_posts().await);

    // The post disappears remotely before the like is replayed
    assert_ok!(h.store.delete_document("posts", "p1").await);
    h.go_offline();
    assert_queued!(h.context.toggle_like("p1").await);

    let mut events = h.context.subscribe();
    h.go_online();
    let finished = wait_for_event(&mut events, |kind| {
        matches!(kind, SyncEventKind::DrainFinished { discarded: 1, .. })
    })
    .await;
    assert!(finished);
    assert_eq!(h.context.pending_count().await, 0);
    assert!(h.store.document("posts", "p1").await.is_none());
    assert!(h.store.calls_to("update").await.is_empty());
    h.context.dispose().await;
}
