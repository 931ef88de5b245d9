//! Offline behaviour: queued writes, cache fallback and local rollback

use crate::common::{seeded_store, Harness, USER_ID};
use crate::{assert_err, assert_ok, assert_queued};
use assert_matches::assert_matches;
use community_sync::client::local_db::MemoryStorage;
use community_sync::client::offline::ActionReceipt;
use community_sync::client::sync::MutationOutcome;
use community_sync::shared::{Category, RemoteError, SyncError, SyncEventKind};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

#[tokio::test]
async fn test_offline_like_is_queued_and_visible() {
    let h = Harness::online().await;
    assert_ok!(h.context.fetch_posts().await);
    h.go_offline();

    assert_queued!(h.context.toggle_like("p1").await);

    let state = h.context.local_state().await;
    let post = state.post("p1").unwrap();
    assert!(post.is_liked);
    assert_eq!(post.likes_count, 1);

    let status = h.context.sync_status().await;
    assert_eq!(status.pending_actions, 1);
    assert_eq!(
        status.describe(),
        "You are offline. 1 change will sync when you reconnect"
    );
    assert!(h.store.calls_to("update").await.is_empty());
    h.context.dispose().await;
}

#[tokio::test]
async fn test_cached_posts_served_when_service_unreachable() {
    let h = Harness::online().await;
    let fresh = assert_ok!(h.context.fetch_posts().await);
    assert_eq!(fresh.len(), 1);

    let mut events = h.context.subscribe();
    // The platform still believes it is online
    h.store.set_reachable(false);

    let cached = assert_ok!(h.context.fetch_posts().await);
    assert_eq!(cached[0].id, "p1");
    assert!(!h.context.is_online());

    let mut served = false;
    while let Ok(event) = events.try_recv() {
        if event.kind == (SyncEventKind::ServedFromCache { category: Category::Posts }) {
            served = true;
        }
    }
    assert!(served);
    h.context.dispose().await;
}

#[tokio::test]
async fn test_offline_read_without_cache_fails() {
    let store = seeded_store().await;
    store.set_reachable(false);
    let h = Harness::with(store, Arc::new(MemoryStorage::new()), false).await;

    let result = h.context.fetch_events().await;
    assert_matches!(
        result,
        Err(SyncError::NoCachedData {
            category: Category::Events,
            ..
        })
    );
    assert!(h.store.calls().await.is_empty());
    h.context.dispose().await;
}

#[tokio::test]
async fn test_deleting_unsynced_post_withdraws_it() {
    let h = Harness::online().await;
    h.context.refresh_all().await;
    h.go_offline();

    assert_queued!(h.context.create_post("Tomato seedlings", None).await);
    let local_id = h
        .context
        .local_state()
        .await
        .posts()
        .iter()
        .find(|p| p.pending)
        .map(|p| p.id.clone())
        .unwrap();
    assert_queued!(h.context.toggle_like(&local_id).await);

    let outcome = assert_ok!(h.context.delete_post(&local_id).await);
    assert_eq!(outcome, MutationOutcome::Withdrawn { discarded: 2 });
    assert_eq!(h.context.pending_count().await, 0);
    assert!(h.context.local_state().await.post(&local_id).is_none());

    let mut events = h.context.subscribe();
    h.go_online();
    let refreshed = crate::common::wait_for_event(&mut events, |kind| {
        *kind == SyncEventKind::Refreshed { category: Category::Recommendations }
    })
    .await;
    assert!(refreshed);
    assert!(h.store.calls_to("set").await.is_empty());
    assert_eq!(h.store.count("posts").await, 1);
    h.context.dispose().await;
}

#[tokio::test]
async fn test_clear_pending_reverts_local_changes() {
    let h = Harness::online().await;
    h.context.refresh_all().await;
    h.go_offline();

    assert_queued!(h.context.toggle_like("p1").await);
    assert_queued!(h.context.toggle_attendance("e1").await);
    assert_eq!(assert_ok!(h.context.clear_pending().await), 2);

    let state = h.context.local_state().await;
    assert!(!state.post("p1").unwrap().is_liked);
    assert!(!state.event("e1").unwrap().is_attending);
    assert_eq!(h.context.pending_count().await, 0);
    h.context.dispose().await;
}

#[tokio::test]
async fn test_rejected_write_rolls_back() {
    let h = Harness::online().await;
    assert_ok!(h.context.fetch_posts().await);
    h.store
        .fail_next(RemoteError::permission_denied("rules"))
        .await;

    assert_err!(
        h.context.toggle_like("p1").await,
        SyncError::Remote(RemoteError::PermissionDenied { .. })
    );
    let state = h.context.local_state().await;
    assert!(!state.post("p1").unwrap().liked_by(USER_ID));
    assert!(h.context.is_online());
    h.context.dispose().await;
}

#[tokio::test]
async fn test_like_with_lost_reply_lands_once() {
    let h = Harness::online().await;
    assert_ok!(h.context.fetch_posts().await);
    h.store
        .lose_next_reply(RemoteError::unavailable("reply lost"))
        .await;

    let outcome = assert_ok!(h.context.toggle_like("p1").await);
    assert_eq!(outcome, MutationOutcome::Confirmed(ActionReceipt::Applied));

    let post = h.store.document("posts", "p1").await.unwrap();
    assert_eq!(post["likesCount"], json!(1));
    assert_eq!(post["likes"].as_array().map(Vec::len), Some(1));
    assert!(h.context.local_state().await.post("p1").unwrap().is_liked);
    assert!(h.context.is_online());
    h.context.dispose().await;
}

#[tokio::test]
async fn test_post_with_lost_reply_is_created_once() {
    let h = Harness::online().await;
    assert_ok!(h.context.fetch_posts().await);
    h.store
        .lose_next_reply(RemoteError::unavailable("reply lost"))
        .await;

    let outcome = assert_ok!(h.context.create_post("Only once", None).await);
    assert_matches!(outcome, MutationOutcome::Confirmed(ActionReceipt::Created { .. }));
    assert_eq!(h.store.count("posts").await, 2);
    assert_eq!(h.context.local_state().await.posts().len(), 2);
    h.context.dispose().await;
}

#[tokio::test]
async fn test_disposed_context_rejects_work() {
    let h = Harness::online().await;
    h.context.dispose().await;
    assert_err!(h.context.fetch_posts().await, SyncError::Disposed);
    assert_err!(h.context.toggle_like("p1").await, SyncError::Disposed);
}
