//! Durable state across restarts, backed by a SQLite file

use crate::common::{seeded_store, Harness, USER_ID};
use crate::{assert_ok, assert_queued};
use community_sync::client::local_db::{DurableStorage, LocalDatabase};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use tempfile::TempDir;

async fn open(dir: &TempDir) -> Arc<dyn DurableStorage> {
    Arc::new(assert_ok!(LocalDatabase::open(dir.path().join("local.db")).await))
}

#[tokio::test]
async fn test_queued_actions_survive_restart() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store().await;

    let first = Harness::with(store.clone(), open(&dir).await, true).await;
    assert_ok!(first.context.fetch_posts().await);
    first.go_offline();
    assert_queued!(first.context.toggle_like("p1").await);
    first.context.dispose().await;

    let persisted = assert_ok!(first.storage.get_item("dashboard_pendingActions").await);
    assert!(persisted.is_some_and(|raw| raw.contains("p1")));
    assert!(store.calls_to("update").await.is_empty());

    // A fresh context over the same file replays the like during init
    store.set_reachable(true);
    let second = Harness::with(store.clone(), open(&dir).await, true).await;
    assert_eq!(second.context.pending_count().await, 0);

    let post = store.document("posts", "p1").await.unwrap();
    assert_eq!(post["likesCount"], json!(1));
    assert_eq!(post["likes"][0]["userId"], json!(USER_ID));
    second.context.dispose().await;
}

#[tokio::test]
async fn test_cache_serves_reads_after_offline_restart() {
    let dir = TempDir::new().unwrap();
    let store = seeded_store().await;

    let first = Harness::with(store.clone(), open(&dir).await, true).await;
    let report = first.context.refresh_all().await;
    assert!(report.is_complete());
    first.context.dispose().await;

    store.set_reachable(false);
    let second = Harness::with(store.clone(), open(&dir).await, false).await;

    // Seeded from the cache before any read
    let state = second.context.local_state().await;
    assert_eq!(state.posts().len(), 1);
    assert_eq!(state.events()[0].id, "e1");

    let posts = assert_ok!(second.context.fetch_posts().await);
    assert_eq!(posts[0].id, "p1");
    assert!(second.context.sync_status().await.last_sync.is_some());
    second.context.dispose().await;
}
