//! The sync context over the HTTP document store, against a mock service

use crate::assert_ok;
use crate::common::{fast_config, session};
use community_sync::client::local_db::MemoryStorage;
use community_sync::client::remote::{HttpDocumentStore, StaticIdentity};
use community_sync::client::sync::SyncContext;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

async fn context(server: &MockServer) -> SyncContext {
    let store = assert_ok!(HttpDocumentStore::new(server.uri()));
    let context = SyncContext::builder(
        fast_config(),
        Arc::new(MemoryStorage::new()),
        Arc::new(store),
        Arc::new(StaticIdentity::signed_in(session())),
    )
    .build()
    .unwrap();
    assert_ok!(context.init().await);
    context
}

async fn mount_feed(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/v1/query"))
        .and(body_partial_json(json!({"collection": "posts"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"id": "p1", "data": {
                "authorId": "u2",
                "content": "Garden day on Saturday",
                "createdAt": "2024-05-01T09:00:00Z"
            }}
        ])))
        .mount(server)
        .await;
}

#[tokio::test]
async fn test_like_reads_then_patches_post() {
    let server = MockServer::start().await;
    mount_feed(&server).await;
    Mock::given(method("GET"))
        .and(path("/v1/posts/p1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "authorId": "u2",
            "createdAt": "2024-05-01T09:00:00Z",
            "likes": [],
            "likesCount": 0
        })))
        .expect(1)
        .mount(&server)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/v1/posts/p1"))
        .respond_with(ResponseTemplate::new(204))
        .expect(1)
        .mount(&server)
        .await;

    let context = context(&server).await;
    let posts = assert_ok!(context.fetch_posts().await);
    assert_eq!(posts.len(), 1);

    let outcome = assert_ok!(context.toggle_like("p1").await);
    assert!(!outcome.is_pending());
    assert!(context.local_state().await.post("p1").unwrap().is_liked);
    context.dispose().await;
}

#[tokio::test]
async fn test_unavailable_service_falls_back_to_cache() {
    let server = MockServer::start().await;
    mount_feed(&server).await;

    let context = context(&server).await;
    assert_ok!(context.fetch_posts().await);

    server.reset().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(503))
        .mount(&server)
        .await;

    let posts = assert_ok!(context.fetch_posts().await);
    assert_eq!(posts[0].id, "p1");
    assert!(!context.is_online());
    context.dispose().await;
}
