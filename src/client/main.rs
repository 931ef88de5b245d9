/**
 * Offline Demo Entry Point
 *
 * Runs the sync core against an in-process document service and walks through
 * a disconnection: actions taken offline are queued, shown in the banner and
 * replayed once the service is reachable again.
 */
use community_sync::client::config::Config;
use community_sync::client::dashboard::DashboardController;
use community_sync::client::local_db::{DurableStorage, LocalDatabase, MemoryStorage};
use community_sync::client::remote::{MemoryBlobStore, MemoryDocumentStore, Session, StaticIdentity};
use community_sync::client::sync::{NetworkSignal, SyncContext};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

async fn seed(store: &MemoryDocumentStore) -> Result<(), Box<dyn std::error::Error>> {
    store
        .insert(
            "users",
            "demo-user",
            &json!({"uid": "demo-user", "firstName": "Demo", "lastName": "Member"}),
        )
        .await?;
    store
        .insert(
            "users",
            "neighbor",
            &json!({"uid": "neighbor", "firstName": "Nia", "lastName": "Okafor", "headline": "Gardener"}),
        )
        .await?;
    store
        .insert(
            "posts",
            "welcome",
            &json!({
                "authorId": "neighbor",
                "authorName": "Nia Okafor",
                "content": "Community garden opens on Saturday!",
                "createdAt": "2024-05-01T09:00:00Z"
            }),
        )
        .await?;
    Ok(())
}

async fn print_state(dashboard: &mut DashboardController) {
    dashboard.pump_events().await;
    let status = dashboard.status().await;
    println!("  status:  {}", status.describe());
    for banner in dashboard.banners() {
        println!("  banner:  {}", banner.text());
    }
    for post in dashboard.posts().await {
        println!(
            "  post:    [{}] {} (likes: {}{})",
            post.id,
            post.content,
            post.likes_count,
            if post.pending { ", pending" } else { "" }
        );
    }
    if let Some(notice) = dashboard.take_notice() {
        println!("  notice:  {}", notice);
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(&env_filter))
        .init();

    let config = Config::from_env()?;
    let storage: Arc<dyn DurableStorage> = match config.database_path() {
        Some(path) => {
            tracing::info!(path = %path.display(), "using SQLite storage");
            Arc::new(LocalDatabase::open(path).await?)
        }
        None => Arc::new(MemoryStorage::new()),
    };

    let store = Arc::new(MemoryDocumentStore::new());
    seed(&store).await?;
    let identity = Arc::new(StaticIdentity::signed_in(Session {
        uid: "demo-user".to_string(),
        email: "demo@example.com".to_string(),
        display_name: Some("Demo Member".to_string()),
    }));

    let context = SyncContext::builder(config.sync().clone(), storage, store.clone(), identity)
        .blob_store(Arc::new(MemoryBlobStore::new()))
        .build()?;
    context.init().await?;

    let mut dashboard = DashboardController::new(context.clone());
    dashboard.load().await;
    println!("Loaded dashboard:");
    print_state(&mut dashboard).await;

    println!("\nConnection lost:");
    store.set_reachable(false);
    context.report_network(NetworkSignal::PlatformOffline);
    tokio::time::sleep(Duration::from_millis(50)).await;

    dashboard.toggle_like("welcome").await;
    dashboard.open_create_post();
    dashboard.create_post.content = "Bringing tomato seedlings".to_string();
    dashboard.submit_post().await;
    print_state(&mut dashboard).await;

    println!("\nConnection restored:");
    store.set_reachable(true);
    context.report_network(NetworkSignal::PlatformOnline);
    // Give the supervisor time to drain the queue and refresh
    tokio::time::sleep(Duration::from_millis(500)).await;
    print_state(&mut dashboard).await;

    println!("\nRemote posts: {}", store.count("posts").await);
    dashboard.sign_out().await;
    Ok(())
}
