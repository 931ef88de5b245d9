//! Remote reads behind the dashboard categories
//!
//! Each loader performs the queries for one category and decodes the
//! documents into models, computing the per-member flags (`is_liked`,
//! `is_attending`). Malformed documents are skipped with a warning so one bad
//! record never hides the rest of the feed.

use crate::client::remote::{DocumentStore, RemoteResult, Session};
use crate::shared::document::{to_document, Direction, DocumentSnapshot, FilterOp, Query};
use crate::shared::models::{Connection, Event, MemberCard, Post, Recommendation, UserProfile};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::HashSet;

/// Feed page size
pub const POSTS_LIMIT: usize = 20;
/// Upcoming events shown
pub const EVENTS_LIMIT: usize = 10;
/// Recommendations shown
pub const RECOMMENDATIONS_LIMIT: usize = 10;

fn decode_all<T: DeserializeOwned>(snapshots: &[DocumentSnapshot]) -> Vec<T> {
    snapshots
        .iter()
        .filter_map(|snapshot| match snapshot.decode::<T>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(id = %snapshot.id, error = %e, "skipping malformed document");
                None
            }
        })
        .collect()
}

/// The member's profile; a basic profile document is created when none exists
pub async fn load_profile(store: &dyn DocumentStore, session: &Session) -> RemoteResult<UserProfile> {
    if let Some(mut snapshot) = store.get_document("users", &session.uid).await? {
        snapshot
            .data
            .entry("uid".to_string())
            .or_insert_with(|| Value::String(session.uid.clone()));
        return snapshot.decode();
    }

    let profile = UserProfile::basic(&session.uid, &session.email, session.display_name.as_deref());
    let mut data = to_document(&profile)?;
    data.insert(
        "createdAt".to_string(),
        Value::String(Utc::now().to_rfc3339()),
    );
    store.set_document("users", &session.uid, data, false).await?;
    tracing::info!(uid = %session.uid, "created basic profile");
    Ok(profile)
}

/// Newest posts, with `is_liked` for `user_id`
pub async fn load_posts(store: &dyn DocumentStore, user_id: &str) -> RemoteResult<Vec<Post>> {
    let query = Query::collection("posts")
        .order_by("createdAt", Direction::Desc)
        .limit(POSTS_LIMIT);
    let snapshots = store.query_collection(&query).await?;

    Ok(decode_all::<Post>(&snapshots)
        .into_iter()
        .map(|mut post| {
            post.is_liked = post.liked_by(user_id);
            post.pending = false;
            post
        })
        .collect())
}

/// Upcoming events after `now`, soonest first, with `is_attending` for `user_id`
pub async fn load_events(
    store: &dyn DocumentStore,
    user_id: &str,
    now: DateTime<Utc>,
) -> RemoteResult<Vec<Event>> {
    let query = Query::collection("events")
        .filter(
            "eventDate",
            FilterOp::Gte,
            now.to_rfc3339_opts(SecondsFormat::Secs, true),
        )
        .order_by("eventDate", Direction::Asc)
        .limit(EVENTS_LIMIT);
    let snapshots = store.query_collection(&query).await?;

    Ok(decode_all::<Event>(&snapshots)
        .into_iter()
        .map(|mut event| {
            event.is_attending = event.attendees.iter().any(|a| a.user_id == user_id);
            event.pending = false;
            event
        })
        .collect())
}

/// Connections of `user_id`, each with the other member's card when available
pub async fn load_connections(store: &dyn DocumentStore, user_id: &str) -> RemoteResult<Vec<Connection>> {
    let query = Query::collection("connections").filter("userId", FilterOp::Eq, user_id);
    let snapshots = store.query_collection(&query).await?;

    let mut connections = decode_all::<Connection>(&snapshots);
    for connection in &mut connections {
        connection.pending = false;
        if connection.user.is_none() {
            connection.user = store
                .get_document("users", &connection.connected_user_id)
                .await?
                .and_then(|snapshot| snapshot.decode::<MemberCard>().ok());
        }
    }
    Ok(connections)
}

/// Other members not yet connected with `user_id`
pub async fn load_recommendations(
    store: &dyn DocumentStore,
    user_id: &str,
    connected: &HashSet<String>,
) -> RemoteResult<Vec<Recommendation>> {
    // Over-fetch so filtering still leaves a full list
    let limit = RECOMMENDATIONS_LIMIT + connected.len() + 1;
    let snapshots = store
        .query_collection(&Query::collection("users").limit(limit))
        .await?;

    let candidates: Vec<DocumentSnapshot> = snapshots
        .into_iter()
        .filter(|s| s.id != user_id && !connected.contains(&s.id))
        .map(|mut s| {
            // Profiles carry their own `uid`; the recommendation id is the document id
            s.data.insert("id".to_string(), Value::String(s.id.clone()));
            s
        })
        .collect();

    let mut recommendations = decode_all::<Recommendation>(&candidates);
    recommendations.truncate(RECOMMENDATIONS_LIMIT);
    Ok(recommendations)
}
