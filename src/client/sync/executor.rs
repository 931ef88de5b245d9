//! Action execution against the document service
//!
//! Translates each [`Action`] into document-store calls. The same executor
//! serves online mutations and queue replay, so an action behaves the same
//! whether it was sent immediately or hours later.
//!
//! Every action is idempotent: likes and RSVPs carry the state they end in,
//! comments are matched by id and created documents take an id chosen on the
//! client. Running an action again after a lost reply changes nothing.

use crate::client::offline::optimistic::ActionReceipt;
use crate::client::offline::queue::Action;
use crate::client::remote::DocumentStore;
use crate::shared::document::{to_document, Document, FieldUpdate, FieldUpdates};
use crate::shared::error::RemoteError;
use async_trait::async_trait;
use chrono::Utc;
use serde_json::{json, Value};
use std::fmt::Debug;
use std::sync::Arc;

/// Sends actions to the remote service
#[async_trait]
pub trait ActionExecutor: Send + Sync + Debug {
    async fn execute(&self, action: &Action) -> Result<ActionReceipt, RemoteError>;
}

/// Remote document id for the local placeholder `local_id`
pub fn remote_id_for(local_id: &str) -> &str {
    local_id.strip_prefix("local-").unwrap_or(local_id)
}

/// Executor writing to the `posts`, `events` and `connections` collections
#[derive(Debug, Clone)]
pub struct DocumentActionExecutor {
    store: Arc<dyn DocumentStore>,
    user_id: String,
}

impl DocumentActionExecutor {
    pub fn new(store: Arc<dyn DocumentStore>, user_id: impl Into<String>) -> Self {
        Self {
            store,
            user_id: user_id.into(),
        }
    }

    /// Make the member's entry in the `list` array of a document present or
    /// absent, keeping `counter` in step. Reads the remote document first and
    /// writes nothing when it already matches.
    async fn set_membership(
        &self,
        collection: &str,
        id: &str,
        list: &str,
        counter: &str,
        member: bool,
    ) -> Result<(), RemoteError> {
        let snapshot = self
            .store
            .get_document(collection, id)
            .await?
            .ok_or_else(|| RemoteError::not_found(collection, id))?;

        let entries: Vec<Value> = snapshot
            .data
            .get(list)
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        let is_member = entries
            .iter()
            .any(|entry| entry.get("userId").and_then(Value::as_str) == Some(self.user_id.as_str()));
        if is_member == member {
            tracing::debug!(%collection, %id, member, "membership already applied");
            return Ok(());
        }

        let mut updates = FieldUpdates::new();
        if is_member {
            let remaining: Vec<Value> = entries
                .into_iter()
                .filter(|entry| entry.get("userId").and_then(Value::as_str) != Some(self.user_id.as_str()))
                .collect();
            updates.insert(list.to_string(), FieldUpdate::Set(Value::Array(remaining)));
            updates.insert(counter.to_string(), FieldUpdate::Increment(-1));
        } else {
            updates.insert(
                list.to_string(),
                FieldUpdate::ArrayUnion(vec![json!({
                    "userId": self.user_id,
                    "timestamp": Utc::now().to_rfc3339(),
                })]),
            );
            updates.insert(counter.to_string(), FieldUpdate::Increment(1));
        }
        self.store.update_document(collection, id, updates).await
    }

    /// Write `data` as `collection/{id}` unless a document already holds that id
    async fn create_once(
        &self,
        collection: &str,
        local_id: &str,
        data: Document,
    ) -> Result<ActionReceipt, RemoteError> {
        let remote_id = remote_id_for(local_id);
        if self.store.get_document(collection, remote_id).await?.is_some() {
            tracing::debug!(%collection, %remote_id, "document already created");
        } else {
            self.store
                .set_document(collection, remote_id, data, false)
                .await?;
            tracing::debug!(%collection, %local_id, %remote_id, "document created");
        }
        Ok(ActionReceipt::Created {
            local_id: local_id.to_string(),
            remote_id: remote_id.to_string(),
        })
    }
}

#[async_trait]
impl ActionExecutor for DocumentActionExecutor {
    async fn execute(&self, action: &Action) -> Result<ActionReceipt, RemoteError> {
        match action {
            Action::CreatePost { local_id, post } => {
                let now = Value::String(Utc::now().to_rfc3339());
                let mut data = to_document(post)?;
                data.insert("createdAt".into(), now.clone());
                data.insert("updatedAt".into(), now);
                data.insert("likes".into(), json!([]));
                data.insert("comments".into(), json!([]));
                data.insert("likesCount".into(), json!(0));
                data.insert("commentsCount".into(), json!(0));
                self.create_once("posts", local_id, data).await
            }
            Action::LikePost { post_id, liked } => {
                self.set_membership("posts", post_id, "likes", "likesCount", *liked)
                    .await?;
                Ok(ActionReceipt::Applied)
            }
            Action::AddComment { post_id, comment } => {
                let snapshot = self
                    .store
                    .get_document("posts", post_id)
                    .await?
                    .ok_or_else(|| RemoteError::not_found("posts", post_id))?;
                let posted = snapshot
                    .data
                    .get("comments")
                    .and_then(Value::as_array)
                    .is_some_and(|comments| {
                        comments
                            .iter()
                            .any(|c| c.get("id").and_then(Value::as_str) == Some(comment.id.as_str()))
                    });
                if posted {
                    tracing::debug!(%post_id, comment_id = %comment.id, "comment already posted");
                    return Ok(ActionReceipt::Applied);
                }

                let mut updates = FieldUpdates::new();
                updates.insert(
                    "comments".into(),
                    FieldUpdate::ArrayUnion(vec![Value::Object(to_document(comment)?)]),
                );
                updates.insert("commentsCount".into(), FieldUpdate::Increment(1));
                self.store.update_document("posts", post_id, updates).await?;
                Ok(ActionReceipt::Applied)
            }
            Action::AttendEvent { event_id, attending } => {
                self.set_membership("events", event_id, "attendees", "attendeesCount", *attending)
                    .await?;
                Ok(ActionReceipt::Applied)
            }
            Action::ConnectUser {
                user_id,
                connection,
            } => {
                let data = to_document(&json!({
                    "userId": self.user_id,
                    "connectedUserId": user_id,
                    "status": connection.status,
                    "createdAt": Utc::now().to_rfc3339(),
                }))?;
                self.create_once("connections", &connection.id, data).await
            }
            Action::DeletePost { post_id } => match self.store.delete_document("posts", post_id).await {
                Ok(()) | Err(RemoteError::NotFound { .. }) => Ok(ActionReceipt::Applied),
                Err(error) => Err(error),
            },
        }
    }
}
