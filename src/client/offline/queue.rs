//! # Pending Action Queue
//!
//! Ordered queue of writes performed while offline, replayed once
//! connectivity returns.
//!
//! ## Features
//!
//! - **Strict Ordering**: a drain hands actions to the handler one at a time, in enqueue order
//! - **Serialized Drains**: concurrent drains never duplicate or drop an action
//! - **Re-queue on Failure**: actions the handler asks to retry go back to the live queue
//! - **Persistent Queue**: best-effort copy in durable storage, restored at startup
//!
//! ## Usage
//!
//! ```rust,no_run
//! use community_sync::client::offline::queue::{Action, DrainDecision, PendingActionQueue};
//!
//! # async fn example() {
//! let queue = PendingActionQueue::new();
//! queue.enqueue(Action::LikePost { post_id: "p1".to_string(), liked: true }).await;
//!
//! let report = queue
//!     .drain(|pending| async move {
//!         // Execute pending.action against the remote service...
//!         DrainDecision::Completed
//!     })
//!     .await;
//! assert_eq!(report.completed, 1);
//! # }
//! ```

use crate::client::local_db::DurableStorage;
use crate::shared::models::{Comment, Connection, NewPost};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

/// A write the user performed, with its typed payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "snake_case")]
pub enum Action {
    /// Publish a post; `local_id` identifies the optimistic copy
    CreatePost { local_id: String, post: NewPost },
    /// Like (`liked`) or unlike a post as the signed-in member
    LikePost { post_id: String, liked: bool },
    /// Append a comment to a post
    AddComment { post_id: String, comment: Comment },
    /// Attend (`attending`) or stop attending an event
    AttendEvent { event_id: String, attending: bool },
    /// Request a connection with another member
    ConnectUser { user_id: String, connection: Connection },
    /// Delete one of the signed-in member's posts
    DeletePost { post_id: String },
}

/// Discriminant of an [`Action`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    CreatePost,
    LikePost,
    AddComment,
    AttendEvent,
    ConnectUser,
    DeletePost,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::CreatePost => "create_post",
            ActionKind::LikePost => "like_post",
            ActionKind::AddComment => "add_comment",
            ActionKind::AttendEvent => "attend_event",
            ActionKind::ConnectUser => "connect_user",
            ActionKind::DeletePost => "delete_post",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity an action operates on
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Target {
    Post(String),
    Event(String),
    User(String),
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::CreatePost { .. } => ActionKind::CreatePost,
            Action::LikePost { .. } => ActionKind::LikePost,
            Action::AddComment { .. } => ActionKind::AddComment,
            Action::AttendEvent { .. } => ActionKind::AttendEvent,
            Action::ConnectUser { .. } => ActionKind::ConnectUser,
            Action::DeletePost { .. } => ActionKind::DeletePost,
        }
    }

    /// Entity the action operates on
    pub fn target(&self) -> Target {
        match self {
            Action::CreatePost { local_id, .. } => Target::Post(local_id.clone()),
            Action::LikePost { post_id, .. }
            | Action::AddComment { post_id, .. }
            | Action::DeletePost { post_id } => Target::Post(post_id.clone()),
            Action::AttendEvent { event_id, .. } => Target::Event(event_id.clone()),
            Action::ConnectUser { user_id, .. } => Target::User(user_id.clone()),
        }
    }

    /// Whether the action references the post `post_id`
    pub fn touches_post(&self, post_id: &str) -> bool {
        matches!(self.target(), Target::Post(id) if id == post_id)
    }

    /// Point every reference to post `from` at post `to`.
    /// Returns whether anything changed.
    pub fn retarget_post(&mut self, from: &str, to: &str) -> bool {
        match self {
            Action::LikePost { post_id, .. }
            | Action::AddComment { post_id, .. }
            | Action::DeletePost { post_id }
                if post_id.as_str() == from =>
            {
                *post_id = to.to_string();
                true
            }
            _ => false,
        }
    }
}

/// An action waiting for replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingAction {
    pub id: Uuid,
    pub action: Action,
    pub enqueued_at: DateTime<Utc>,
    /// Drains that tried this action and asked for a retry
    #[serde(default)]
    pub attempts: u32,
}

impl PendingAction {
    pub fn new(action: Action) -> Self {
        Self {
            id: Uuid::new_v4(),
            action,
            enqueued_at: Utc::now(),
            attempts: 0,
        }
    }
}

/// Outcome a drain handler reports for one action
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainDecision {
    /// The action reached the remote service; drop it
    Completed,
    /// The action was sent and failed; re-append it to the live queue
    Retry,
    /// The action was not attempted; re-append it unchanged
    Defer,
    /// The action can never succeed; drop it without sending
    Discard,
}

/// Counters of one drain cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrainReport {
    pub processed: usize,
    pub completed: usize,
    pub retried: usize,
    pub discarded: usize,
    pub deferred: usize,
}

impl DrainReport {
    /// Whether any action left the queue
    pub fn made_progress(&self) -> bool {
        self.completed + self.discarded > 0
    }

    /// Add the counters of a later pass
    pub fn merge(&mut self, other: DrainReport) {
        self.processed += other.processed;
        self.completed += other.completed;
        self.retried += other.retried;
        self.discarded += other.discarded;
        self.deferred += other.deferred;
    }
}

/// FIFO queue of pending actions
#[derive(Debug, Default)]
pub struct PendingActionQueue {
    /// Actions waiting for the next drain
    actions: RwLock<VecDeque<PendingAction>>,
    /// Actions taken by the running drain and not handled yet
    in_flight: RwLock<VecDeque<PendingAction>>,
    drain_lock: Mutex<()>,
    persistence: Option<Persistence>,
}

#[derive(Debug)]
struct Persistence {
    storage: Arc<dyn DurableStorage>,
    key: String,
}

impl PendingActionQueue {
    /// In-memory queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue mirrored to `storage` under `key`
    pub fn persistent(storage: Arc<dyn DurableStorage>, key: impl Into<String>) -> Self {
        Self {
            persistence: Some(Persistence {
                storage,
                key: key.into(),
            }),
            ..Self::default()
        }
    }

    /// Append `action`, stamped with the current time
    pub async fn enqueue(&self, action: Action) -> Uuid {
        let pending = PendingAction::new(action);
        let id = pending.id;
        tracing::debug!(action_id = %id, kind = %pending.action.kind(), "action queued");

        self.actions.write().await.push_back(pending);
        self.persist().await;
        id
    }

    /// Hand every queued action to `handler`, one at a time and in order.
    ///
    /// The live queue is emptied up front so actions enqueued while the drain
    /// runs wait for the next drain. Drains are serialized: a second caller
    /// waits for the first to finish and then sees only what is left.
    pub async fn drain<F, Fut>(&self, mut handler: F) -> DrainReport
    where
        F: FnMut(PendingAction) -> Fut,
        Fut: Future<Output = DrainDecision>,
    {
        let _guard = self.drain_lock.lock().await;

        {
            let mut live = self.actions.write().await;
            let mut in_flight = self.in_flight.write().await;
            *in_flight = std::mem::take(&mut *live);
        }

        let mut report = DrainReport::default();
        loop {
            let next = self.in_flight.read().await.front().cloned();
            let Some(pending) = next else { break };

            let decision = handler(pending.clone()).await;
            report.processed += 1;

            self.in_flight.write().await.pop_front();
            match decision {
                DrainDecision::Completed => report.completed += 1,
                DrainDecision::Discard => {
                    tracing::info!(action_id = %pending.id, kind = %pending.action.kind(), "action discarded");
                    report.discarded += 1;
                }
                DrainDecision::Retry => {
                    let mut retry = pending;
                    retry.attempts += 1;
                    tracing::debug!(action_id = %retry.id, attempts = retry.attempts, "action re-queued");
                    self.actions.write().await.push_back(retry);
                    report.retried += 1;
                }
                DrainDecision::Defer => {
                    self.actions.write().await.push_back(pending);
                    report.deferred += 1;
                }
            }
            self.persist().await;
        }

        if report.processed > 0 {
            tracing::info!(
                completed = report.completed,
                retried = report.retried,
                discarded = report.discarded,
                deferred = report.deferred,
                "pending actions drained"
            );
        }
        report
    }

    /// Actions waiting, including those a running drain has not handled yet
    pub async fn size(&self) -> usize {
        self.actions.read().await.len() + self.in_flight.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.size().await == 0
    }

    /// Queued actions in replay order
    pub async fn snapshot(&self) -> Vec<PendingAction> {
        // Same lock order as `drain`
        let live = self.actions.read().await;
        let in_flight = self.in_flight.read().await;
        in_flight.iter().chain(live.iter()).cloned().collect()
    }

    /// Drop every waiting action and return them, oldest first
    pub async fn clear(&self) -> Vec<PendingAction> {
        let removed: Vec<_> = self.actions.write().await.drain(..).collect();
        self.persist().await;
        if !removed.is_empty() {
            tracing::info!(count = removed.len(), "pending actions cleared");
        }
        removed
    }

    /// Remove every waiting action matching `predicate` without sending it
    pub async fn discard_where<P>(&self, mut predicate: P) -> Vec<PendingAction>
    where
        P: FnMut(&PendingAction) -> bool,
    {
        let mut removed = Vec::new();
        {
            let mut live = self.actions.write().await;
            let mut kept = VecDeque::with_capacity(live.len());
            for pending in live.drain(..) {
                if predicate(&pending) {
                    removed.push(pending);
                } else {
                    kept.push_back(pending);
                }
            }
            *live = kept;
        }
        if !removed.is_empty() {
            self.persist().await;
        }
        removed
    }

    /// Rewrite every waiting action with `rewrite`
    pub async fn rewrite<R>(&self, mut rewrite: R)
    where
        R: FnMut(&mut Action) -> bool,
    {
        let changed = {
            let mut live = self.actions.write().await;
            live.iter_mut()
                .fold(false, |changed, pending| rewrite(&mut pending.action) || changed)
        };
        if changed {
            self.persist().await;
        }
    }

    /// Entities referenced by any waiting action
    pub async fn targets(&self) -> HashSet<Target> {
        self.snapshot()
            .await
            .iter()
            .map(|pending| pending.action.target())
            .collect()
    }

    /// Load the persisted queue, appending it after anything already queued.
    /// Returns the number of restored actions.
    pub async fn restore(&self) -> usize {
        let Some(persistence) = &self.persistence else {
            return 0;
        };

        let raw = match persistence.storage.get_item(&persistence.key).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return 0,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read persisted queue");
                return 0;
            }
        };

        let restored: Vec<PendingAction> = match serde_json::from_str(&raw) {
            Ok(actions) => actions,
            Err(e) => {
                tracing::warn!(error = %e, "ignoring corrupt persisted queue");
                return 0;
            }
        };

        let count = restored.len();
        {
            let mut live = self.actions.write().await;
            let known: HashSet<Uuid> = live.iter().map(|p| p.id).collect();
            live.extend(restored.into_iter().filter(|p| !known.contains(&p.id)));
        }
        tracing::info!(count, "restored pending actions");
        count
    }

    async fn persist(&self) {
        let Some(persistence) = &self.persistence else {
            return;
        };

        let actions = self.snapshot().await;
        let result = if actions.is_empty() {
            persistence.storage.remove_item(&persistence.key).await
        } else {
            match serde_json::to_string(&actions) {
                Ok(json) => persistence.storage.set_item(&persistence.key, &json).await,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to encode pending actions");
                    return;
                }
            }
        };

        if let Err(e) = result {
            tracing::warn!(error = %e, "failed to persist pending actions");
        }
    }
}
