//! # Optimistic Local State
//!
//! The dashboard's view of the community data: remote snapshots with the
//! effect of every not-yet-confirmed action applied on top.
//!
//! ## Features
//!
//! - **Immediate Updates**: actions change local state before the remote service confirms them
//! - **Rollback Support**: every applied action can be reverted exactly
//! - **Confirmation**: confirmed creations take their remote id; later actions follow through aliases
//! - **Rebase**: fresh remote lists are merged by replaying the still-queued actions on top
//!
//! ## Usage
//!
//! ```rust,no_run
//! use community_sync::client::offline::{Action, LocalState};
//!
//! let mut state = LocalState::new(Some("u1".to_string()));
//! let action = Action::LikePost { post_id: "p1".to_string(), liked: true };
//! if state.apply(&action) {
//!     // ...remote call failed
//!     state.rollback(&action);
//! }
//! ```

use crate::client::offline::queue::{Action, PendingAction};
use crate::shared::models::{
    Attendee, Connection, Event, Like, Post, Recommendation, UserProfile,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What the remote service reported for a confirmed action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionReceipt {
    /// A document was created; the local placeholder id maps to `remote_id`
    Created { local_id: String, remote_id: String },
    /// The action was applied to existing documents
    Applied,
}

/// Optimistic copy of the dashboard data
#[derive(Debug, Clone, Default)]
pub struct LocalState {
    user_id: Option<String>,
    profile: Option<UserProfile>,
    posts: Vec<Post>,
    events: Vec<Event>,
    connections: Vec<Connection>,
    recommendations: Vec<Recommendation>,
    /// Posts removed by a pending delete, with their former position
    deleted_posts: HashMap<String, (usize, Post)>,
    /// Recommendations hidden by a pending connection request
    hidden_recommendations: HashMap<String, (usize, Recommendation)>,
    /// Local placeholder id -> confirmed remote id
    aliases: HashMap<String, String>,
}

impl LocalState {
    /// Empty state for the signed-in member `user_id`
    pub fn new(user_id: Option<String>) -> Self {
        Self {
            user_id,
            ..Self::default()
        }
    }

    pub fn user_id(&self) -> Option<&str> {
        self.user_id.as_deref()
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        self.profile.as_ref()
    }

    pub fn posts(&self) -> &[Post] {
        &self.posts
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn recommendations(&self) -> &[Recommendation] {
        &self.recommendations
    }

    pub fn post(&self, post_id: &str) -> Option<&Post> {
        let post_id = self.resolve_id(post_id);
        self.posts.iter().find(|post| post.id == post_id)
    }

    pub fn event(&self, event_id: &str) -> Option<&Event> {
        self.events.iter().find(|event| event.id == event_id)
    }

    pub fn set_profile(&mut self, profile: UserProfile) {
        self.profile = Some(profile);
    }

    /// Replace the posts with `remote` and replay `pending` on top
    pub fn rebase_posts(&mut self, remote: Vec<Post>, pending: &[PendingAction]) {
        self.posts = remote;
        self.deleted_posts.clear();
        for queued in pending {
            let action = self.resolve(&queued.action);
            match &action {
                Action::CreatePost { .. }
                | Action::LikePost { .. }
                | Action::AddComment { .. }
                | Action::DeletePost { .. } => {
                    self.apply(&action);
                }
                Action::AttendEvent { .. } | Action::ConnectUser { .. } => {}
            }
        }
    }

    /// Replace the events with `remote` and replay `pending` on top
    pub fn rebase_events(&mut self, remote: Vec<Event>, pending: &[PendingAction]) {
        self.events = remote;
        for queued in pending {
            if let Action::AttendEvent { event_id, attending } = &queued.action {
                self.set_attendance(event_id, *attending);
            }
        }
    }

    /// Replace the connections with `remote` and replay `pending` on top
    pub fn rebase_connections(&mut self, remote: Vec<Connection>, pending: &[PendingAction]) {
        self.connections = remote;
        for queued in pending {
            if let Action::ConnectUser { connection, .. } = &queued.action {
                self.add_connection(connection);
            }
        }
    }

    /// Replace the recommendations with `remote` and replay `pending` on top
    pub fn rebase_recommendations(
        &mut self,
        remote: Vec<Recommendation>,
        pending: &[PendingAction],
    ) {
        self.recommendations = remote;
        self.hidden_recommendations.clear();
        for queued in pending {
            if let Action::ConnectUser { user_id, .. } = &queued.action {
                self.hide_recommendation(user_id);
            }
        }
    }

    /// Apply the local effect of `action`. Returns `false` when the entity it
    /// targets is not known locally and nothing changed.
    pub fn apply(&mut self, action: &Action) -> bool {
        match action {
            Action::CreatePost { local_id, post } => {
                if self.posts.iter().any(|p| &p.id == local_id) {
                    return true;
                }
                self.posts
                    .insert(0, Post::pending_from(local_id, post, Utc::now()));
                true
            }
            Action::LikePost { post_id, liked } => self.set_like(post_id, *liked),
            Action::AddComment { post_id, comment } => {
                let post_id = self.resolve_id(post_id);
                let Some(post) = self.posts.iter_mut().find(|p| p.id == post_id) else {
                    return false;
                };
                if !post.comments.iter().any(|c| c.id == comment.id) {
                    let mut comment = comment.clone();
                    comment.pending = true;
                    post.comments.push(comment);
                    post.comments_count += 1;
                }
                true
            }
            Action::AttendEvent { event_id, attending } => self.set_attendance(event_id, *attending),
            Action::ConnectUser { user_id, connection } => {
                self.add_connection(connection);
                self.hide_recommendation(user_id);
                true
            }
            Action::DeletePost { post_id } => {
                let post_id = self.resolve_id(post_id);
                match self.posts.iter().position(|p| p.id == post_id) {
                    Some(index) => {
                        let post = self.posts.remove(index);
                        self.deleted_posts.insert(post_id, (index, post));
                        true
                    }
                    None => false,
                }
            }
        }
    }

    /// Revert the local effect of a previously applied `action`
    pub fn rollback(&mut self, action: &Action) {
        match action {
            Action::CreatePost { local_id, .. } => {
                let id = self.resolve_id(local_id);
                self.posts.retain(|p| p.id != id);
            }
            Action::LikePost { post_id, liked } => {
                self.set_like(post_id, !liked);
            }
            Action::AddComment { post_id, comment } => {
                let post_id = self.resolve_id(post_id);
                if let Some(post) = self.posts.iter_mut().find(|p| p.id == post_id) {
                    let before = post.comments.len();
                    post.comments.retain(|c| c.id != comment.id);
                    if post.comments.len() < before {
                        post.comments_count = (post.comments_count - 1).max(0);
                    }
                }
            }
            Action::AttendEvent { event_id, attending } => {
                self.set_attendance(event_id, !attending);
            }
            Action::ConnectUser { user_id, connection } => {
                let id = self.resolve_id(&connection.id);
                self.connections.retain(|c| c.id != id);
                if let Some((index, rec)) = self.hidden_recommendations.remove(user_id) {
                    let index = index.min(self.recommendations.len());
                    self.recommendations.insert(index, rec);
                }
            }
            Action::DeletePost { post_id } => {
                let post_id = self.resolve_id(post_id);
                if let Some((index, post)) = self.deleted_posts.remove(&post_id) {
                    let index = index.min(self.posts.len());
                    self.posts.insert(index, post);
                }
            }
        }
    }

    /// Record the remote confirmation of `action`
    pub fn confirm(&mut self, action: &Action, receipt: &ActionReceipt) {
        if let ActionReceipt::Created {
            local_id,
            remote_id,
        } = receipt
        {
            self.aliases.insert(local_id.clone(), remote_id.clone());
        }

        match (action, receipt) {
            (Action::CreatePost { local_id, .. }, ActionReceipt::Created { remote_id, .. }) => {
                if let Some(post) = self.posts.iter_mut().find(|p| &p.id == local_id) {
                    post.id = remote_id.clone();
                    post.pending = false;
                }
            }
            (Action::ConnectUser { connection, .. }, ActionReceipt::Created { remote_id, .. }) => {
                if let Some(c) = self.connections.iter_mut().find(|c| c.id == connection.id) {
                    c.id = remote_id.clone();
                    c.pending = false;
                }
            }
            (Action::AddComment { post_id, comment }, _) => {
                let post_id = self.resolve_id(post_id);
                if let Some(c) = self
                    .posts
                    .iter_mut()
                    .find(|p| p.id == post_id)
                    .and_then(|p| p.comments.iter_mut().find(|c| c.id == comment.id))
                {
                    c.pending = false;
                }
            }
            (Action::DeletePost { post_id }, _) => {
                let post_id = self.resolve_id(post_id);
                self.deleted_posts.remove(&post_id);
            }
            (Action::ConnectUser { user_id, .. }, _) => {
                self.hidden_recommendations.remove(user_id);
            }
            _ => {}
        }
    }

    /// Clear the pending flag of every entity no queued action owns anymore
    pub fn settle(&mut self, pending: &[PendingAction]) {
        let owned: Vec<Action> = pending.iter().map(|p| self.resolve(&p.action)).collect();

        for post in &mut self.posts {
            if post.pending
                && !owned.iter().any(
                    |a| matches!(a, Action::CreatePost { local_id, .. } if *local_id == post.id),
                )
            {
                post.pending = false;
            }
            for comment in &mut post.comments {
                if comment.pending
                    && !owned.iter().any(
                        |a| matches!(a, Action::AddComment { comment: c, .. } if c.id == comment.id),
                    )
                {
                    comment.pending = false;
                }
            }
        }

        for event in &mut self.events {
            if event.pending
                && !owned.iter().any(
                    |a| matches!(a, Action::AttendEvent { event_id, .. } if *event_id == event.id),
                )
            {
                event.pending = false;
            }
        }

        for connection in &mut self.connections {
            if connection.pending
                && !owned.iter().any(
                    |a| matches!(a, Action::ConnectUser { connection: c, .. } if c.id == connection.id),
                )
            {
                connection.pending = false;
            }
        }
    }

    /// Remote id of `id` if it was a confirmed local placeholder
    pub fn resolve_id(&self, id: &str) -> String {
        self.aliases
            .get(id)
            .cloned()
            .unwrap_or_else(|| id.to_string())
    }

    /// `action` with every confirmed placeholder id replaced by its remote id
    pub fn resolve(&self, action: &Action) -> Action {
        let mut resolved = action.clone();
        for (local, remote) in &self.aliases {
            resolved.retarget_post(local, remote);
        }
        resolved
    }

    /// Whether the optimistic post `local_id` still exists locally
    pub fn has_post(&self, post_id: &str) -> bool {
        self.post(post_id).is_some()
    }

    fn set_like(&mut self, post_id: &str, liked: bool) -> bool {
        let Some(user_id) = self.user_id.clone() else {
            return false;
        };
        let post_id = self.resolve_id(post_id);
        let Some(post) = self.posts.iter_mut().find(|p| p.id == post_id) else {
            return false;
        };

        if post.is_liked == liked {
            return true;
        }
        if post.is_liked {
            post.likes.retain(|like| like.user_id != user_id);
            post.likes_count = (post.likes_count - 1).max(0);
            post.is_liked = false;
        } else {
            post.likes.push(Like {
                user_id,
                timestamp: Some(Utc::now()),
            });
            post.likes_count += 1;
            post.is_liked = true;
        }
        true
    }

    fn set_attendance(&mut self, event_id: &str, attending: bool) -> bool {
        let Some(user_id) = self.user_id.clone() else {
            return false;
        };
        let Some(event) = self.events.iter_mut().find(|e| e.id == event_id) else {
            return false;
        };

        event.pending = true;
        if event.is_attending == attending {
            return true;
        }
        if event.is_attending {
            event.attendees.retain(|a| a.user_id != user_id);
            event.attendees_count = (event.attendees_count - 1).max(0);
            event.is_attending = false;
        } else {
            event.attendees.push(Attendee {
                user_id,
                timestamp: Some(Utc::now()),
            });
            event.attendees_count += 1;
            event.is_attending = true;
        }
        true
    }

    fn add_connection(&mut self, connection: &Connection) {
        if self.connections.iter().any(|c| c.id == connection.id) {
            return;
        }
        let mut connection = connection.clone();
        connection.pending = true;
        self.connections.push(connection);
    }

    fn hide_recommendation(&mut self, user_id: &str) {
        if let Some(index) = self.recommendations.iter().position(|r| r.id == user_id) {
            let rec = self.recommendations.remove(index);
            self.hidden_recommendations
                .insert(user_id.to_string(), (index, rec));
        }
    }
}
