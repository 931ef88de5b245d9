/**
 * Sync Event System
 *
 * Notifications emitted by the sync context to the view layer: connectivity
 * changes, queue size changes, drain results and refreshed categories.
 * Events are delivered over a tokio broadcast channel; every subscriber sees
 * each event once.
 */
use crate::shared::models::Category;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Type of sync event
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEventKind {
    /// Connectivity was lost
    WentOffline {
        /// Actions waiting for replay at the time of the transition
        pending_actions: usize,
    },
    /// Connectivity came back
    Reconnected,
    /// The pending queue changed size
    QueueChanged { pending_actions: usize },
    /// A drain cycle finished
    DrainFinished {
        completed: usize,
        retried: usize,
        discarded: usize,
    },
    /// A category was refreshed from the remote service
    Refreshed { category: Category },
    /// A category was served from the local cache
    ServedFromCache { category: Category },
    /// A reconnection probe failed; the next attempt is scheduled
    ReconnectScheduled {
        attempt: u32,
        next_attempt_at: DateTime<Utc>,
    },
}

/// Event broadcast to every subscriber of the sync context
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SyncEvent {
    #[serde(flatten)]
    pub kind: SyncEventKind,
    pub timestamp: DateTime<Utc>,
}

impl SyncEvent {
    /// Create a new event stamped with the current time
    pub fn new(kind: SyncEventKind) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
        }
    }

    pub fn went_offline(pending_actions: usize) -> Self {
        Self::new(SyncEventKind::WentOffline { pending_actions })
    }

    pub fn reconnected() -> Self {
        Self::new(SyncEventKind::Reconnected)
    }

    pub fn queue_changed(pending_actions: usize) -> Self {
        Self::new(SyncEventKind::QueueChanged { pending_actions })
    }

    /// Whether this event reports a connectivity change
    pub fn is_connectivity_change(&self) -> bool {
        matches!(
            self.kind,
            SyncEventKind::WentOffline { .. } | SyncEventKind::Reconnected
        )
    }
}
