//! Snapshot of the sync layer shown by the view layer

use crate::client::sync::network_monitor::NetworkStatus;
use crate::client::sync::scheduler::ReconnectionStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Connectivity, queue and reconnection state at one point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub network: NetworkStatus,
    /// Actions waiting for replay
    pub pending_actions: usize,
    /// Last successful remote read of any category
    pub last_sync: Option<DateTime<Utc>>,
    pub reconnection: ReconnectionStatus,
}

impl SyncStatus {
    pub fn is_online(&self) -> bool {
        self.network.is_online()
    }

    /// Whether everything the user did has reached the remote service
    pub fn is_settled(&self) -> bool {
        self.is_online() && self.pending_actions == 0
    }

    /// Short human-readable summary for banners
    pub fn describe(&self) -> String {
        match (self.is_online(), self.pending_actions) {
            (true, 0) => "All changes saved".to_string(),
            (true, n) => format!("Syncing {} pending {}", n, plural(n)),
            (false, 0) => "You are offline".to_string(),
            (false, n) => format!(
                "You are offline. {} {} will sync when you reconnect",
                n,
                plural(n)
            ),
        }
    }
}

fn plural(n: usize) -> &'static str {
    if n == 1 {
        "change"
    } else {
        "changes"
    }
}
