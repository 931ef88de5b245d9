//! # Network Monitor
//!
//! Two-state connectivity machine fed by platform signals, failed remote
//! calls and successful reconnection probes.
//!
//! ## Features
//!
//! - **Connectivity Detection**: online/offline status from every known source
//! - **Idempotent Transitions**: repeated signals for the current state are ignored
//! - **Exactly-Once Notification**: subscribers see each real transition once
//! - **Epochs**: every transition bumps a counter so in-flight work can detect staleness

use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{broadcast, watch};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkStatus {
    Online,
    Offline,
}

impl NetworkStatus {
    pub fn is_online(&self) -> bool {
        matches!(self, NetworkStatus::Online)
    }
}

/// Input to the monitor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkSignal {
    /// The platform reports the network is up
    PlatformOnline,
    /// The platform reports the network is down
    PlatformOffline,
    /// A remote call failed in a way that means the service is unreachable
    RemoteUnreachable,
    /// A reconnection probe reached the service
    ProbeSucceeded,
}

impl NetworkSignal {
    /// State the signal asks for
    pub fn target(&self) -> NetworkStatus {
        match self {
            NetworkSignal::PlatformOnline | NetworkSignal::ProbeSucceeded => NetworkStatus::Online,
            NetworkSignal::PlatformOffline | NetworkSignal::RemoteUnreachable => {
                NetworkStatus::Offline
            }
        }
    }
}

/// A change of connectivity
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    pub status: NetworkStatus,
    pub cause: NetworkSignal,
    /// Number of transitions so far, this one included
    pub epoch: u64,
}

/// Connectivity state machine
#[derive(Debug)]
pub struct NetworkMonitor {
    status: watch::Sender<NetworkStatus>,
    transitions: broadcast::Sender<Transition>,
    epoch: AtomicU64,
}

impl NetworkMonitor {
    /// Monitor starting from the platform's reported state
    pub fn new(initially_online: bool) -> Self {
        let initial = if initially_online {
            NetworkStatus::Online
        } else {
            NetworkStatus::Offline
        };
        let (status, _) = watch::channel(initial);
        let (transitions, _) = broadcast::channel(64);
        Self {
            status,
            transitions,
            epoch: AtomicU64::new(0),
        }
    }

    /// Feed a signal. Returns the transition it caused, or `None` when the
    /// monitor was already in the requested state.
    pub fn signal(&self, signal: NetworkSignal) -> Option<Transition> {
        let target = signal.target();
        let changed = self.status.send_if_modified(|current| {
            if *current == target {
                false
            } else {
                *current = target;
                true
            }
        });
        if !changed {
            return None;
        }

        let epoch = self.epoch.fetch_add(1, Ordering::SeqCst) + 1;
        let transition = Transition {
            status: target,
            cause: signal,
            epoch,
        };
        match target {
            NetworkStatus::Online => tracing::info!(?signal, epoch, "connection restored"),
            NetworkStatus::Offline => tracing::warn!(?signal, epoch, "connection lost"),
        }
        // No subscribers is fine
        let _ = self.transitions.send(transition);
        Some(transition)
    }

    pub fn status(&self) -> NetworkStatus {
        *self.status.borrow()
    }

    pub fn is_online(&self) -> bool {
        self.status().is_online()
    }

    /// Number of transitions so far
    pub fn epoch(&self) -> u64 {
        self.epoch.load(Ordering::SeqCst)
    }

    /// Stream of transitions from now on
    pub fn subscribe(&self) -> broadcast::Receiver<Transition> {
        self.transitions.subscribe()
    }

    /// Latest-value view of the status
    pub fn watch(&self) -> watch::Receiver<NetworkStatus> {
        self.status.subscribe()
    }
}
