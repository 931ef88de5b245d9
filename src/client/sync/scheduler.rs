//! # Reconnection Scheduler
//!
//! While offline, probes the remote service on an exponential backoff and
//! reports a successful probe to the network monitor.
//!
//! ## Features
//!
//! - **Exponential Backoff**: attempt *n* waits `min(2^(n-1) * base, cap)` plus jitter
//! - **Single Timer**: at most one probe loop runs at any time
//! - **Manual Retry**: `retry_now` cancels the timer and probes immediately
//! - **Visible Progress**: attempt count and next attempt time for the view layer

use crate::client::offline::retry::BackoffStrategy;
use crate::client::remote::DocumentStore;
use crate::client::sync::network_monitor::{NetworkMonitor, NetworkSignal};
use crate::shared::error::RemoteError;
use crate::shared::event::{SyncEvent, SyncEventKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::sync::Arc;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;

/// Lightweight check that the remote service is reachable
#[async_trait]
pub trait ConnectivityProbe: Send + Sync + Debug {
    async fn probe(&self) -> Result<(), RemoteError>;
}

/// Probe reading the signed-in member's own document
#[derive(Debug, Clone)]
pub struct UserDocumentProbe {
    store: Arc<dyn DocumentStore>,
    user_id: String,
}

impl UserDocumentProbe {
    pub fn new(store: Arc<dyn DocumentStore>, user_id: impl Into<String>) -> Self {
        Self {
            store,
            user_id: user_id.into(),
        }
    }
}

#[async_trait]
impl ConnectivityProbe for UserDocumentProbe {
    async fn probe(&self) -> Result<(), RemoteError> {
        // Any answer, even "absent", proves the service is reachable
        self.store.get_document("users", &self.user_id).await.map(|_| ())
    }
}

/// Reconnection progress shown to the user
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconnectionStatus {
    /// Failed probes since connectivity was lost
    pub attempt: u32,
    pub next_attempt_at: Option<DateTime<Utc>>,
    /// A probe is running right now
    pub in_progress: bool,
}

#[derive(Debug)]
struct SchedulerInner {
    monitor: Arc<NetworkMonitor>,
    probe: Arc<dyn ConnectivityProbe>,
    backoff: BackoffStrategy,
    status: Mutex<ReconnectionStatus>,
    events: Option<broadcast::Sender<SyncEvent>>,
}

/// Backoff-driven reconnection probing
#[derive(Debug)]
pub struct ReconnectionScheduler {
    inner: Arc<SchedulerInner>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ReconnectionScheduler {
    pub fn new(
        monitor: Arc<NetworkMonitor>,
        probe: Arc<dyn ConnectivityProbe>,
        backoff: BackoffStrategy,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                monitor,
                probe,
                backoff,
                status: Mutex::new(ReconnectionStatus::default()),
                events: None,
            }),
            task: Mutex::new(None),
        }
    }

    /// Publish `ReconnectScheduled` events on `events`
    pub fn with_events(
        monitor: Arc<NetworkMonitor>,
        probe: Arc<dyn ConnectivityProbe>,
        backoff: BackoffStrategy,
        events: broadcast::Sender<SyncEvent>,
    ) -> Self {
        Self {
            inner: Arc::new(SchedulerInner {
                monitor,
                probe,
                backoff,
                status: Mutex::new(ReconnectionStatus::default()),
                events: Some(events),
            }),
            task: Mutex::new(None),
        }
    }

    /// Start probing, replacing any running probe loop
    pub async fn start(&self) {
        let mut task = self.task.lock().await;
        if let Some(handle) = task.take() {
            handle.abort();
        }
        tracing::debug!("reconnection scheduler started");
        *task = Some(tokio::spawn(run_loop(self.inner.clone())));
    }

    /// Cancel the probe loop and reset the attempt counter
    pub async fn stop(&self) {
        if let Some(handle) = self.task.lock().await.take() {
            handle.abort();
        }
        *self.inner.status.lock().await = ReconnectionStatus::default();
    }

    /// Cancel the pending timer and probe immediately. Returns whether the
    /// service is reachable; on failure backoff resumes from the next attempt.
    pub async fn retry_now(&self) -> bool {
        if self.inner.monitor.is_online() {
            return true;
        }

        let mut task = self.task.lock().await;
        if let Some(handle) = task.take() {
            handle.abort();
        }

        if probe_once(&self.inner).await {
            drop(task);
            self.stop().await;
            return true;
        }

        *task = Some(tokio::spawn(run_loop(self.inner.clone())));
        false
    }

    pub async fn status(&self) -> ReconnectionStatus {
        self.inner.status.lock().await.clone()
    }

    /// Whether a probe loop is scheduled
    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

impl Drop for ReconnectionScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.task.get_mut().take() {
            handle.abort();
        }
    }
}

/// Run one probe; on failure count it. Returns whether the probe succeeded.
async fn probe_once(inner: &SchedulerInner) -> bool {
    inner.status.lock().await.in_progress = true;
    let result = inner.probe.probe().await;

    let mut status = inner.status.lock().await;
    status.in_progress = false;
    match result {
        Ok(()) => {
            drop(status);
            inner.monitor.signal(NetworkSignal::ProbeSucceeded);
            true
        }
        Err(error) => {
            status.attempt += 1;
            tracing::debug!(attempt = status.attempt, %error, "reconnection probe failed");
            false
        }
    }
}

async fn run_loop(inner: Arc<SchedulerInner>) {
    loop {
        if inner.monitor.is_online() {
            break;
        }

        let attempt = inner.status.lock().await.attempt + 1;
        let delay = inner.backoff.delay(attempt);
        let next_attempt_at =
            Utc::now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        inner.status.lock().await.next_attempt_at = Some(next_attempt_at);

        if let Some(events) = &inner.events {
            let _ = events.send(SyncEvent::new(SyncEventKind::ReconnectScheduled {
                attempt,
                next_attempt_at,
            }));
        }
        tracing::debug!(attempt, ?delay, "next reconnection attempt scheduled");

        tokio::time::sleep(delay).await;

        if inner.monitor.is_online() || probe_once(&inner).await {
            break;
        }
    }
    inner.status.lock().await.next_attempt_at = None;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    /// Fails the first `failures` probes
    #[derive(Debug)]
    struct FlakyProbe {
        failures: u32,
        calls: AtomicU32,
    }

    #[async_trait]
    impl ConnectivityProbe for FlakyProbe {
        async fn probe(&self) -> Result<(), RemoteError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                Err(RemoteError::unavailable("still down"))
            } else {
                Ok(())
            }
        }
    }

    fn no_jitter() -> BackoffStrategy {
        BackoffStrategy::Exponential {
            base: Duration::from_secs(1),
            max: Duration::from_secs(60),
            jitter: Duration::ZERO,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_until_probe_succeeds() {
        let monitor = Arc::new(NetworkMonitor::new(false));
        let probe = Arc::new(FlakyProbe {
            failures: 3,
            calls: AtomicU32::new(0),
        });
        let scheduler = ReconnectionScheduler::new(monitor.clone(), probe.clone(), no_jitter());
        let mut transitions = monitor.subscribe();
        let started = tokio::time::Instant::now();

        scheduler.start().await;
        let transition = transitions.recv().await.unwrap();

        assert!(transition.status.is_online());
        assert_eq!(transition.cause, NetworkSignal::ProbeSucceeded);
        // 1s + 2s + 4s + 8s
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(15) && elapsed < Duration::from_secs(16));
        assert_eq!(probe.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_probe_updates_visible_status() {
        let monitor = Arc::new(NetworkMonitor::new(false));
        let probe = Arc::new(FlakyProbe {
            failures: u32::MAX,
            calls: AtomicU32::new(0),
        });
        let scheduler = ReconnectionScheduler::new(monitor.clone(), probe, no_jitter());

        scheduler.start().await;
        tokio::time::sleep(Duration::from_millis(3500)).await;

        let status = scheduler.status().await;
        assert_eq!(status.attempt, 2);
        assert!(status.next_attempt_at.is_some());
        assert!(!monitor.is_online());

        scheduler.stop().await;
        assert_eq!(scheduler.status().await, ReconnectionStatus::default());
        assert!(!scheduler.is_running().await);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_now_reconnects_immediately() {
        let monitor = Arc::new(NetworkMonitor::new(false));
        let probe = Arc::new(FlakyProbe {
            failures: 1,
            calls: AtomicU32::new(0),
        });
        let scheduler = ReconnectionScheduler::new(monitor.clone(), probe.clone(), no_jitter());
        scheduler.start().await;

        assert!(!scheduler.retry_now().await);
        assert_eq!(scheduler.status().await.attempt, 1);
        assert!(scheduler.is_running().await);

        assert!(scheduler.retry_now().await);
        assert!(monitor.is_online());
        assert_eq!(probe.calls.load(Ordering::SeqCst), 2);
        assert_eq!(scheduler.status().await.attempt, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restart_keeps_single_timer() {
        let monitor = Arc::new(NetworkMonitor::new(false));
        let probe = Arc::new(FlakyProbe {
            failures: 0,
            calls: AtomicU32::new(0),
        });
        let scheduler = ReconnectionScheduler::new(monitor.clone(), probe.clone(), no_jitter());

        scheduler.start().await;
        scheduler.start().await;
        scheduler.start().await;
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(probe.calls.load(Ordering::SeqCst), 1);
        assert!(monitor.is_online());
    }
}
