//! Local Login Lockout
//!
//! Counts failed sign-in attempts in durable storage and locks the login form
//! for a while after too many of them. The counters live on this device only,
//! so the lockout is advisory: it slows down casual guessing from the same
//! client and is not a substitute for rate limiting at the identity provider.
//!
//! ## Storage Layout
//!
//! - `"{namespace}loginAttempts"`: failed attempts since the last success
//! - `"{namespace}loginLockoutTime"`: end of the lockout, in Unix milliseconds
//!
//! ## Usage
//!
//! ```rust,no_run
//! use community_sync::client::local_auth::{LoginGuard, LoginStatus};
//! use community_sync::client::local_db::MemoryStorage;
//! use community_sync::shared::SyncConfig;
//! use std::sync::Arc;
//!
//! # async fn example() {
//! let guard = LoginGuard::new(Arc::new(MemoryStorage::new()), &SyncConfig::default());
//! if let LoginStatus::LockedOut { .. } = guard.check().await {
//!     return;
//! }
//! // ...sign in; on failure:
//! guard.record_failure().await;
//! # }
//! ```

use crate::client::local_db::DurableStorage;
use crate::shared::config::{LockoutConfig, SyncConfig};
use chrono::{DateTime, Duration, TimeZone, Utc};
use std::sync::Arc;

/// Whether a sign-in may be attempted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStatus {
    Allowed { remaining_attempts: u32 },
    LockedOut { until: DateTime<Utc> },
}

impl LoginStatus {
    pub fn is_allowed(&self) -> bool {
        matches!(self, LoginStatus::Allowed { .. })
    }

    /// Message shown on the login form while locked out
    pub fn message(&self, now: DateTime<Utc>) -> Option<String> {
        match self {
            LoginStatus::Allowed { .. } => None,
            LoginStatus::LockedOut { until } => {
                let minutes = ((*until - now).num_seconds().max(0) + 59) / 60;
                Some(format!(
                    "Too many failed login attempts. Please try again in {} minute{}.",
                    minutes,
                    if minutes == 1 { "" } else { "s" }
                ))
            }
        }
    }
}

/// Failed-login counter with a temporary lockout
#[derive(Debug, Clone)]
pub struct LoginGuard {
    storage: Arc<dyn DurableStorage>,
    attempts_key: String,
    lockout_key: String,
    policy: LockoutConfig,
}

impl LoginGuard {
    pub fn new(storage: Arc<dyn DurableStorage>, config: &SyncConfig) -> Self {
        Self {
            storage,
            attempts_key: config.storage_key("loginAttempts"),
            lockout_key: config.storage_key("loginLockoutTime"),
            policy: config.lockout,
        }
    }

    pub async fn check(&self) -> LoginStatus {
        self.check_at(Utc::now()).await
    }

    /// Status at `now`; an expired lockout is cleared
    pub async fn check_at(&self, now: DateTime<Utc>) -> LoginStatus {
        if let Some(until) = self.lockout_until().await {
            if now < until {
                return LoginStatus::LockedOut { until };
            }
            self.reset().await;
        }
        LoginStatus::Allowed {
            remaining_attempts: self.policy.max_attempts.saturating_sub(self.attempts().await),
        }
    }

    pub async fn record_failure(&self) -> LoginStatus {
        self.record_failure_at(Utc::now()).await
    }

    /// Count a failed attempt at `now`, starting the lockout when the limit is reached
    pub async fn record_failure_at(&self, now: DateTime<Utc>) -> LoginStatus {
        if let LoginStatus::LockedOut { until } = self.check_at(now).await {
            return LoginStatus::LockedOut { until };
        }

        let attempts = self.attempts().await + 1;
        self.write(&self.attempts_key, attempts.to_string()).await;

        if attempts >= self.policy.max_attempts {
            let duration = Duration::from_std(self.policy.duration).unwrap_or_else(|_| Duration::zero());
            let until = now + duration;
            self.write(&self.lockout_key, until.timestamp_millis().to_string())
                .await;
            tracing::warn!(attempts, %until, "login locked after repeated failures");
            return LoginStatus::LockedOut { until };
        }

        LoginStatus::Allowed {
            remaining_attempts: self.policy.max_attempts - attempts,
        }
    }

    /// Clear the counters after a successful sign-in
    pub async fn record_success(&self) {
        self.reset().await;
    }

    async fn attempts(&self) -> u32 {
        match self.storage.get_item(&self.attempts_key).await {
            Ok(Some(raw)) => raw.parse().unwrap_or(0),
            Ok(None) => 0,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read login attempts");
                0
            }
        }
    }

    async fn lockout_until(&self) -> Option<DateTime<Utc>> {
        let raw = match self.storage.get_item(&self.lockout_key).await {
            Ok(raw) => raw?,
            Err(e) => {
                tracing::warn!(error = %e, "failed to read login lockout");
                return None;
            }
        };
        let millis: i64 = raw.parse().ok()?;
        Utc.timestamp_millis_opt(millis).single()
    }

    async fn write(&self, key: &str, value: String) {
        if let Err(e) = self.storage.set_item(key, &value).await {
            tracing::warn!(key, error = %e, "failed to store login counter");
        }
    }

    async fn reset(&self) {
        for key in [&self.attempts_key, &self.lockout_key] {
            if let Err(e) = self.storage.remove_item(key).await {
                tracing::warn!(key = %key, error = %e, "failed to clear login counter");
            }
        }
    }
}
