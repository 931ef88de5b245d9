//! # Retry Logic and Backoff Strategies
//!
//! One parameterized retry policy shared by every remote read and every online
//! write, plus the backoff strategies used by that policy and by the
//! reconnection scheduler.
//!
//! ## Features
//!
//! - **Exponential Backoff**: `min(2^(n-1) * base, cap)` plus random jitter
//! - **Linear Backoff**: retry *n* waits `n * step`
//! - **Retryable Predicate**: only errors the predicate accepts are retried
//! - **Bounded Attempts**: at most `max_retries` retries after the first call
//!
//! ## Usage
//!
//! ```rust,no_run
//! use community_sync::client::offline::retry::{BackoffStrategy, RetryPolicy};
//! use std::time::Duration;
//!
//! # async fn example() {
//! let policy = RetryPolicy::new(3, BackoffStrategy::Linear { step: Duration::from_secs(2) });
//! let result = policy.run(|| async { Ok::<_, community_sync::shared::RemoteError>(42) }).await;
//! # }
//! ```

use crate::shared::config::{FetchRetryConfig, ReconnectConfig};
use crate::shared::error::RemoteError;
use rand::Rng;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

/// Backoff strategy configuration
#[derive(Clone)]
pub enum BackoffStrategy {
    /// Fixed interval between attempts
    Fixed {
        interval: Duration,
    },
    /// Attempt *n* waits `n * step`
    Linear {
        step: Duration,
    },
    /// Attempt *n* waits `min(2^(n-1) * base, max)` plus jitter in `[0, jitter)`
    Exponential {
        base: Duration,
        max: Duration,
        jitter: Duration,
    },
    /// Custom delay function of the 1-indexed attempt
    Custom(Arc<dyn Fn(u32) -> Duration + Send + Sync>),
}

impl fmt::Debug for BackoffStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Fixed { interval } => f.debug_struct("Fixed").field("interval", interval).finish(),
            Self::Linear { step } => f.debug_struct("Linear").field("step", step).finish(),
            Self::Exponential { base, max, jitter } => f
                .debug_struct("Exponential")
                .field("base", base)
                .field("max", max)
                .field("jitter", jitter)
                .finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl BackoffStrategy {
    /// Delay before the 1-indexed `attempt`, without jitter.
    /// Attempt 0 is treated as attempt 1.
    pub fn base_delay(&self, attempt: u32) -> Duration {
        let attempt = attempt.max(1);
        match self {
            Self::Fixed { interval } => *interval,
            Self::Linear { step } => step.saturating_mul(attempt),
            Self::Exponential { base, max, .. } => {
                let factor = 1u32.checked_shl(attempt - 1).unwrap_or(u32::MAX);
                base.saturating_mul(factor).min(*max)
            }
            Self::Custom(calc) => calc(attempt),
        }
    }

    /// Delay before `attempt` including jitter drawn from the thread RNG
    pub fn delay(&self, attempt: u32) -> Duration {
        self.delay_with(attempt, &mut rand::thread_rng())
    }

    /// Delay before `attempt` including jitter drawn from `rng`
    pub fn delay_with<R: Rng + ?Sized>(&self, attempt: u32, rng: &mut R) -> Duration {
        let base = self.base_delay(attempt);
        match self {
            Self::Exponential { jitter, .. } if !jitter.is_zero() => {
                let bound = u64::try_from(jitter.as_nanos()).unwrap_or(u64::MAX);
                base + Duration::from_nanos(rng.gen_range(0..bound))
            }
            _ => base,
        }
    }
}

impl From<ReconnectConfig> for BackoffStrategy {
    fn from(config: ReconnectConfig) -> Self {
        Self::Exponential {
            base: config.base,
            max: config.cap,
            jitter: config.jitter_max,
        }
    }
}

impl From<FetchRetryConfig> for RetryPolicy {
    fn from(config: FetchRetryConfig) -> Self {
        Self::new(config.max_retries, BackoffStrategy::Linear { step: config.step })
    }
}

/// Bounded retry of remote calls
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first failed attempt
    pub max_retries: u32,
    /// Delay before each retry
    pub backoff: BackoffStrategy,
    retryable: fn(&RemoteError) -> bool,
}

impl RetryPolicy {
    /// Policy retrying transient errors
    pub fn new(max_retries: u32, backoff: BackoffStrategy) -> Self {
        Self {
            max_retries,
            backoff,
            retryable: RemoteError::is_transient,
        }
    }

    /// Policy that never retries
    pub fn none() -> Self {
        Self::new(0, BackoffStrategy::Fixed { interval: Duration::ZERO })
    }

    /// Replace the retryable-error predicate
    pub fn with_predicate(mut self, retryable: fn(&RemoteError) -> bool) -> Self {
        self.retryable = retryable;
        self
    }

    /// Whether a failure on the 1-indexed `attempt` should be retried
    pub fn should_retry(&self, error: &RemoteError, attempt: u32) -> bool {
        attempt <= self.max_retries && (self.retryable)(error)
    }

    /// Run `operation` until it succeeds, fails with a non-retryable error or
    /// the retry budget is exhausted. The last error is returned.
    pub async fn run<T, F, Fut>(&self, mut operation: F) -> Result<T, RemoteError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, RemoteError>>,
    {
        let mut attempt = 0u32;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    attempt += 1;
                    if !self.should_retry(&error, attempt) {
                        return Err(error);
                    }
                    let delay = self.backoff.delay(attempt);
                    tracing::debug!(attempt, ?delay, %error, "retrying remote call");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
