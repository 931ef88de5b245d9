//! # Offline Support
//!
//! Building blocks that keep the dashboard usable without connectivity.
//!
//! ## Architecture
//!
//! The offline system consists of:
//! - **Cache**: last-known-good snapshot per data category
//! - **Operation Queue**: writes performed offline, replayed in order
//! - **Optimistic State**: local data with unconfirmed actions applied
//! - **Retry Logic**: bounded retries and backoff strategies
//!
//! ## Key Components
//!
//! - `cache.rs`: durable per-category snapshots
//! - `queue.rs`: pending action queue and the typed `Action` union
//! - `optimistic.rs`: optimistic apply, rollback and reconciliation
//! - `retry.rs`: retry policy and backoff strategies
//!
//! The pieces hold no reference to each other; `client::sync::SyncContext`
//! wires them together.

pub mod cache;
pub mod optimistic;
pub mod queue;
pub mod retry;

// Re-export main types
pub use cache::{CacheStore, CachedSnapshot};
pub use optimistic::{ActionReceipt, LocalState};
pub use queue::{
    Action, ActionKind, DrainDecision, DrainReport, PendingAction, PendingActionQueue, Target,
};
pub use retry::{BackoffStrategy, RetryPolicy};
