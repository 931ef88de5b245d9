//! Client Sync Core
//!
//! Everything the dashboard needs to keep working through flaky connectivity:
//! a local cache, a durable queue of pending actions, a connectivity monitor
//! with a backoff reconnection scheduler, and the façade tying them together.
//!
//! # Architecture
//!
//! - **`config`** - Environment and file configuration
//! - **`local_db`** - Durable key/value storage (SQLite or in-memory)
//! - **`offline`** - Cache, pending action queue, retry policy, optimistic state
//! - **`remote`** - Document, blob and identity service seams
//! - **`sync`** - Connectivity monitor, reconnection scheduler, `SyncContext`
//! - **`media`** - Validation and naming of post media
//! - **`local_auth`** - Failed-login counter with temporary lockout
//! - **`dashboard`** - Presentation state driven by sync events
//!
//! # Module Structure
//!
//! ```text
//! client/
//! ├── mod.rs        - Module exports and documentation
//! ├── main.rs       - Offline demo entry point
//! ├── config.rs     - Configuration management
//! ├── dashboard.rs  - Dashboard controller
//! ├── local_auth.rs - Login lockout
//! ├── media.rs      - Media validation
//! ├── local_db/     - Durable storage
//! ├── offline/      - Offline building blocks
//! ├── remote/       - Remote service seams
//! └── sync/         - Connectivity and the sync façade
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! // Run the offline walkthrough:
//! // cargo run --bin offline_demo
//! ```

pub mod config;
pub mod dashboard;
pub mod local_auth;
pub mod local_db;
pub mod media;
pub mod offline;
pub mod remote;
pub mod sync;

pub use config::Config;
pub use dashboard::{Banner, DashboardController, DashboardTab};
pub use sync::{SyncContext, SyncStatus};
