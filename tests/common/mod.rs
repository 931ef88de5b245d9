//! Common test utilities and helpers
//!
//! This module provides shared utilities for all tests including:
//! - Seeded in-memory document stores and signed-in sessions
//! - Sync context harnesses with fast retry timings
//! - Custom assertion macros

pub mod assertions;
pub mod fixtures;

// Re-export commonly used utilities
pub use fixtures::*;
