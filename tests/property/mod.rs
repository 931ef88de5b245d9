//! Property-based tests

pub mod backoff_proptest;
pub mod local_state_proptest;
pub mod queue_proptest;
