//! Integration tests driving the sync context end to end

pub mod http_store_test;
pub mod offline_test;
pub mod persistence_test;
pub mod reconnect_test;
