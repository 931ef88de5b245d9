//! Test suite for the community sync core
//!
//! This module organizes all tests

pub mod common;
pub mod integration;
pub mod property;
