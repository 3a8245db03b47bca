//! Common test utilities for the supervisor test suites

pub mod helpers;

pub use helpers::{LaunchLog, SupervisorBuilder, TestHelpers};
