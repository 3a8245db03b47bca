//! Unit tests for the supervisor crate
//!
//! Readiness is exercised against real loopback HTTP servers.

pub mod helpers;
pub mod health;
