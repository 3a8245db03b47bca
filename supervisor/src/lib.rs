//! Process supervisor for the application under development
//!
//! Owns the build → run → monitor → stop lifecycle of the child app
//! process. A periodic heartbeat probes the running app and feeds a pure
//! state machine that decides when a silent hang warrants a restart.

pub mod error;
pub mod health;
pub mod heartbeat;
pub mod services;
pub mod supervisor;
pub mod traits;

#[cfg(test)]
mod tests;

pub use error::{SupervisorError, SupervisorResult};
pub use health::{HealthMonitor, ReachabilityChecker, wait_for_healthy};
pub use heartbeat::{HeartbeatState, HeartbeatVerdict};
pub use services::{BinaryLauncher, CommandToolchain, HttpHealthProbe};
pub use supervisor::{HeartbeatConfig, ProcessState, RebuildTrigger, Supervisor, SupervisorConfig};
pub use traits::{HealthProbe, Launcher, Toolchain};
