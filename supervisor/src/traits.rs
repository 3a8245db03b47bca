//! Service trait definitions for dependency injection
//!
//! Compiling, launching and probing all touch the outside world; they sit
//! behind these traits so the supervisor loop can be tested with mocks.

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Child;

use crate::error::SupervisorResult;

/// External build toolchain invocation
#[mockall::automock]
#[async_trait]
pub trait Toolchain: Send + Sync {
    /// Compile the application, blocking until the toolchain exits
    async fn build(&self) -> SupervisorResult<()>;
}

/// Launches the compiled application binary
#[mockall::automock]
#[async_trait]
pub trait Launcher: Send + Sync {
    /// Spawn the binary and hand back the running child
    async fn launch(&self, binary: &Path) -> SupervisorResult<Child>;
}

/// Single bounded-timeout health probe against the running app
#[mockall::automock]
#[async_trait]
pub trait HealthProbe: Send + Sync {
    /// Returns true when the app answered in a healthy way
    async fn probe(&self) -> bool;
}
