//! Shared building blocks for the shadowfax development orchestrator
//!
//! Contains the pieces every subsystem touches: subsystem identifiers and
//! change classifications, the reload broadcaster, the tracked process
//! registry and the process-wide development state.

pub mod errors;
pub mod logging;
pub mod registry;
pub mod reload;
pub mod state;
pub mod types;

pub use errors::*;
pub use registry::{ProcessRegistry, TrackedPid};
pub use reload::{Broadcaster, Subscriber, DEFAULT_DEBOUNCE};
pub use state::{DevState, RebuildFlag};
pub use types::*;
