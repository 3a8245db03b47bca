//! Process-wide development state
//!
//! The tracked process registry and the rebuild-in-progress flag are the
//! only mutable state shared between subsystems outside the broadcaster.
//! Both live in an explicitly owned [`DevState`] handed to every component
//! that needs them.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::registry::ProcessRegistry;

/// Set while a full rebuild/restart of the app is underway
///
/// A stylesheet rebuild finishing while this is set must not broadcast:
/// the supervisor broadcasts once the new process is healthy.
#[derive(Debug, Default)]
pub struct RebuildFlag(AtomicBool);

impl RebuildFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Shared state injected into the supervisor, watchers and coordinator
#[derive(Debug, Default)]
pub struct DevState {
    pub registry: ProcessRegistry,
    pub rebuild_in_progress: RebuildFlag,
}

impl DevState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a spawned subprocess for unified shutdown
    pub fn track_process(&self, pid: Option<u32>) {
        if let Some(pid) = pid {
            self.registry.track(pid);
        }
    }
}
