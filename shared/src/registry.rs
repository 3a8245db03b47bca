//! Registry of every subprocess spawned during a session
//!
//! The supervisor and each watcher register the children they launch so
//! that shutdown can signal all of them in one place. Dead entries are
//! compacted lazily on every mutation.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::errors::{SharedError, SharedResult};
use crate::types::Subsystem;
use crate::{subsystem_debug, subsystem_warn};

/// Operating-system process id of a tracked child
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TrackedPid(pub u32);

impl fmt::Display for TrackedPid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TrackedPid {
    /// Check whether the process still exists
    #[cfg(unix)]
    pub fn is_alive(self) -> bool {
        use nix::errno::Errno;
        use nix::sys::signal;
        use nix::unistd::Pid;

        let Ok(raw) = i32::try_from(self.0) else {
            return false;
        };
        match signal::kill(Pid::from_raw(raw), None) {
            Ok(()) => true,
            // The process exists but belongs to someone else
            Err(Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    #[cfg(not(unix))]
    pub fn is_alive(self) -> bool {
        true
    }

    /// Ask the process to terminate (SIGTERM)
    #[cfg(unix)]
    pub fn terminate(self) -> SharedResult<()> {
        self.send(nix::sys::signal::Signal::SIGTERM)
    }

    /// Ask the process to interrupt (SIGINT)
    #[cfg(unix)]
    pub fn interrupt(self) -> SharedResult<()> {
        self.send(nix::sys::signal::Signal::SIGINT)
    }

    /// Force the process to exit (SIGKILL)
    #[cfg(unix)]
    pub fn kill(self) -> SharedResult<()> {
        self.send(nix::sys::signal::Signal::SIGKILL)
    }

    #[cfg(unix)]
    fn send(self, sig: nix::sys::signal::Signal) -> SharedResult<()> {
        use nix::errno::Errno;
        use nix::sys::signal;
        use nix::unistd::Pid;

        let raw = i32::try_from(self.0).map_err(|e| SharedError::signal(self.0, e.to_string()))?;
        match signal::kill(Pid::from_raw(raw), sig) {
            // Already gone
            Ok(()) | Err(Errno::ESRCH) => Ok(()),
            Err(e) => Err(SharedError::signal(self.0, e.to_string())),
        }
    }

    #[cfg(not(unix))]
    pub fn terminate(self) -> SharedResult<()> {
        Err(SharedError::signal(self.0, "signals are not supported on this platform"))
    }

    #[cfg(not(unix))]
    pub fn interrupt(self) -> SharedResult<()> {
        self.terminate()
    }

    #[cfg(not(unix))]
    pub fn kill(self) -> SharedResult<()> {
        self.terminate()
    }
}

/// Mapping of tracked subprocesses to liveness
#[derive(Debug, Default)]
pub struct ProcessRegistry {
    processes: Mutex<Vec<TrackedPid>>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<TrackedPid>> {
        self.processes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn compact_locked(processes: &mut Vec<TrackedPid>) -> usize {
        let before = processes.len();
        processes.retain(|pid| pid.is_alive());
        before - processes.len()
    }

    /// Register a freshly spawned subprocess
    pub fn track(&self, pid: u32) {
        let mut processes = self.lock();
        Self::compact_locked(&mut processes);
        let pid = TrackedPid(pid);
        if !processes.contains(&pid) {
            processes.push(pid);
        }
    }

    /// Drop entries whose process has exited; returns how many were removed
    pub fn sweep(&self) -> usize {
        Self::compact_locked(&mut self.lock())
    }

    /// Number of tracked processes that are still alive
    pub fn live_count(&self) -> usize {
        let mut processes = self.lock();
        Self::compact_locked(&mut processes);
        processes.len()
    }

    /// Drain the registry and stop every live process
    ///
    /// Sends SIGTERM to everything, waits `grace`, then SIGKILLs whatever
    /// is still alive. Returns the number of processes that had to be
    /// force-killed.
    pub async fn terminate_all(&self, grace: Duration) -> usize {
        let processes = {
            let mut guard = self.lock();
            Self::compact_locked(&mut guard);
            std::mem::take(&mut *guard)
        };
        if processes.is_empty() {
            return 0;
        }

        for pid in &processes {
            if let Err(e) = pid.terminate() {
                subsystem_warn!(Subsystem::Shadowfax, "⚠️ {}", e);
            }
        }

        tokio::time::sleep(grace).await;

        let mut killed = 0;
        for pid in processes.into_iter().filter(|pid| pid.is_alive()) {
            subsystem_debug!(Subsystem::Shadowfax, "🔨 Process {} ignored SIGTERM, killing", pid);
            match pid.kill() {
                Ok(()) => killed += 1,
                Err(e) => subsystem_warn!(Subsystem::Shadowfax, "⚠️ {}", e),
            }
        }
        killed
    }
}
