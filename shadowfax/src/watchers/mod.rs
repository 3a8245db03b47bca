//! Change sources feeding the coordinator
//!
//! The Go source watcher uses filesystem notifications directly; the templ
//! and tailwind watchers wrap the external tools' own watch modes and
//! classify their output line by line.

pub mod source;
pub mod tailwind;
pub mod templ;

use std::time::Duration;

use tokio::process::Child;
use tokio::time::timeout;

use shared::{Subsystem, TrackedPid, subsystem_debug, subsystem_warn};

pub use source::SourceWatcher;
pub use tailwind::TailwindWatcher;
pub use templ::TemplWatcher;

/// How long a killed tool gets to be reaped
const REAP_TIMEOUT: Duration = Duration::from_millis(250);

/// Interrupt a tool, give it `grace` to exit, then kill it
pub(crate) async fn interrupt_then_kill(child: &mut Child, subsystem: Subsystem, grace: Duration) {
    if let Some(pid) = child.id()
        && let Err(e) = TrackedPid(pid).interrupt()
    {
        subsystem_debug!(subsystem, "Interrupt failed: {}", e);
    }

    if timeout(grace, child.wait()).await.is_ok() {
        return;
    }
    subsystem_warn!(subsystem, "🔨 Did not exit within {}s, killing", grace.as_secs());
    kill_and_reap(child, subsystem).await;
}

/// Kill a tool and wait briefly for it to be reaped
pub(crate) async fn kill_and_reap(child: &mut Child, subsystem: Subsystem) {
    if let Err(e) = child.start_kill() {
        subsystem_debug!(subsystem, "Kill failed: {}", e);
        return;
    }
    if timeout(REAP_TIMEOUT, child.wait()).await.is_err() {
        subsystem_warn!(subsystem, "⚠️ Process did not exit after kill");
    }
}
