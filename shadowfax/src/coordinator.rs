//! Change coordinator
//!
//! Turns classified template changes into one of two reactions: a direct
//! browser reload, or a full rebuild of the app. With
//! the stylesheet pipeline active, browser-visible changes are routed
//! through a stylesheet rebuild instead, and the "CSS rebuilt" signal that
//! follows decides whether browsers reload.

use std::fs::{File, FileTimes};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use shared::{
    Broadcaster, ChangeKind, DevState, Subsystem, logging, subsystem_debug, subsystem_info, subsystem_warn,
};
use supervisor::RebuildTrigger;

/// Bump the access and modification times of an existing file to now
///
/// The file is never created or truncated.
pub fn touch_file(path: &Path) -> io::Result<()> {
    let file = File::options().write(true).open(path)?;
    let now = SystemTime::now();
    file.set_times(FileTimes::new().set_accessed(now).set_modified(now))
}

pub struct Coordinator {
    broadcaster: Arc<Broadcaster>,
    state: Arc<DevState>,
    rebuild: RebuildTrigger,
    stylesheet_pipeline: bool,
    stylesheet_source: PathBuf,
}

impl Coordinator {
    pub fn new(
        broadcaster: Arc<Broadcaster>,
        state: Arc<DevState>,
        rebuild: RebuildTrigger,
        stylesheet_pipeline: bool,
        stylesheet_source: impl Into<PathBuf>,
    ) -> Self {
        Self {
            broadcaster,
            state,
            rebuild,
            stylesheet_pipeline,
            stylesheet_source: stylesheet_source.into(),
        }
    }

    /// React to one classified change
    pub fn handle_change(&self, change: ChangeKind) {
        match change {
            ChangeKind::None => {}
            ChangeKind::NeedsBrowserReload => self.reload_browsers(),
            ChangeKind::NeedsRestart => self.request_restart(),
        }
    }

    fn reload_browsers(&self) {
        if !self.stylesheet_pipeline {
            self.broadcast("template change");
            return;
        }

        // The stylesheet watcher picks the touch up and reports back
        if let Err(e) = touch_file(&self.stylesheet_source) {
            subsystem_warn!(
                Subsystem::Tailwind,
                "⚠️ Failed to touch {}: {}, reloading directly",
                self.stylesheet_source.display(),
                e
            );
            self.broadcast("template change");
        }
    }

    fn request_restart(&self) {
        self.state.rebuild_in_progress.set();

        if self.stylesheet_pipeline
            && let Err(e) = touch_file(&self.stylesheet_source)
        {
            subsystem_warn!(
                Subsystem::Tailwind,
                "⚠️ Failed to touch {}: {}",
                self.stylesheet_source.display(),
                e
            );
        }

        if !self.rebuild.request() {
            subsystem_debug!(Subsystem::Shadowfax, "Rebuild already queued");
        }
    }

    /// The stylesheet watcher finished a rebuild
    ///
    /// Broadcasts unless a full rebuild is underway; returns whether it
    /// broadcast.
    pub fn handle_css_rebuilt(&self) -> bool {
        if self.state.rebuild_in_progress.is_set() {
            subsystem_debug!(Subsystem::Tailwind, "CSS rebuilt during app rebuild, waiting for server");
            return false;
        }
        subsystem_info!(Subsystem::Tailwind, "🎨 CSS rebuilt");
        self.broadcast("stylesheet rebuild");
        true
    }

    /// The app became healthy after a rebuild
    pub fn handle_ready(&self) {
        self.state.rebuild_in_progress.clear();
    }

    fn broadcast(&self, cause: &str) {
        let delivered = self.broadcaster.broadcast();
        subsystem_debug!(Subsystem::Reload, "📡 Reload after {} delivered to {} listeners", cause, delivered);
    }

    /// Event loop; returns once `cancel` fires
    ///
    /// A closed input channel is no longer polled.
    pub async fn run(
        self,
        mut changes: mpsc::Receiver<ChangeKind>,
        mut css_rebuilt: mpsc::Receiver<()>,
        mut ready: mpsc::Receiver<()>,
        cancel: CancellationToken,
    ) {
        logging::log_startup(Subsystem::Shadowfax, "change coordinator");

        let mut changes_open = true;
        let mut css_open = true;
        let mut ready_open = true;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,

                change = changes.recv(), if changes_open => match change {
                    Some(change) => self.handle_change(change),
                    None => changes_open = false,
                },

                rebuilt = css_rebuilt.recv(), if css_open => match rebuilt {
                    Some(()) => {
                        self.handle_css_rebuilt();
                    }
                    None => css_open = false,
                },

                signal = ready.recv(), if ready_open => match signal {
                    Some(()) => self.handle_ready(),
                    None => ready_open = false,
                },
            }
        }

        logging::log_shutdown(Subsystem::Shadowfax, "change coordinator cancelled");
    }
}
