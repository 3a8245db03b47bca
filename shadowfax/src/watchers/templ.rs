//! templ generate watcher
//!
//! Runs `templ generate --watch` and classifies its diagnostic output.
//! After each regeneration templ prints a post-generation line saying
//! whether the app must restart (Go code changed) or a browser reload is
//! enough (only template text changed).

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::interrupt_then_kill;
use crate::config::Config;
use crate::error::{ShadowfaxError, ShadowfaxResult};
use shared::{
    ChangeKind, DevState, Subsystem, logging, subsystem_debug, subsystem_error, subsystem_info, subsystem_warn,
};

/// Arguments for `templ generate` in watch mode
pub const TEMPL_ARGS: [&str; 6] = [
    "generate",
    "--watch",
    "--log-level",
    "debug",
    "--watch-pattern",
    r"(.+\.templ$)",
];

/// Capacity of the classified change queue
pub const CHANGE_QUEUE: usize = 64;

const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

const WARNING_MARKER: &str = "(!)";
const ERROR_MARKER: &str = "(✗)";
const ERROR_CLEARED_MARKER: &str = "(✓) Error cleared";
const POST_GENERATION_MARKER: &str = "(✓) Post-generation event received, processing...";
const NEEDS_RESTART_MARKER: &str = "needsRestart=true";
const NEEDS_BROWSER_RELOAD_MARKER: &str = "needsBrowserReload=true";

/// One classified line of templ output
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TemplLine {
    Warning,
    Error,
    ErrorCleared,
    /// A post-generation event; the kind may be `None`
    PostGeneration(ChangeKind),
    Other,
}

/// Classify a single line of templ's stderr
pub fn classify_line(line: &str) -> TemplLine {
    if line.starts_with(POST_GENERATION_MARKER) {
        // A restart subsumes a browser reload
        let kind = if line.contains(NEEDS_RESTART_MARKER) {
            ChangeKind::NeedsRestart
        } else if line.contains(NEEDS_BROWSER_RELOAD_MARKER) {
            ChangeKind::NeedsBrowserReload
        } else {
            ChangeKind::None
        };
        return TemplLine::PostGeneration(kind);
    }
    if line.contains(ERROR_CLEARED_MARKER) {
        return TemplLine::ErrorCleared;
    }
    if line.contains(ERROR_MARKER) {
        return TemplLine::Error;
    }
    if line.contains(WARNING_MARKER) {
        return TemplLine::Warning;
    }
    TemplLine::Other
}

#[derive(Debug, Clone)]
pub struct TemplWatcher {
    binary: PathBuf,
    working_dir: PathBuf,
    verbose: bool,
    state: Arc<DevState>,
}

impl TemplWatcher {
    pub fn new(config: &Config, state: Arc<DevState>) -> Self {
        Self {
            binary: config.templ_bin.clone(),
            working_dir: config.project_root.clone(),
            verbose: config.verbose,
            state,
        }
    }

    /// Run templ until cancelled or until it exits on its own
    ///
    /// Classified changes are offered to `changes` without blocking; a full
    /// queue drops the change.
    pub async fn run(self, changes: mpsc::Sender<ChangeKind>, cancel: CancellationToken) -> ShadowfaxResult<()> {
        logging::log_startup(Subsystem::Templ, "templ watcher");

        let mut child = Command::new(&self.binary)
            .args(TEMPL_ARGS)
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| {
                ShadowfaxError::watcher(
                    Subsystem::Templ.to_string(),
                    format!("failed to start {}: {e}", self.binary.display()),
                )
            })?;
        self.state.track_process(child.id());

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(scan_output(stderr, changes, self.verbose));
        }

        let exited = tokio::select! {
            _ = cancel.cancelled() => None,
            status = child.wait() => Some(status),
        };

        match exited {
            None => {
                interrupt_then_kill(&mut child, Subsystem::Templ, SHUTDOWN_GRACE).await;
                logging::log_shutdown(Subsystem::Templ, "cancelled");
                Ok(())
            }
            Some(Ok(status)) if status.success() => Ok(()),
            Some(Ok(status)) => Err(ShadowfaxError::watcher(
                Subsystem::Templ.to_string(),
                format!("templ exited with {status}"),
            )),
            Some(Err(e)) => Err(e.into()),
        }
    }
}

async fn scan_output<R>(output: R, changes: mpsc::Sender<ChangeKind>, verbose: bool)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(output).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break,
            Err(e) => {
                subsystem_debug!(Subsystem::Templ, "Output stream error: {}", e);
                break;
            }
        };

        if verbose {
            subsystem_debug!(Subsystem::Templ, "{}", line);
        }

        match classify_line(&line) {
            TemplLine::Warning => subsystem_warn!(Subsystem::Templ, "⚠️ {}", line),
            TemplLine::Error => subsystem_error!(Subsystem::Templ, "❌ {}", line),
            TemplLine::ErrorCleared => subsystem_info!(Subsystem::Templ, "✅ Error cleared"),
            TemplLine::PostGeneration(ChangeKind::None) | TemplLine::Other => {}
            TemplLine::PostGeneration(kind) => {
                subsystem_debug!(Subsystem::Templ, "Templates regenerated: {}", kind);
                if changes.try_send(kind).is_err() {
                    subsystem_debug!(Subsystem::Templ, "Change queue full, dropping {}", kind);
                }
            }
        }
    }
}
