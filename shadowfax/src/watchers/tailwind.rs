//! Tailwind CLI watcher
//!
//! Runs the standalone tailwind CLI in watch mode and reports each
//! finished stylesheet build. The CLI prints its "Done in ..." line on
//! either stream depending on version, so both are scanned.

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use super::kill_and_reap;
use crate::config::Config;
use crate::error::{ShadowfaxError, ShadowfaxResult};
use shared::{DevState, Subsystem, logging, subsystem_debug, subsystem_error};

/// Minimum spacing between two reported rebuilds
pub const REBUILD_DEBOUNCE: Duration = Duration::from_millis(250);

const DONE_MARKER: &str = "Done in";

pub fn is_rebuild_done_line(line: &str) -> bool {
    line.contains(DONE_MARKER)
}

/// Lock-free leading-edge debounce shared by the stdout and stderr scanners
#[derive(Debug)]
pub struct RebuildDebounce {
    epoch: Instant,
    window: Duration,
    /// Nanoseconds since `epoch` of the last emitted rebuild; 0 = never
    last: AtomicU64,
}

impl RebuildDebounce {
    pub fn new(window: Duration) -> Self {
        Self {
            epoch: Instant::now(),
            window,
            last: AtomicU64::new(0),
        }
    }

    /// Claim the right to emit; false while inside the window of the
    /// previous emission
    pub fn should_emit(&self) -> bool {
        // Offset by one so the very first instant never reads as "never"
        let now = u64::try_from(self.epoch.elapsed().as_nanos())
            .unwrap_or(u64::MAX)
            .saturating_add(1);
        let window = u64::try_from(self.window.as_nanos()).unwrap_or(u64::MAX);

        let mut last = self.last.load(Ordering::Acquire);
        loop {
            if last != 0 && now.saturating_sub(last) < window {
                return false;
            }
            match self
                .last
                .compare_exchange_weak(last, now, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => return true,
                Err(current) => last = current,
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct TailwindWatcher {
    binary: PathBuf,
    working_dir: PathBuf,
    input: PathBuf,
    output: PathBuf,
    verbose: bool,
    state: Arc<DevState>,
}

impl TailwindWatcher {
    pub fn new(config: &Config, state: Arc<DevState>) -> Self {
        Self {
            binary: config.tailwind_bin.clone(),
            working_dir: config.project_root.clone(),
            input: config.stylesheet_source.clone(),
            output: config.stylesheet_output.clone(),
            verbose: config.verbose,
            state,
        }
    }

    /// Run the CLI until cancelled; cancellation kills it and is not an
    /// error
    pub async fn run(self, css_rebuilt: mpsc::Sender<()>, cancel: CancellationToken) -> ShadowfaxResult<()> {
        logging::log_startup(Subsystem::Tailwind, "tailwind watcher");

        let spawned = Command::new(&self.binary)
            .arg("-i")
            .arg(&self.input)
            .arg("-o")
            .arg(&self.output)
            .arg("--watch=always")
            .current_dir(&self.working_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn();
        let mut child = match spawned {
            Ok(child) => child,
            Err(e) => {
                subsystem_error!(Subsystem::Tailwind, "❌ Tailwind CLI not found. Run 'andurel sync' to download it.");
                return Err(ShadowfaxError::watcher(
                    Subsystem::Tailwind.to_string(),
                    format!("failed to start {}: {e}", self.binary.display()),
                ));
            }
        };
        self.state.track_process(child.id());

        let debounce = Arc::new(RebuildDebounce::new(REBUILD_DEBOUNCE));
        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(scan_output(stdout, css_rebuilt.clone(), debounce.clone(), self.verbose));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(scan_output(stderr, css_rebuilt, debounce, self.verbose));
        }

        let exited = tokio::select! {
            _ = cancel.cancelled() => None,
            status = child.wait() => Some(status),
        };

        match exited {
            None => {
                kill_and_reap(&mut child, Subsystem::Tailwind).await;
                logging::log_shutdown(Subsystem::Tailwind, "cancelled");
                Ok(())
            }
            Some(Ok(status)) if status.success() => Ok(()),
            Some(Ok(status)) => Err(ShadowfaxError::watcher(
                Subsystem::Tailwind.to_string(),
                format!("tailwind exited with {status}"),
            )),
            Some(Err(e)) => Err(e.into()),
        }
    }
}

async fn scan_output<R>(output: R, css_rebuilt: mpsc::Sender<()>, debounce: Arc<RebuildDebounce>, verbose: bool)
where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(output).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        if verbose {
            subsystem_debug!(Subsystem::Tailwind, "{}", line);
        }
        // Dropped when a signal is already pending
        if is_rebuild_done_line(&line) && debounce.should_emit() {
            let _ = css_rebuilt.try_send(());
        }
    }
}
