//! Supervisor loop for the app process
//!
//! Lifecycle per process: `Stopped -> Building -> Starting -> Running ->
//! Stopping -> Stopped`. Two external triggers drive it (rebuild requests
//! and the root cancellation) plus one internal trigger, the heartbeat's
//! restart verdict.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::process::Child;
use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at, timeout};
use tokio_util::sync::CancellationToken;

use crate::error::{SupervisorError, SupervisorResult};
use crate::health::{HealthMonitor, ReachabilityChecker};
use crate::heartbeat::HeartbeatState;
use crate::traits::{HealthProbe, Launcher, Toolchain};
use shared::{
    Broadcaster, DevState, Subsystem, TrackedPid, logging, subsystem_debug, subsystem_error, subsystem_info,
    subsystem_warn,
};

/// Heartbeat tuning
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    pub interval: Duration,
    pub timeout: Duration,
    pub failure_threshold: u32,
    pub startup_grace: Duration,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(3),
            timeout: Duration::from_millis(700),
            failure_threshold: 3,
            startup_grace: Duration::from_secs(4),
        }
    }
}

/// Static configuration of the supervised app
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Compiled binary produced by the toolchain
    pub binary_path: PathBuf,
    /// Port the app listens on
    pub app_port: u16,
    pub heartbeat: HeartbeatConfig,
    /// How long a SIGTERM'd process gets before it is killed
    pub stop_timeout: Duration,
}

impl SupervisorConfig {
    pub fn new(binary_path: impl Into<PathBuf>, app_port: u16) -> Self {
        Self {
            binary_path: binary_path.into(),
            app_port,
            heartbeat: HeartbeatConfig::default(),
            stop_timeout: Duration::from_secs(3),
        }
    }
}

/// Lifecycle state of the supervised process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Stopped,
    Building,
    Starting,
    Running,
    Stopping,
}

/// Sender half of the coalescing rebuild channel
#[derive(Debug, Clone)]
pub struct RebuildTrigger(mpsc::Sender<()>);

impl RebuildTrigger {
    /// Capacity 1: at most one rebuild is ever queued
    pub fn channel() -> (Self, mpsc::Receiver<()>) {
        let (tx, rx) = mpsc::channel(1);
        (Self(tx), rx)
    }

    /// Queue a rebuild; returns false when one was already pending
    pub fn request(&self) -> bool {
        self.0.try_send(()).is_ok()
    }
}

/// The running child and what it was started from
#[derive(Debug)]
struct SupervisedProcess {
    binary_path: PathBuf,
    child: Child,
    pid: Option<u32>,
    started_at: Instant,
}

/// Owns the build → run → monitor → stop lifecycle of the app
pub struct Supervisor<T, L, P>
where
    T: Toolchain + 'static,
    L: Launcher + 'static,
    P: HealthProbe + 'static,
{
    config: SupervisorConfig,

    /// Injected services
    toolchain: T,
    launcher: L,
    probe: P,

    broadcaster: Arc<Broadcaster>,
    state: Arc<DevState>,
    ready_tx: Option<mpsc::Sender<()>>,
    checker: ReachabilityChecker,

    process: Option<SupervisedProcess>,
    lifecycle: ProcessState,
    heartbeat: HeartbeatState,
    monitor: Option<HealthMonitor>,
}

impl<T, L, P> Supervisor<T, L, P>
where
    T: Toolchain + 'static,
    L: Launcher + 'static,
    P: HealthProbe + 'static,
{
    /// Create new supervisor with injected dependencies
    pub fn new(
        config: SupervisorConfig,
        toolchain: T,
        launcher: L,
        probe: P,
        broadcaster: Arc<Broadcaster>,
        state: Arc<DevState>,
    ) -> SupervisorResult<Self> {
        let heartbeat = HeartbeatState::new(config.heartbeat.failure_threshold);
        let checker = ReachabilityChecker::for_port(config.app_port)?;
        Ok(Self {
            config,
            toolchain,
            launcher,
            probe,
            broadcaster,
            state,
            ready_tx: None,
            checker,
            process: None,
            lifecycle: ProcessState::Stopped,
            heartbeat,
            monitor: None,
        })
    }

    /// Signal `ready_tx` every time a new process becomes healthy (fluent API)
    pub fn with_ready_signal(mut self, ready_tx: mpsc::Sender<()>) -> Self {
        self.ready_tx = Some(ready_tx);
        self
    }

    /// Override the readiness checker used after each start (fluent API)
    pub fn with_reachability_checker(mut self, checker: ReachabilityChecker) -> Self {
        self.checker = checker;
        self
    }

    pub fn state(&self) -> ProcessState {
        self.lifecycle
    }

    pub fn pid(&self) -> Option<u32> {
        self.process.as_ref().and_then(|p| p.pid)
    }

    pub fn heartbeat(&self) -> &HeartbeatState {
        &self.heartbeat
    }

    /// Main loop: initial build, then react to rebuilds, heartbeats and
    /// cancellation until cancelled
    pub async fn run(mut self, mut rebuild_rx: mpsc::Receiver<()>, cancel: CancellationToken) -> SupervisorResult<()> {
        logging::log_startup(Subsystem::AppServer, "app server supervisor");

        if let Err(e) = self.rebuild(&cancel).await {
            subsystem_error!(Subsystem::AppServer, "❌ Initial build failed: {}", e);
        }

        let period = self.config.heartbeat.interval;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut triggers_open = true;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    self.stop().await;
                    logging::log_shutdown(Subsystem::AppServer, "cancelled");
                    return Ok(());
                }

                trigger = rebuild_rx.recv(), if triggers_open => match trigger {
                    Some(()) => {
                        self.stop().await;
                        if let Err(e) = self.rebuild(&cancel).await {
                            subsystem_error!(Subsystem::AppServer, "❌ Build failed: {}", e);
                        }
                    }
                    None => {
                        subsystem_debug!(Subsystem::AppServer, "Rebuild trigger channel closed");
                        triggers_open = false;
                    }
                },

                _ = ticker.tick() => self.heartbeat_tick(&cancel).await,
            }
        }
    }

    /// Build the app and start the new binary
    ///
    /// A failed build or launch leaves the supervisor stopped; nothing is
    /// retried until the next trigger.
    pub async fn rebuild(&mut self, cancel: &CancellationToken) -> SupervisorResult<()> {
        self.state.rebuild_in_progress.set();

        let result = self.build_and_start(cancel).await;
        if result.is_err() {
            // No process will become healthy, so nobody else clears the flag
            self.state.rebuild_in_progress.clear();
            self.lifecycle = ProcessState::Stopped;
        }
        result
    }

    async fn build_and_start(&mut self, cancel: &CancellationToken) -> SupervisorResult<()> {
        self.lifecycle = ProcessState::Building;
        subsystem_info!(Subsystem::AppServer, "🔨 Building...");

        tokio::select! {
            _ = cancel.cancelled() => return Err(SupervisorError::Cancelled),
            built = self.toolchain.build() => built?,
        }

        self.lifecycle = ProcessState::Starting;
        subsystem_info!(Subsystem::AppServer, "🚀 Starting server...");

        let binary_path = self.config.binary_path.clone();
        let child = self.launcher.launch(&binary_path).await?;
        let pid = child.id();
        self.state.track_process(pid);

        self.process = Some(SupervisedProcess {
            binary_path,
            child,
            pid,
            started_at: Instant::now(),
        });
        self.heartbeat.reset();
        self.start_health_monitor(cancel);
        self.lifecycle = ProcessState::Running;

        subsystem_debug!(
            Subsystem::AppServer,
            "Started {} (PID: {})",
            self.config.binary_path.display(),
            pid.map(|p| p.to_string()).unwrap_or_else(|| "unknown".to_string())
        );
        Ok(())
    }

    fn start_health_monitor(&mut self, cancel: &CancellationToken) {
        self.cancel_health_monitor();
        self.monitor = Some(HealthMonitor::spawn(
            self.checker.clone(),
            self.broadcaster.clone(),
            self.state.clone(),
            self.ready_tx.clone(),
            cancel,
        ));
    }

    fn cancel_health_monitor(&mut self) {
        if let Some(monitor) = self.monitor.take() {
            monitor.cancel();
        }
    }

    /// Stop the running process: SIGTERM, bounded wait, then kill
    ///
    /// A no-op when nothing is running.
    pub async fn stop(&mut self) {
        self.cancel_health_monitor();

        let Some(mut process) = self.process.take() else {
            self.lifecycle = ProcessState::Stopped;
            return;
        };
        self.lifecycle = ProcessState::Stopping;

        let signalled = match process.pid {
            Some(pid) => TrackedPid(pid).terminate().is_ok(),
            None => false,
        };

        let exited = signalled && timeout(self.config.stop_timeout, process.child.wait()).await.is_ok();
        if !exited {
            subsystem_warn!(
                Subsystem::AppServer,
                "🔨 {} did not exit in {}s, killing",
                process.binary_path.display(),
                self.config.stop_timeout.as_secs()
            );
            if let Err(e) = process.child.kill().await {
                subsystem_debug!(Subsystem::AppServer, "Kill fallback: {}", e);
            }
        }

        self.lifecycle = ProcessState::Stopped;
        subsystem_debug!(Subsystem::AppServer, "🛑 Stopped app server");
    }

    async fn heartbeat_tick(&mut self, cancel: &CancellationToken) {
        // Skip while nothing runs or the process is still booting
        let within_grace = match &self.process {
            None => return,
            Some(process) => process.started_at.elapsed() < self.config.heartbeat.startup_grace,
        };
        if within_grace {
            return;
        }

        let healthy = tokio::select! {
            _ = cancel.cancelled() => return,
            healthy = self.probe.probe() => healthy,
        };

        let verdict = self.heartbeat.observe(healthy);
        if verdict.recovered {
            subsystem_info!(Subsystem::AppServer, "💚 Heartbeat recovered");
        }
        if !healthy && !verdict.restart {
            subsystem_debug!(
                Subsystem::AppServer,
                "Heartbeat check failed ({}/{})",
                self.heartbeat.consecutive_failures(),
                self.heartbeat.failure_threshold()
            );
        }
        if !verdict.restart {
            return;
        }

        subsystem_warn!(
            Subsystem::AppServer,
            "💔 Heartbeat failed {} consecutive checks, restarting app server...",
            self.heartbeat.failure_threshold()
        );
        self.stop().await;
        if let Err(e) = self.rebuild(cancel).await {
            subsystem_error!(Subsystem::AppServer, "❌ Build failed during heartbeat recovery: {}", e);
        }
    }
}
