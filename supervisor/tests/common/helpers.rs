//! Builders and helpers for driving a mocked supervisor
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::any;
use tokio::net::TcpListener;
use tokio::process::Command;
use tokio::sync::mpsc;

use shared::{Broadcaster, DevState, TrackedPid};
use supervisor::traits::{MockHealthProbe, MockLauncher, MockToolchain};
use supervisor::{HeartbeatConfig, ReachabilityChecker, Supervisor, SupervisorConfig, SupervisorError};

pub type TestSupervisor = Supervisor<MockToolchain, MockLauncher, MockHealthProbe>;

/// Pids handed out by the mocked launcher, in launch order
#[derive(Debug, Clone, Default)]
pub struct LaunchLog(Arc<Mutex<Vec<u32>>>);

impl LaunchLog {
    pub fn pids(&self) -> Vec<u32> {
        self.0.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.0.lock().unwrap().len()
    }

    fn push(&self, pid: u32) {
        self.0.lock().unwrap().push(pid);
    }
}

/// Builder for supervisors wired to mocks with sensible defaults
pub struct SupervisorBuilder {
    config: SupervisorConfig,
    toolchain: MockToolchain,
    launcher: MockLauncher,
    probe: MockHealthProbe,
    broadcaster: Arc<Broadcaster>,
    state: Arc<DevState>,
    checker: Option<ReachabilityChecker>,
    ready_tx: Option<mpsc::Sender<()>>,
    builds: Arc<AtomicUsize>,
    launches: LaunchLog,
    probes: Arc<AtomicUsize>,
}

impl SupervisorBuilder {
    /// Successful builds, `sleep 30` as the app, always-healthy probe
    pub fn new() -> Self {
        let builds = Arc::new(AtomicUsize::new(0));
        let launches = LaunchLog::default();
        let probes = Arc::new(AtomicUsize::new(0));

        let mut toolchain = MockToolchain::new();
        let counter = builds.clone();
        toolchain
            .expect_build()
            .returning(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok(())
            })
            .times(0..);

        let mut launcher = MockLauncher::new();
        let log = launches.clone();
        launcher
            .expect_launch()
            .returning(move |_| {
                let child = TestHelpers::spawn_sleeper();
                if let Some(pid) = child.id() {
                    log.push(pid);
                }
                Ok(child)
            })
            .times(0..);

        let probe = Self::counting_probe(probes.clone(), true);

        let mut config = SupervisorConfig::new("tmp/bin/main", 0);
        config.stop_timeout = Duration::from_secs(1);

        Self {
            config,
            toolchain,
            launcher,
            probe,
            broadcaster: Arc::new(Broadcaster::new()),
            state: DevState::new(),
            checker: None,
            ready_tx: None,
            builds,
            launches,
            probes,
        }
    }

    fn counting_probe(probes: Arc<AtomicUsize>, healthy: bool) -> MockHealthProbe {
        let mut probe = MockHealthProbe::new();
        probe
            .expect_probe()
            .returning(move || {
                probes.fetch_add(1, Ordering::SeqCst);
                healthy
            })
            .times(0..);
        probe
    }

    /// Every build fails
    pub fn failing_build(mut self) -> Self {
        let mut toolchain = MockToolchain::new();
        let counter = self.builds.clone();
        toolchain
            .expect_build()
            .returning(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(SupervisorError::build("exit status: 2"))
            })
            .times(0..);
        self.toolchain = toolchain;
        self
    }

    /// Every probe reports the app as unhealthy
    pub fn unhealthy_probe(mut self) -> Self {
        self.probe = Self::counting_probe(self.probes.clone(), false);
        self
    }

    pub fn with_heartbeat(mut self, heartbeat: HeartbeatConfig) -> Self {
        self.config.heartbeat = heartbeat;
        self
    }

    pub fn with_reachability(mut self, addr: SocketAddr) -> Self {
        self.checker = Some(ReachabilityChecker::new(format!("http://{addr}/")).unwrap());
        self
    }

    pub fn with_ready_signal(mut self, ready_tx: mpsc::Sender<()>) -> Self {
        self.ready_tx = Some(ready_tx);
        self
    }

    pub fn broadcaster(&self) -> Arc<Broadcaster> {
        self.broadcaster.clone()
    }

    pub fn state(&self) -> Arc<DevState> {
        self.state.clone()
    }

    pub fn builds(&self) -> Arc<AtomicUsize> {
        self.builds.clone()
    }

    pub fn launches(&self) -> LaunchLog {
        self.launches.clone()
    }

    /// Number of heartbeat probes issued so far
    pub fn probes(&self) -> Arc<AtomicUsize> {
        self.probes.clone()
    }

    pub fn build(self) -> TestSupervisor {
        let mut supervisor = Supervisor::new(
            self.config,
            self.toolchain,
            self.launcher,
            self.probe,
            self.broadcaster,
            self.state,
        )
        .unwrap();
        if let Some(checker) = self.checker {
            supervisor = supervisor.with_reachability_checker(checker);
        }
        if let Some(ready_tx) = self.ready_tx {
            supervisor = supervisor.with_ready_signal(ready_tx);
        }
        supervisor
    }
}

impl Default for SupervisorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Helper functions for common test operations
pub struct TestHelpers;

impl TestHelpers {
    pub fn spawn_sleeper() -> tokio::process::Child {
        Command::new("sleep").arg("30").kill_on_drop(true).spawn().unwrap()
    }

    /// Serve every request with `status` on an ephemeral loopback port
    pub async fn status_server(status: StatusCode, delay: Duration) -> SocketAddr {
        let app = Router::new().fallback(any(move || async move {
            tokio::time::sleep(delay).await;
            status
        }));
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });
        addr
    }

    /// Heartbeat settings fast enough for tests
    pub fn fast_heartbeat(failure_threshold: u32) -> HeartbeatConfig {
        HeartbeatConfig {
            interval: Duration::from_millis(40),
            timeout: Duration::from_millis(20),
            failure_threshold,
            startup_grace: Duration::ZERO,
        }
    }

    /// Poll `condition` until it holds or `limit` elapses
    pub async fn eventually<F>(limit: Duration, mut condition: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let deadline = tokio::time::Instant::now() + limit;
        while tokio::time::Instant::now() < deadline {
            if condition() {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        condition()
    }

    pub fn is_alive(pid: u32) -> bool {
        TrackedPid(pid).is_alive()
    }
}
