//! Readiness checks for a freshly started app process
//!
//! After every start a [`HealthMonitor`] polls the app until it answers,
//! then broadcasts the reload, clears the rebuild-in-progress flag and
//! signals readiness. Cancelling the monitor suppresses all three.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, timeout};
use tokio_util::sync::CancellationToken;

use crate::error::{SupervisorError, SupervisorResult};
use shared::{Broadcaster, DevState, Subsystem, subsystem_debug, subsystem_info, subsystem_warn};

/// Default per-request timeout of the generic reachability checker
pub const REACHABILITY_TIMEOUT: Duration = Duration::from_millis(500);

/// Delay before the first poll, giving a replaced process time to go away
const SETTLE_DELAY: Duration = Duration::from_millis(100);
const POLL_INTERVAL: Duration = Duration::from_millis(100);
const READY_TIMEOUT: Duration = Duration::from_secs(30);
/// Grace between the first successful answer and the broadcast
const BROADCAST_DELAY: Duration = Duration::from_millis(50);

/// Generic HEAD checker: any response at all counts as healthy
#[derive(Debug, Clone)]
pub struct ReachabilityChecker {
    url: String,
    client: reqwest::Client,
}

impl ReachabilityChecker {
    pub fn new(url: impl Into<String>) -> SupervisorResult<Self> {
        Self::with_timeout(url, REACHABILITY_TIMEOUT)
    }

    pub fn with_timeout(url: impl Into<String>, timeout: Duration) -> SupervisorResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            url: url.into(),
            client,
        })
    }

    pub fn for_port(port: u16) -> SupervisorResult<Self> {
        Self::new(format!("http://localhost:{port}/"))
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn is_healthy(&self) -> bool {
        self.client.head(&self.url).send().await.is_ok()
    }
}

/// Poll until the checker reports healthy or `cancel` fires
pub async fn wait_for_healthy(
    checker: &ReachabilityChecker,
    cancel: &CancellationToken,
    poll_interval: Duration,
) -> SupervisorResult<()> {
    let mut ticker = interval(poll_interval);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => return Err(SupervisorError::Cancelled),
            _ = ticker.tick() => {
                let healthy = tokio::select! {
                    _ = cancel.cancelled() => return Err(SupervisorError::Cancelled),
                    healthy = checker.is_healthy() => healthy,
                };
                if healthy {
                    return Ok(());
                }
            }
        }
    }
}

/// Background task waiting for one app start to become healthy
#[derive(Debug)]
pub struct HealthMonitor {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl HealthMonitor {
    /// Start monitoring; `parent` cancellation also stops the monitor
    pub fn spawn(
        checker: ReachabilityChecker,
        broadcaster: Arc<Broadcaster>,
        state: Arc<DevState>,
        ready_tx: Option<mpsc::Sender<()>>,
        parent: &CancellationToken,
    ) -> Self {
        let cancel = parent.child_token();
        let token = cancel.clone();
        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => return,
                _ = sleep(SETTLE_DELAY) => {}
            }

            match timeout(READY_TIMEOUT, wait_for_healthy(&checker, &token, POLL_INTERVAL)).await {
                Ok(Ok(())) => {}
                Ok(Err(_)) => return,
                Err(_) => {
                    let err = SupervisorError::HealthTimeout {
                        seconds: READY_TIMEOUT.as_secs(),
                    };
                    subsystem_warn!(Subsystem::AppServer, "⏱️ {}", err);
                    return;
                }
            }

            tokio::select! {
                _ = token.cancelled() => return,
                _ = sleep(BROADCAST_DELAY) => {}
            }
            if token.is_cancelled() {
                return;
            }

            let delivered = broadcaster.broadcast();
            state.rebuild_in_progress.clear();
            subsystem_info!(Subsystem::AppServer, "✅ Server healthy, broadcasting reload");
            subsystem_debug!(Subsystem::Reload, "📡 Reload delivered to {} listeners", delivered);

            if let Some(ready_tx) = ready_tx {
                // Dropped when a ready signal is already pending
                let _ = ready_tx.try_send(());
            }
        });

        Self { cancel, handle }
    }

    /// Stop the monitor without emitting anything
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }
}

impl Drop for HealthMonitor {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
