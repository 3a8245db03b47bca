//! Common test utilities for the shadowfax test suites
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use shadowfax::Coordinator;
use shared::{Broadcaster, ChangeKind, DevState, Subscriber};
use supervisor::RebuildTrigger;

/// A coordinator wired to test channels and a temporary project
pub struct CoordinatorHarness {
    pub project: TempDir,
    pub stylesheet: PathBuf,
    pub broadcaster: Arc<Broadcaster>,
    pub state: Arc<DevState>,
    pub subscriber: Subscriber,
    pub rebuild_rx: mpsc::Receiver<()>,
    pub coordinator: Coordinator,
}

/// Builder for [`CoordinatorHarness`]
pub struct CoordinatorBuilder {
    stylesheet_pipeline: bool,
    create_stylesheet: bool,
}

impl CoordinatorBuilder {
    pub fn new() -> Self {
        Self {
            stylesheet_pipeline: false,
            create_stylesheet: true,
        }
    }

    pub fn with_stylesheet_pipeline(mut self) -> Self {
        self.stylesheet_pipeline = true;
        self
    }

    /// Leave `css/base.css` out so touching it fails
    pub fn without_stylesheet(mut self) -> Self {
        self.create_stylesheet = false;
        self
    }

    pub fn build(self) -> CoordinatorHarness {
        let project = TempDir::new().unwrap();
        let stylesheet = project.path().join("css").join("base.css");
        if self.create_stylesheet {
            std::fs::create_dir_all(stylesheet.parent().unwrap()).unwrap();
            std::fs::write(&stylesheet, "@import \"tailwindcss\";").unwrap();
            set_stale(&stylesheet);
        }

        let broadcaster = Arc::new(Broadcaster::with_debounce(Duration::ZERO));
        let subscriber = broadcaster.subscribe();
        let state = DevState::new();
        let (trigger, rebuild_rx) = RebuildTrigger::channel();

        let coordinator = Coordinator::new(
            broadcaster.clone(),
            state.clone(),
            trigger,
            self.stylesheet_pipeline,
            &stylesheet,
        );

        CoordinatorHarness {
            project,
            stylesheet,
            broadcaster,
            state,
            subscriber,
            rebuild_rx,
            coordinator,
        }
    }
}

/// Channels feeding a coordinator running in the background
pub struct RunningCoordinator {
    pub changes: mpsc::Sender<ChangeKind>,
    pub css_rebuilt: mpsc::Sender<()>,
    pub ready: mpsc::Sender<()>,
    pub cancel: CancellationToken,
    pub handle: JoinHandle<()>,
}

impl CoordinatorHarness {
    /// Move the coordinator into its event loop
    ///
    /// [`HarnessParts`] keeps the project directory alive.
    pub fn spawn(self) -> (RunningCoordinator, HarnessParts) {
        let (changes, changes_rx) = mpsc::channel(64);
        let (css_rebuilt, css_rx) = mpsc::channel(1);
        let (ready, ready_rx) = mpsc::channel(1);
        let cancel = CancellationToken::new();

        let handle = tokio::spawn(self.coordinator.run(changes_rx, css_rx, ready_rx, cancel.clone()));

        (
            RunningCoordinator {
                changes,
                css_rebuilt,
                ready,
                cancel,
                handle,
            },
            HarnessParts {
                _project: self.project,
                stylesheet: self.stylesheet,
                broadcaster: self.broadcaster,
                state: self.state,
                subscriber: self.subscriber,
                rebuild_rx: self.rebuild_rx,
            },
        )
    }
}

/// What stays with the test after the coordinator is spawned
pub struct HarnessParts {
    _project: TempDir,
    pub stylesheet: PathBuf,
    pub broadcaster: Arc<Broadcaster>,
    pub state: Arc<DevState>,
    pub subscriber: Subscriber,
    pub rebuild_rx: mpsc::Receiver<()>,
}

/// Push a file's modification time an hour into the past
pub fn set_stale(path: &Path) {
    let past = std::time::SystemTime::now() - Duration::from_secs(3600);
    std::fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(past)
        .unwrap();
}

/// Whether the file was modified within the last minute
pub fn recently_touched(path: &Path) -> bool {
    let modified = std::fs::metadata(path).unwrap().modified().unwrap();
    modified.elapsed().map(|age| age < Duration::from_secs(60)).unwrap_or(true)
}

/// Poll `condition` every 10 ms until it holds or `within` elapses
pub async fn eventually<F>(within: Duration, mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = tokio::time::Instant::now() + within;
    while tokio::time::Instant::now() < deadline {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

/// Write an executable shell script at `root/relative`
#[cfg(unix)]
pub fn write_script(root: &Path, relative: &str, body: &str) -> PathBuf {
    use std::os::unix::fs::PermissionsExt;

    let path = root.join(relative);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// A loopback port nothing is listening on
pub fn unused_port() -> u16 {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().port()
}
