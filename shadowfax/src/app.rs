//! Composition root
//!
//! Binds the proxy, starts the supervisor, the watchers and the
//! coordinator, then waits for a shutdown signal or the first fatal
//! subsystem error. Every subsystem shares one root cancellation token;
//! after it fires, tracked subprocesses are terminated before returning.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::coordinator::Coordinator;
use crate::error::{ShadowfaxError, ShadowfaxResult};
use crate::watchers::{SourceWatcher, TailwindWatcher, TemplWatcher, templ};
use proxy::{ProxyConfig, ProxyServer};
use shared::{
    Broadcaster, DevState, Subsystem, logging, subsystem_debug, subsystem_error, subsystem_info, subsystem_warn,
};
use supervisor::{
    BinaryLauncher, CommandToolchain, HttpHealthProbe, RebuildTrigger, Supervisor, SupervisorConfig,
};

/// Grace between SIGTERM and SIGKILL for leftover subprocesses
pub const CLEANUP_GRACE: Duration = Duration::from_millis(500);

/// Upper bound on waiting for subsystems after cancellation
const SUBSYSTEM_SHUTDOWN: Duration = Duration::from_secs(10);

const ERROR_QUEUE: usize = 5;

type ReportedError = (Subsystem, ShadowfaxError);

/// Run until Ctrl-C/SIGTERM or a fatal error; returns the exit code
pub async fn run(config: Config) -> ShadowfaxResult<i32> {
    run_until(config, shutdown_signal()).await
}

/// Run until `shutdown` completes or a subsystem fails
///
/// Binding the proxy happens before anything is spawned, so a taken port
/// is returned as an error with nothing left to clean up.
pub async fn run_until<S>(config: Config, shutdown: S) -> ShadowfaxResult<i32>
where
    S: Future<Output = ()>,
{
    let broadcaster = Arc::new(Broadcaster::new());
    let state = DevState::new();
    let cancel = CancellationToken::new();

    let proxy_config = ProxyConfig::new(config.proxy_port, config.app_port, &config.project_root);
    let proxy = ProxyServer::bind(&proxy_config, broadcaster.clone()).await?;

    let stylesheet_pipeline = config.stylesheet_pipeline();
    print_banner(&config, proxy.local_addr(), stylesheet_pipeline);

    let (rebuild, rebuild_rx) = RebuildTrigger::channel();
    let (ready_tx, ready_rx) = mpsc::channel(1);
    let (changes_tx, changes_rx) = mpsc::channel(templ::CHANGE_QUEUE);
    let (css_tx, css_rx) = mpsc::channel(1);
    let (errors_tx, mut errors_rx) = mpsc::channel::<ReportedError>(ERROR_QUEUE);

    let mut tasks = JoinSet::new();

    spawn_subsystem(&mut tasks, Subsystem::Proxy, &errors_tx, {
        let cancel = cancel.clone();
        async move { proxy.serve(cancel).await.map_err(ShadowfaxError::from) }
    });

    let supervisor = build_supervisor(&config, broadcaster.clone(), state.clone())?.with_ready_signal(ready_tx);
    spawn_subsystem(&mut tasks, Subsystem::AppServer, &errors_tx, {
        let cancel = cancel.clone();
        async move { supervisor.run(rebuild_rx, cancel).await.map_err(ShadowfaxError::from) }
    });

    let source_watcher = SourceWatcher::new(&config.project_root, config.verbose);
    spawn_subsystem(
        &mut tasks,
        Subsystem::GoWatcher,
        &errors_tx,
        source_watcher.run(rebuild.clone(), cancel.clone()),
    );

    let templ_watcher = TemplWatcher::new(&config, state.clone());
    spawn_subsystem(
        &mut tasks,
        Subsystem::Templ,
        &errors_tx,
        templ_watcher.run(changes_tx, cancel.clone()),
    );

    if stylesheet_pipeline {
        let tailwind_watcher = TailwindWatcher::new(&config, state.clone());
        spawn_subsystem(
            &mut tasks,
            Subsystem::Tailwind,
            &errors_tx,
            tailwind_watcher.run(css_tx, cancel.clone()),
        );
    } else {
        drop(css_tx);
    }

    let coordinator = Coordinator::new(
        broadcaster.clone(),
        state.clone(),
        rebuild,
        stylesheet_pipeline,
        &config.stylesheet_source,
    );
    tasks.spawn(coordinator.run(changes_rx, css_rx, ready_rx, cancel.clone()));

    // Only the subsystems hold senders now
    drop(errors_tx);

    let mut exit_code = 0;
    tokio::select! {
        _ = shutdown => logging::log_shutdown(Subsystem::Shadowfax, "signal received"),
        Some((subsystem, e)) = errors_rx.recv() => {
            logging::log_error(subsystem, "Subsystem", &e);
            exit_code = 1;
        }
    }
    cancel.cancel();

    let drained = timeout(SUBSYSTEM_SHUTDOWN, async {
        let mut panicked = false;
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined
                && e.is_panic()
            {
                subsystem_error!(Subsystem::Shadowfax, "❌ Subsystem task panicked: {}", e);
                panicked = true;
            }
        }
        panicked
    })
    .await;
    match drained {
        Ok(true) => exit_code = 1,
        Ok(false) => {}
        Err(_) => {
            subsystem_warn!(
                Subsystem::Shadowfax,
                "⏱️ Subsystems still running after {}s, aborting",
                SUBSYSTEM_SHUTDOWN.as_secs()
            );
            tasks.abort_all();
        }
    }

    // Errors raised while shutting down still count
    while let Ok((subsystem, e)) = errors_rx.try_recv() {
        logging::log_error(subsystem, "Subsystem", &e);
        exit_code = 1;
    }

    let killed = state.registry.terminate_all(CLEANUP_GRACE).await;
    if killed > 0 {
        subsystem_debug!(Subsystem::Shadowfax, "Force-killed {} processes", killed);
    }
    logging::log_success(Subsystem::Shadowfax, "Cleanup complete");

    Ok(exit_code)
}

fn build_supervisor(
    config: &Config,
    broadcaster: Arc<Broadcaster>,
    state: Arc<DevState>,
) -> ShadowfaxResult<Supervisor<CommandToolchain, BinaryLauncher, HttpHealthProbe>> {
    let mut supervisor_config = SupervisorConfig::new(&config.binary_path, config.app_port);
    supervisor_config.heartbeat = config.heartbeat.clone();

    let (program, args) = config
        .build_command
        .split_first()
        .map(|(program, args)| (program.clone(), args.to_vec()))
        .unwrap_or_default();
    let toolchain = CommandToolchain::new(program, args).with_working_dir(&config.project_root);
    let launcher = BinaryLauncher::new().with_working_dir(&config.project_root);
    let probe = HttpHealthProbe::new(format!("{}/", config.app_url()), config.heartbeat.timeout)?;

    Supervisor::new(supervisor_config, toolchain, launcher, probe, broadcaster, state).map_err(ShadowfaxError::from)
}

/// Spawn a fallible subsystem; its error goes to the error queue
fn spawn_subsystem<F>(tasks: &mut JoinSet<()>, subsystem: Subsystem, errors: &mpsc::Sender<ReportedError>, task: F)
where
    F: Future<Output = ShadowfaxResult<()>> + Send + 'static,
{
    let errors = errors.clone();
    tasks.spawn(async move {
        if let Err(e) = task.await
            && let Err(TrySendError::Full((subsystem, e)) | TrySendError::Closed((subsystem, e))) =
                errors.try_send((subsystem, e))
        {
            // Shutdown is already underway
            logging::log_error(subsystem, "Subsystem", &e);
        }
    });
}

fn print_banner(config: &Config, proxy_addr: SocketAddr, stylesheet_pipeline: bool) {
    subsystem_info!(Subsystem::Shadowfax, "⚡ shadowfax {}", env!("CARGO_PKG_VERSION"));
    subsystem_info!(Subsystem::Shadowfax, "🌐 Proxy:      http://localhost:{}", proxy_addr.port());
    subsystem_info!(Subsystem::Shadowfax, "🔧 App server: {} (internal)", config.app_url());
    subsystem_info!(Subsystem::Shadowfax, "🔥 TEMPL_DEV_MODE: enabled (fast template reloads)");
    if stylesheet_pipeline {
        subsystem_info!(Subsystem::Shadowfax, "🎨 Tailwind: enabled");
    }
}

/// Resolves on Ctrl-C or, on unix, SIGTERM
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            subsystem_warn!(Subsystem::Shadowfax, "⚠️ Cannot listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{SignalKind, signal};

        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                subsystem_warn!(Subsystem::Shadowfax, "⚠️ Cannot listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
