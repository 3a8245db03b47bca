//! Tests for readiness checking and the health monitor

use std::sync::Arc;
use std::time::Duration;

use axum::http::StatusCode;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use super::helpers::{start_status_server, unused_port};
use crate::health::{HealthMonitor, ReachabilityChecker, wait_for_healthy};
use crate::services::HttpHealthProbe;
use crate::traits::HealthProbe;
use shared::{Broadcaster, DevState};

#[tokio::test]
async fn test_probe_healthy_for_ok() {
    let addr = start_status_server(StatusCode::OK, Duration::ZERO).await;
    let probe = HttpHealthProbe::new(format!("http://{addr}/"), Duration::from_millis(700)).unwrap();

    assert!(probe.probe().await);
}

#[tokio::test]
async fn test_probe_healthy_for_client_error() {
    let addr = start_status_server(StatusCode::NOT_FOUND, Duration::ZERO).await;
    let probe = HttpHealthProbe::new(format!("http://{addr}/"), Duration::from_millis(700)).unwrap();

    assert!(probe.probe().await);
}

#[tokio::test]
async fn test_probe_unhealthy_for_server_error() {
    let addr = start_status_server(StatusCode::INTERNAL_SERVER_ERROR, Duration::ZERO).await;
    let probe = HttpHealthProbe::new(format!("http://{addr}/"), Duration::from_millis(700)).unwrap();

    assert!(!probe.probe().await);
}

#[tokio::test]
async fn test_probe_unhealthy_on_timeout() {
    let addr = start_status_server(StatusCode::OK, Duration::from_millis(250)).await;
    let probe = HttpHealthProbe::new(format!("http://{addr}/"), Duration::from_millis(50)).unwrap();

    assert!(!probe.probe().await);
}

#[test]
fn test_clients_build_for_any_timeout() {
    tokio_test::assert_ok!(HttpHealthProbe::for_port(8080));
    tokio_test::assert_ok!(HttpHealthProbe::new("http://localhost:8080/", Duration::from_millis(1)));
    tokio_test::assert_ok!(ReachabilityChecker::with_timeout("http://localhost:8080/", Duration::from_secs(60)));
}

#[tokio::test]
async fn test_reachability_counts_any_response() {
    let addr = start_status_server(StatusCode::INTERNAL_SERVER_ERROR, Duration::ZERO).await;
    let checker = ReachabilityChecker::new(format!("http://{addr}/")).unwrap();

    assert!(checker.is_healthy().await);
}

#[tokio::test]
async fn test_reachability_fails_without_listener() {
    let port = unused_port().await;
    let checker = ReachabilityChecker::for_port(port).unwrap();

    assert!(!checker.is_healthy().await);
}

#[tokio::test]
async fn test_wait_for_healthy_observes_cancellation() {
    let port = unused_port().await;
    let checker = ReachabilityChecker::for_port(port).unwrap();
    let cancel = CancellationToken::new();

    let waiter = {
        let cancel = cancel.clone();
        tokio::spawn(async move { wait_for_healthy(&checker, &cancel, Duration::from_millis(20)).await })
    };
    tokio::time::sleep(Duration::from_millis(60)).await;
    cancel.cancel();

    let result = timeout(Duration::from_secs(1), waiter).await.unwrap().unwrap();
    assert!(result.is_err());
}

#[tokio::test]
async fn test_monitor_signals_ready_and_clears_rebuild_flag() {
    let addr = start_status_server(StatusCode::OK, Duration::ZERO).await;
    let broadcaster = Arc::new(Broadcaster::new());
    let mut listener = broadcaster.subscribe();
    let state = DevState::new();
    state.rebuild_in_progress.set();
    let (ready_tx, mut ready_rx) = mpsc::channel(1);
    let root = CancellationToken::new();

    let _monitor = HealthMonitor::spawn(
        ReachabilityChecker::new(format!("http://{addr}/")).unwrap(),
        broadcaster.clone(),
        state.clone(),
        Some(ready_tx),
        &root,
    );

    let ready = timeout(Duration::from_secs(3), ready_rx.recv()).await;
    assert_eq!(ready.ok().flatten(), Some(()));
    assert!(!state.rebuild_in_progress.is_set());
    assert_eq!(listener.try_recv(), Ok(()));
}

#[tokio::test]
async fn test_cancelled_monitor_never_signals() {
    let port = unused_port().await;
    let broadcaster = Arc::new(Broadcaster::new());
    let mut listener = broadcaster.subscribe();
    let state = DevState::new();
    state.rebuild_in_progress.set();
    let (ready_tx, mut ready_rx) = mpsc::channel(1);
    let root = CancellationToken::new();

    let monitor = HealthMonitor::spawn(
        ReachabilityChecker::for_port(port).unwrap(),
        broadcaster.clone(),
        state.clone(),
        Some(ready_tx),
        &root,
    );
    monitor.cancel();

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert!(monitor.is_finished());
    assert!(ready_rx.try_recv().is_err());
    assert!(state.rebuild_in_progress.is_set());
    assert!(listener.try_recv().is_err());
}
