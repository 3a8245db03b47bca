//! Shared test helpers

use std::net::SocketAddr;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::routing::any;
use tokio::net::TcpListener;

/// Serve every request with `status` on an ephemeral loopback port
pub async fn start_status_server(status: StatusCode, delay: Duration) -> SocketAddr {
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

/// Reserve a port and release it so nothing listens there
pub async fn unused_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap().port()
}
