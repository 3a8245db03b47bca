//! Common test infrastructure for the proxy test suites
#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use axum::routing::get;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use proxy::websocket::ChannelTimings;
use proxy::{ContentEncoding, ProxyConfig, ProxyResult, ProxyServer};
use shared::Broadcaster;

pub const PAGE: &str =
    r#"<html><head><link rel="stylesheet" href="/assets/css/1770715671/style.css"></head><body>hello</body></html>"#;
pub const STYLESHEET: &str = "body { color: rebeccapurple; }";

/// A running proxy plus everything a test needs to poke at it
pub struct TestProxy {
    pub addr: SocketAddr,
    pub broadcaster: Arc<Broadcaster>,
    pub cancel: CancellationToken,
    pub handle: JoinHandle<ProxyResult<()>>,
    _project: TempDir,
}

impl TestProxy {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}{}", self.addr, proxy::EVENTS_PATH)
    }
}

/// Fixed-route app standing in for the supervised process
pub async fn start_upstream() -> SocketAddr {
    let app = Router::new()
        .route("/", get(|| async { ([(header::CONTENT_TYPE, "text/html; charset=utf-8")], PAGE) }))
        .route("/gzip", get(gzip_page))
        .route("/json", get(|| async { ([(header::CONTENT_TYPE, "application/json")], r#"{"ok":true}"#) }))
        .route("/empty", get(|| async { StatusCode::NO_CONTENT }))
        .route("/headers", get(echo_forwarded))
        .route("/redirect", get(|| async { (StatusCode::FOUND, [(header::LOCATION, "/elsewhere")]) }))
        .fallback(|| async { (StatusCode::NOT_FOUND, "upstream not found") });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

async fn gzip_page() -> impl IntoResponse {
    let body = ContentEncoding::Gzip.encode(PAGE.as_bytes()).unwrap();
    (
        [
            (header::CONTENT_TYPE, "text/html"),
            (header::CONTENT_ENCODING, "gzip"),
        ],
        body,
    )
}

async fn echo_forwarded(headers: HeaderMap) -> String {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("-")
            .to_string()
    };
    format!(
        "{}|{}|{}",
        get("x-forwarded-proto"),
        get("x-forwarded-host"),
        get("x-forwarded-for")
    )
}

/// App with its own WebSocket endpoint at `/app-ws` that echoes text
/// frames back prefixed with "echo: "
pub async fn start_ws_upstream() -> SocketAddr {
    let app = Router::new()
        .route("/app-ws", get(|ws: WebSocketUpgrade| async move { ws.on_upgrade(echo_socket) }))
        .fallback(|| async { (StatusCode::NOT_FOUND, "upstream not found") });

    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    addr
}

async fn echo_socket(mut socket: WebSocket) {
    use axum::extract::ws::Message;

    while let Some(Ok(message)) = socket.recv().await {
        if let Message::Text(text) = message
            && socket.send(Message::Text(format!("echo: {text}"))).await.is_err()
        {
            break;
        }
    }
}

/// Address with nothing listening behind it
pub async fn dead_upstream() -> SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    listener.local_addr().unwrap()
}

pub async fn start_proxy(upstream: SocketAddr) -> TestProxy {
    start_proxy_with(upstream, ChannelTimings::default()).await
}

pub async fn start_proxy_with(upstream: SocketAddr, timings: ChannelTimings) -> TestProxy {
    let project = TempDir::new().unwrap();
    let css_dir = project.path().join("assets/css");
    std::fs::create_dir_all(&css_dir).unwrap();
    std::fs::write(css_dir.join("style.css"), STYLESHEET).unwrap();

    let config = ProxyConfig {
        listen_addr: "127.0.0.1:0".parse().unwrap(),
        upstream_url: format!("http://{upstream}"),
        assets_root: project.path().join("assets"),
    };
    let broadcaster = Arc::new(Broadcaster::with_debounce(Duration::ZERO));
    let server = ProxyServer::bind(&config, broadcaster.clone())
        .await
        .unwrap()
        .with_channel_timings(timings);
    let addr = server.local_addr();
    let cancel = CancellationToken::new();
    let handle = tokio::spawn(server.serve(cancel.clone()));

    TestProxy {
        addr,
        broadcaster,
        cancel,
        handle,
        _project: project,
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
