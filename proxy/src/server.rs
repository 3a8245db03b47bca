//! Proxy HTTP server
//!
//! A single fallback handler routes every request: reload socket upgrades,
//! then the app's own upgrades, then local assets, then the upstream app.

use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Body;
use axum::extract::{ConnectInfo, FromRequestParts, Request, State, WebSocketUpgrade};
use axum::http::{HeaderMap, Response, header};
use axum::response::IntoResponse;
use tokio::net::TcpListener;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::assets::AssetServer;
use crate::error::{ProxyError, ProxyResult};
use crate::forward::Upstream;
use crate::websocket::{ChannelTimings, serve_reload_socket};
use crate::{ASSETS_PREFIX, EVENTS_PATH};
use shared::{Broadcaster, Subsystem, logging, subsystem_warn};

/// Upper bound on draining open connections after cancellation
pub const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

/// Proxy settings
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub listen_addr: SocketAddr,
    pub upstream_url: String,
    /// Directory served under the local asset prefix
    pub assets_root: PathBuf,
}

impl ProxyConfig {
    /// Listen on all interfaces at `proxy_port`, forward to the app on
    /// `app_port` and serve `<project_root>/assets`
    pub fn new(proxy_port: u16, app_port: u16, project_root: &Path) -> Self {
        Self {
            listen_addr: SocketAddr::from(([0, 0, 0, 0], proxy_port)),
            upstream_url: format!("http://localhost:{app_port}"),
            assets_root: project_root.join("assets"),
        }
    }
}

#[derive(Clone)]
struct ProxyState {
    upstream: Upstream,
    assets: AssetServer,
    broadcaster: Arc<Broadcaster>,
    timings: ChannelTimings,
    cancel: CancellationToken,
}

/// Bound, not yet serving, proxy
pub struct ProxyServer {
    listener: TcpListener,
    local_addr: SocketAddr,
    upstream: Upstream,
    assets: AssetServer,
    broadcaster: Arc<Broadcaster>,
    timings: ChannelTimings,
}

impl ProxyServer {
    /// Bind the listening socket
    ///
    /// Fails immediately with [`ProxyError::Bind`] when the port is taken.
    pub async fn bind(config: &ProxyConfig, broadcaster: Arc<Broadcaster>) -> ProxyResult<Self> {
        let upstream = Upstream::new(&config.upstream_url)?;
        let listener = TcpListener::bind(config.listen_addr)
            .await
            .map_err(|e| ProxyError::bind(config.listen_addr, e))?;
        let local_addr = listener.local_addr()?;

        Ok(Self {
            listener,
            local_addr,
            upstream,
            assets: AssetServer::new(&config.assets_root),
            broadcaster,
            timings: ChannelTimings::default(),
        })
    }

    /// Override WebSocket timings (fluent API)
    pub fn with_channel_timings(mut self, timings: ChannelTimings) -> Self {
        self.timings = timings;
        self
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Serve until `cancel` fires, then drain for at most [`SHUTDOWN_GRACE`]
    pub async fn serve(self, cancel: CancellationToken) -> ProxyResult<()> {
        let state = ProxyState {
            upstream: self.upstream,
            assets: self.assets,
            broadcaster: self.broadcaster,
            timings: self.timings,
            cancel: cancel.clone(),
        };
        logging::log_startup(
            Subsystem::Proxy,
            &format!("reverse proxy on {} → {}", self.local_addr, state.upstream.base()),
        );

        let app = build_router(state);
        let shutdown = cancel.clone();
        let server = axum::serve(self.listener, app.into_make_service_with_connect_info::<SocketAddr>())
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .into_future();
        let mut server = std::pin::pin!(server);

        tokio::select! {
            result = &mut server => return result.map_err(|e| ProxyError::Serve(e.to_string())),
            _ = cancel.cancelled() => {}
        }

        match timeout(SHUTDOWN_GRACE, server).await {
            Ok(result) => {
                logging::log_shutdown(Subsystem::Proxy, "cancelled");
                result.map_err(|e| ProxyError::Serve(e.to_string()))
            }
            Err(_) => {
                subsystem_warn!(
                    Subsystem::Proxy,
                    "⏱️ Connections still open after {}s, closing",
                    SHUTDOWN_GRACE.as_secs()
                );
                Ok(())
            }
        }
    }
}

fn build_router(state: ProxyState) -> Router {
    Router::new()
        .fallback(handle_request)
        .with_state(state)
        .layer(ServiceBuilder::new().layer(TraceLayer::new_for_http()))
}

async fn handle_request(
    State(state): State<ProxyState>,
    connect_info: Option<ConnectInfo<SocketAddr>>,
    request: Request,
) -> Response<Body> {
    let path = request.uri().path().to_owned();

    if path == EVENTS_PATH && is_websocket_request(request.headers()) {
        let (mut parts, _body) = request.into_parts();
        return match WebSocketUpgrade::from_request_parts(&mut parts, &state).await {
            Ok(ws) => {
                let ProxyState {
                    broadcaster,
                    timings,
                    cancel,
                    ..
                } = state;
                ws.on_upgrade(move |socket| serve_reload_socket(socket, broadcaster, timings, cancel))
            }
            Err(rejection) => rejection.into_response(),
        };
    }

    if is_websocket_request(request.headers()) {
        let client_addr = connect_info.map(|ConnectInfo(addr)| addr);
        return state.upstream.forward_upgrade(request, client_addr, state.cancel.clone()).await;
    }

    if path.starts_with(ASSETS_PREFIX)
        && let Some(response) = state.assets.serve(request.method(), &path).await
    {
        return response;
    }

    state
        .upstream
        .forward(request, connect_info.map(|ConnectInfo(addr)| addr))
        .await
}

fn is_websocket_request(headers: &HeaderMap) -> bool {
    let connection_upgrade = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .any(|v| v.to_ascii_lowercase().contains("upgrade"));
    let websocket = headers
        .get(header::UPGRADE)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.eq_ignore_ascii_case("websocket"));
    connection_upgrade && websocket
}
