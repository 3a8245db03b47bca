//! Forwarding of proxied requests to the app under development

use std::net::SocketAddr;

use axum::body::Body;
use axum::http::{HeaderMap, HeaderValue, Method, Request, Response, StatusCode, header};
use hyper::upgrade::OnUpgrade;
use hyper_util::rt::TokioIo;
use tokio::io::copy_bidirectional;
use tokio_util::sync::CancellationToken;
use url::Url;

use crate::compression::ContentEncoding;
use crate::error::{ProxyError, ProxyResult};
use crate::fallback::unavailable_response;
use crate::rewrite::{inject_script, is_html, rewrite_stylesheet_hrefs};
use shared::{Subsystem, subsystem_debug, subsystem_warn};

/// Connection-scoped headers that must not cross the proxy
const HOP_BY_HOP: [&str; 8] = [
    "connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

/// The app server every non-local request is forwarded to
#[derive(Debug, Clone)]
pub struct Upstream {
    base: Url,
    client: reqwest::Client,
}

impl Upstream {
    pub fn new(base: &str) -> ProxyResult<Self> {
        let url = Url::parse(base).map_err(|e| ProxyError::invalid_upstream(base, e.to_string()))?;
        if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
            return Err(ProxyError::invalid_upstream(base, "expected an http(s) URL with a host"));
        }

        // Redirects and compressed bodies are relayed to the browser untouched
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self { base: url, client })
    }

    pub fn for_port(port: u16) -> ProxyResult<Self> {
        Self::new(&format!("http://localhost:{port}"))
    }

    pub fn base(&self) -> &Url {
        &self.base
    }

    /// Absolute upstream URL for a request's path and query
    pub fn target(&self, path_and_query: &str) -> String {
        format!("{}{}", self.base.as_str().trim_end_matches('/'), path_and_query)
    }

    /// Forward `request`, rewriting HTML responses on the way back
    ///
    /// Never fails: an unreachable app yields the self-reloading 503 page.
    pub async fn forward(&self, request: Request<Body>, client_addr: Option<SocketAddr>) -> Response<Body> {
        let (parts, body) = request.into_parts();
        let body = match axum::body::to_bytes(body, usize::MAX).await {
            Ok(body) => body,
            Err(e) => {
                subsystem_warn!(Subsystem::Proxy, "⚠️ Failed to read request body: {}", e);
                return status_response(StatusCode::BAD_REQUEST, "failed to read request body");
            }
        };

        let path_and_query = parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        let url = self.target(path_and_query);
        let headers = forwarded_request_headers(&parts.headers, client_addr);

        let upstream = self
            .client
            .request(parts.method.clone(), &url)
            .headers(headers)
            .body(body)
            .send()
            .await;
        let upstream = match upstream {
            Ok(response) => response,
            Err(e) => {
                if e.is_connect() {
                    subsystem_debug!(Subsystem::Proxy, "App unreachable for {} {}: {}", parts.method, url, e);
                } else {
                    subsystem_warn!(Subsystem::Proxy, "⚠️ Upstream error for {} {}: {}", parts.method, url, e);
                }
                return unavailable_response();
            }
        };

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        strip_hop_by_hop(&mut headers);

        let bodyless = parts.method == Method::HEAD
            || status == StatusCode::NO_CONTENT
            || status == StatusCode::NOT_MODIFIED;
        let html = headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(is_html);

        if bodyless || !html {
            return build_response(status, headers, Body::from_stream(upstream.bytes_stream()));
        }

        let raw = match upstream.bytes().await {
            Ok(raw) => raw,
            Err(e) => {
                subsystem_warn!(Subsystem::Proxy, "⚠️ Failed to read upstream body for {}: {}", url, e);
                return status_response(StatusCode::BAD_GATEWAY, "failed to read upstream response");
            }
        };

        let encoding = headers.get(header::CONTENT_ENCODING).and_then(|v| v.to_str().ok());
        let body = match rewrite_html_body(&raw, encoding) {
            Some(rewritten) => rewritten,
            None => raw.to_vec(),
        };
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(body.len()));
        build_response(status, headers, Body::from(body))
    }

    /// Forward a protocol upgrade handshake and, once the app switches
    /// protocols, pipe bytes both ways until either side closes or
    /// `cancel` fires
    ///
    /// A non-101 reply is relayed like any other response.
    pub async fn forward_upgrade(
        &self,
        mut request: Request<Body>,
        client_addr: Option<SocketAddr>,
        cancel: CancellationToken,
    ) -> Response<Body> {
        let Some(client_upgrade) = request.extensions_mut().remove::<OnUpgrade>() else {
            return status_response(StatusCode::BAD_REQUEST, "connection cannot be upgraded");
        };
        let (parts, _body) = request.into_parts();

        let path_and_query = parts.uri.path_and_query().map(|pq| pq.as_str()).unwrap_or("/");
        let url = self.target(path_and_query);
        let mut headers = forwarded_request_headers(&parts.headers, client_addr);
        restore_upgrade_headers(&parts.headers, &mut headers);

        let upstream = match self.client.request(parts.method.clone(), &url).headers(headers).send().await {
            Ok(response) => response,
            Err(e) => {
                subsystem_debug!(Subsystem::Proxy, "App unreachable for upgrade {}: {}", url, e);
                return unavailable_response();
            }
        };

        let status = upstream.status();
        let mut headers = upstream.headers().clone();
        strip_hop_by_hop(&mut headers);
        if status != StatusCode::SWITCHING_PROTOCOLS {
            return build_response(status, headers, Body::from_stream(upstream.bytes_stream()));
        }
        restore_upgrade_headers(upstream.headers(), &mut headers);

        let mut app_io = match upstream.upgrade().await {
            Ok(io) => io,
            Err(e) => {
                subsystem_warn!(Subsystem::Proxy, "⚠️ App accepted upgrade for {} but the tunnel failed: {}", url, e);
                return status_response(StatusCode::BAD_GATEWAY, "upstream upgrade failed");
            }
        };

        subsystem_debug!(Subsystem::Proxy, "Tunnelling upgraded connection to {}", url);
        tokio::spawn(async move {
            let browser_io = match client_upgrade.await {
                Ok(io) => io,
                Err(e) => {
                    subsystem_warn!(Subsystem::Proxy, "⚠️ Browser upgrade failed: {}", e);
                    return;
                }
            };
            let mut browser_io = TokioIo::new(browser_io);

            tokio::select! {
                _ = cancel.cancelled() => {}
                copied = copy_bidirectional(&mut browser_io, &mut app_io) => match copied {
                    Ok((sent, received)) => subsystem_debug!(
                        Subsystem::Proxy,
                        "Tunnel to {} closed ({} bytes up, {} bytes down)",
                        url,
                        sent,
                        received
                    ),
                    Err(e) => subsystem_debug!(Subsystem::Proxy, "Tunnel to {} ended: {}", url, e),
                },
            }
        });

        build_response(status, headers, Body::empty())
    }
}

/// Copy `Connection` and `Upgrade` from `source`, which hop-by-hop
/// stripping removes
fn restore_upgrade_headers(source: &HeaderMap, target: &mut HeaderMap) {
    if let Some(upgrade) = source.get(header::UPGRADE) {
        target.insert(header::UPGRADE, upgrade.clone());
        target.insert(header::CONNECTION, HeaderValue::from_static("upgrade"));
    }
}

/// Decode, rewrite and re-encode an HTML body
///
/// `None` means the body must be relayed unchanged: either the encoding is
/// not one the rewriter understands or the body failed to decode.
pub fn rewrite_html_body(body: &[u8], content_encoding: Option<&str>) -> Option<Vec<u8>> {
    let Some(encoding) = ContentEncoding::from_header(content_encoding) else {
        subsystem_debug!(
            Subsystem::Proxy,
            "Skipping HTML rewrite for content-encoding {}",
            content_encoding.unwrap_or_default()
        );
        return None;
    };

    let decoded = match encoding.decode(body) {
        Ok(decoded) => decoded,
        Err(e) => {
            subsystem_warn!(Subsystem::Proxy, "⚠️ {}", e);
            return None;
        }
    };

    let rewritten = inject_script(&rewrite_stylesheet_hrefs(&decoded));
    match encoding.encode(&rewritten) {
        Ok(encoded) => Some(encoded),
        Err(e) => {
            subsystem_warn!(Subsystem::Proxy, "⚠️ {}", e);
            None
        }
    }
}

fn forwarded_request_headers(original: &HeaderMap, client_addr: Option<SocketAddr>) -> HeaderMap {
    let mut headers = original.clone();
    strip_hop_by_hop(&mut headers);
    let host = headers.remove(header::HOST);

    if let Some(addr) = client_addr {
        let ip = addr.ip().to_string();
        let forwarded_for = match headers.get("x-forwarded-for").and_then(|v| v.to_str().ok()) {
            Some(prior) => format!("{prior}, {ip}"),
            None => ip,
        };
        if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
            headers.insert("x-forwarded-for", value);
        }
    }
    if let Some(host) = host {
        headers.insert("x-forwarded-host", host);
    }
    headers.insert("x-forwarded-proto", HeaderValue::from_static("http"));
    headers
}

/// Remove hop-by-hop headers, including any named by `Connection`
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<String> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .map(|token| token.trim().to_ascii_lowercase())
        .filter(|token| !token.is_empty())
        .collect();

    for name in listed.iter().map(String::as_str).chain(HOP_BY_HOP) {
        headers.remove(name);
    }
}

fn build_response(status: StatusCode, headers: HeaderMap, body: Body) -> Response<Body> {
    let mut response = Response::new(body);
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}

fn status_response(status: StatusCode, message: &'static str) -> Response<Body> {
    let mut response = Response::new(Body::from(message));
    *response.status_mut() = status;
    response
}
