//! Self-healing page returned while the app is unreachable

use axum::body::Body;
use axum::http::{HeaderValue, Response, StatusCode, header};

const UNAVAILABLE_PAGE: &str = r#"<!DOCTYPE html>
<html>
<head>
  <meta charset="utf-8">
  <title>App restarting...</title>
  <style>
    body { font-family: system-ui, sans-serif; display: flex; align-items: center; justify-content: center; height: 100vh; margin: 0; color: #444; }
  </style>
</head>
<body>
  <p>App restarting...</p>
  <script>setTimeout(function() { window.location.reload(); }, 1000);</script>
</body>
</html>
"#;

/// 503 page that reloads itself after one second
pub fn unavailable_response() -> Response<Body> {
    let mut response = Response::new(Body::from(UNAVAILABLE_PAGE));
    *response.status_mut() = StatusCode::SERVICE_UNAVAILABLE;
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/html; charset=utf-8"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store"));
    response
}
