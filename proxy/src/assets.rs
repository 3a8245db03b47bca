//! Local asset serving
//!
//! Stylesheets rebuilt by the CSS pipeline are served straight from the
//! project's `assets/` directory so the browser never sees a stale copy
//! cached by the app. Lookups are confined to the assets root.

use std::path::{Path, PathBuf};

use axum::body::Body;
use axum::http::{HeaderValue, Method, Response, StatusCode, header};
use percent_encoding::percent_decode_str;

use crate::ASSETS_PREFIX;
use crate::rewrite::is_cache_buster_segment;
use shared::{Subsystem, subsystem_debug};

const CHARSET_SUFFIX: &str = "; charset=utf-8";

/// Serves files below a fixed assets root
#[derive(Debug, Clone)]
pub struct AssetServer {
    root: PathBuf,
}

impl AssetServer {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Serve `path` when it names a local asset
    ///
    /// Returns `None` for anything that is not a GET/HEAD under the asset
    /// prefix or does not resolve to a file; the caller forwards those.
    pub async fn serve(&self, method: &Method, path: &str) -> Option<Response<Body>> {
        if method != Method::GET && method != Method::HEAD {
            return None;
        }
        let encoded = path.strip_prefix(ASSETS_PREFIX)?;
        let relative = percent_decode_str(encoded).decode_utf8().ok()?;

        let file = self.resolve(&relative).await?;
        let content = match tokio::fs::read(&file).await {
            Ok(content) => content,
            Err(e) => {
                subsystem_debug!(Subsystem::Proxy, "Failed to read {}: {}", file.display(), e);
                return None;
            }
        };

        let content_type = content_type_for(&file, &content);
        let length = content.len();
        let body = if method == Method::HEAD {
            Body::empty()
        } else {
            Body::from(content)
        };

        let mut response = Response::new(body);
        *response.status_mut() = StatusCode::OK;
        let headers = response.headers_mut();
        if let Ok(value) = HeaderValue::from_str(&content_type) {
            headers.insert(header::CONTENT_TYPE, value);
        }
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
        headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-store, must-revalidate"));
        headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
        headers.insert(header::EXPIRES, HeaderValue::from_static("0"));
        Some(response)
    }

    /// Map a path relative to the asset prefix onto a file below the root
    ///
    /// Tries the literal path first, then, for paths with at least three
    /// segments, each variant with one cache-buster segment removed.
    pub async fn resolve(&self, relative: &str) -> Option<PathBuf> {
        let canonical_root = tokio::fs::canonicalize(&self.root).await.ok()?;

        for candidate in candidates(relative) {
            let Some(cleaned) = clean_relative(&candidate) else {
                continue;
            };
            let joined = self.root.join(cleaned);
            let Ok(canonical) = tokio::fs::canonicalize(&joined).await else {
                continue;
            };
            // Symlinks must not lead out of the root either
            if !canonical.starts_with(&canonical_root) {
                continue;
            }
            if let Ok(metadata) = tokio::fs::metadata(&canonical).await
                && metadata.is_file()
            {
                return Some(canonical);
            }
        }
        None
    }
}

fn candidates(relative: &str) -> Vec<String> {
    let mut candidates = vec![relative.to_string()];
    let parts: Vec<&str> = relative.trim_matches('/').split('/').collect();
    if parts.len() >= 3 {
        for skip in (1..parts.len() - 1).filter(|&i| is_cache_buster_segment(parts[i])) {
            let variant: Vec<&str> = parts
                .iter()
                .enumerate()
                .filter(|&(i, _)| i != skip)
                .map(|(_, part)| *part)
                .collect();
            candidates.push(variant.join("/"));
        }
    }
    candidates
}

/// Lexically clean a relative path; `None` when it climbs above its root
fn clean_relative(candidate: &str) -> Option<PathBuf> {
    let mut parts: Vec<&str> = Vec::new();
    for segment in candidate.split(['/', '\\']) {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop()?;
            }
            segment => parts.push(segment),
        }
    }
    if parts.is_empty() {
        return None;
    }
    Some(parts.into_iter().collect())
}

/// Content type from the extension, sniffed when the extension is unknown
fn content_type_for(path: &Path, content: &[u8]) -> String {
    match mime_guess::from_path(path).first() {
        Some(mime) => {
            let essence = mime.essence_str();
            let textual = mime.type_().as_str() == "text"
                || essence == "application/javascript"
                || essence == "application/json";
            if textual && mime.get_param("charset").is_none() {
                format!("{essence}{CHARSET_SUFFIX}")
            } else {
                mime.to_string()
            }
        }
        None if std::str::from_utf8(content).is_ok() => format!("text/plain{CHARSET_SUFFIX}"),
        None => "application/octet-stream".to_string(),
    }
}
