//! HTML response rewriting
//!
//! Two transformations run over every proxied HTML page: stylesheet links
//! pointing at the app's assets are redirected to the proxy's local asset
//! prefix, and the reload client script is injected.

use std::borrow::Cow;
use std::sync::LazyLock;

use regex::bytes::{Captures, Regex};

use crate::ASSETS_PREFIX;

static STYLESHEET_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"(?is)<link\b[^>]*\bhref\s*=\s*["']([^"']+)["'][^>]*>"#).unwrap());

/// Browser-side reload client
///
/// Opens the events socket, reloads on `"r"` and reconnects with a backoff
/// starting at 1 s, growing ×1.5 per attempt up to 5 s.
pub const RELOAD_SCRIPT: &str = r#"<script>
(function() {
  var protocol = window.location.protocol === 'https:' ? 'wss:' : 'ws:';
  var wsUrl = protocol + '//' + window.location.host + '/__shadowfax/events';
  var reconnectDelay = 1000;
  var maxReconnectDelay = 5000;

  function connect() {
    var ws = new WebSocket(wsUrl);

    ws.onopen = function() {
      console.log('[shadowfax] Connected to hot reload server');
      reconnectDelay = 1000;
    };

    ws.onmessage = function(event) {
      if (event.data === 'r') {
        console.log('[shadowfax] Reloading page...');
        window.location.reload();
      }
    };

    ws.onclose = function() {
      console.log('[shadowfax] Connection closed, reconnecting in ' + reconnectDelay + 'ms');
      setTimeout(function() {
        reconnectDelay = Math.min(reconnectDelay * 1.5, maxReconnectDelay);
        connect();
      }, reconnectDelay);
    };

    ws.onerror = function(err) {
      console.log('[shadowfax] WebSocket error:', err);
      ws.close();
    };
  }

  connect();
})();
</script>"#;

/// True when a `Content-Type` value declares HTML
pub fn is_html(content_type: &str) -> bool {
    content_type.to_ascii_lowercase().contains("text/html")
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|window| window == needle)
}

/// Insert the reload script before `</head>`, else before `</body>`, else
/// at the end of the document
pub fn inject_script(content: &[u8]) -> Vec<u8> {
    let lower = content.to_ascii_lowercase();
    let at = find(&lower, b"</head>")
        .or_else(|| find(&lower, b"</body>"))
        .unwrap_or(content.len());

    let mut out = Vec::with_capacity(content.len() + RELOAD_SCRIPT.len());
    out.extend_from_slice(&content[..at]);
    out.extend_from_slice(RELOAD_SCRIPT.as_bytes());
    out.extend_from_slice(&content[at..]);
    out
}

/// Point same-origin stylesheet links under `assets/` at the local asset
/// prefix, dropping cache-buster segments on the way
pub fn rewrite_stylesheet_hrefs(content: &[u8]) -> Cow<'_, [u8]> {
    STYLESHEET_LINK.replace_all(content, |caps: &Captures<'_>| -> Vec<u8> {
        let tag = &caps[0];
        let lower = tag.to_ascii_lowercase();
        if find(&lower, b"rel=").is_none() || find(&lower, b"stylesheet").is_none() {
            return tag.to_vec();
        }

        let (Some(whole), Some(href)) = (caps.get(0), caps.get(1)) else {
            return tag.to_vec();
        };
        let Some(rewritten) = std::str::from_utf8(href.as_bytes())
            .ok()
            .and_then(rewrite_stylesheet_href)
        else {
            return tag.to_vec();
        };

        let start = href.start() - whole.start();
        let end = href.end() - whole.start();
        let mut out = Vec::with_capacity(tag.len() + ASSETS_PREFIX.len());
        out.extend_from_slice(&tag[..start]);
        out.extend_from_slice(rewritten.as_bytes());
        out.extend_from_slice(&tag[end..]);
        out
    })
}

/// Rewrite a single href; `None` leaves the link untouched
pub fn rewrite_stylesheet_href(href: &str) -> Option<String> {
    let lower = href.to_ascii_lowercase();
    if ["http://", "https://", "//", "data:"]
        .iter()
        .any(|prefix| lower.starts_with(prefix))
    {
        return None;
    }

    let (path, suffix) = match href.find(['?', '#']) {
        Some(idx) => href.split_at(idx),
        None => (href, ""),
    };
    if path.is_empty() {
        return None;
    }

    let path = path.strip_prefix("./").unwrap_or(path);
    let normalized = if path.starts_with("/assets/") {
        strip_cache_buster_segment(path, "/assets/")
    } else if path.starts_with("assets/") {
        strip_cache_buster_segment(path, "assets/")
    } else {
        return None;
    };

    let relative = normalized.trim_start_matches('/');
    let relative = relative.strip_prefix("assets/").unwrap_or(relative);
    Some(format!("{ASSETS_PREFIX}{relative}{suffix}"))
}

/// Purely numeric path segment of at least six digits
pub fn is_cache_buster_segment(segment: &str) -> bool {
    segment.len() >= 6 && segment.bytes().all(|b| b.is_ascii_digit())
}

/// Remove the first cache-buster segment sitting between the asset root and
/// the file name
pub fn strip_cache_buster_segment(path: &str, prefix: &str) -> String {
    let rest = path.strip_prefix(prefix).unwrap_or(path);
    let parts: Vec<&str> = rest.trim_matches('/').split('/').collect();
    if parts.len() < 3 {
        return path.to_string();
    }

    let Some(idx) = (1..parts.len() - 1).find(|&i| is_cache_buster_segment(parts[i])) else {
        return path.to_string();
    };

    let kept: Vec<&str> = parts
        .iter()
        .enumerate()
        .filter(|&(i, _)| i != idx)
        .map(|(_, part)| *part)
        .collect();
    let trailing = if path.ends_with('/') { "/" } else { "" };
    format!("{prefix}{}{trailing}", kept.join("/"))
}
