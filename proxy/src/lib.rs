//! Reverse proxy sitting between the browser and the app under development
//!
//! Forwards every request to the supervised app, injects the reload client
//! into HTML responses, serves hot-swappable stylesheet assets straight
//! from disk and hosts the reload WebSocket endpoint.

pub mod assets;
pub mod compression;
pub mod error;
pub mod fallback;
pub mod forward;
pub mod rewrite;
pub mod server;
pub mod websocket;

pub use assets::AssetServer;
pub use compression::ContentEncoding;
pub use error::{ProxyError, ProxyResult};
pub use forward::Upstream;
pub use rewrite::{RELOAD_SCRIPT, inject_script, is_html, rewrite_stylesheet_hrefs};
pub use server::{ProxyConfig, ProxyServer};

/// Path of the reload WebSocket endpoint
pub const EVENTS_PATH: &str = "/__shadowfax/events";

/// Prefix under which local assets are served from disk
pub const ASSETS_PREFIX: &str = "/__shadowfax/assets/";
