//! shadowfax: live-reload development orchestrator
//!
//! Builds and runs a Go web app, watches its sources, templates and
//! stylesheets, and keeps every connected browser in sync through a
//! reloading reverse proxy.

pub mod app;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod watchers;

pub use config::{Args, Config, detect_stylesheet_pipeline};
pub use coordinator::{Coordinator, touch_file};
pub use error::{ShadowfaxError, ShadowfaxResult};
