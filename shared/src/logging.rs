//! Shared logging utilities for consistent tracing across all subsystems

use crate::errors::{SharedError, SharedResult};
use crate::types::Subsystem;
use chrono::{DateTime, Local};
use tracing::{error, info};

/// Crates whose events are shown at the configured level
const WORKSPACE_TARGETS: &[&str] = &["shadowfax", "supervisor", "proxy", "shared"];

/// Build the filter directive string for a base level
///
/// Third-party HTTP crates are held at `warn` so request plumbing does not
/// drown out the orchestrator's own messages.
pub fn filter_directives(base_level: &str) -> String {
    let mut directives: Vec<String> = WORKSPACE_TARGETS
        .iter()
        .map(|target| format!("{target}={base_level}"))
        .collect();
    directives.push("tower_http=warn".to_string());
    directives.push("hyper=warn".to_string());
    directives.push("reqwest=warn".to_string());
    directives.join(",")
}

/// Initialize the stdout tracing subscriber
///
/// `RUST_LOG` takes precedence when set; otherwise `log_level` (default
/// `info`) applies to the workspace crates.
pub fn init_tracing(log_level: Option<&str>) -> SharedResult<()> {
    use tracing_subscriber::{EnvFilter, fmt};

    let base_level = log_level.unwrap_or("info");
    let env_filter = match std::env::var("RUST_LOG") {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(directives),
        _ => EnvFilter::try_new(filter_directives(base_level)),
    }
    .map_err(|e| SharedError::config("log_level", format!("{base_level} ({e})")))?;

    fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .try_init()
        .map_err(|e| SharedError::config("tracing", e.to_string()))
}

/// Get formatted timestamp for consistent logging
pub fn format_timestamp() -> String {
    let now: DateTime<Local> = Local::now();
    now.format("%H:%M:%S%.3f").to_string()
}

/// Macro for subsystem-aware info logging
#[macro_export]
macro_rules! subsystem_info {
    ($subsystem:expr, $($arg:tt)*) => {
        tracing::info!(
            subsystem = %$subsystem,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        )
    };
}

/// Macro for subsystem-aware warning logging
#[macro_export]
macro_rules! subsystem_warn {
    ($subsystem:expr, $($arg:tt)*) => {
        tracing::warn!(
            subsystem = %$subsystem,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        )
    };
}

/// Macro for subsystem-aware error logging
#[macro_export]
macro_rules! subsystem_error {
    ($subsystem:expr, $($arg:tt)*) => {
        tracing::error!(
            subsystem = %$subsystem,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        )
    };
}

/// Macro for subsystem-aware debug logging
#[macro_export]
macro_rules! subsystem_debug {
    ($subsystem:expr, $($arg:tt)*) => {
        tracing::debug!(
            subsystem = %$subsystem,
            timestamp = $crate::logging::format_timestamp(),
            $($arg)*
        )
    };
}

/// Contextual logging helper for startup messages
pub fn log_startup(subsystem: Subsystem, details: &str) {
    info!(
        subsystem = %subsystem,
        timestamp = format_timestamp(),
        "🚀 Starting {}",
        details
    );
}

/// Contextual logging helper for shutdown messages
pub fn log_shutdown(subsystem: Subsystem, reason: &str) {
    info!(
        subsystem = %subsystem,
        timestamp = format_timestamp(),
        "🛑 Shutting down: {}",
        reason
    );
}

/// Contextual logging helper for error conditions
pub fn log_error(subsystem: Subsystem, context: &str, error: &dyn std::fmt::Display) {
    error!(
        subsystem = %subsystem,
        timestamp = format_timestamp(),
        error = %error,
        "❌ {} failed: {}",
        context,
        error
    );
}

/// Contextual logging helper for success conditions
pub fn log_success(subsystem: Subsystem, message: &str) {
    info!(
        subsystem = %subsystem,
        timestamp = format_timestamp(),
        "✅ {}",
        message
    );
}
