//! Command-line arguments and resolved runtime configuration

use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

use crate::error::{ShadowfaxError, ShadowfaxResult};
use shared::{Subsystem, subsystem_debug};
use supervisor::HeartbeatConfig;

/// Lock file written by the andurel scaffolder
pub const LOCK_FILE: &str = "andurel.lock";
/// Stylesheet framework that enables the tailwind pipeline
const STYLESHEET_FRAMEWORK: &str = "tailwind";

/// Live-reload development server for Go + templ web apps
#[derive(Parser, Debug, Clone)]
#[command(name = "shadowfax")]
#[command(version)]
#[command(about = "Builds, runs and live-reloads a Go web app behind a reloading proxy")]
pub struct Args {
    /// Port the reloading proxy listens on
    #[arg(long, env = "PROXY_PORT", default_value_t = 3000)]
    pub proxy_port: u16,

    /// Port the app itself listens on
    #[arg(long, env = "PORT", default_value_t = 8080)]
    pub app_port: u16,

    /// Echo raw watcher output and log at debug level
    #[arg(long, env = "SHADOWFAX_VERBOSE")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error); overrides --verbose
    #[arg(long)]
    pub log_level: Option<String>,
}

/// Everything the composition root needs, resolved against a project root
#[derive(Debug, Clone)]
pub struct Config {
    pub project_root: PathBuf,
    pub proxy_port: u16,
    pub app_port: u16,
    pub verbose: bool,
    pub log_level: String,

    /// Build command run from the project root (program first)
    pub build_command: Vec<String>,
    /// Binary produced by the build command
    pub binary_path: PathBuf,

    pub stylesheet_source: PathBuf,
    pub stylesheet_output: PathBuf,
    pub templ_bin: PathBuf,
    pub tailwind_bin: PathBuf,
    pub lock_file: PathBuf,

    pub heartbeat: HeartbeatConfig,
}

impl Config {
    /// Defaults for a project rooted at `project_root`
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        let project_root = project_root.into();
        Self {
            proxy_port: 3000,
            app_port: 8080,
            verbose: false,
            log_level: "info".to_string(),
            build_command: ["go", "build", "-o", "tmp/bin/main", "cmd/app/main.go"]
                .into_iter()
                .map(String::from)
                .collect(),
            binary_path: project_root.join("tmp").join("bin").join("main"),
            stylesheet_source: project_root.join("css").join("base.css"),
            stylesheet_output: project_root.join("assets").join("css").join("style.css"),
            templ_bin: project_root.join("bin").join("templ"),
            tailwind_bin: project_root.join("bin").join("tailwindcli"),
            lock_file: project_root.join(LOCK_FILE),
            heartbeat: HeartbeatConfig::default(),
            project_root,
        }
    }

    pub fn from_args(args: &Args, project_root: impl Into<PathBuf>) -> Self {
        let log_level = match &args.log_level {
            Some(level) => level.clone(),
            None if args.verbose => "debug".to_string(),
            None => "info".to_string(),
        };
        Self {
            proxy_port: args.proxy_port,
            app_port: args.app_port,
            verbose: args.verbose,
            log_level,
            ..Self::new(project_root)
        }
    }

    /// Public URL of the reloading proxy
    pub fn proxy_url(&self) -> String {
        format!("http://localhost:{}", self.proxy_port)
    }

    /// Internal URL of the app itself
    pub fn app_url(&self) -> String {
        format!("http://localhost:{}", self.app_port)
    }

    /// Whether the project opted into the tailwind stylesheet pipeline
    ///
    /// An unreadable or malformed lock file counts as "no".
    pub fn stylesheet_pipeline(&self) -> bool {
        match detect_stylesheet_pipeline(&self.lock_file) {
            Ok(active) => active,
            Err(e) => {
                subsystem_debug!(Subsystem::Shadowfax, "{}, stylesheet pipeline disabled", e);
                false
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct LockFile {
    #[serde(rename = "scaffoldConfig")]
    scaffold_config: Option<ScaffoldConfig>,
}

#[derive(Debug, Deserialize)]
struct ScaffoldConfig {
    #[serde(rename = "cssFramework", default)]
    css_framework: String,
}

/// Read the lock file at `path` and report whether tailwind is configured
///
/// A missing file is not an error: the project simply has no pipeline.
pub fn detect_stylesheet_pipeline(path: &Path) -> ShadowfaxResult<bool> {
    let contents = match std::fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };

    let lock: LockFile =
        serde_json::from_str(&contents).map_err(|e| ShadowfaxError::lock_file(path, e.to_string()))?;

    Ok(lock
        .scaffold_config
        .is_some_and(|scaffold| scaffold.css_framework.eq_ignore_ascii_case(STYLESHEET_FRAMEWORK)))
}
