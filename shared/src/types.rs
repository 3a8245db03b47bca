//! Core shared types and identifiers

use std::fmt;

/// Subsystem tag attached to every log line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Subsystem {
    /// Composition root and coordinator
    Shadowfax,
    /// Reverse proxy and content rewriter
    Proxy,
    /// Supervised application process
    AppServer,
    /// Browser reload delivery
    Reload,
    /// templ generate watcher
    Templ,
    /// Tailwind CLI watcher
    Tailwind,
    /// Go source file watcher
    GoWatcher,
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Subsystem::Shadowfax => write!(f, "shadowfax"),
            Subsystem::Proxy => write!(f, "proxy"),
            Subsystem::AppServer => write!(f, "app-server"),
            Subsystem::Reload => write!(f, "reload"),
            Subsystem::Templ => write!(f, "templ"),
            Subsystem::Tailwind => write!(f, "tailwind"),
            Subsystem::GoWatcher => write!(f, "go-watcher"),
        }
    }
}

/// Classification of a source change reported by a watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChangeKind {
    /// Nothing the browser or the app needs to react to
    #[default]
    None,
    /// Compiled code changed; the app must be rebuilt and restarted
    NeedsRestart,
    /// Only browser-visible content changed; a reload is enough
    NeedsBrowserReload,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::None => write!(f, "none"),
            ChangeKind::NeedsRestart => write!(f, "needs-restart"),
            ChangeKind::NeedsBrowserReload => write!(f, "needs-browser-reload"),
        }
    }
}
