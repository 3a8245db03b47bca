//! Go source file watcher
//!
//! Watches every project directory except build output, dependencies and
//! hidden directories. Directories created after startup are not picked up.
//! Changes go straight to the supervisor's rebuild trigger; they never pass
//! through the coordinator, so the stylesheet pipeline is not re-run.

use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::event::ModifyKind;
use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

use crate::error::{ShadowfaxError, ShadowfaxResult};
use shared::{Subsystem, logging, subsystem_debug, subsystem_info, subsystem_warn};
use supervisor::RebuildTrigger;

/// Quiet period after the last change before a restart is requested
pub const SOURCE_DEBOUNCE: Duration = Duration::from_millis(500);

const EXCLUDED_DIRS: [&str; 6] = ["tmp", "bin", "node_modules", ".git", "assets", "vendor"];

/// Directory names never descended into
pub fn is_excluded_dir(name: &str) -> bool {
    EXCLUDED_DIRS.contains(&name) || name.starts_with('.')
}

/// Hand-written Go sources; templ's generated files are handled by the
/// templ watcher
pub fn is_watched_source(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    name.ends_with(".go") && !name.ends_with("_templ.go")
}

/// Writes and creations count; metadata-only changes and removals do not
pub fn is_relevant_event(kind: &EventKind) -> bool {
    matches!(
        kind,
        EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Any | ModifyKind::Data(_) | ModifyKind::Name(_) | ModifyKind::Other)
    )
}

/// Collect `root` and every non-excluded directory below it
///
/// The root itself is always included, whatever its name.
pub fn watch_dirs(root: &Path) -> Vec<PathBuf> {
    let mut dirs = vec![root.to_path_buf()];
    let mut pending = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let Ok(entries) = std::fs::read_dir(&dir) else {
            continue;
        };
        for entry in entries.flatten() {
            let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);
            if !is_dir || entry.file_name().to_str().is_none_or(is_excluded_dir) {
                continue;
            }
            let path = entry.path();
            dirs.push(path.clone());
            pending.push(path);
        }
    }
    dirs
}

#[derive(Debug, Clone)]
pub struct SourceWatcher {
    root: PathBuf,
    debounce: Duration,
    verbose: bool,
}

impl SourceWatcher {
    pub fn new(root: impl Into<PathBuf>, verbose: bool) -> Self {
        Self {
            root: root.into(),
            debounce: SOURCE_DEBOUNCE,
            verbose,
        }
    }

    /// Override the quiet period (fluent API)
    pub fn with_debounce(mut self, debounce: Duration) -> Self {
        self.debounce = debounce;
        self
    }

    /// Watch until cancelled, requesting one rebuild per burst of source
    /// changes
    pub async fn run(self, rebuild: RebuildTrigger, cancel: CancellationToken) -> ShadowfaxResult<()> {
        logging::log_startup(Subsystem::GoWatcher, "Go source watcher");

        let (tx, mut rx) = mpsc::channel::<notify::Result<Event>>(100);
        // The callback runs on notify's own thread
        let mut watcher: RecommendedWatcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            let _ = tx.blocking_send(res);
        })?;

        let dirs = watch_dirs(&self.root);
        for dir in &dirs {
            if let Err(e) = watcher.watch(dir, RecursiveMode::NonRecursive) {
                subsystem_warn!(Subsystem::GoWatcher, "⚠️ Cannot watch {}: {}", dir.display(), e);
            }
        }
        subsystem_debug!(Subsystem::GoWatcher, "Watching {} directories", dirs.len());

        let mut deadline: Option<Instant> = None;
        let mut last_changed: Option<PathBuf> = None;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    logging::log_shutdown(Subsystem::GoWatcher, "cancelled");
                    return Ok(());
                }

                event = rx.recv() => match event {
                    Some(Ok(event)) => {
                        if !is_relevant_event(&event.kind) {
                            continue;
                        }
                        if let Some(path) = event.paths.into_iter().find(|p| is_watched_source(p)) {
                            last_changed = Some(path);
                            deadline = Some(Instant::now() + self.debounce);
                        }
                    }
                    Some(Err(e)) => {
                        if self.verbose {
                            subsystem_warn!(Subsystem::GoWatcher, "⚠️ Watcher error: {}", e);
                        }
                    }
                    None => {
                        return Err(ShadowfaxError::watcher(
                            Subsystem::GoWatcher.to_string(),
                            "notification stream closed",
                        ));
                    }
                },

                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    deadline = None;
                    let name = last_changed
                        .take()
                        .and_then(|p| p.file_name().map(|n| n.to_string_lossy().into_owned()))
                        .unwrap_or_default();
                    subsystem_info!(Subsystem::GoWatcher, "📝 Go file changed: {}", name);
                    if !rebuild.request() {
                        subsystem_debug!(Subsystem::GoWatcher, "Rebuild already queued");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_watched_sources() {
        assert!(is_watched_source(Path::new("/app/cmd/app/main.go")));
        assert!(is_watched_source(Path::new("handlers.go")));
        assert!(!is_watched_source(Path::new("/app/views/home_templ.go")));
        assert!(!is_watched_source(Path::new("/app/views/home.templ")));
        assert!(!is_watched_source(Path::new("/app/go.mod")));
    }

    #[test]
    fn test_excluded_dirs() {
        for name in ["tmp", "bin", "node_modules", ".git", "assets", "vendor", ".idea"] {
            assert!(is_excluded_dir(name), "{name} should be excluded");
        }
        assert!(!is_excluded_dir("controllers"));
    }

    #[test]
    fn test_relevant_events() {
        use notify::event::{AccessKind, CreateKind, DataChange, MetadataKind, RemoveKind};

        assert!(is_relevant_event(&EventKind::Create(CreateKind::File)));
        assert!(is_relevant_event(&EventKind::Modify(ModifyKind::Data(DataChange::Content))));
        assert!(!is_relevant_event(&EventKind::Modify(ModifyKind::Metadata(MetadataKind::Permissions))));
        assert!(!is_relevant_event(&EventKind::Remove(RemoveKind::File)));
        assert!(!is_relevant_event(&EventKind::Access(AccessKind::Read)));
    }

    #[test]
    fn test_watch_dirs_skips_excluded_trees() {
        let root = TempDir::new().unwrap();
        for dir in ["controllers/api", "tmp/bin", "node_modules/pkg", ".git/objects", "views"] {
            std::fs::create_dir_all(root.path().join(dir)).unwrap();
        }

        let mut dirs: Vec<_> = watch_dirs(root.path())
            .into_iter()
            .map(|d| d.strip_prefix(root.path()).unwrap().to_path_buf())
            .collect();
        dirs.sort();

        assert_eq!(
            dirs,
            vec![
                PathBuf::new(),
                PathBuf::from("controllers"),
                PathBuf::from("controllers/api"),
                PathBuf::from("views"),
            ]
        );
    }
}
