//! Launches the compiled app binary

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::{Child, Command};

use crate::error::{SupervisorError, SupervisorResult};
use crate::traits::Launcher;

/// Spawns the app with templ's development mode enabled
#[derive(Debug, Clone, Default)]
pub struct BinaryLauncher {
    working_dir: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl BinaryLauncher {
    pub fn new() -> Self {
        Self {
            working_dir: None,
            env: vec![("TEMPL_DEV_MODE".to_string(), "true".to_string())],
        }
    }

    /// Configure working directory (fluent API)
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    /// Add an environment variable for the child (fluent API)
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

#[async_trait]
impl Launcher for BinaryLauncher {
    async fn launch(&self, binary: &Path) -> SupervisorResult<Child> {
        let mut cmd = Command::new(binary);
        cmd.envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        cmd.spawn()
            .map_err(|e| SupervisorError::start(binary.display().to_string(), e.to_string()))
    }
}
