//! Build toolchain backed by an external command

use std::path::PathBuf;
use std::process::Stdio;

use async_trait::async_trait;
use tokio::process::Command;

use crate::error::{SupervisorError, SupervisorResult};
use crate::traits::Toolchain;
use shared::{Subsystem, subsystem_debug};

/// Runs a fixed build command, inheriting stdout/stderr so compiler
/// diagnostics reach the operator's terminal
#[derive(Debug, Clone)]
pub struct CommandToolchain {
    program: String,
    args: Vec<String>,
    working_dir: Option<PathBuf>,
}

impl CommandToolchain {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
            working_dir: None,
        }
    }

    /// `go build -o tmp/bin/main cmd/app/main.go`
    pub fn go_default() -> Self {
        Self::new("go", ["build", "-o", "tmp/bin/main", "cmd/app/main.go"])
    }

    /// Configure working directory (fluent API)
    pub fn with_working_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.working_dir = Some(dir.into());
        self
    }

    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

#[async_trait]
impl Toolchain for CommandToolchain {
    async fn build(&self) -> SupervisorResult<()> {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);
        if let Some(dir) = &self.working_dir {
            cmd.current_dir(dir);
        }

        subsystem_debug!(Subsystem::AppServer, "🔧 Running {}", self.command_line());

        let status = cmd
            .status()
            .await
            .map_err(|e| SupervisorError::build(format!("{}: {e}", self.command_line())))?;
        if status.success() {
            Ok(())
        } else {
            Err(SupervisorError::build(format!("{} exited with {status}", self.command_line())))
        }
    }
}
