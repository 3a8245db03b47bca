//! Supervisor-specific error types

use shared::SharedError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Build failed: {message}")]
    BuildFailed { message: String },

    #[error("Failed to start {binary}: {message}")]
    StartFailed { binary: String, message: String },

    #[error("Health check timed out after {seconds}s")]
    HealthTimeout { seconds: u64 },

    #[error("Health check cancelled")]
    Cancelled,

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Shared component error: {0}")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SupervisorError {
    pub fn build(message: impl Into<String>) -> Self {
        Self::BuildFailed {
            message: message.into(),
        }
    }

    pub fn start(binary: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StartFailed {
            binary: binary.into(),
            message: message.into(),
        }
    }
}

pub type SupervisorResult<T> = Result<T, SupervisorError>;
