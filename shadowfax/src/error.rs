//! Top-level error types for the shadowfax binary

use std::path::PathBuf;

use proxy::ProxyError;
use shared::SharedError;
use supervisor::SupervisorError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ShadowfaxError {
    #[error("{0}")]
    Proxy(#[from] ProxyError),

    #[error("{0}")]
    Supervisor(#[from] SupervisorError),

    #[error("Shared component error: {0}")]
    Shared(#[from] SharedError),

    #[error("Invalid lock file {path}: {message}")]
    LockFile { path: PathBuf, message: String },

    #[error("{watcher}: {message}")]
    Watcher { watcher: String, message: String },

    #[error("File watcher error: {0}")]
    Notify(#[from] notify::Error),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ShadowfaxError {
    pub fn lock_file(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::LockFile {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn watcher(watcher: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Watcher {
            watcher: watcher.into(),
            message: message.into(),
        }
    }
}

pub type ShadowfaxResult<T> = Result<T, ShadowfaxError>;
