//! Shared error types for the shadowfax subsystems

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Failed to signal process {pid}: {message}")]
    SignalFailed { pid: u32, message: String },

    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: String, value: String },

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl SharedError {
    pub fn signal(pid: u32, message: impl Into<String>) -> Self {
        Self::SignalFailed {
            pid,
            message: message.into(),
        }
    }

    pub fn config(field: impl Into<String>, value: impl Into<String>) -> Self {
        Self::InvalidConfig {
            field: field.into(),
            value: value.into(),
        }
    }
}

pub type SharedResult<T> = Result<T, SharedError>;
