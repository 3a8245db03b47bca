//! Proxy-specific error types

use std::net::SocketAddr;

use shared::SharedError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProxyError {
    #[error("Failed to bind proxy to {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid upstream URL {url}: {message}")]
    InvalidUpstream { url: String, message: String },

    #[error("Upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("Failed to {operation} {encoding} body: {message}")]
    Compression {
        operation: &'static str,
        encoding: &'static str,
        message: String,
    },

    #[error("Proxy server error: {0}")]
    Serve(String),

    #[error("Shared component error: {0}")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ProxyError {
    pub fn bind(addr: SocketAddr, source: std::io::Error) -> Self {
        Self::Bind { addr, source }
    }

    pub fn invalid_upstream(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidUpstream {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn compression(operation: &'static str, encoding: &'static str, message: impl Into<String>) -> Self {
        Self::Compression {
            operation,
            encoding,
            message: message.into(),
        }
    }
}

pub type ProxyResult<T> = Result<T, ProxyError>;
