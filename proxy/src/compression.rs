//! Content-Encoding handling for rewritten HTML bodies

use std::io::{Read, Write};

use flate2::Compression;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;

use crate::error::{ProxyError, ProxyResult};

const BROTLI_BUFFER_SIZE: usize = 4096;
const BROTLI_QUALITY: u32 = 5;
const BROTLI_WINDOW: u32 = 22;

/// Encodings the rewriter can undo and redo
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentEncoding {
    Identity,
    Gzip,
    Brotli,
}

impl ContentEncoding {
    /// Parse a `Content-Encoding` header value
    ///
    /// Returns `None` for encodings that cannot be rewritten (deflate,
    /// zstd, stacked encodings); such bodies are passed through as-is.
    pub fn from_header(value: Option<&str>) -> Option<Self> {
        match value.map(|v| v.trim().to_ascii_lowercase()).as_deref() {
            None | Some("") | Some("identity") => Some(Self::Identity),
            Some("gzip") | Some("x-gzip") => Some(Self::Gzip),
            Some("br") => Some(Self::Brotli),
            Some(_) => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Identity => "identity",
            Self::Gzip => "gzip",
            Self::Brotli => "br",
        }
    }

    pub fn decode(self, body: &[u8]) -> ProxyResult<Vec<u8>> {
        let mut out = Vec::with_capacity(body.len() * 4);
        let result = match self {
            Self::Identity => return Ok(body.to_vec()),
            Self::Gzip => GzDecoder::new(body).read_to_end(&mut out),
            Self::Brotli => brotli::Decompressor::new(body, BROTLI_BUFFER_SIZE).read_to_end(&mut out),
        };
        result.map_err(|e| ProxyError::compression("decode", self.as_str(), e.to_string()))?;
        Ok(out)
    }

    pub fn encode(self, body: &[u8]) -> ProxyResult<Vec<u8>> {
        let wrap = |e: std::io::Error| ProxyError::compression("encode", self.as_str(), e.to_string());
        match self {
            Self::Identity => Ok(body.to_vec()),
            Self::Gzip => {
                let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 2), Compression::default());
                encoder.write_all(body).map_err(wrap)?;
                encoder.finish().map_err(wrap)
            }
            Self::Brotli => {
                let mut encoder = brotli::CompressorWriter::new(
                    Vec::with_capacity(body.len() / 2),
                    BROTLI_BUFFER_SIZE,
                    BROTLI_QUALITY,
                    BROTLI_WINDOW,
                );
                encoder.write_all(body).map_err(wrap)?;
                // into_inner finishes the stream
                Ok(encoder.into_inner())
            }
        }
    }
}
