//! Error types for cmsrelay.
//!
//! The `Display` output of each variant is what reaches the end user, either
//! as a JSON `error` field or as the text after the in-band `[error] ` marker.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    /// Bad request input (missing/oversized query, unknown provider).
    #[error("{0}")]
    Validation(String),

    /// Missing credential or other process-level misconfiguration.
    #[error("{0}")]
    Config(String),

    /// Non-success status (or absent body) from an LLM vendor.
    #[error("{provider} error: {status} {body}")]
    Vendor {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("{0}")]
    Transport(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("Content source error: {0}")]
    ContentSource(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// True for errors caused by the caller's request rather than the server.
    pub fn is_client_error(&self) -> bool {
        matches!(self, Error::Validation(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
