//! Error types shared by the gateway crates.

use std::path::PathBuf;

/// Failure while reading or writing the durable analytics file.
///
/// Always non-fatal for the server: callers log it and keep serving from
/// in-memory state.
#[derive(Debug, thiserror::Error)]
pub enum PersistenceError {
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid analytics JSON: {0}")]
    Json(#[from] serde_json::Error),
}

/// Failure reported by the external search collaborator.
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// No API key was supplied by the request, its headers, or the process default.
    #[error("No Exa API key provided")]
    MissingApiKey,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid Exa base URL: {0}")]
    InvalidBaseUrl(String),

    #[error("Upstream returned status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Upstream request timed out")]
    Timeout,

    #[error("Failed to decode upstream response: {0}")]
    Decode(String),
}

impl UpstreamError {
    /// Map a reqwest failure, keeping timeouts distinct from other transport errors.
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Http(err)
        }
    }
}

/// `tools/call` arguments that do not fit the tool's typed payload.
#[derive(Debug, thiserror::Error)]
pub enum ArgumentError {
    #[error("Invalid arguments: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Invalid arguments: {0}")]
    Invalid(String),
}
