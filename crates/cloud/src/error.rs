//! Error types for imagery service backends.

use thiserror::Error;

/// Errors produced by imagery service backends.
#[derive(Error, Debug)]
pub enum CloudError {
    #[cfg(feature = "remote")]
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("network error: {0}")]
    Network(String),

    #[error("service returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("cannot decode service response: {0}")]
    Decode(String),

    #[error("authentication error: {0}")]
    Auth(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unknown composite '{0}'")]
    UnknownComposite(String),

    #[error("export rejected: {0}")]
    ExportRejected(String),

    #[error("scene manifest error: {0}")]
    Manifest(String),

    #[error("core error: {0}")]
    Core(#[from] fieldzones_core::Error),
}

impl From<serde_json::Error> for CloudError {
    fn from(e: serde_json::Error) -> Self {
        CloudError::Decode(e.to_string())
    }
}

/// Result alias for cloud operations.
pub type Result<T> = std::result::Result<T, CloudError>;
