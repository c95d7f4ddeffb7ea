//! Error types shared by the ingestion pipeline.
//!
//! Soft extraction failures (missing metadata, non-2xx responses, transport
//! errors on a single article) never surface as errors; they are logged and
//! represented as absent values. Everything in [`IngestError`] is a failure a
//! caller is expected to see: persistence problems, configuration mistakes and
//! transport failures on operations that cannot degrade gracefully.

use thiserror::Error;

/// Errors raised by the ingestion core.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("A feed with this URL already exists: {url}")]
    DuplicateUrl { url: String },

    #[error("Invalid feed item: {0}")]
    Validation(String),

    #[error("Source configuration not found: {0}")]
    ConfigNotFound(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Config parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, IngestError>;
