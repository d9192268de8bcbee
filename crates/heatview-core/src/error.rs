//! Error types for Heatview Core

use thiserror::Error;

/// Result type alias for telemetry operations
pub type Result<T> = std::result::Result<T, Error>;

/// Telemetry error types
#[derive(Error, Debug)]
pub enum Error {
    // Transport errors
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Analytics endpoint returned HTTP {status}")]
    HttpStatus { status: u16 },

    #[error("Telemetry outbox closed")]
    OutboxClosed,

    #[error("No async runtime available to spawn the telemetry worker")]
    NoRuntime,

    // Metadata errors
    #[error("Failed to fetch metadata: {0}")]
    MetadataFetch(String),

    #[error("Failed to parse metadata: {0}")]
    MetadataParse(String),

    // Encoding errors
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Returns true if a later attempt could succeed
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::Network(_) | Error::HttpStatus { .. } | Error::MetadataFetch(_)
        )
    }

    /// Returns a stable error code for logging
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Network(_) => "NETWORK",
            Error::HttpStatus { .. } => "HTTP_STATUS",
            Error::OutboxClosed => "OUTBOX_CLOSED",
            Error::NoRuntime => "NO_RUNTIME",
            Error::MetadataFetch(_) => "METADATA_FETCH",
            Error::MetadataParse(_) => "METADATA_PARSE",
            Error::InvalidUrl(_) => "INVALID_URL",
            Error::Serialization(_) => "SERIALIZATION",
            Error::InvalidConfig(_) => "INVALID_CONFIG",
            Error::Io(_) => "IO",
        }
    }
}
