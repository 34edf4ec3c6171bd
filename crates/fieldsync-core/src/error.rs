//! Error types for fieldsync-core

use thiserror::Error;

/// Result type alias using fieldsync-core's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in fieldsync-core operations
#[derive(Error, Debug)]
pub enum Error {
    /// libSQL error
    #[error("libSQL error: {0}")]
    LibSql(#[from] libsql::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The record store refused a write because it would exceed its quota
    #[error("Storage quota exceeded: {required} bytes required, {quota} bytes available")]
    QuotaExceeded { required: u64, quota: u64 },

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// HTTP client setup error
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

impl Error {
    /// Whether this error means a write could not be durably recorded.
    pub const fn is_durability_failure(&self) -> bool {
        matches!(
            self,
            Self::LibSql(_) | Self::Io(_) | Self::QuotaExceeded { .. }
        )
    }
}
