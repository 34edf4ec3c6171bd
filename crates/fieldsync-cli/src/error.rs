use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] fieldsync_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("No payload provided")]
    EmptyPayload,
    #[error("Payload must be a JSON object: {0}")]
    InvalidPayload(String),
    #[error("Invalid operation ID: {0}")]
    InvalidOperationId(String),
    #[error("No dead-lettered operation with id {0}")]
    NotDeadLettered(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Refusing to delete unsynced work without --yes ({0} unsynced)")]
    ConfirmationRequired(usize),
    #[error(
        "Sync is not configured. Run `fieldsync config init --api-base-url <URL>` or set FIELDSYNC_API_URL."
    )]
    SyncNotConfigured,
}
