//! Unified error types for binsync.
//!
//! Every variant carries a stable code prefix so that control-channel callers
//! can match on it without parsing free text.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the offline engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller-supplied value failed validation (blank cache name, negative weight).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// SQLite call failed or the connection thread is gone.
    #[error("STORAGE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    #[error("STORAGE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A cache write would push durable usage past the configured quota.
    #[error("QUOTA_EXCEEDED: {needed} bytes needed, {available} available")]
    QuotaExceeded { needed: u64, available: u64 },

    /// Stored value could not be encoded or decoded.
    #[error("SERIALIZATION_ERROR: {0}")]
    Serialization(String),

    /// Request target or configured endpoint is not an absolute http(s) URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// The network did not answer within the fetch timeout.
    #[error("FETCH_TIMEOUT: {0}")]
    FetchTimeout(String),

    /// Response body exceeded the configured `max_bytes`.
    #[error("FETCH_TOO_LARGE: {0}")]
    FetchTooLarge(String),

    /// Network-level failure (DNS, connection refused, offline).
    #[error("NETWORK_ERROR: {0}")]
    Network(String),

    /// Non-success status from the network.
    #[error("HTTP_ERROR: {0}")]
    HttpError(String),

    /// The remote endpoint refused a queued mutation.
    #[error("REMOTE_REJECTED: {0}")]
    RemoteRejected(String),

    /// A worker version was asked to move against its lifecycle.
    #[error("INVALID_TRANSITION: {0}")]
    InvalidTransition(String),
}

impl Error {
    /// True for failures that come from the network boundary rather than local storage.
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            Error::FetchTimeout(_) | Error::Network(_) | Error::HttpError(_) | Error::FetchTooLarge(_)
        )
    }
}

impl From<tokio_rusqlite::Error<Error>> for Error {
    fn from(err: tokio_rusqlite::Error<Error>) -> Self {
        match err {
            tokio_rusqlite::Error::Error(e) => e,
            tokio_rusqlite::Error::ConnectionClosed => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
            tokio_rusqlite::Error::Close(c) => Error::Database(tokio_rusqlite::Error::Close(c)),
            _ => Error::Database(tokio_rusqlite::Error::ConnectionClosed),
        }
    }
}

impl From<tokio_rusqlite::Error<rusqlite::Error>> for Error {
    fn from(err: tokio_rusqlite::Error<rusqlite::Error>) -> Self {
        Error::Database(err)
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Error::Database(tokio_rusqlite::Error::Error(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::Database(e) => (-32002, e.to_string()),
            Error::MigrationFailed(msg) => (-32002, msg.clone()),
            Error::QuotaExceeded { .. } => (-32003, err.to_string()),
            Error::Serialization(msg) => (-32004, msg.clone()),
            Error::InvalidUrl(msg) => (-32005, msg.clone()),
            Error::FetchTimeout(msg) => (-32006, msg.clone()),
            Error::FetchTooLarge(msg) => (-32007, msg.clone()),
            Error::Network(msg) => (-32008, msg.clone()),
            Error::HttpError(msg) => (-32009, msg.clone()),
            Error::RemoteRejected(msg) => (-32010, msg.clone()),
            Error::InvalidTransition(msg) => (-32011, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
