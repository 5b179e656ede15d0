//! Unified error types for tidecache.
//!
//! Tier failures (disk, store, timeouts, corrupted payloads) are recovered
//! inside the engine; only [`Error::InvalidKey`] is meant to reach callers.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use tokio_rusqlite::rusqlite;

/// Unified error types for the cache engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Malformed or empty cache key. Indicates a caller bug.
    #[error("INVALID_KEY: {0}")]
    InvalidKey(String),

    /// Invalid input parameters (e.g., a tool argument that is not JSON).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// No cache entry found for the given key.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// Disk tier I/O failed.
    #[error("CACHE_ERROR: io: {0}")]
    Io(#[from] std::io::Error),

    /// A stored payload could not be decoded.
    #[error("CACHE_ERROR: corrupted payload: {0}")]
    Corrupted(String),

    /// A disk or store call exceeded its time budget.
    #[error("CACHE_ERROR: {tier} tier timed out")]
    TierTimeout { tier: &'static str },
}

impl Error {
    /// Whether this error came from a durable tier and should degrade to a miss.
    pub fn is_tier_failure(&self) -> bool {
        matches!(
            self,
            Error::Database(_)
                | Error::MigrationFailed(_)
                | Error::Io(_)
                | Error::Corrupted(_)
                | Error::TierTimeout { .. }
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
        Error::Corrupted(err.to_string())
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidKey(msg) => (-32602, msg.clone()),
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::CacheMiss(msg) => (-32001, msg.clone()),
            Error::Database(e) => (-32002, e.to_string()),
            Error::MigrationFailed(msg) => (-32002, msg.clone()),
            Error::Io(e) => (-32002, e.to_string()),
            Error::Corrupted(msg) => (-32002, msg.clone()),
            Error::TierTimeout { tier } => (-32002, format!("{tier} tier timed out")),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}
