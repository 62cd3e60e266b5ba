//! Unified error types for shelf.
//!
//! [`Error`] covers failures inside the process (database, migrations,
//! corrupt rows). [`CacheFailure`] is the taxonomy that crosses the
//! agent/client boundary and is shown to readers.

use rmcp::model::{ErrorCode, ErrorData as McpError};
use serde::{Deserialize, Serialize};
use tokio_rusqlite::rusqlite;

/// Unified error types for the shelf cache.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Invalid input parameters (e.g., empty document id).
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Database operation failed.
    #[error("CACHE_ERROR: {0}")]
    Database(tokio_rusqlite::Error),

    /// Migration failed to apply.
    #[error("CACHE_ERROR: migration failed: {0}")]
    MigrationFailed(String),

    /// A persisted row could not be decoded.
    #[error("CACHE_ERROR: corrupt record {document_id}: {reason}")]
    CorruptRecord { document_id: String, reason: String },
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

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::Database(e) => (-32002, e.to_string()),
            Error::MigrationFailed(msg) => (-32002, msg.clone()),
            Error::CorruptRecord { .. } => (-32002, err.to_string()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

/// Terminal failure of a cache command, as seen by the foreground.
///
/// Serialized by variant name (`"ConsentDenied"`, ...). Storage detail is
/// logged by the agent and never carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, thiserror::Error)]
pub enum CacheFailure {
    /// The owner's consent level forbids offline copies.
    #[error("CONSENT_DENIED")]
    ConsentDenied,

    /// Entry missing, expired, revoked, or out of refreshes.
    #[error("NOT_CACHEABLE")]
    NotCacheable,

    /// The durable medium failed; the store is unchanged.
    #[error("STORAGE_ERROR")]
    StorageError,

    /// The background agent is not running.
    #[error("AGENT_UNAVAILABLE")]
    AgentUnavailable,

    /// No reply arrived within the command timeout.
    #[error("TIMEOUT")]
    Timeout,
}

impl CacheFailure {
    /// Explanation suitable for showing to a reader.
    pub fn user_message(&self) -> &'static str {
        match self {
            CacheFailure::ConsentDenied => "The author of this work does not allow offline copies.",
            CacheFailure::NotCacheable => "This work is no longer available offline and cannot be renewed.",
            CacheFailure::StorageError => "The offline copy could not be saved. Please try again.",
            CacheFailure::AgentUnavailable => "Offline reading is still starting up. Please try again shortly.",
            CacheFailure::Timeout => "Saving for offline reading took too long. Please try again.",
        }
    }

    /// Whether the caller may retry the same command.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CacheFailure::StorageError | CacheFailure::AgentUnavailable | CacheFailure::Timeout)
    }
}

impl From<CacheFailure> for McpError {
    fn from(failure: CacheFailure) -> Self {
        let code = match failure {
            CacheFailure::ConsentDenied => -32020,
            CacheFailure::NotCacheable => -32021,
            CacheFailure::StorageError => -32022,
            CacheFailure::AgentUnavailable => -32023,
            CacheFailure::Timeout => -32024,
        };

        McpError { code: ErrorCode(code), message: failure.user_message().into(), data: None }
    }
}
