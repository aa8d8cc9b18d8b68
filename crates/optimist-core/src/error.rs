//! Error types
//!
//! `RemoteCallFailure` is the one error the retry loop reacts to. It is
//! deliberately not classified: validation errors, connectivity errors and
//! server errors all consume one attempt.
//!
//! `SyncError` covers mistakes the caller can make before a retry chain
//! starts, plus the one-shot initial load.

use thiserror::Error;

use crate::client_id::ClientsideId;

/// Any failure reported by the remote store
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Remote call failed: {message}")]
pub struct RemoteCallFailure {
    pub message: String,
}

impl RemoteCallFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<rusqlite::Error> for RemoteCallFailure {
    fn from(error: rusqlite::Error) -> Self {
        Self::new(format!("database error: {}", error))
    }
}

impl From<serde_json::Error> for RemoteCallFailure {
    fn from(error: serde_json::Error) -> Self {
        Self::new(format!("malformed response: {}", error))
    }
}

/// Errors surfaced to the caller of the sync engine
#[derive(Error, Debug)]
pub enum SyncError {
    /// Item is not (or no longer) in the store
    #[error("Item '{0}' is not in the store")]
    UnknownItem(ClientsideId),

    /// Item has no server key yet (its creation is still pending)
    #[error("Item '{clientside_id}' has no value for key field '{field}' yet")]
    MissingKey {
        clientside_id: ClientsideId,
        field: &'static str,
    },

    /// Mutation with no items
    #[error("Mutation targets no items")]
    EmptyBatch,

    /// Record could not be converted to or from a row
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Row returned by the bulk read does not match the record type
    #[error("Failed to decode row {index}: {source}")]
    Decode {
        index: usize,
        #[source]
        source: serde_json::Error,
    },

    /// Initial load failed
    #[error(transparent)]
    Remote(#[from] RemoteCallFailure),

    /// Retry chain panicked or was aborted
    #[error("Sync task did not complete: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type for sync engine operations
pub type SyncResult<T> = Result<T, SyncError>;
