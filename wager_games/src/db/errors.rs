//! Storage error types.

use std::time::Duration;
use thiserror::Error;

use crate::session::SessionId;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Query timed out
    #[error("Database operation timed out after {0:?}")]
    Timeout(Duration),

    /// A newer snapshot was saved since this one was loaded
    #[error("Version conflict on session {session_id}: expected {expected}, found {found}")]
    VersionConflict {
        session_id: SessionId,
        expected: i64,
        found: i64,
    },

    /// Board document could not be decoded or does not match the session
    #[error("Corrupt board for session {session_id}: {reason}")]
    CorruptBoard {
        session_id: SessionId,
        reason: String,
    },

    /// Row could not be mapped onto a session
    #[error("Corrupt session row {session_id}: {reason}")]
    CorruptRow {
        session_id: SessionId,
        reason: String,
    },

    /// Session not found
    #[error("Session {0} not found")]
    NotFound(SessionId),
}

impl StorageError {
    /// Get a client-safe error message that doesn't leak sensitive information
    pub fn client_message(&self) -> String {
        match self {
            StorageError::NotFound(_) => "Session not found".to_string(),
            _ => "Internal server error".to_string(),
        }
    }
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;
