//! Session error types.

use thiserror::Error;

use super::models::{SessionId, SessionStatus, UserId};
use crate::{db::StorageError, game::GameError, wallet::LedgerError};

/// Session errors
#[derive(Debug, Error)]
pub enum SessionError {
    /// Session does not exist (never created, cancelled, or rejected)
    #[error("Session {0} not found")]
    NotFound(SessionId),

    /// Session already reached a terminal state
    #[error("Session {0} is already finished")]
    AlreadyFinished(SessionId),

    /// Session has not started yet
    #[error("Session {0} has not started")]
    NotStarted(SessionId),

    /// Operation not allowed in the current status
    #[error("Operation not allowed while session is {status}")]
    InvalidState { status: SessionStatus },

    /// Actor is not allowed to act on this session
    #[error("User {user_id} cannot act on session {session_id}")]
    NotParticipant {
        session_id: SessionId,
        user_id: UserId,
    },

    /// Wager must be positive
    #[error("Invalid wager: {0}")]
    InvalidWager(i64),

    /// Wager below the configured minimum
    #[error("Wager {wager} is below the minimum of {minimum}")]
    WagerBelowMinimum { wager: i64, minimum: i64 },

    /// Not enough spendable balance to cover the stake
    #[error("Insufficient stake: available {available}, required {required}")]
    InsufficientStake { available: i64, required: i64 },

    #[error("Cannot challenge yourself")]
    CannotChallengeSelf,

    /// Operation only applies to global sessions
    #[error("Session {0} is not a global challenge")]
    NotGlobal(SessionId),

    #[error("Session {0} already has an opponent")]
    OpponentAlreadyJoined(SessionId),

    /// Game type has not been selected yet
    #[error("No game type selected for session {0}")]
    TypeNotSelected(SessionId),

    /// Invalid engine configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Board engine rejected the operation
    #[error(transparent)]
    Game(#[from] GameError),

    /// Ledger error
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),

    /// Storage error
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Session actor went away before replying
    #[error("Session {0} actor unavailable")]
    ActorUnavailable(SessionId),
}

impl SessionError {
    /// Errors that abort the operation and are logged at error level.
    pub fn is_fatal(&self) -> bool {
        match self {
            SessionError::Game(err) => err.is_fatal(),
            SessionError::Ledger(_)
            | SessionError::Storage(_)
            | SessionError::InvalidConfig(_)
            | SessionError::ActorUnavailable(_) => true,
            _ => false,
        }
    }

    /// Get a client-safe error message that doesn't leak sensitive information
    pub fn client_message(&self) -> String {
        match self {
            SessionError::Storage(err) => err.client_message(),
            SessionError::Ledger(err) => err.client_message(),
            err if err.is_fatal() => "Internal server error".to_string(),
            err => err.to_string(),
        }
    }

    /// Map a failed stake reservation, keeping balance shortfalls user-visible.
    pub(crate) fn from_reserve(err: LedgerError) -> Self {
        match err {
            LedgerError::InsufficientBalance {
                available,
                required,
                ..
            } => SessionError::InsufficientStake {
                available,
                required,
            },
            err => SessionError::Ledger(err),
        }
    }
}

/// Result type for session operations
pub type SessionResult<T> = Result<T, SessionError>;
