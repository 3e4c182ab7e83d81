//! Ledger error types.

use thiserror::Error;

use super::models::UserId;

/// Ledger errors
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Not enough spendable balance to reserve a stake
    #[error("Insufficient balance: available {available}, required {required}")]
    InsufficientBalance {
        user_id: UserId,
        available: i64,
        required: i64,
    },

    /// Not enough pending balance to release or settle a stake
    #[error("Insufficient pending balance: pending {pending}, required {required}")]
    InsufficientPending {
        user_id: UserId,
        pending: i64,
        required: i64,
    },

    /// Wallet not found
    #[error("Wallet not found for user {0}")]
    WalletNotFound(UserId),

    /// Duplicate transaction (idempotency key already used)
    #[error("Duplicate transaction: {0}")]
    DuplicateTransaction(String),

    /// Invalid amount (must be positive)
    #[error("Invalid amount: {0}")]
    InvalidAmount(i64),

    /// Balance arithmetic would overflow
    #[error("Balance overflow")]
    BalanceOverflow,

    /// Settlement between a user and themselves
    #[error("Winner and loser must differ")]
    SelfSettlement,
}

impl LedgerError {
    /// Get a client-safe error message that doesn't leak sensitive information
    pub fn client_message(&self) -> String {
        match self {
            LedgerError::Database(_) => "Internal server error".to_string(),
            LedgerError::WalletNotFound(_) => "Wallet not found".to_string(),
            LedgerError::DuplicateTransaction(_) => "Transaction already processed".to_string(),
            _ => self.to_string(),
        }
    }

    /// Whether the operation was already applied under the same idempotency key.
    #[must_use]
    pub fn is_duplicate(&self) -> bool {
        matches!(self, LedgerError::DuplicateTransaction(_))
    }
}

/// Result type for ledger operations
pub type LedgerResult<T> = Result<T, LedgerError>;
