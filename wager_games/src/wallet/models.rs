//! Ledger data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// User ID type
pub type UserId = i64;

/// Spendable and pending (escrowed) balance of one user
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    pub user_id: UserId,
    pub spendable: i64,
    pub pending: i64,
}

impl Balance {
    /// Spendable plus pending.
    #[must_use]
    pub fn total(&self) -> i64 {
        self.spendable.saturating_add(self.pending)
    }
}

/// Ledger entry model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: i64,
    pub user_id: UserId,
    /// Signed change to the spendable balance
    pub spendable_delta: i64,
    /// Signed change to the pending balance
    pub pending_delta: i64,
    pub kind: EntryKind,
    pub taxable: bool,
    pub idempotency_key: String,
    pub created_at: DateTime<Utc>,
}

/// Entry kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Reserve,
    Release,
    SettleWin,
    SettleLoss,
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryKind::Reserve => write!(f, "reserve"),
            EntryKind::Release => write!(f, "release"),
            EntryKind::SettleWin => write!(f, "settle_win"),
            EntryKind::SettleLoss => write!(f, "settle_loss"),
        }
    }
}
