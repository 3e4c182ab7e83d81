//! Escrow ledger contract and an in-memory implementation.

use async_trait::async_trait;
use chrono::Utc;
use std::{
    collections::{HashMap, HashSet},
    sync::{Mutex, MutexGuard, PoisonError},
};

use super::{
    errors::{LedgerError, LedgerResult},
    models::{Balance, EntryKind, LedgerEntry, UserId},
};

/// Escrow operations the session engine relies on.
///
/// Every call carries an idempotency key; replaying a key fails with
/// [`LedgerError::DuplicateTransaction`] and changes nothing.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Move `amount` from spendable into pending.
    async fn reserve(
        &self,
        user_id: UserId,
        amount: i64,
        idempotency_key: &str,
    ) -> LedgerResult<Balance>;

    /// Move `amount` from pending back into spendable.
    async fn release(
        &self,
        user_id: UserId,
        amount: i64,
        idempotency_key: &str,
    ) -> LedgerResult<Balance>;

    /// Settle a decided match: both stakes leave pending, the winner is
    /// credited both.
    async fn settle(
        &self,
        winner: UserId,
        loser: UserId,
        amount: i64,
        taxable: bool,
        idempotency_key: &str,
    ) -> LedgerResult<()>;

    /// Current balance of a user.
    async fn balance(&self, user_id: UserId) -> LedgerResult<Balance>;
}

#[derive(Default)]
struct LedgerState {
    balances: HashMap<UserId, Balance>,
    applied: HashSet<String>,
    entries: Vec<LedgerEntry>,
}

impl LedgerState {
    fn wallet(&mut self, user_id: UserId, starting: Option<i64>) -> LedgerResult<&mut Balance> {
        if let Some(spendable) = starting {
            return Ok(self.balances.entry(user_id).or_insert(Balance {
                user_id,
                spendable,
                pending: 0,
            }));
        }
        self.balances
            .get_mut(&user_id)
            .ok_or(LedgerError::WalletNotFound(user_id))
    }

    fn record(
        &mut self,
        user_id: UserId,
        spendable_delta: i64,
        pending_delta: i64,
        kind: EntryKind,
        taxable: bool,
        idempotency_key: &str,
    ) {
        let id = i64::try_from(self.entries.len()).unwrap_or(i64::MAX) + 1;
        self.entries.push(LedgerEntry {
            id,
            user_id,
            spendable_delta,
            pending_delta,
            kind,
            taxable,
            idempotency_key: idempotency_key.to_string(),
            created_at: Utc::now(),
        });
    }

    fn check_key(&self, idempotency_key: &str) -> LedgerResult<()> {
        if self.applied.contains(idempotency_key) {
            return Err(LedgerError::DuplicateTransaction(idempotency_key.to_string()));
        }
        Ok(())
    }
}

/// Ledger held in process memory.
///
/// Used by tests and by the server's in-memory mode. With a starting balance
/// configured, unknown users get a wallet on first touch.
#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
    starting_balance: Option<i64>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Give every unknown user `amount` spendable on first touch.
    pub fn with_starting_balance(mut self, amount: i64) -> Self {
        self.starting_balance = Some(amount);
        self
    }

    /// Create a wallet with the given spendable balance.
    pub fn with_wallet(self, user_id: UserId, spendable: i64) -> Self {
        self.lock().balances.insert(
            user_id,
            Balance {
                user_id,
                spendable,
                pending: 0,
            },
        );
        self
    }

    /// Ledger entries of a user, oldest first.
    pub fn entries(&self, user_id: UserId) -> Vec<LedgerEntry> {
        self.lock()
            .entries
            .iter()
            .filter(|entry| entry.user_id == user_id)
            .cloned()
            .collect()
    }

    /// Sum of spendable and pending over every wallet.
    pub fn total_money(&self) -> i64 {
        self.lock().balances.values().map(Balance::total).sum()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn reserve(
        &self,
        user_id: UserId,
        amount: i64,
        idempotency_key: &str,
    ) -> LedgerResult<Balance> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let mut state = self.lock();
        state.check_key(idempotency_key)?;

        let wallet = state.wallet(user_id, self.starting_balance)?;
        if wallet.spendable < amount {
            return Err(LedgerError::InsufficientBalance {
                user_id,
                available: wallet.spendable,
                required: amount,
            });
        }
        wallet.spendable -= amount;
        wallet.pending = wallet
            .pending
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow)?;
        let balance = *wallet;

        state.applied.insert(idempotency_key.to_string());
        state.record(user_id, -amount, amount, EntryKind::Reserve, false, idempotency_key);
        Ok(balance)
    }

    async fn release(
        &self,
        user_id: UserId,
        amount: i64,
        idempotency_key: &str,
    ) -> LedgerResult<Balance> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        let mut state = self.lock();
        state.check_key(idempotency_key)?;

        let wallet = state.wallet(user_id, None)?;
        if wallet.pending < amount {
            return Err(LedgerError::InsufficientPending {
                user_id,
                pending: wallet.pending,
                required: amount,
            });
        }
        wallet.spendable = wallet
            .spendable
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow)?;
        wallet.pending -= amount;
        let balance = *wallet;

        state.applied.insert(idempotency_key.to_string());
        state.record(user_id, amount, -amount, EntryKind::Release, false, idempotency_key);
        Ok(balance)
    }

    async fn settle(
        &self,
        winner: UserId,
        loser: UserId,
        amount: i64,
        taxable: bool,
        idempotency_key: &str,
    ) -> LedgerResult<()> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }
        if winner == loser {
            return Err(LedgerError::SelfSettlement);
        }
        let mut state = self.lock();
        state.check_key(idempotency_key)?;

        // Validate both sides before mutating either.
        for user_id in [winner, loser] {
            let wallet = state.wallet(user_id, None)?;
            if wallet.pending < amount {
                return Err(LedgerError::InsufficientPending {
                    user_id,
                    pending: wallet.pending,
                    required: amount,
                });
            }
        }
        let payout = amount.checked_mul(2).ok_or(LedgerError::BalanceOverflow)?;
        let winner_wallet = state.wallet(winner, None)?;
        winner_wallet.spendable = winner_wallet
            .spendable
            .checked_add(payout)
            .ok_or(LedgerError::BalanceOverflow)?;
        winner_wallet.pending -= amount;
        state.wallet(loser, None)?.pending -= amount;

        state.applied.insert(idempotency_key.to_string());
        state.record(winner, payout, -amount, EntryKind::SettleWin, taxable, idempotency_key);
        state.record(loser, 0, -amount, EntryKind::SettleLoss, taxable, idempotency_key);
        Ok(())
    }

    async fn balance(&self, user_id: UserId) -> LedgerResult<Balance> {
        let mut state = self.lock();
        state.wallet(user_id, self.starting_balance).map(|wallet| *wallet)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ledger() -> InMemoryLedger {
        InMemoryLedger::new().with_wallet(1, 1000).with_wallet(2, 1000)
    }

    #[tokio::test]
    async fn test_reserve_moves_into_pending() {
        let ledger = ledger();
        let balance = ledger.reserve(1, 300, "r1").await.unwrap();
        assert_eq!(balance.spendable, 700);
        assert_eq!(balance.pending, 300);
        assert_eq!(ledger.total_money(), 2000);
    }

    #[tokio::test]
    async fn test_reserve_insufficient_balance() {
        let ledger = ledger();
        let err = ledger.reserve(1, 5000, "r1").await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { available: 1000, .. }));
        assert_eq!(ledger.balance(1).await.unwrap().spendable, 1000);
    }

    #[tokio::test]
    async fn test_duplicate_key_applies_once() {
        let ledger = ledger();
        ledger.reserve(1, 100, "same").await.unwrap();
        let err = ledger.reserve(1, 100, "same").await.unwrap_err();
        assert!(err.is_duplicate());
        assert_eq!(ledger.balance(1).await.unwrap().pending, 100);
    }

    #[tokio::test]
    async fn test_settle_conserves_money() {
        let ledger = ledger();
        ledger.reserve(1, 250, "r1").await.unwrap();
        ledger.reserve(2, 250, "r2").await.unwrap();
        ledger.settle(2, 1, 250, false, "s").await.unwrap();

        let winner = ledger.balance(2).await.unwrap();
        let loser = ledger.balance(1).await.unwrap();
        assert_eq!(winner.spendable, 1250);
        assert_eq!(winner.pending, 0);
        assert_eq!(loser.spendable, 750);
        assert_eq!(loser.pending, 0);
        assert_eq!(ledger.total_money(), 2000);
    }

    #[tokio::test]
    async fn test_settle_without_pending_changes_nothing() {
        let ledger = ledger();
        ledger.reserve(1, 250, "r1").await.unwrap();
        let err = ledger.settle(1, 2, 250, false, "s").await.unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientPending { user_id: 2, .. }));
        assert_eq!(ledger.balance(1).await.unwrap().pending, 250);
    }

    #[tokio::test]
    async fn test_starting_balance_creates_wallets() {
        let ledger = InMemoryLedger::new().with_starting_balance(50);
        assert_eq!(ledger.balance(9).await.unwrap().spendable, 50);
        assert!(matches!(
            ledger.release(10, 1, "x").await,
            Err(LedgerError::WalletNotFound(10))
        ));
    }
}
