//! PostgreSQL ledger with pending balances and an idempotent entry log.
#![allow(clippy::needless_raw_string_hashes)]

use super::{
    errors::{LedgerError, LedgerResult},
    ledger::Ledger,
    models::{Balance, EntryKind, UserId},
};
use async_trait::async_trait;
use sqlx::{PgPool, Postgres, Row, Transaction};
use std::sync::Arc;

/// Ledger backed by the `wallets` and `wallet_entries` tables
#[derive(Clone)]
pub struct PgLedger {
    pool: Arc<PgPool>,
}

impl PgLedger {
    /// Create a new ledger
    ///
    /// # Arguments
    ///
    /// * `pool` - Database connection pool
    ///
    /// # Returns
    ///
    /// * `PgLedger` - New ledger instance
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    async fn ensure_new_key(
        tx: &mut Transaction<'_, Postgres>,
        idempotency_key: &str,
    ) -> LedgerResult<()> {
        let existing = sqlx::query("SELECT id FROM wallet_entries WHERE idempotency_key = $1 LIMIT 1")
            .bind(idempotency_key)
            .fetch_optional(&mut **tx)
            .await?;

        if existing.is_some() {
            return Err(LedgerError::DuplicateTransaction(idempotency_key.to_string()));
        }
        Ok(())
    }

    /// Lock a wallet row for the rest of the transaction
    async fn lock_wallet(
        tx: &mut Transaction<'_, Postgres>,
        user_id: UserId,
    ) -> LedgerResult<Balance> {
        let row = sqlx::query(
            "SELECT balance, pending_balance FROM wallets WHERE user_id = $1 FOR UPDATE",
        )
        .bind(user_id)
        .fetch_optional(&mut **tx)
        .await?
        .ok_or(LedgerError::WalletNotFound(user_id))?;

        Ok(Balance {
            user_id,
            spendable: row.get("balance"),
            pending: row.get("pending_balance"),
        })
    }

    async fn write_wallet(tx: &mut Transaction<'_, Postgres>, balance: &Balance) -> LedgerResult<()> {
        sqlx::query(
            "UPDATE wallets
             SET balance = $1, pending_balance = $2, updated_at = NOW()
             WHERE user_id = $3",
        )
        .bind(balance.spendable)
        .bind(balance.pending)
        .bind(balance.user_id)
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Create a ledger entry
    async fn create_entry(
        tx: &mut Transaction<'_, Postgres>,
        user_id: UserId,
        spendable_delta: i64,
        pending_delta: i64,
        kind: EntryKind,
        taxable: bool,
        idempotency_key: &str,
    ) -> LedgerResult<i64> {
        let row = sqlx::query(
            r#"
            INSERT INTO wallet_entries (user_id, spendable_delta, pending_delta, kind, taxable, idempotency_key)
            VALUES ($1, $2, $3, $4, $5, $6)
            RETURNING id
            "#,
        )
        .bind(user_id)
        .bind(spendable_delta)
        .bind(pending_delta)
        .bind(kind.to_string())
        .bind(taxable)
        .bind(idempotency_key)
        .fetch_one(&mut **tx)
        .await?;

        Ok(row.get("id"))
    }
}

#[async_trait]
impl Ledger for PgLedger {
    async fn reserve(
        &self,
        user_id: UserId,
        amount: i64,
        idempotency_key: &str,
    ) -> LedgerResult<Balance> {
        if amount <= 0 {
            return Err(LedgerError::InvalidAmount(amount));
        }

        let mut tx = self.pool.begin().await?;
        Self::ensure_new_key(&mut tx, idempotency_key).await?;

        let mut balance = Self::lock_wallet(&mut tx, user_id).await?;
        if balance.spendable < amount {
            return Err(LedgerError::InsufficientBalance {
                user_id,
                available: balance.spendable,
                required: amount,
            });
        }
        balance.spendable -= amount;
        balance.pending = balance
            .pending
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow)?;

        Self::write_wallet(&mut tx, &balance).await?;
        Self::create_entry(
            &mut tx,
            user_id,
            -amount,
            amount,
            EntryKind::Reserve,
            false,
            idempotency_key,
        )
        .await?;

        tx.commit().await?;
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

        let mut tx = self.pool.begin().await?;
        Self::ensure_new_key(&mut tx, idempotency_key).await?;

        let mut balance = Self::lock_wallet(&mut tx, user_id).await?;
        if balance.pending < amount {
            return Err(LedgerError::InsufficientPending {
                user_id,
                pending: balance.pending,
                required: amount,
            });
        }
        balance.spendable = balance
            .spendable
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow)?;
        balance.pending -= amount;

        Self::write_wallet(&mut tx, &balance).await?;
        Self::create_entry(
            &mut tx,
            user_id,
            amount,
            -amount,
            EntryKind::Release,
            false,
            idempotency_key,
        )
        .await?;

        tx.commit().await?;
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

        let mut tx = self.pool.begin().await?;
        Self::ensure_new_key(&mut tx, idempotency_key).await?;

        // Lock in id order so concurrent settlements cannot deadlock.
        let (first, second) = if winner < loser { (winner, loser) } else { (loser, winner) };
        let first_balance = Self::lock_wallet(&mut tx, first).await?;
        let second_balance = Self::lock_wallet(&mut tx, second).await?;
        let (mut winner_balance, mut loser_balance) = if first == winner {
            (first_balance, second_balance)
        } else {
            (second_balance, first_balance)
        };

        for balance in [&winner_balance, &loser_balance] {
            if balance.pending < amount {
                return Err(LedgerError::InsufficientPending {
                    user_id: balance.user_id,
                    pending: balance.pending,
                    required: amount,
                });
            }
        }

        let payout = amount.checked_mul(2).ok_or(LedgerError::BalanceOverflow)?;
        winner_balance.spendable = winner_balance
            .spendable
            .checked_add(payout)
            .ok_or(LedgerError::BalanceOverflow)?;
        winner_balance.pending -= amount;
        loser_balance.pending -= amount;

        Self::write_wallet(&mut tx, &winner_balance).await?;
        Self::write_wallet(&mut tx, &loser_balance).await?;
        Self::create_entry(
            &mut tx,
            winner,
            payout,
            -amount,
            EntryKind::SettleWin,
            taxable,
            idempotency_key,
        )
        .await?;
        Self::create_entry(
            &mut tx,
            loser,
            0,
            -amount,
            EntryKind::SettleLoss,
            taxable,
            idempotency_key,
        )
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn balance(&self, user_id: UserId) -> LedgerResult<Balance> {
        let row = sqlx::query("SELECT balance, pending_balance FROM wallets WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(self.pool.as_ref())
            .await?
            .ok_or(LedgerError::WalletNotFound(user_id))?;

        Ok(Balance {
            user_id,
            spendable: row.get("balance"),
            pending: row.get("pending_balance"),
        })
    }
}
