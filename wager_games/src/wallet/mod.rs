//! Wallet module providing stake escrow for wagered sessions.
//!
//! This module implements:
//! - The [`Ledger`] contract (reserve, release, settle)
//! - Pending balances that hold stakes while a session is in flight
//! - Idempotency keys to prevent duplicate transactions
//! - A PostgreSQL ledger and an in-memory ledger
//!
//! ## Example
//!
//! ```
//! use wager_games::wallet::{InMemoryLedger, Ledger};
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ledger = InMemoryLedger::new().with_wallet(1, 1_000).with_wallet(2, 1_000);
//!
//! ledger.reserve(1, 100, "session:7:reserve:1").await?;
//! ledger.reserve(2, 100, "session:7:reserve:2").await?;
//! ledger.settle(1, 2, 100, false, "session:7:settle").await?;
//!
//! assert_eq!(ledger.balance(1).await?.spendable, 1_100);
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod ledger;
pub mod manager;
pub mod models;

pub use errors::{LedgerError, LedgerResult};
pub use ledger::{InMemoryLedger, Ledger};
pub use manager::PgLedger;
pub use models::{Balance, EntryKind, LedgerEntry, UserId};
