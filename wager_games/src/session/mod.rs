//! Session engine: lifecycle, escrow, timers, and per-session actors.
//!
//! This module provides:
//! - [`GameSession`], the persisted record of one wagered game
//! - [`SessionManager`], the entry point that creates sessions and routes
//!   every other operation to a per-session [`SessionActor`]
//! - Delayed tasks ([`SessionTask`]) that re-read persisted state when they
//!   fire, plus the hint catch-up arithmetic ([`catch_up`])
//! - Outbound notifications through the [`Notifier`] port
//!
//! ## Example
//!
//! ```
//! use std::sync::Arc;
//! use wager_games::{
//!     db::InMemorySessionRepository,
//!     game::{GameType, Move, RpsChoice, StaticCatalog},
//!     session::{
//!         LogNotifier, RecordingScheduler, SessionConfig, SessionContext, SessionManager,
//!         SessionStatus, SessionTask, SystemClock,
//!     },
//!     wallet::InMemoryLedger,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let ctx = SessionContext {
//!     config: Arc::new(SessionConfig::default()),
//!     repository: Arc::new(InMemorySessionRepository::new()),
//!     ledger: Arc::new(InMemoryLedger::new().with_wallet(1, 100).with_wallet(2, 100)),
//!     catalog: Arc::new(StaticCatalog::builtin()),
//!     notifier: Arc::new(LogNotifier),
//!     scheduler: Arc::new(RecordingScheduler::new()),
//!     clock: Arc::new(SystemClock),
//! };
//! let manager = SessionManager::new(ctx)?;
//!
//! let session = manager.create_session(1, 10, Some(2), None).await?;
//! manager.select_type(session.id, 1, GameType::RockPaperScissors).await?;
//! manager.respond(session.id, 2, true).await?;
//! manager.dispatch(session.id, SessionTask::CountdownElapsed).await.ok();
//! # Ok(())
//! # }
//! ```

pub mod actor;
pub mod clock;
pub mod config;
pub mod errors;
pub mod manager;
pub mod messages;
pub mod models;
pub mod notifier;
pub mod scheduler;

pub use actor::{SessionActor, SessionContext, SessionHandle};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SessionConfig;
pub use errors::{SessionError, SessionResult};
pub use manager::SessionManager;
pub use messages::{MoveOutcome, SessionMessage};
pub use models::{GameSession, SessionId, SessionStatus, UserId};
pub use notifier::{ChannelNotifier, LogNotifier, Notifier, SessionEvent};
pub use scheduler::{
    CatchUp, DelayedTask, RecordingScheduler, ScheduledTask, SessionTask, TaskScheduler,
    TokioScheduler, catch_up,
};
