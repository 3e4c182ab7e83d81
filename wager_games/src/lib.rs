//! # Wager Games
//!
//! A wagered mini-game engine: two users stake the same amount, play one of
//! seven mini-games, and the winner collects both stakes.
//!
//! Sessions run either head-to-head (both sides share one board and play in
//! real time) or global (an open challenge anyone can join later; each side
//! plays its own board and the results are compared at the end).
//!
//! ## Architecture
//!
//! A session moves through a fixed lifecycle:
//!
//! - **AwaitingSelection**: created, challenger's stake already in escrow
//! - **AwaitingOpponentConfirmation**: game type chosen
//! - **CountdownToStart**: opponent accepted and staked
//! - **InProgress**: boards are live, timers drive hints and deadlines
//! - **Won/Lost/Draw/ForcedEnd**: terminal, stakes settled or refunded
//!
//! Each session is owned by one actor that re-reads the persisted record on
//! every message. Timers are fire-and-forget tasks that re-check state when
//! they fire, and hint timing is rebuilt from persisted timestamps, so a
//! restarted host picks up exactly where it stopped.
//!
//! ## Core Modules
//!
//! - [`game`]: Board engines, the persisted [`game::Board`] union, difficulty tiers
//! - [`session`]: Session lifecycle, actors, scheduling, notifications
//! - [`wallet`]: Escrow ledger (reserve, release, settle)
//! - [`db`]: PostgreSQL pool and session storage

/// Database pool, configuration, and session repositories.
pub mod db;

/// Board engines and shared game vocabulary.
pub mod game;
pub use game::{Board, GameError, GameType, Move, Outcome, Role};

/// Session lifecycle and the per-session actors.
pub mod session;
pub use session::{GameSession, SessionConfig, SessionError, SessionManager, SessionStatus};

/// Stake escrow.
pub mod wallet;
