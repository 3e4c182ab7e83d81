//! Session actor message types.

use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use super::{
    errors::SessionResult,
    models::{GameSession, SessionStatus, UserId},
    scheduler::SessionTask,
};
use crate::game::{GameType, Move, Outcome};

/// Messages that can be sent to a SessionActor
#[derive(Debug)]
pub enum SessionMessage {
    /// Challenger picks the game type
    SelectType {
        user_id: UserId,
        game_type: GameType,
        response: oneshot::Sender<SessionResult<GameSession>>,
    },

    /// Opponent accepts or rejects; for global sessions the challenger
    /// publishes or withdraws. Replies `None` when the session was deleted.
    Respond {
        user_id: UserId,
        accept: bool,
        response: oneshot::Sender<SessionResult<Option<GameSession>>>,
    },

    /// Challenger withdraws before confirmation
    Cancel {
        user_id: UserId,
        response: oneshot::Sender<SessionResult<()>>,
    },

    /// Move or guess from a participant
    SubmitMove {
        user_id: UserId,
        mv: Move,
        response: oneshot::Sender<SessionResult<MoveOutcome>>,
    },

    /// Take the open seat of a global challenge
    JoinGlobal {
        user_id: UserId,
        response: oneshot::Sender<SessionResult<GameSession>>,
    },

    /// Administrative termination with full refund. Replies whether the
    /// session was ended by this call.
    ForceEnd {
        response: oneshot::Sender<SessionResult<bool>>,
    },

    /// Rebuild timers from persisted timestamps after a host restart
    Resume {
        response: oneshot::Sender<SessionResult<()>>,
    },

    /// Internal: a delayed task fired
    Timer {
        task: SessionTask,
        response: oneshot::Sender<SessionResult<()>>,
    },
}

/// What a submitted move led to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MoveOutcome {
    /// Whether a guess was correct; `None` for turn-based moves
    pub correct: Option<bool>,
    /// Whether the mover can no longer act
    pub side_finished: bool,
    pub status: SessionStatus,
    /// Set once the session is decided
    pub outcome: Option<Outcome>,
}
