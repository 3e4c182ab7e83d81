//! Session data models.

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::game::{Board, Difficulty, GameType, Outcome, Role};
pub use crate::wallet::UserId;

/// Session ID type
pub type SessionId = i64;

/// Lifecycle status of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    AwaitingSelection,
    AwaitingOpponentConfirmation,
    CountdownToStart,
    InProgress,
    /// Challenger won
    Won,
    /// Challenger lost
    Lost,
    Draw,
    ForcedEnd,
}

impl SessionStatus {
    pub const ALL: [SessionStatus; 8] = [
        SessionStatus::AwaitingSelection,
        SessionStatus::AwaitingOpponentConfirmation,
        SessionStatus::CountdownToStart,
        SessionStatus::InProgress,
        SessionStatus::Won,
        SessionStatus::Lost,
        SessionStatus::Draw,
        SessionStatus::ForcedEnd,
    ];

    /// Terminal states are absorbing.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Won | Self::Lost | Self::Draw | Self::ForcedEnd)
    }

    /// States in which a cancel or rejection deletes the session.
    pub fn is_pre_confirmation(self) -> bool {
        matches!(self, Self::AwaitingSelection | Self::AwaitingOpponentConfirmation)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::AwaitingSelection => "awaiting_selection",
            Self::AwaitingOpponentConfirmation => "awaiting_opponent_confirmation",
            Self::CountdownToStart => "countdown_to_start",
            Self::InProgress => "in_progress",
            Self::Won => "won",
            Self::Lost => "lost",
            Self::Draw => "draw",
            Self::ForcedEnd => "forced_end",
        }
    }

    /// Terminal status for a decided outcome, from the challenger's view.
    pub fn from_outcome(outcome: Outcome) -> Option<Self> {
        match outcome {
            Outcome::ChallengerWon => Some(Self::Won),
            Outcome::OpponentWon => Some(Self::Lost),
            Outcome::Draw => Some(Self::Draw),
            Outcome::Undecided => None,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| format!("unknown session status '{s}'"))
    }
}

/// Persistent record of one wagered game
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameSession {
    pub id: SessionId,
    pub challenger: UserId,
    /// Absent until a global session is joined
    pub opponent: Option<UserId>,
    /// Absent while awaiting selection
    pub game_type: Option<GameType>,
    pub status: SessionStatus,
    pub wager: i64,
    /// Chat group the challenge was issued in
    pub group_id: Option<i64>,
    pub is_global: bool,
    pub difficulty: Difficulty,

    /// Shared board, or the challenger's board in global mode
    pub board: Option<Board>,
    /// Opponent's board, global mode only
    pub opponent_board: Option<Board>,
    pub outcome: Option<Outcome>,

    pub challenger_escrowed: bool,
    pub opponent_escrowed: bool,

    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub countdown_ends_at: Option<DateTime<Utc>>,
    pub last_interaction_at: Option<DateTime<Utc>>,
    pub last_interaction_opponent_at: Option<DateTime<Utc>>,
    pub last_hint_at: Option<DateTime<Utc>>,
    pub last_hint_opponent_at: Option<DateTime<Utc>>,
    pub global_challenger_start_at: Option<DateTime<Utc>>,
    pub global_challenger_end_at: Option<DateTime<Utc>>,
    pub global_opponent_start_at: Option<DateTime<Utc>>,
    pub global_opponent_end_at: Option<DateTime<Utc>>,

    /// Number of times hint recovery had to catch up
    pub hint_restart_count: i32,
    /// Optimistic concurrency token, bumped on every save
    pub version: i64,
}

impl GameSession {
    /// A fresh session awaiting type selection. The id is assigned on insert.
    pub fn new(
        challenger: UserId,
        opponent: Option<UserId>,
        wager: i64,
        group_id: Option<i64>,
        difficulty: Difficulty,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: 0,
            challenger,
            opponent,
            game_type: None,
            status: SessionStatus::AwaitingSelection,
            wager,
            group_id,
            is_global: opponent.is_none(),
            difficulty,
            board: None,
            opponent_board: None,
            outcome: None,
            challenger_escrowed: true,
            opponent_escrowed: false,
            created_at: now,
            started_at: None,
            countdown_ends_at: None,
            last_interaction_at: None,
            last_interaction_opponent_at: None,
            last_hint_at: None,
            last_hint_opponent_at: None,
            global_challenger_start_at: None,
            global_challenger_end_at: None,
            global_opponent_start_at: None,
            global_opponent_end_at: None,
            hint_restart_count: 0,
            version: 0,
        }
    }

    pub fn role_of(&self, user_id: UserId) -> Option<Role> {
        if user_id == self.challenger {
            Some(Role::Challenger)
        } else if Some(user_id) == self.opponent {
            Some(Role::Opponent)
        } else {
            None
        }
    }

    pub fn participant(&self, role: Role) -> Option<UserId> {
        match role {
            Role::Challenger => Some(self.challenger),
            Role::Opponent => self.opponent,
        }
    }

    /// Whether the stake of `role` currently sits in pending balance.
    pub fn escrowed(&self, role: Role) -> bool {
        match role {
            Role::Challenger => self.challenger_escrowed,
            Role::Opponent => self.opponent_escrowed,
        }
    }

    pub fn set_escrowed(&mut self, role: Role, escrowed: bool) {
        match role {
            Role::Challenger => self.challenger_escrowed = escrowed,
            Role::Opponent => self.opponent_escrowed = escrowed,
        }
    }

    /// Total stake held for this session.
    pub fn escrowed_amount(&self) -> i64 {
        let sides = i64::from(self.challenger_escrowed) + i64::from(self.opponent_escrowed);
        self.wager.saturating_mul(sides)
    }

    /// The board `role` plays on. Head-to-head sessions share one board.
    pub fn board_for(&self, role: Role) -> Option<&Board> {
        match (self.is_global, role) {
            (true, Role::Opponent) => self.opponent_board.as_ref(),
            _ => self.board.as_ref(),
        }
    }

    pub fn board_for_mut(&mut self, role: Role) -> Option<&mut Board> {
        match (self.is_global, role) {
            (true, Role::Opponent) => self.opponent_board.as_mut(),
            _ => self.board.as_mut(),
        }
    }

    /// Sides with their own hint cadence: one for head-to-head, one per joined
    /// side in global mode.
    pub fn hint_sides(&self) -> Vec<Role> {
        if !self.is_global {
            return vec![Role::Challenger];
        }
        Role::BOTH
            .into_iter()
            .filter(|role| self.board_for(*role).is_some())
            .collect()
    }

    pub fn last_hint_for(&self, side: Role) -> Option<DateTime<Utc>> {
        match (self.is_global, side) {
            (true, Role::Opponent) => self.last_hint_opponent_at,
            _ => self.last_hint_at,
        }
    }

    pub fn set_last_hint(&mut self, side: Role, at: DateTime<Utc>) {
        match (self.is_global, side) {
            (true, Role::Opponent) => self.last_hint_opponent_at = Some(at),
            _ => self.last_hint_at = Some(at),
        }
    }

    pub fn last_interaction_for(&self, side: Role) -> Option<DateTime<Utc>> {
        match (self.is_global, side) {
            (true, Role::Opponent) => self.last_interaction_opponent_at,
            _ => self.last_interaction_at,
        }
    }

    pub fn set_last_interaction(&mut self, side: Role, at: DateTime<Utc>) {
        match (self.is_global, side) {
            (true, Role::Opponent) => self.last_interaction_opponent_at = Some(at),
            _ => self.last_interaction_at = Some(at),
        }
    }

    pub fn side_start(&self, side: Role) -> Option<DateTime<Utc>> {
        match side {
            Role::Challenger => self.global_challenger_start_at,
            Role::Opponent => self.global_opponent_start_at,
        }
    }

    pub fn side_end(&self, side: Role) -> Option<DateTime<Utc>> {
        match side {
            Role::Challenger => self.global_challenger_end_at,
            Role::Opponent => self.global_opponent_end_at,
        }
    }

    pub fn set_side_end(&mut self, side: Role, at: DateTime<Utc>) {
        match side {
            Role::Challenger => self.global_challenger_end_at = Some(at),
            Role::Opponent => self.global_opponent_end_at = Some(at),
        }
    }

    /// Active time of a global side: `(end or now) - start`.
    pub fn side_elapsed(&self, side: Role, now: DateTime<Utc>) -> TimeDelta {
        match self.side_start(side) {
            Some(start) => self.side_end(side).unwrap_or(now) - start,
            None => TimeDelta::zero(),
        }
    }

    /// Open global challenge still waiting for an opponent.
    pub fn is_open_global(&self) -> bool {
        self.is_global && self.opponent.is_none() && self.status == SessionStatus::InProgress
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(opponent: Option<UserId>) -> GameSession {
        GameSession::new(1, opponent, 500, None, Difficulty::Easy, Utc::now())
    }

    #[test]
    fn test_status_round_trip_names() {
        for status in SessionStatus::ALL {
            assert_eq!(status.as_str().parse::<SessionStatus>(), Ok(status));
        }
        assert!(SessionStatus::Draw.is_terminal());
        assert!(!SessionStatus::CountdownToStart.is_terminal());
    }

    #[test]
    fn test_global_when_no_opponent() {
        assert!(session(None).is_global);
        assert!(!session(Some(2)).is_global);
    }

    #[test]
    fn test_roles() {
        let session = session(Some(2));
        assert_eq!(session.role_of(1), Some(Role::Challenger));
        assert_eq!(session.role_of(2), Some(Role::Opponent));
        assert_eq!(session.role_of(3), None);
    }

    #[test]
    fn test_escrowed_amount_counts_sides() {
        let mut session = session(Some(2));
        assert_eq!(session.escrowed_amount(), 500);
        session.set_escrowed(Role::Opponent, true);
        assert_eq!(session.escrowed_amount(), 1000);
    }

    #[test]
    fn test_head_to_head_shares_hint_clock() {
        let mut session = session(Some(2));
        let at = Utc::now();
        session.set_last_hint(Role::Opponent, at);
        assert_eq!(session.last_hint_at, Some(at));
        assert_eq!(session.last_hint_opponent_at, None);
    }
}
