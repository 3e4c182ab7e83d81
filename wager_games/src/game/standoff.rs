//! Standoff: both sides declare ready and the game always draws.

use serde::{Deserialize, Serialize};

use super::{BoardMode, GameError, GameType, Move, Outcome, PerRole, Role, TurnEngine};

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct StandoffBoard {
    pub mode: BoardMode,
    pub ready: PerRole<bool>,
}

impl StandoffBoard {
    #[must_use]
    pub fn new(mode: BoardMode) -> Self {
        Self {
            mode,
            ready: PerRole::default(),
        }
    }
}

impl TurnEngine for StandoffBoard {
    fn apply_move(&mut self, role: Role, mv: &Move) -> Result<(), GameError> {
        if *mv != Move::Ready {
            return Err(GameError::UnsupportedMove {
                game_type: GameType::Standoff,
                mv: mv.to_string(),
            });
        }
        if !self.mode.admits(role) {
            return Err(GameError::NotOnBoard);
        }
        if self.is_finished() {
            return Err(GameError::GameOver);
        }
        let ready = self.ready.get_mut(role);
        if *ready {
            return Err(GameError::AlreadyCommitted);
        }
        *ready = true;
        Ok(())
    }

    fn is_finished(&self) -> bool {
        self.awaiting().is_empty()
    }

    fn outcome(&self) -> Outcome {
        if self.mode == BoardMode::HeadToHead && self.is_finished() {
            Outcome::Draw
        } else {
            Outcome::Undecided
        }
    }

    fn current_turn(&self) -> Option<Role> {
        None
    }

    fn awaiting(&self) -> Vec<Role> {
        Role::BOTH
            .into_iter()
            .filter(|role| self.mode.admits(*role) && !*self.ready.get(*role))
            .collect()
    }

    fn move_count(&self) -> u32 {
        u32::from(self.ready.challenger) + u32::from(self.ready.opponent)
    }
}
