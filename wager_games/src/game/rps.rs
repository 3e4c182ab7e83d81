//! Rock-paper-scissors.
//!
//! Both sides commit one choice independently; there is no turn order.

use rand::{Rng, RngCore};
use serde::{Deserialize, Serialize};
use std::fmt;

use super::{BoardMode, GameError, GameType, Move, Outcome, PerRole, Role, TurnEngine};

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RpsChoice {
    Rock,
    Paper,
    Scissors,
}

impl RpsChoice {
    pub const ALL: [RpsChoice; 3] = [RpsChoice::Rock, RpsChoice::Paper, RpsChoice::Scissors];

    /// The choice this one defeats.
    #[must_use]
    pub fn defeats(self) -> Self {
        match self {
            Self::Rock => Self::Scissors,
            Self::Paper => Self::Rock,
            Self::Scissors => Self::Paper,
        }
    }

    #[must_use]
    pub fn beats(self, other: Self) -> bool {
        self.defeats() == other
    }

    pub fn random<R: RngCore + ?Sized>(rng: &mut R) -> Self {
        Self::ALL[rng.random_range(0..Self::ALL.len())]
    }
}

impl fmt::Display for RpsChoice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::Rock => "rock",
            Self::Paper => "paper",
            Self::Scissors => "scissors",
        };
        write!(f, "{repr}")
    }
}

/// Resolve a pair of choices from the challenger's point of view.
#[must_use]
pub fn resolve(challenger: RpsChoice, opponent: RpsChoice) -> Outcome {
    if challenger == opponent {
        Outcome::Draw
    } else if challenger.beats(opponent) {
        Outcome::ChallengerWon
    } else {
        Outcome::OpponentWon
    }
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RpsBoard {
    pub mode: BoardMode,
    pub choices: PerRole<Option<RpsChoice>>,
}

impl RpsBoard {
    #[must_use]
    pub fn new(mode: BoardMode) -> Self {
        Self {
            mode,
            choices: PerRole::default(),
        }
    }

    #[must_use]
    pub fn choice(&self, role: Role) -> Option<RpsChoice> {
        *self.choices.get(role)
    }

    /// Fallback for a side that missed its deadline.
    ///
    /// When the other side's choice is known the idle side receives the
    /// choice that loses to it; otherwise the choice is random.
    pub fn fallback_choice<R: RngCore + ?Sized>(
        counterpart: Option<RpsChoice>,
        rng: &mut R,
    ) -> RpsChoice {
        match counterpart {
            Some(committed) => committed.defeats(),
            None => RpsChoice::random(rng),
        }
    }
}

impl TurnEngine for RpsBoard {
    fn apply_move(&mut self, role: Role, mv: &Move) -> Result<(), GameError> {
        let Move::Rps(choice) = mv else {
            return Err(GameError::UnsupportedMove {
                game_type: GameType::RockPaperScissors,
                mv: mv.to_string(),
            });
        };
        if !self.mode.admits(role) {
            return Err(GameError::NotOnBoard);
        }
        if self.is_finished() {
            return Err(GameError::GameOver);
        }

        let slot = self.choices.get_mut(role);
        if slot.is_some() {
            return Err(GameError::AlreadyCommitted);
        }
        *slot = Some(*choice);
        Ok(())
    }

    fn is_finished(&self) -> bool {
        match self.mode {
            BoardMode::HeadToHead => {
                self.choices.challenger.is_some() && self.choices.opponent.is_some()
            }
            BoardMode::Solo(owner) => self.choices.get(owner).is_some(),
        }
    }

    fn outcome(&self) -> Outcome {
        match (self.mode, self.choices.challenger, self.choices.opponent) {
            (BoardMode::HeadToHead, Some(challenger), Some(opponent)) => {
                resolve(challenger, opponent)
            }
            _ => Outcome::Undecided,
        }
    }

    fn current_turn(&self) -> Option<Role> {
        None
    }

    fn awaiting(&self) -> Vec<Role> {
        Role::BOTH
            .into_iter()
            .filter(|role| self.mode.admits(*role) && self.choices.get(*role).is_none())
            .collect()
    }

    fn move_count(&self) -> u32 {
        u32::from(self.choices.challenger.is_some()) + u32::from(self.choices.opponent.is_some())
    }
}
