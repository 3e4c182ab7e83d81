//! Russian roulette on an N x M grid.
//!
//! One cell hides the bullet. The exact center cell (present only when both
//! dimensions are odd) can never be fired and never holds the bullet.

use rand::{RngCore, seq::IndexedRandom};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::{BoardMode, GameError, GameType, Move, Outcome, Role, TurnEngine};

pub const DEFAULT_ROWS: usize = 3;
pub const DEFAULT_COLS: usize = 3;

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct RouletteBoard {
    pub mode: BoardMode,
    pub rows: usize,
    pub cols: usize,
    pub bullet: usize,
    /// Fired cells in firing order.
    pub fired: Vec<usize>,
    pub turn: Role,
    pub bullet_hit_by: Option<Role>,
}

impl RouletteBoard {
    /// Lays out a grid and hides the bullet in a random selectable cell.
    ///
    /// # Errors
    ///
    /// Returns `GameError::InvalidSetup` when the grid has fewer than two
    /// selectable cells.
    pub fn new(
        rows: usize,
        cols: usize,
        mode: BoardMode,
        rng: &mut dyn RngCore,
    ) -> Result<Self, GameError> {
        let center = center_cell(rows, cols);
        let selectable: Vec<usize> = (0..rows * cols)
            .filter(|cell| Some(*cell) != center)
            .collect();
        if selectable.len() < 2 {
            return Err(GameError::InvalidSetup(format!(
                "a {rows}x{cols} grid has fewer than two selectable cells"
            )));
        }

        let bullet = *selectable
            .choose(rng)
            .ok_or_else(|| GameError::InvalidSetup("empty grid".to_string()))?;

        let turn = match mode {
            BoardMode::HeadToHead => Role::Challenger,
            BoardMode::Solo(owner) => owner,
        };

        Ok(Self {
            mode,
            rows,
            cols,
            bullet,
            fired: Vec::new(),
            turn,
            bullet_hit_by: None,
        })
    }

    #[must_use]
    pub fn center(&self) -> Option<usize> {
        center_cell(self.rows, self.cols)
    }

    #[must_use]
    pub fn selectable_count(&self) -> usize {
        self.rows * self.cols - usize::from(self.center().is_some())
    }

    /// Selectable cells that have not been fired yet.
    #[must_use]
    pub fn unfired_cells(&self) -> Vec<usize> {
        let center = self.center();
        (0..self.rows * self.cols)
            .filter(|cell| Some(*cell) != center && !self.fired.contains(cell))
            .collect()
    }

    /// Cells fired without hitting the bullet.
    #[must_use]
    pub fn safe_fires(&self) -> u32 {
        let safe = self.fired.iter().filter(|cell| **cell != self.bullet).count();
        u32::try_from(safe).unwrap_or(u32::MAX)
    }

    pub fn fallback_cell(&self, rng: &mut dyn RngCore) -> Option<usize> {
        self.unfired_cells().choose(rng).copied()
    }

    /// Compare two solo boards by safe fires; equal counts draw.
    #[must_use]
    pub fn compare_scores(challenger: &Self, opponent: &Self) -> Outcome {
        match challenger.safe_fires().cmp(&opponent.safe_fires()) {
            Ordering::Greater => Outcome::ChallengerWon,
            Ordering::Less => Outcome::OpponentWon,
            Ordering::Equal => Outcome::Draw,
        }
    }

    fn validate_cell(&self, cell: usize) -> Result<(), GameError> {
        if cell >= self.rows * self.cols {
            return Err(GameError::CellOutOfRange(cell));
        }
        if self.center() == Some(cell) {
            return Err(GameError::CenterCell);
        }
        if self.fired.contains(&cell) {
            return Err(GameError::CellAlreadyFired(cell));
        }
        Ok(())
    }
}

fn center_cell(rows: usize, cols: usize) -> Option<usize> {
    (rows % 2 == 1 && cols % 2 == 1).then(|| (rows / 2) * cols + cols / 2)
}

impl TurnEngine for RouletteBoard {
    fn apply_move(&mut self, role: Role, mv: &Move) -> Result<(), GameError> {
        let Move::Fire { cell } = mv else {
            return Err(GameError::UnsupportedMove {
                game_type: GameType::RussianRoulette,
                mv: mv.to_string(),
            });
        };
        if !self.mode.admits(role) {
            return Err(GameError::NotOnBoard);
        }
        if self.is_finished() {
            return Err(GameError::GameOver);
        }
        if self.turn != role {
            return Err(GameError::NotYourTurn);
        }
        self.validate_cell(*cell)?;

        self.fired.push(*cell);
        if *cell == self.bullet {
            self.bullet_hit_by = Some(role);
        } else if self.mode == BoardMode::HeadToHead {
            self.turn = self.turn.other();
        }
        Ok(())
    }

    fn is_finished(&self) -> bool {
        if self.bullet_hit_by.is_some() {
            return true;
        }
        // With the bullet unfired, a single remaining cell must be the bullet:
        // the player on turn is the holder, and a solo side has no safe cells left.
        self.selectable_count() - self.fired.len() <= 1
    }

    fn outcome(&self) -> Outcome {
        if self.mode != BoardMode::HeadToHead || !self.is_finished() {
            return Outcome::Undecided;
        }
        match self.bullet_hit_by {
            Some(firer) => Outcome::won_by(firer.other()),
            None => Outcome::won_by(self.turn.other()),
        }
    }

    fn current_turn(&self) -> Option<Role> {
        (!self.is_finished()).then_some(self.turn)
    }

    fn awaiting(&self) -> Vec<Role> {
        self.current_turn().into_iter().collect()
    }

    fn move_count(&self) -> u32 {
        u32::try_from(self.fired.len()).unwrap_or(u32::MAX)
    }
}
