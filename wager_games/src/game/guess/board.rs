use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{GuessEngine, Puzzle, normalize};
use crate::game::{BoardMode, GameError, Outcome, PerRole, Role};

/// Guessing progress of one side.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct GuessProgress {
    /// Remaining lives; only the life-guessing game tracks them.
    pub lives: Option<u8>,
    pub guessed_letters: BTreeSet<char>,
    pub guesses: u32,
    pub wrong_guesses: u32,
    /// Reveal counter at the moment this side solved the puzzle.
    pub solved_at_reveal: Option<u32>,
}

impl GuessProgress {
    #[must_use]
    pub fn is_solved(&self) -> bool {
        self.solved_at_reveal.is_some()
    }

    #[must_use]
    pub fn is_out_of_lives(&self) -> bool {
        self.lives == Some(0)
    }

    fn lose_life(&mut self) {
        if let Some(lives) = self.lives.as_mut() {
            *lives = lives.saturating_sub(1);
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct GuessResult {
    pub correct: bool,
    pub solved: bool,
    pub finished: bool,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct GuessBoard {
    pub mode: BoardMode,
    pub puzzle: Puzzle,
    /// Reveal steps applied so far. Only grows.
    pub reveals: u32,
    pub sides: PerRole<GuessProgress>,
}

impl GuessBoard {
    #[must_use]
    pub fn new(mode: BoardMode, puzzle: Puzzle, lives: u8) -> Self {
        let progress = GuessProgress {
            lives: puzzle.accepts_letters().then_some(lives),
            ..GuessProgress::default()
        };
        Self {
            mode,
            puzzle,
            reveals: 0,
            sides: PerRole {
                challenger: progress.clone(),
                opponent: progress,
            },
        }
    }

    #[must_use]
    pub fn progress(&self, role: Role) -> &GuessProgress {
        self.sides.get(role)
    }

    #[must_use]
    pub fn has_more_reveals(&self) -> bool {
        self.reveals < self.puzzle.capacity()
    }

    /// What `role` currently sees of the answer.
    #[must_use]
    pub fn masked_answer(&self, role: Role) -> String {
        self.puzzle
            .masked_answer(self.reveals, &self.sides.get(role).guessed_letters)
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        match self.mode {
            BoardMode::HeadToHead => Role::BOTH.into_iter().any(|role| {
                let side = self.sides.get(role);
                side.is_solved() || side.is_out_of_lives()
            }),
            BoardMode::Solo(owner) => self.is_finished_for(owner),
        }
    }

    /// Decided outcome of a head-to-head board: the first solver wins and a
    /// side that runs out of lives loses.
    #[must_use]
    pub fn outcome(&self) -> Outcome {
        if self.mode != BoardMode::HeadToHead {
            return Outcome::Undecided;
        }
        for role in Role::BOTH {
            let side = self.sides.get(role);
            if side.is_solved() {
                return Outcome::won_by(role);
            }
            if side.is_out_of_lives() {
                return Outcome::won_by(role.other());
            }
        }
        Outcome::Undecided
    }

    #[must_use]
    pub fn move_count(&self) -> u32 {
        self.sides.challenger.guesses + self.sides.opponent.guesses
    }

    fn all_positions_known(&self, role: Role) -> bool {
        !self.masked_answer(role).contains('_')
    }
}

impl GuessEngine for GuessBoard {
    fn reveal_next(&mut self) -> bool {
        if self.is_finished() || !self.has_more_reveals() {
            return false;
        }
        self.reveals += 1;
        true
    }

    fn submit_guess(&mut self, role: Role, text: &str) -> Result<GuessResult, GameError> {
        if !self.mode.admits(role) {
            return Err(GameError::NotOnBoard);
        }
        if self.is_finished() {
            return Err(GameError::GameOver);
        }
        if self.is_finished_for(role) {
            return Err(GameError::SideFinished);
        }

        let guess = normalize(text);
        let mut letters = guess.chars();
        let single = match (letters.next(), letters.next()) {
            (None, _) => return Err(GameError::EmptyGuess),
            (Some(letter), None) => Some(letter),
            _ => None,
        };

        let answer = self.puzzle.answer().to_string();
        let reveals = self.reveals;
        let letter_game = self.puzzle.accepts_letters();

        let correct = if guess == answer {
            let side = self.sides.get_mut(role);
            side.guesses += 1;
            side.solved_at_reveal = Some(reveals);
            true
        } else if let (Some(letter), true) = (single, letter_game) {
            let side = self.sides.get_mut(role);
            if side.guessed_letters.contains(&letter) {
                return Err(GameError::LetterAlreadyGuessed(letter));
            }
            side.guesses += 1;
            side.guessed_letters.insert(letter);
            let hit = answer.contains(letter);
            if !hit {
                side.wrong_guesses += 1;
                side.lose_life();
            }
            if hit && self.all_positions_known(role) {
                self.sides.get_mut(role).solved_at_reveal = Some(reveals);
            }
            hit
        } else {
            let side = self.sides.get_mut(role);
            side.guesses += 1;
            side.wrong_guesses += 1;
            side.lose_life();
            false
        };

        let side = self.sides.get(role);
        Ok(GuessResult {
            correct,
            solved: side.is_solved(),
            finished: self.is_finished_for(role),
        })
    }

    fn is_finished_for(&self, role: Role) -> bool {
        if self.mode == BoardMode::HeadToHead && self.is_finished() {
            return true;
        }
        let side = self.sides.get(role);
        side.is_solved() || side.is_out_of_lives()
    }
}
