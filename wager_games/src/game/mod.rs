//! Board engines for every supported mini-game.
//!
//! This module provides:
//! - Shared vocabulary (roles, game types, outcomes, moves)
//! - Turn-based engines: rock-paper-scissors, russian roulette, standoff
//! - Guess-based engines: four progressive-reveal puzzles sharing [`GuessBoard`]
//! - The [`Board`] tagged union that is persisted with every session
//!
//! Boards are pure state machines. All randomness a board will ever need is
//! drawn when the board is created, so a board is fully determined by its
//! initial contents and the sequence of moves and reveals applied to it.

pub mod board;
pub mod difficulty;
pub mod guess;
pub mod roulette;
pub mod rps;
pub mod standoff;

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use thiserror::Error;

pub use board::{Board, BoardSetup, MoveReport};
pub use difficulty::{Difficulty, DifficultyBounds, DifficultyThresholds};
pub use guess::{
    CatalogEntry, GuessBoard, GuessEngine, GuessProgress, GuessResult, Puzzle, SecretCatalog,
    StaticCatalog,
};
pub use roulette::RouletteBoard;
pub use rps::{RpsBoard, RpsChoice};
pub use standoff::StandoffBoard;

/// Side of a session a participant plays on.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Challenger,
    Opponent,
}

impl Role {
    pub const BOTH: [Role; 2] = [Role::Challenger, Role::Opponent];

    #[must_use]
    pub fn other(self) -> Self {
        match self {
            Self::Challenger => Self::Opponent,
            Self::Opponent => Self::Challenger,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Challenger => write!(f, "challenger"),
            Self::Opponent => write!(f, "opponent"),
        }
    }
}

/// A value held once per side.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct PerRole<T> {
    pub challenger: T,
    pub opponent: T,
}

impl<T> PerRole<T> {
    pub fn get(&self, role: Role) -> &T {
        match role {
            Role::Challenger => &self.challenger,
            Role::Opponent => &self.opponent,
        }
    }

    pub fn get_mut(&mut self, role: Role) -> &mut T {
        match role {
            Role::Challenger => &mut self.challenger,
            Role::Opponent => &mut self.opponent,
        }
    }
}

/// Whether a board is shared by both sides or owned by a single side
/// (global sessions give each side its own board).
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BoardMode {
    HeadToHead,
    Solo(Role),
}

impl BoardMode {
    /// Whether `role` may act on a board in this mode.
    #[must_use]
    pub fn admits(self, role: Role) -> bool {
        match self {
            Self::HeadToHead => true,
            Self::Solo(owner) => owner == role,
        }
    }
}

/// The seven game kinds a session can be played as.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GameType {
    RockPaperScissors,
    RussianRoulette,
    Standoff,
    GuessOrLife,
    PunkRecords,
    WhosWho,
    Shambles,
}

/// Engine family a game type belongs to.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum GameFamily {
    Turn,
    Guess,
}

impl GameType {
    pub const ALL: [GameType; 7] = [
        GameType::RockPaperScissors,
        GameType::RussianRoulette,
        GameType::Standoff,
        GameType::GuessOrLife,
        GameType::PunkRecords,
        GameType::WhosWho,
        GameType::Shambles,
    ];

    #[must_use]
    pub fn family(self) -> GameFamily {
        match self {
            Self::RockPaperScissors | Self::RussianRoulette | Self::Standoff => GameFamily::Turn,
            Self::GuessOrLife | Self::PunkRecords | Self::WhosWho | Self::Shambles => {
                GameFamily::Guess
            }
        }
    }

    #[must_use]
    pub fn is_guess(self) -> bool {
        self.family() == GameFamily::Guess
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RockPaperScissors => "rock_paper_scissors",
            Self::RussianRoulette => "russian_roulette",
            Self::Standoff => "standoff",
            Self::GuessOrLife => "guess_or_life",
            Self::PunkRecords => "punk_records",
            Self::WhosWho => "whos_who",
            Self::Shambles => "shambles",
        }
    }
}

impl fmt::Display for GameType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for GameType {
    type Err = GameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| GameError::UnknownGameType(s.to_string()))
    }
}

/// Result of a finished game, or `Undecided` while it is still running.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    ChallengerWon,
    OpponentWon,
    Draw,
    Undecided,
}

impl Outcome {
    #[must_use]
    pub fn won_by(role: Role) -> Self {
        match role {
            Role::Challenger => Self::ChallengerWon,
            Role::Opponent => Self::OpponentWon,
        }
    }

    #[must_use]
    pub fn winner(self) -> Option<Role> {
        match self {
            Self::ChallengerWon => Some(Role::Challenger),
            Self::OpponentWon => Some(Role::Opponent),
            Self::Draw | Self::Undecided => None,
        }
    }

    #[must_use]
    pub fn is_decided(self) -> bool {
        self != Self::Undecided
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repr = match self {
            Self::ChallengerWon => "challenger won",
            Self::OpponentWon => "opponent won",
            Self::Draw => "draw",
            Self::Undecided => "undecided",
        };
        write!(f, "{repr}")
    }
}

/// A move submitted by a participant (or injected as an auto-move).
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Move {
    Rps(RpsChoice),
    Fire { cell: usize },
    Ready,
    Guess(String),
}

impl fmt::Display for Move {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Rps(choice) => write!(f, "{choice}"),
            Self::Fire { cell } => write!(f, "fire cell {cell}"),
            Self::Ready => write!(f, "ready"),
            Self::Guess(text) => write!(f, "guess '{text}'"),
        }
    }
}

/// Errors raised by board engines.
///
/// Everything except [`GameError::UnsupportedMove`] and
/// [`GameError::UnknownGameType`] is a recoverable rejection that leaves the
/// board untouched.
#[derive(Debug, Deserialize, Eq, Error, PartialEq, Serialize)]
pub enum GameError {
    #[error("not your turn")]
    NotYourTurn,
    #[error("you already made your move")]
    AlreadyCommitted,
    #[error("cell {0} was already fired")]
    CellAlreadyFired(usize),
    #[error("cell {0} is not on the grid")]
    CellOutOfRange(usize),
    #[error("the center cell can't be fired")]
    CenterCell,
    #[error("letter '{0}' was already guessed")]
    LetterAlreadyGuessed(char),
    #[error("empty guess")]
    EmptyGuess,
    #[error("game is over")]
    GameOver,
    #[error("you already finished this game")]
    SideFinished,
    #[error("not playing on this board")]
    NotOnBoard,
    #[error("no secret fits the {0} difficulty bounds")]
    NoSecretAvailable(String),
    #[error("invalid board setup: {0}")]
    InvalidSetup(String),
    #[error("move '{mv}' is not supported by {game_type}")]
    UnsupportedMove { game_type: GameType, mv: String },
    #[error("unknown game type '{0}'")]
    UnknownGameType(String),
}

impl GameError {
    /// Programmer or data errors that should abort the operation loudly.
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedMove { .. }
                | Self::UnknownGameType(_)
                | Self::InvalidSetup(_)
                | Self::NoSecretAvailable(_)
        )
    }
}

/// Engine contract shared by the turn-based boards.
pub trait TurnEngine {
    /// Validate and apply a move for `role`.
    fn apply_move(&mut self, role: Role, mv: &Move) -> Result<(), GameError>;

    /// Whether the board has reached its end (for solo boards: the owner is done).
    fn is_finished(&self) -> bool;

    /// Decided outcome of a head-to-head board.
    fn outcome(&self) -> Outcome;

    /// Role that must act next, or `None` when both act independently.
    fn current_turn(&self) -> Option<Role>;

    /// Roles that still owe a move.
    fn awaiting(&self) -> Vec<Role>;

    /// Number of moves applied so far.
    fn move_count(&self) -> u32;
}
