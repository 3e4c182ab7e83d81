//! Progressive-reveal guessing games.
//!
//! All four guess games share [`GuessBoard`]: a secret answer, a reveal
//! counter that only grows, and per-side guessing progress. The variants only
//! differ in what a reveal discloses, which lives in [`Puzzle`].

pub mod board;
pub mod catalog;
pub mod puzzle;

pub use board::{GuessBoard, GuessProgress, GuessResult};
pub use catalog::{CatalogEntry, SecretCatalog, StaticCatalog};
pub use puzzle::{DetailStep, Puzzle};

use super::{GameError, Role};

/// Engine contract shared by the guess boards.
pub trait GuessEngine {
    /// Disclose one more piece of the secret. Returns false when nothing is left.
    fn reveal_next(&mut self) -> bool;

    /// Submit a letter or a full-answer guess for `role`.
    fn submit_guess(&mut self, role: Role, text: &str) -> Result<GuessResult, GameError>;

    /// Whether `role` can no longer guess on this board.
    fn is_finished_for(&self, role: Role) -> bool;
}

/// Uppercase and strip everything but alphanumerics.
#[must_use]
pub fn normalize(text: &str) -> String {
    text.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_uppercase)
        .collect()
}
