//! Difficulty tiers derived from the wager size.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// Wager thresholds at which the harder tiers kick in (inclusive).
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct DifficultyThresholds {
    pub medium: i64,
    pub hard: i64,
}

impl Default for DifficultyThresholds {
    fn default() -> Self {
        Self {
            medium: 10_000,
            hard: 1_000_000,
        }
    }
}

/// Complexity bounds a secret and its board must satisfy.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct DifficultyBounds {
    /// Maximum normalized answer length.
    pub max_length: usize,
    /// Maximum number of distinct letters in the answer.
    pub max_unique_letters: usize,
    /// Side length of the square letter grid.
    pub grid_size: usize,
    /// Starting blur level of a silhouette.
    pub blur_levels: u8,
    /// Wrong guesses a side may make in the life-guessing game.
    pub lives: u8,
}

impl Difficulty {
    #[must_use]
    pub fn from_wager(wager: i64, thresholds: &DifficultyThresholds) -> Self {
        if wager >= thresholds.hard {
            Self::Hard
        } else if wager >= thresholds.medium {
            Self::Medium
        } else {
            Self::Easy
        }
    }

    #[must_use]
    pub fn bounds(self) -> DifficultyBounds {
        match self {
            Self::Easy => DifficultyBounds {
                max_length: 8,
                max_unique_letters: 6,
                grid_size: 4,
                blur_levels: 3,
                lives: 8,
            },
            Self::Medium => DifficultyBounds {
                max_length: 12,
                max_unique_letters: 8,
                grid_size: 5,
                blur_levels: 5,
                lives: 6,
            },
            Self::Hard => DifficultyBounds {
                max_length: 20,
                max_unique_letters: 12,
                grid_size: 6,
                blur_levels: 7,
                lives: 5,
            },
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "easy",
            Self::Medium => "medium",
            Self::Hard => "hard",
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "easy" => Ok(Self::Easy),
            "medium" => Ok(Self::Medium),
            "hard" => Ok(Self::Hard),
            other => Err(format!("unknown difficulty '{other}'")),
        }
    }
}
