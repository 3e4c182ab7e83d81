use rand::{Rng, RngCore, seq::SliceRandom};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::{CatalogEntry, normalize};
use crate::game::{DifficultyBounds, GameError, GameType};

/// One step of the detail-reveal game.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DetailStep {
    Detail(usize),
    Letter(usize),
}

/// The secret of a guess board plus everything its reveals will disclose.
///
/// Reveal orders are drawn once when the puzzle is built, so the disclosed
/// information is a pure function of the reveal counter.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Puzzle {
    /// Word with blanks; each reveal uncovers one more position.
    Life {
        answer: String,
        reveal_order: Vec<usize>,
    },
    /// Alternates descriptive details and letter positions.
    Detail {
        answer: String,
        details: Vec<String>,
        steps: Vec<DetailStep>,
    },
    /// Silhouette whose blur drops by one per reveal.
    Silhouette {
        answer: String,
        image: Option<String>,
        max_blur: u8,
    },
    /// Square letter grid holding the answer; each reveal excludes a batch of decoys.
    Grid {
        answer: String,
        width: usize,
        cells: Vec<char>,
        answer_cells: Vec<usize>,
        decoy_order: Vec<usize>,
        per_reveal: usize,
    },
}

impl Puzzle {
    /// Builds the puzzle for a guess game type from a catalog entry.
    ///
    /// # Errors
    ///
    /// Returns `GameError::InvalidSetup` when the entry cannot be laid out
    /// within `bounds` or `game_type` is not a guess game.
    pub fn build(
        game_type: GameType,
        entry: &CatalogEntry,
        bounds: &DifficultyBounds,
        rng: &mut dyn RngCore,
    ) -> Result<Self, GameError> {
        let answer = normalize(&entry.answer);
        let len = answer.chars().count();
        if len < 2 {
            return Err(GameError::InvalidSetup(format!(
                "answer '{}' is too short",
                entry.answer
            )));
        }

        match game_type {
            GameType::GuessOrLife => Ok(Self::Life {
                reveal_order: letter_order(len, rng),
                answer,
            }),
            GameType::PunkRecords => {
                if entry.details.is_empty() {
                    return Err(GameError::InvalidSetup(format!(
                        "'{}' has no details",
                        entry.answer
                    )));
                }
                let letters = letter_order(len, rng);
                let mut steps = Vec::with_capacity(entry.details.len() + letters.len());
                let mut details = 0..entry.details.len();
                let mut letters = letters.into_iter();
                loop {
                    let detail = details.next().map(DetailStep::Detail);
                    let letter = letters.next().map(DetailStep::Letter);
                    if detail.is_none() && letter.is_none() {
                        break;
                    }
                    steps.extend(detail);
                    steps.extend(letter);
                }
                Ok(Self::Detail {
                    answer,
                    details: entry.details.clone(),
                    steps,
                })
            }
            GameType::WhosWho => Ok(Self::Silhouette {
                answer,
                image: entry.image.clone(),
                max_blur: bounds.blur_levels,
            }),
            GameType::Shambles => {
                let width = bounds.grid_size;
                let total = width * width;
                if len > total {
                    return Err(GameError::InvalidSetup(format!(
                        "'{answer}' does not fit a {width}x{width} grid"
                    )));
                }
                let offset = rng.random_range(0..=total - len);
                let answer_cells: Vec<usize> = (offset..offset + len).collect();
                let mut cells: Vec<char> = (0..total)
                    .map(|_| char::from(rng.random_range(b'A'..=b'Z')))
                    .collect();
                for (cell, letter) in answer_cells.iter().zip(answer.chars()) {
                    cells[*cell] = letter;
                }
                let mut decoy_order: Vec<usize> = (0..total)
                    .filter(|cell| !answer_cells.contains(cell))
                    .collect();
                decoy_order.shuffle(rng);
                Ok(Self::Grid {
                    answer,
                    width,
                    cells,
                    answer_cells,
                    decoy_order,
                    per_reveal: width.max(1),
                })
            }
            other => Err(GameError::InvalidSetup(format!(
                "{other} is not a guess game"
            ))),
        }
    }

    #[must_use]
    pub fn answer(&self) -> &str {
        match self {
            Self::Life { answer, .. }
            | Self::Detail { answer, .. }
            | Self::Silhouette { answer, .. }
            | Self::Grid { answer, .. } => answer,
        }
    }

    /// Total number of reveal steps the puzzle supports.
    #[must_use]
    pub fn capacity(&self) -> u32 {
        let steps = match self {
            Self::Life { reveal_order, .. } => reveal_order.len(),
            Self::Detail { steps, .. } => steps.len(),
            Self::Silhouette { max_blur, .. } => usize::from(*max_blur),
            Self::Grid {
                decoy_order,
                per_reveal,
                ..
            } => decoy_order.len().div_ceil(*per_reveal),
        };
        u32::try_from(steps).unwrap_or(u32::MAX)
    }

    /// Whether single-letter guesses uncover letters instead of counting as
    /// whole-answer guesses.
    #[must_use]
    pub fn accepts_letters(&self) -> bool {
        matches!(self, Self::Life { .. })
    }

    /// Answer positions disclosed after `reveals` steps.
    #[must_use]
    pub fn revealed_positions(&self, reveals: u32) -> BTreeSet<usize> {
        let reveals = reveals as usize;
        match self {
            Self::Life { reveal_order, .. } => reveal_order.iter().take(reveals).copied().collect(),
            Self::Detail { steps, .. } => steps
                .iter()
                .take(reveals)
                .filter_map(|step| match step {
                    DetailStep::Letter(pos) => Some(*pos),
                    DetailStep::Detail(_) => None,
                })
                .collect(),
            Self::Silhouette { .. } | Self::Grid { .. } => BTreeSet::new(),
        }
    }

    /// Answer with undisclosed positions replaced by `_`.
    #[must_use]
    pub fn masked_answer(&self, reveals: u32, guessed_letters: &BTreeSet<char>) -> String {
        let positions = self.revealed_positions(reveals);
        self.answer()
            .chars()
            .enumerate()
            .map(|(pos, letter)| {
                if positions.contains(&pos) || guessed_letters.contains(&letter) {
                    letter
                } else {
                    '_'
                }
            })
            .collect()
    }

    #[must_use]
    pub fn visible_details(&self, reveals: u32) -> Vec<&str> {
        match self {
            Self::Detail { details, steps, .. } => steps
                .iter()
                .take(reveals as usize)
                .filter_map(|step| match step {
                    DetailStep::Detail(index) => details.get(*index).map(String::as_str),
                    DetailStep::Letter(_) => None,
                })
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Current blur level of a silhouette puzzle.
    #[must_use]
    pub fn blur_level(&self, reveals: u32) -> Option<u8> {
        match self {
            Self::Silhouette { max_blur, .. } => {
                let spent = u8::try_from(reveals).unwrap_or(u8::MAX);
                Some(max_blur.saturating_sub(spent))
            }
            _ => None,
        }
    }

    /// Grid with excluded decoy cells blanked out.
    #[must_use]
    pub fn visible_grid(&self, reveals: u32) -> Option<Vec<Option<char>>> {
        match self {
            Self::Grid {
                cells,
                decoy_order,
                per_reveal,
                ..
            } => {
                let excluded_count = (reveals as usize)
                    .saturating_mul(*per_reveal)
                    .min(decoy_order.len());
                let excluded: BTreeSet<usize> =
                    decoy_order[..excluded_count].iter().copied().collect();
                Some(
                    cells
                        .iter()
                        .enumerate()
                        .map(|(cell, letter)| (!excluded.contains(&cell)).then_some(*letter))
                        .collect(),
                )
            }
            _ => None,
        }
    }
}

/// Shuffled answer positions, leaving one position that reveals never uncover.
fn letter_order(len: usize, rng: &mut dyn RngCore) -> Vec<usize> {
    let mut order: Vec<usize> = (0..len).collect();
    order.shuffle(rng);
    order.truncate(len.saturating_sub(1));
    order
}
