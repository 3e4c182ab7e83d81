//! Session timing and wager configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::game::{DifficultyThresholds, roulette};

/// Session engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds between two reveals of a guess board (default: 30)
    pub hint_interval_secs: u64,

    /// Delay between confirmation and start of a head-to-head session (default: 5)
    pub countdown_secs: u64,

    /// Seconds a player has to move before an auto-move is injected (default: 60)
    pub turn_timeout_secs: u64,

    /// Lead time of the turn warning before the deadline (default: 15)
    pub turn_warning_secs: u64,

    /// Ceiling on a head-to-head guess session before it is drawn (default: 600)
    pub guess_max_duration_secs: u64,

    /// Inactivity ceiling of one global side (default: 900)
    pub global_inactivity_secs: u64,

    /// Total-duration ceiling of one global side (default: 3600)
    pub global_max_duration_secs: u64,

    /// How long an open global challenge waits for an opponent (default: 86400)
    pub global_join_timeout_secs: u64,

    /// Smallest accepted wager (default: 1)
    pub min_wager: i64,

    /// Wager thresholds for the difficulty tiers
    pub difficulty_thresholds: DifficultyThresholds,

    /// Roulette grid rows (default: 3)
    pub roulette_rows: usize,

    /// Roulette grid columns (default: 3)
    pub roulette_cols: usize,

    /// Seed for the per-session random generators; random when absent
    pub rng_seed: Option<u64>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            hint_interval_secs: 30,
            countdown_secs: 5,
            turn_timeout_secs: 60,
            turn_warning_secs: 15,
            guess_max_duration_secs: 600,
            global_inactivity_secs: 900,
            global_max_duration_secs: 3600,
            global_join_timeout_secs: 86_400,
            min_wager: 1,
            difficulty_thresholds: DifficultyThresholds::default(),
            roulette_rows: roulette::DEFAULT_ROWS,
            roulette_cols: roulette::DEFAULT_COLS,
            rng_seed: None,
        }
    }
}

impl SessionConfig {
    /// Load configuration from environment variables, falling back to defaults
    ///
    /// Recognized variables: `HINT_INTERVAL_SECS`, `COUNTDOWN_SECS`,
    /// `TURN_TIMEOUT_SECS`, `TURN_WARNING_SECS`, `GUESS_MAX_DURATION_SECS`,
    /// `GLOBAL_INACTIVITY_SECS`, `GLOBAL_MAX_DURATION_SECS`,
    /// `GLOBAL_JOIN_TIMEOUT_SECS`, `MIN_WAGER`, `DIFFICULTY_MEDIUM_WAGER`,
    /// `DIFFICULTY_HARD_WAGER`, `ROULETTE_ROWS`, `ROULETTE_COLS`, `GAME_RNG_SEED`.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            hint_interval_secs: parse_env_or("HINT_INTERVAL_SECS", defaults.hint_interval_secs),
            countdown_secs: parse_env_or("COUNTDOWN_SECS", defaults.countdown_secs),
            turn_timeout_secs: parse_env_or("TURN_TIMEOUT_SECS", defaults.turn_timeout_secs),
            turn_warning_secs: parse_env_or("TURN_WARNING_SECS", defaults.turn_warning_secs),
            guess_max_duration_secs: parse_env_or(
                "GUESS_MAX_DURATION_SECS",
                defaults.guess_max_duration_secs,
            ),
            global_inactivity_secs: parse_env_or(
                "GLOBAL_INACTIVITY_SECS",
                defaults.global_inactivity_secs,
            ),
            global_max_duration_secs: parse_env_or(
                "GLOBAL_MAX_DURATION_SECS",
                defaults.global_max_duration_secs,
            ),
            global_join_timeout_secs: parse_env_or(
                "GLOBAL_JOIN_TIMEOUT_SECS",
                defaults.global_join_timeout_secs,
            ),
            min_wager: parse_env_or("MIN_WAGER", defaults.min_wager),
            difficulty_thresholds: DifficultyThresholds {
                medium: parse_env_or(
                    "DIFFICULTY_MEDIUM_WAGER",
                    defaults.difficulty_thresholds.medium,
                ),
                hard: parse_env_or("DIFFICULTY_HARD_WAGER", defaults.difficulty_thresholds.hard),
            },
            roulette_rows: parse_env_or("ROULETTE_ROWS", defaults.roulette_rows),
            roulette_cols: parse_env_or("ROULETTE_COLS", defaults.roulette_cols),
            rng_seed: std::env::var("GAME_RNG_SEED")
                .ok()
                .and_then(|v| v.parse().ok()),
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.hint_interval_secs == 0 {
            return Err("Hint interval must be greater than 0".to_string());
        }

        if self.turn_timeout_secs == 0 {
            return Err("Turn timeout must be greater than 0".to_string());
        }

        if self.turn_warning_secs >= self.turn_timeout_secs {
            return Err("Turn warning must come before the turn deadline".to_string());
        }

        if self.min_wager <= 0 {
            return Err("Minimum wager must be greater than 0".to_string());
        }

        if self.difficulty_thresholds.hard <= self.difficulty_thresholds.medium {
            return Err("Hard difficulty threshold must exceed the medium one".to_string());
        }

        let center = usize::from(self.roulette_rows % 2 == 1 && self.roulette_cols % 2 == 1);
        if self.roulette_rows * self.roulette_cols < 2 + center {
            return Err("Roulette grid needs at least two selectable cells".to_string());
        }

        if self.global_inactivity_secs == 0 || self.global_max_duration_secs == 0 {
            return Err("Global ceilings must be greater than 0".to_string());
        }

        Ok(())
    }

    pub fn hint_interval(&self) -> Duration {
        Duration::from_secs(self.hint_interval_secs)
    }

    pub fn countdown(&self) -> Duration {
        Duration::from_secs(self.countdown_secs)
    }

    pub fn turn_timeout(&self) -> Duration {
        Duration::from_secs(self.turn_timeout_secs)
    }
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
