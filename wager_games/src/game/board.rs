//! The persisted board union.

use chrono::TimeDelta;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use super::{
    BoardMode, DifficultyBounds, GameError, GameType, GuessBoard, GuessEngine, Move, Outcome,
    Puzzle, Role, RouletteBoard, RpsBoard, RpsChoice, SecretCatalog, StandoffBoard, TurnEngine,
    rps,
};

/// Board state of one session side, tagged by game type.
///
/// The four guess games share [`GuessBoard`]; the tag keeps them apart so a
/// decoded blob can be checked against the session's game type.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(tag = "type", content = "board", rename_all = "snake_case")]
pub enum Board {
    RockPaperScissors(RpsBoard),
    RussianRoulette(RouletteBoard),
    Standoff(StandoffBoard),
    GuessOrLife(GuessBoard),
    PunkRecords(GuessBoard),
    WhosWho(GuessBoard),
    Shambles(GuessBoard),
}

/// Parameters a new board is laid out with.
#[derive(Clone, Copy, Debug)]
pub struct BoardSetup {
    pub mode: BoardMode,
    pub bounds: DifficultyBounds,
    pub roulette_rows: usize,
    pub roulette_cols: usize,
}

/// What happened when a move was applied.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct MoveReport {
    /// Whether a guess was correct; `None` for turn-based moves.
    pub correct: Option<bool>,
    /// Whether the mover can no longer act on this board.
    pub finished: bool,
}

impl Board {
    /// Creates a fresh board, drawing every random element up front.
    ///
    /// # Arguments
    ///
    /// * `game_type` - Game the board is for
    /// * `setup` - Board mode and difficulty bounds
    /// * `catalog` - Secret source for guess games
    /// * `rng` - Randomness for bullets, secrets, and reveal orders
    ///
    /// # Errors
    ///
    /// Returns `GameError::NoSecretAvailable` when the catalog has nothing
    /// that fits the bounds, or `GameError::InvalidSetup` for impossible grids.
    pub fn new(
        game_type: GameType,
        setup: &BoardSetup,
        catalog: &dyn SecretCatalog,
        rng: &mut dyn RngCore,
    ) -> Result<Self, GameError> {
        let board = match game_type {
            GameType::RockPaperScissors => Self::RockPaperScissors(RpsBoard::new(setup.mode)),
            GameType::RussianRoulette => Self::RussianRoulette(RouletteBoard::new(
                setup.roulette_rows,
                setup.roulette_cols,
                setup.mode,
                rng,
            )?),
            GameType::Standoff => Self::Standoff(StandoffBoard::new(setup.mode)),
            GameType::GuessOrLife
            | GameType::PunkRecords
            | GameType::WhosWho
            | GameType::Shambles => {
                let entry = catalog
                    .pick(game_type, &setup.bounds, rng)
                    .ok_or_else(|| GameError::NoSecretAvailable(game_type.to_string()))?;
                let puzzle = Puzzle::build(game_type, &entry, &setup.bounds, rng)?;
                Self::wrap_guess(game_type, GuessBoard::new(setup.mode, puzzle, setup.bounds.lives))?
            }
        };
        Ok(board)
    }

    /// A board for the other side of a global session.
    ///
    /// Guess games reuse this board's secret with fresh progress; turn-based
    /// games get an independent layout.
    ///
    /// # Errors
    ///
    /// Same as [`Board::new`].
    pub fn counterpart(
        &self,
        setup: &BoardSetup,
        catalog: &dyn SecretCatalog,
        rng: &mut dyn RngCore,
    ) -> Result<Self, GameError> {
        match self.as_guess() {
            Some(guess) => Self::wrap_guess(
                self.game_type(),
                GuessBoard::new(setup.mode, guess.puzzle.clone(), setup.bounds.lives),
            ),
            None => Self::new(self.game_type(), setup, catalog, rng),
        }
    }

    fn wrap_guess(game_type: GameType, board: GuessBoard) -> Result<Self, GameError> {
        match game_type {
            GameType::GuessOrLife => Ok(Self::GuessOrLife(board)),
            GameType::PunkRecords => Ok(Self::PunkRecords(board)),
            GameType::WhosWho => Ok(Self::WhosWho(board)),
            GameType::Shambles => Ok(Self::Shambles(board)),
            other => Err(GameError::InvalidSetup(format!("{other} is not a guess game"))),
        }
    }

    #[must_use]
    pub fn game_type(&self) -> GameType {
        match self {
            Self::RockPaperScissors(_) => GameType::RockPaperScissors,
            Self::RussianRoulette(_) => GameType::RussianRoulette,
            Self::Standoff(_) => GameType::Standoff,
            Self::GuessOrLife(_) => GameType::GuessOrLife,
            Self::PunkRecords(_) => GameType::PunkRecords,
            Self::WhosWho(_) => GameType::WhosWho,
            Self::Shambles(_) => GameType::Shambles,
        }
    }

    #[must_use]
    pub fn mode(&self) -> BoardMode {
        match self {
            Self::RockPaperScissors(board) => board.mode,
            Self::RussianRoulette(board) => board.mode,
            Self::Standoff(board) => board.mode,
            Self::GuessOrLife(board)
            | Self::PunkRecords(board)
            | Self::WhosWho(board)
            | Self::Shambles(board) => board.mode,
        }
    }

    #[must_use]
    pub fn as_turn(&self) -> Option<&dyn TurnEngine> {
        match self {
            Self::RockPaperScissors(board) => Some(board),
            Self::RussianRoulette(board) => Some(board),
            Self::Standoff(board) => Some(board),
            _ => None,
        }
    }

    pub fn as_turn_mut(&mut self) -> Option<&mut dyn TurnEngine> {
        match self {
            Self::RockPaperScissors(board) => Some(board),
            Self::RussianRoulette(board) => Some(board),
            Self::Standoff(board) => Some(board),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_guess(&self) -> Option<&GuessBoard> {
        match self {
            Self::GuessOrLife(board)
            | Self::PunkRecords(board)
            | Self::WhosWho(board)
            | Self::Shambles(board) => Some(board),
            _ => None,
        }
    }

    pub fn as_guess_mut(&mut self) -> Option<&mut GuessBoard> {
        match self {
            Self::GuessOrLife(board)
            | Self::PunkRecords(board)
            | Self::WhosWho(board)
            | Self::Shambles(board) => Some(board),
            _ => None,
        }
    }

    /// Applies a move for `role`.
    ///
    /// # Errors
    ///
    /// Returns the engine's rejection, or `GameError::UnsupportedMove` when the
    /// move kind does not belong to this game.
    pub fn apply(&mut self, role: Role, mv: &Move) -> Result<MoveReport, GameError> {
        let game_type = self.game_type();
        if let Some(engine) = self.as_turn_mut() {
            engine.apply_move(role, mv)?;
            return Ok(MoveReport {
                correct: None,
                finished: engine.is_finished(),
            });
        }

        match (self.as_guess_mut(), mv) {
            (Some(board), Move::Guess(text)) => {
                let result = board.submit_guess(role, text)?;
                Ok(MoveReport {
                    correct: Some(result.correct),
                    finished: result.finished,
                })
            }
            _ => Err(GameError::UnsupportedMove {
                game_type,
                mv: mv.to_string(),
            }),
        }
    }

    /// Disclose one more piece of a guess board. Turn-based boards have
    /// nothing to reveal.
    pub fn reveal_next(&mut self) -> bool {
        self.as_guess_mut().is_some_and(GuessEngine::reveal_next)
    }

    #[must_use]
    pub fn reveal_count(&self) -> u32 {
        self.as_guess().map_or(0, |board| board.reveals)
    }

    #[must_use]
    pub fn is_finished(&self) -> bool {
        match (self.as_turn(), self.as_guess()) {
            (Some(engine), _) => engine.is_finished(),
            (None, Some(board)) => board.is_finished(),
            (None, None) => true,
        }
    }

    #[must_use]
    pub fn is_finished_for(&self, role: Role) -> bool {
        match self.as_guess() {
            Some(board) => board.is_finished_for(role),
            None => self.is_finished(),
        }
    }

    #[must_use]
    pub fn outcome(&self) -> Outcome {
        match (self.as_turn(), self.as_guess()) {
            (Some(engine), _) => engine.outcome(),
            (None, Some(board)) => board.outcome(),
            (None, None) => Outcome::Undecided,
        }
    }

    #[must_use]
    pub fn move_count(&self) -> u32 {
        match (self.as_turn(), self.as_guess()) {
            (Some(engine), _) => engine.move_count(),
            (None, Some(board)) => board.move_count(),
            (None, None) => 0,
        }
    }

    #[must_use]
    pub fn current_turn(&self) -> Option<Role> {
        self.as_turn().and_then(|engine| engine.current_turn())
    }

    /// Roles that owe a turn-based move. Guess boards never owe one.
    #[must_use]
    pub fn awaiting(&self) -> Vec<Role> {
        self.as_turn()
            .map(|engine| engine.awaiting())
            .unwrap_or_default()
    }

    #[must_use]
    pub fn rps_choice(&self, role: Role) -> Option<RpsChoice> {
        match self {
            Self::RockPaperScissors(board) => board.choice(role),
            _ => None,
        }
    }

    /// Move injected for `role` after a missed deadline, or `None` when the
    /// role owes nothing on this board.
    ///
    /// `counterpart` is the other side's board in global mode.
    pub fn fallback_move(
        &self,
        role: Role,
        counterpart: Option<&Board>,
        rng: &mut dyn RngCore,
    ) -> Option<Move> {
        if !self.awaiting().contains(&role) {
            return None;
        }
        match self {
            Self::RockPaperScissors(board) => {
                let known = board
                    .choice(role.other())
                    .or_else(|| counterpart.and_then(|other| other.rps_choice(role.other())));
                Some(Move::Rps(RpsBoard::fallback_choice(known, rng)))
            }
            Self::RussianRoulette(board) => {
                board.fallback_cell(rng).map(|cell| Move::Fire { cell })
            }
            Self::Standoff(_) => Some(Move::Ready),
            _ => None,
        }
    }

    /// Outcome of a global session from both sides' boards.
    ///
    /// # Arguments
    ///
    /// * `challenger` - The challenger's solo board
    /// * `opponent` - The opponent's solo board
    /// * `challenger_elapsed` - Active time the challenger spent
    /// * `opponent_elapsed` - Active time the opponent spent
    ///
    /// # Returns
    ///
    /// RPS uses the dominance table, roulette compares safe fires, and guess
    /// games rank solved over unsolved, then fewer reveals, then less time.
    ///
    /// # Errors
    ///
    /// Returns `GameError::InvalidSetup` when the boards are of different games.
    pub fn compare_global(
        challenger: &Board,
        opponent: &Board,
        challenger_elapsed: TimeDelta,
        opponent_elapsed: TimeDelta,
    ) -> Result<Outcome, GameError> {
        if challenger.game_type() != opponent.game_type() {
            return Err(GameError::InvalidSetup(format!(
                "cannot compare a {} board with a {} board",
                challenger.game_type(),
                opponent.game_type()
            )));
        }

        let outcome = match (challenger, opponent) {
            (Self::RockPaperScissors(ch), Self::RockPaperScissors(op)) => {
                match (ch.choice(Role::Challenger), op.choice(Role::Opponent)) {
                    (Some(a), Some(b)) => rps::resolve(a, b),
                    (Some(_), None) => Outcome::ChallengerWon,
                    (None, Some(_)) => Outcome::OpponentWon,
                    (None, None) => Outcome::Draw,
                }
            }
            (Self::RussianRoulette(ch), Self::RussianRoulette(op)) => {
                RouletteBoard::compare_scores(ch, op)
            }
            (Self::Standoff(_), Self::Standoff(_)) => Outcome::Draw,
            _ => match (challenger.as_guess(), opponent.as_guess()) {
                (Some(ch), Some(op)) => compare_guess(
                    ch.progress(Role::Challenger).solved_at_reveal,
                    op.progress(Role::Opponent).solved_at_reveal,
                    challenger_elapsed,
                    opponent_elapsed,
                ),
                _ => Outcome::Draw,
            },
        };
        Ok(outcome)
    }
}

fn compare_guess(
    challenger: Option<u32>,
    opponent: Option<u32>,
    challenger_elapsed: TimeDelta,
    opponent_elapsed: TimeDelta,
) -> Outcome {
    let ordering = match (challenger, opponent) {
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
        (Some(a), Some(b)) => a.cmp(&b).then(challenger_elapsed.cmp(&opponent_elapsed)),
    };
    match ordering {
        Ordering::Less => Outcome::ChallengerWon,
        Ordering::Greater => Outcome::OpponentWon,
        Ordering::Equal => Outcome::Draw,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::{Difficulty, StaticCatalog};
    use rand::{SeedableRng, rngs::StdRng};

    fn setup(mode: BoardMode) -> BoardSetup {
        BoardSetup {
            mode,
            bounds: Difficulty::Easy.bounds(),
            roulette_rows: 3,
            roulette_cols: 3,
        }
    }

    #[test]
    fn test_every_game_type_builds() {
        let catalog = StaticCatalog::builtin();
        let mut rng = StdRng::seed_from_u64(17);
        for game_type in GameType::ALL {
            let board = Board::new(game_type, &setup(BoardMode::HeadToHead), &catalog, &mut rng)
                .unwrap();
            assert_eq!(board.game_type(), game_type);
            assert!(!board.is_finished());
        }
    }

    #[test]
    fn test_json_tag_matches_game_type() {
        let board = Board::RockPaperScissors(RpsBoard::new(BoardMode::HeadToHead));
        let json = serde_json::to_value(&board).unwrap();
        assert_eq!(json["type"], "rock_paper_scissors");
        let decoded: Board = serde_json::from_value(json).unwrap();
        assert_eq!(decoded, board);
    }

    #[test]
    fn test_mismatched_move_is_unsupported() {
        let mut board = Board::Standoff(StandoffBoard::new(BoardMode::HeadToHead));
        let err = board
            .apply(Role::Challenger, &Move::Guess("luffy".to_string()))
            .unwrap_err();
        assert!(matches!(err, GameError::UnsupportedMove { .. }));
    }

    #[test]
    fn test_empty_catalog_has_no_secret() {
        let catalog = StaticCatalog::default();
        let mut rng = StdRng::seed_from_u64(1);
        let err = Board::new(
            GameType::WhosWho,
            &setup(BoardMode::HeadToHead),
            &catalog,
            &mut rng,
        )
        .unwrap_err();
        assert!(matches!(err, GameError::NoSecretAvailable(_)));
    }

    #[test]
    fn test_counterpart_shares_secret() {
        let catalog = StaticCatalog::builtin();
        let mut rng = StdRng::seed_from_u64(23);
        let mine = Board::new(
            GameType::GuessOrLife,
            &setup(BoardMode::Solo(Role::Challenger)),
            &catalog,
            &mut rng,
        )
        .unwrap();
        let theirs = mine
            .counterpart(&setup(BoardMode::Solo(Role::Opponent)), &catalog, &mut rng)
            .unwrap();
        assert_eq!(
            mine.as_guess().unwrap().puzzle,
            theirs.as_guess().unwrap().puzzle
        );
        assert_eq!(theirs.mode(), BoardMode::Solo(Role::Opponent));
    }

    #[test]
    fn test_rps_fallback_uses_counterpart_board() {
        let mut rng = StdRng::seed_from_u64(2);
        let mine = Board::RockPaperScissors(RpsBoard::new(BoardMode::Solo(Role::Challenger)));
        let mut theirs = Board::RockPaperScissors(RpsBoard::new(BoardMode::Solo(Role::Opponent)));
        theirs
            .apply(Role::Opponent, &Move::Rps(RpsChoice::Paper))
            .unwrap();
        let fallback = mine.fallback_move(Role::Challenger, Some(&theirs), &mut rng);
        assert_eq!(fallback, Some(Move::Rps(RpsChoice::Rock)));
    }

    #[test]
    fn test_guess_ranking() {
        let short = TimeDelta::seconds(10);
        let long = TimeDelta::seconds(50);
        assert_eq!(compare_guess(Some(3), None, long, short), Outcome::ChallengerWon);
        assert_eq!(compare_guess(Some(3), Some(1), short, long), Outcome::OpponentWon);
        assert_eq!(compare_guess(Some(2), Some(2), short, long), Outcome::ChallengerWon);
        assert_eq!(compare_guess(Some(2), Some(2), short, short), Outcome::Draw);
        assert_eq!(compare_guess(None, None, short, long), Outcome::Draw);
    }
}
