//! Session repository: trait plus PostgreSQL and in-memory implementations.
#![allow(clippy::needless_raw_string_hashes)]

use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use super::{
    errors::{StorageError, StorageResult},
    timeouts::{with_default_timeout, with_long_timeout},
};
use crate::{
    game::{Board, Difficulty, GameType, Outcome},
    session::{GameSession, SessionId, SessionStatus},
};

/// Persistence port for game sessions
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Insert a new session and return its assigned id
    async fn insert(&self, session: &GameSession) -> StorageResult<SessionId>;

    /// Load a session
    async fn get(&self, id: SessionId) -> StorageResult<Option<GameSession>>;

    /// Save a session if nobody saved it since it was loaded.
    ///
    /// On success `session.version` is bumped to the stored version.
    async fn save(&self, session: &mut GameSession) -> StorageResult<()>;

    /// Delete a session. Returns whether a row was removed.
    async fn delete(&self, id: SessionId) -> StorageResult<bool>;

    /// Every session in a non-terminal state
    async fn list_active(&self) -> StorageResult<Vec<GameSession>>;

    /// Global sessions still waiting for an opponent, oldest first
    async fn list_open_global(&self) -> StorageResult<Vec<GameSession>>;
}

const SESSION_COLUMNS: &str = r#"
    id, challenger_id, opponent_id, game_type, status, wager, group_id, is_global,
    difficulty, board::text AS board, opponent_board::text AS opponent_board, outcome,
    challenger_escrowed, opponent_escrowed, created_at, started_at, countdown_ends_at,
    last_interaction_at, last_interaction_opponent_at, last_hint_at, last_hint_opponent_at,
    global_challenger_start_at, global_challenger_end_at, global_opponent_start_at,
    global_opponent_end_at, hint_restart_count, version
"#;

/// Default PostgreSQL implementation of `SessionRepository`
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn encode_board(session_id: SessionId, board: Option<&Board>) -> StorageResult<Option<String>> {
    board
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| StorageError::CorruptBoard {
            session_id,
            reason: e.to_string(),
        })
}

/// Decode a stored board and check it belongs to the session's game type.
fn decode_board(
    session_id: SessionId,
    game_type: Option<GameType>,
    json: Option<String>,
) -> StorageResult<Option<Board>> {
    let Some(json) = json else {
        return Ok(None);
    };
    let board: Board = serde_json::from_str(&json).map_err(|e| StorageError::CorruptBoard {
        session_id,
        reason: e.to_string(),
    })?;
    if Some(board.game_type()) != game_type {
        return Err(StorageError::CorruptBoard {
            session_id,
            reason: format!(
                "{} board stored for a session of type {}",
                board.game_type(),
                game_type.map_or_else(|| "none".to_string(), |t| t.to_string())
            ),
        });
    }
    Ok(Some(board))
}

fn outcome_str(outcome: Outcome) -> &'static str {
    match outcome {
        Outcome::ChallengerWon => "challenger_won",
        Outcome::OpponentWon => "opponent_won",
        Outcome::Draw => "draw",
        Outcome::Undecided => "undecided",
    }
}

fn parse_outcome(value: &str) -> Option<Outcome> {
    match value {
        "challenger_won" => Some(Outcome::ChallengerWon),
        "opponent_won" => Some(Outcome::OpponentWon),
        "draw" => Some(Outcome::Draw),
        "undecided" => Some(Outcome::Undecided),
        _ => None,
    }
}

fn naive(at: Option<DateTime<Utc>>) -> Option<NaiveDateTime> {
    at.map(|dt| dt.naive_utc())
}

fn utc(row: &PgRow, column: &str) -> Option<DateTime<Utc>> {
    row.get::<Option<NaiveDateTime>, _>(column)
        .map(|dt| dt.and_utc())
}

fn session_from_row(row: &PgRow) -> StorageResult<GameSession> {
    let id: SessionId = row.get("id");
    let corrupt = |reason: String| StorageError::CorruptRow {
        session_id: id,
        reason,
    };

    let game_type = row
        .get::<Option<String>, _>("game_type")
        .map(|value| value.parse::<GameType>())
        .transpose()
        .map_err(|e| corrupt(e.to_string()))?;
    let status = row
        .get::<String, _>("status")
        .parse::<SessionStatus>()
        .map_err(corrupt)?;
    let difficulty = row
        .get::<String, _>("difficulty")
        .parse::<Difficulty>()
        .map_err(corrupt)?;
    let outcome = match row.get::<Option<String>, _>("outcome") {
        Some(value) => Some(
            parse_outcome(&value).ok_or_else(|| corrupt(format!("unknown outcome '{value}'")))?,
        ),
        None => None,
    };

    let is_global: bool = row.get("is_global");
    let board = decode_board(id, game_type, row.get("board"))?;
    let opponent_board = decode_board(id, game_type, row.get("opponent_board"))?;
    if opponent_board.is_some() && !is_global {
        return Err(StorageError::CorruptBoard {
            session_id: id,
            reason: "opponent board stored for a head-to-head session".to_string(),
        });
    }

    Ok(GameSession {
        id,
        challenger: row.get("challenger_id"),
        opponent: row.get("opponent_id"),
        game_type,
        status,
        wager: row.get("wager"),
        group_id: row.get("group_id"),
        is_global,
        difficulty,
        board,
        opponent_board,
        outcome,
        challenger_escrowed: row.get("challenger_escrowed"),
        opponent_escrowed: row.get("opponent_escrowed"),
        created_at: row.get::<NaiveDateTime, _>("created_at").and_utc(),
        started_at: utc(row, "started_at"),
        countdown_ends_at: utc(row, "countdown_ends_at"),
        last_interaction_at: utc(row, "last_interaction_at"),
        last_interaction_opponent_at: utc(row, "last_interaction_opponent_at"),
        last_hint_at: utc(row, "last_hint_at"),
        last_hint_opponent_at: utc(row, "last_hint_opponent_at"),
        global_challenger_start_at: utc(row, "global_challenger_start_at"),
        global_challenger_end_at: utc(row, "global_challenger_end_at"),
        global_opponent_start_at: utc(row, "global_opponent_start_at"),
        global_opponent_end_at: utc(row, "global_opponent_end_at"),
        hint_restart_count: row.get("hint_restart_count"),
        version: row.get("version"),
    })
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn insert(&self, session: &GameSession) -> StorageResult<SessionId> {
        let board = encode_board(session.id, session.board.as_ref())?;
        let opponent_board = encode_board(session.id, session.opponent_board.as_ref())?;

        let row = with_default_timeout(
            sqlx::query(
                r#"
                INSERT INTO game_sessions (
                    challenger_id, opponent_id, game_type, status, wager, group_id, is_global,
                    difficulty, board, opponent_board, outcome, challenger_escrowed,
                    opponent_escrowed, created_at, version
                )
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9::jsonb, $10::jsonb, $11, $12, $13, $14, 0)
                RETURNING id
                "#,
            )
            .bind(session.challenger)
            .bind(session.opponent)
            .bind(session.game_type.map(GameType::as_str))
            .bind(session.status.as_str())
            .bind(session.wager)
            .bind(session.group_id)
            .bind(session.is_global)
            .bind(session.difficulty.as_str())
            .bind(board)
            .bind(opponent_board)
            .bind(session.outcome.map(outcome_str))
            .bind(session.challenger_escrowed)
            .bind(session.opponent_escrowed)
            .bind(session.created_at.naive_utc())
            .fetch_one(&self.pool),
        )
        .await?;

        Ok(row.get("id"))
    }

    async fn get(&self, id: SessionId) -> StorageResult<Option<GameSession>> {
        let query = format!("SELECT {SESSION_COLUMNS} FROM game_sessions WHERE id = $1");
        let row = with_default_timeout(sqlx::query(&query).bind(id).fetch_optional(&self.pool))
            .await?;

        row.as_ref().map(session_from_row).transpose()
    }

    async fn save(&self, session: &mut GameSession) -> StorageResult<()> {
        let board = encode_board(session.id, session.board.as_ref())?;
        let opponent_board = encode_board(session.id, session.opponent_board.as_ref())?;

        let row = with_default_timeout(
            sqlx::query(
                r#"
                UPDATE game_sessions SET
                    opponent_id = $3, game_type = $4, status = $5, board = $6::jsonb,
                    opponent_board = $7::jsonb, outcome = $8, challenger_escrowed = $9,
                    opponent_escrowed = $10, started_at = $11, countdown_ends_at = $12,
                    last_interaction_at = $13, last_interaction_opponent_at = $14,
                    last_hint_at = $15, last_hint_opponent_at = $16,
                    global_challenger_start_at = $17, global_challenger_end_at = $18,
                    global_opponent_start_at = $19, global_opponent_end_at = $20,
                    hint_restart_count = $21, version = version + 1, updated_at = NOW()
                WHERE id = $1 AND version = $2
                RETURNING version
                "#,
            )
            .bind(session.id)
            .bind(session.version)
            .bind(session.opponent)
            .bind(session.game_type.map(GameType::as_str))
            .bind(session.status.as_str())
            .bind(board)
            .bind(opponent_board)
            .bind(session.outcome.map(outcome_str))
            .bind(session.challenger_escrowed)
            .bind(session.opponent_escrowed)
            .bind(naive(session.started_at))
            .bind(naive(session.countdown_ends_at))
            .bind(naive(session.last_interaction_at))
            .bind(naive(session.last_interaction_opponent_at))
            .bind(naive(session.last_hint_at))
            .bind(naive(session.last_hint_opponent_at))
            .bind(naive(session.global_challenger_start_at))
            .bind(naive(session.global_challenger_end_at))
            .bind(naive(session.global_opponent_start_at))
            .bind(naive(session.global_opponent_end_at))
            .bind(session.hint_restart_count)
            .fetch_optional(&self.pool),
        )
        .await?;

        if let Some(row) = row {
            session.version = row.get("version");
            return Ok(());
        }

        let current = with_default_timeout(
            sqlx::query("SELECT version FROM game_sessions WHERE id = $1")
                .bind(session.id)
                .fetch_optional(&self.pool),
        )
        .await?;

        match current {
            Some(row) => Err(StorageError::VersionConflict {
                session_id: session.id,
                expected: session.version,
                found: row.get("version"),
            }),
            None => Err(StorageError::NotFound(session.id)),
        }
    }

    async fn delete(&self, id: SessionId) -> StorageResult<bool> {
        let result = with_default_timeout(
            sqlx::query("DELETE FROM game_sessions WHERE id = $1")
                .bind(id)
                .execute(&self.pool),
        )
        .await?;

        Ok(result.rows_affected() > 0)
    }

    async fn list_active(&self) -> StorageResult<Vec<GameSession>> {
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM game_sessions
             WHERE status NOT IN ('won', 'lost', 'draw', 'forced_end')
             ORDER BY id ASC"
        );
        let rows = with_long_timeout(sqlx::query(&query).fetch_all(&self.pool)).await?;

        rows.iter().map(session_from_row).collect()
    }

    async fn list_open_global(&self) -> StorageResult<Vec<GameSession>> {
        let query = format!(
            "SELECT {SESSION_COLUMNS} FROM game_sessions
             WHERE is_global = TRUE AND opponent_id IS NULL AND status = 'in_progress'
             ORDER BY created_at ASC, id ASC"
        );
        let rows = with_default_timeout(sqlx::query(&query).fetch_all(&self.pool)).await?;

        rows.iter().map(session_from_row).collect()
    }
}

/// Session repository held in process memory.
///
/// Used by tests and by the server's in-memory mode.
#[derive(Default)]
pub struct InMemorySessionRepository {
    state: Mutex<InMemoryState>,
}

#[derive(Default)]
struct InMemoryState {
    sessions: HashMap<SessionId, GameSession>,
    last_id: SessionId,
}

impl InMemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.lock().sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, InMemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn insert(&self, session: &GameSession) -> StorageResult<SessionId> {
        let mut state = self.lock();
        state.last_id += 1;
        let id = state.last_id;

        let mut stored = session.clone();
        stored.id = id;
        stored.version = 0;
        state.sessions.insert(id, stored);
        Ok(id)
    }

    async fn get(&self, id: SessionId) -> StorageResult<Option<GameSession>> {
        Ok(self.lock().sessions.get(&id).cloned())
    }

    async fn save(&self, session: &mut GameSession) -> StorageResult<()> {
        let mut state = self.lock();
        let stored = state
            .sessions
            .get_mut(&session.id)
            .ok_or(StorageError::NotFound(session.id))?;

        if stored.version != session.version {
            return Err(StorageError::VersionConflict {
                session_id: session.id,
                expected: session.version,
                found: stored.version,
            });
        }

        session.version += 1;
        *stored = session.clone();
        Ok(())
    }

    async fn delete(&self, id: SessionId) -> StorageResult<bool> {
        Ok(self.lock().sessions.remove(&id).is_some())
    }

    async fn list_active(&self) -> StorageResult<Vec<GameSession>> {
        let mut sessions: Vec<GameSession> = self
            .lock()
            .sessions
            .values()
            .filter(|session| !session.status.is_terminal())
            .cloned()
            .collect();
        sessions.sort_by_key(|session| session.id);
        Ok(sessions)
    }

    async fn list_open_global(&self) -> StorageResult<Vec<GameSession>> {
        let mut sessions: Vec<GameSession> = self
            .lock()
            .sessions
            .values()
            .filter(|session| session.is_open_global())
            .cloned()
            .collect();
        sessions.sort_by_key(|session| (session.created_at, session.id));
        Ok(sessions)
    }
}
