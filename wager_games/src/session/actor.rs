//! Session actor implementation with async message handling.

use chrono::{DateTime, TimeDelta, Utc};
use rand::{SeedableRng, rngs::StdRng};
use std::{collections::HashSet, sync::Arc, time::Duration};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::{
    clock::Clock,
    config::SessionConfig,
    errors::{SessionError, SessionResult},
    messages::{MoveOutcome, SessionMessage},
    models::{GameSession, SessionId, SessionStatus, UserId},
    notifier::Notifier,
    scheduler::{SessionTask, TaskScheduler, catch_up},
};
use crate::{
    db::SessionRepository,
    game::{
        Board, BoardMode, BoardSetup, Difficulty, GameError, GameType, Move, Outcome, Role,
        SecretCatalog,
    },
    wallet::Ledger,
};

/// Ports and settings shared by every session actor
#[derive(Clone)]
pub struct SessionContext {
    pub config: Arc<SessionConfig>,
    pub repository: Arc<dyn SessionRepository>,
    pub ledger: Arc<dyn Ledger>,
    pub catalog: Arc<dyn SecretCatalog>,
    pub notifier: Arc<dyn Notifier>,
    pub scheduler: Arc<dyn TaskScheduler>,
    pub clock: Arc<dyn Clock>,
}

impl SessionContext {
    fn board_setup(&self, difficulty: Difficulty, mode: BoardMode) -> BoardSetup {
        BoardSetup {
            mode,
            bounds: difficulty.bounds(),
            roulette_rows: self.config.roulette_rows,
            roulette_cols: self.config.roulette_cols,
        }
    }
}

/// Session actor handle for sending messages
#[derive(Clone)]
pub struct SessionHandle {
    sender: mpsc::Sender<SessionMessage>,
    session_id: SessionId,
}

impl SessionHandle {
    /// Create a new session handle
    pub fn new(sender: mpsc::Sender<SessionMessage>, session_id: SessionId) -> Self {
        Self { sender, session_id }
    }

    /// Get session ID
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Whether the actor stopped accepting messages
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }

    /// Send a message to the session
    pub async fn send(&self, message: SessionMessage) -> Result<(), String> {
        self.sender
            .send(message)
            .await
            .map_err(|_| "Session actor is closed".to_string())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum CatchUpTrigger {
    Timer,
    Interaction,
    Resume,
}

/// Actor owning a single session.
///
/// Every message re-reads the persisted session, mutates it, and saves it
/// with an optimistic version check, so the actor never trusts memory over
/// storage. The only in-memory state is the set of self-rearming timers
/// already in flight.
pub struct SessionActor {
    id: SessionId,
    ctx: SessionContext,
    inbox: mpsc::Receiver<SessionMessage>,
    rng: StdRng,
    /// Hint and side-check timers currently in flight
    armed: HashSet<SessionTask>,
    /// Session is terminal or gone; drain the inbox and stop
    done: bool,
}

impl SessionActor {
    /// Create a new session actor
    ///
    /// # Arguments
    ///
    /// * `id` - Session ID
    /// * `ctx` - Shared ports and configuration
    ///
    /// # Returns
    ///
    /// * `(SessionActor, SessionHandle)` - Actor and handle for sending messages
    pub fn new(id: SessionId, ctx: SessionContext) -> (Self, SessionHandle) {
        let (sender, inbox) = mpsc::channel(100);

        let rng = match ctx.config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed.wrapping_add(id.unsigned_abs())),
            None => StdRng::from_os_rng(),
        };

        let actor = Self {
            id,
            ctx,
            inbox,
            rng,
            armed: HashSet::new(),
            done: false,
        };

        (actor, SessionHandle::new(sender, id))
    }

    /// Run the session actor event loop
    pub async fn run(mut self) {
        log::debug!("Session {} actor starting", self.id);

        while let Some(message) = self.inbox.recv().await {
            self.handle_message(message).await;

            if self.done {
                // Buffered messages are still drained; new senders get an error.
                self.inbox.close();
            }
        }

        log::debug!("Session {} actor stopped", self.id);
    }

    /// Handle a session message
    async fn handle_message(&mut self, message: SessionMessage) {
        match message {
            SessionMessage::SelectType {
                user_id,
                game_type,
                response,
            } => {
                let result = self.handle_select_type(user_id, game_type).await;
                let _ = response.send(self.logged(result));
            }

            SessionMessage::Respond {
                user_id,
                accept,
                response,
            } => {
                let result = self.handle_respond(user_id, accept).await;
                let _ = response.send(self.logged(result));
            }

            SessionMessage::Cancel { user_id, response } => {
                let result = self.handle_cancel(user_id).await;
                let _ = response.send(self.logged(result));
            }

            SessionMessage::SubmitMove {
                user_id,
                mv,
                response,
            } => {
                let result = self.handle_move(user_id, mv).await;
                let _ = response.send(self.logged(result));
            }

            SessionMessage::JoinGlobal { user_id, response } => {
                let result = self.handle_join_global(user_id).await;
                let _ = response.send(self.logged(result));
            }

            SessionMessage::ForceEnd { response } => {
                let result = self.handle_force_end().await;
                let _ = response.send(self.logged(result));
            }

            SessionMessage::Resume { response } => {
                let result = self.handle_resume().await;
                let _ = response.send(self.logged(result));
            }

            SessionMessage::Timer { task, response } => {
                let result = self.handle_timer(task).await;
                let _ = response.send(self.logged(result));
            }
        }
    }

    fn logged<T>(&self, result: SessionResult<T>) -> SessionResult<T> {
        if let Err(err) = &result {
            if err.is_fatal() {
                log::error!("Session {}: {}", self.id, err);
            } else {
                log::debug!("Session {}: rejected: {}", self.id, err);
            }
        }
        result
    }

    fn now(&self) -> DateTime<Utc> {
        self.ctx.clock.now()
    }

    async fn load(&mut self) -> SessionResult<GameSession> {
        match self.ctx.repository.get(self.id).await? {
            Some(session) => {
                if session.status.is_terminal() {
                    self.done = true;
                }
                Ok(session)
            }
            None => {
                self.done = true;
                Err(SessionError::NotFound(self.id))
            }
        }
    }

    async fn save(&mut self, session: &mut GameSession) -> SessionResult<()> {
        self.ctx.repository.save(session).await?;
        if session.status.is_terminal() {
            self.done = true;
        }
        Ok(())
    }

    fn schedule(&self, task: SessionTask, delay: Duration) {
        self.ctx.scheduler.schedule(self.id, task, delay);
    }

    /// Arm a self-rearming timer unless one is already in flight.
    fn arm_once(&mut self, task: SessionTask, delay: Duration) {
        if self.armed.insert(task) {
            self.schedule(task, delay);
        }
    }

    fn role_of(&self, session: &GameSession, user_id: UserId) -> SessionResult<Role> {
        session
            .role_of(user_id)
            .ok_or(SessionError::NotParticipant {
                session_id: self.id,
                user_id,
            })
    }

    fn require_in_progress(&self, session: &GameSession) -> SessionResult<()> {
        match session.status {
            SessionStatus::InProgress => Ok(()),
            status if status.is_terminal() => Err(SessionError::AlreadyFinished(self.id)),
            _ => Err(SessionError::NotStarted(self.id)),
        }
    }

    // Escrow

    /// Reserve the stake of `role` under a key unique to this attempt, so a
    /// reservation that was rolled back never blocks the next one.
    ///
    /// Returns the key, which the rollback derives its own key from.
    async fn reserve_stake(&self, session: &mut GameSession, role: Role) -> SessionResult<String> {
        let Some(user_id) = session.participant(role) else {
            return Err(SessionError::InvalidState {
                status: session.status,
            });
        };

        let key = format!("session:{}:reserve:{}:{}", session.id, user_id, Uuid::new_v4());
        self.ctx
            .ledger
            .reserve(user_id, session.wager, &key)
            .await
            .map_err(SessionError::from_reserve)?;

        session.set_escrowed(role, true);
        Ok(key)
    }

    /// Return an escrowed stake. `purpose` keeps refunds and releases apart
    /// in the idempotency key.
    async fn release_stake(
        &self,
        session: &mut GameSession,
        role: Role,
        purpose: &str,
    ) -> SessionResult<()> {
        if !session.escrowed(role) {
            return Ok(());
        }
        let Some(user_id) = session.participant(role) else {
            session.set_escrowed(role, false);
            return Ok(());
        };

        let key = format!("session:{}:{}:{}", session.id, purpose, user_id);
        match self.ctx.ledger.release(user_id, session.wager, &key).await {
            Ok(_) => {}
            Err(err) if err.is_duplicate() => {
                log::debug!("Session {}: {} for {} already applied", session.id, purpose, user_id);
            }
            Err(err) => return Err(err.into()),
        }

        session.set_escrowed(role, false);
        Ok(())
    }

    /// Undo a reservation whose session update could not be saved.
    async fn rollback_stake(&self, session: &mut GameSession, role: Role, reserve_key: &str) {
        session.set_escrowed(role, false);
        let Some(user_id) = session.participant(role) else {
            return;
        };
        let key = format!("{reserve_key}:rollback");
        if let Err(err) = self.ctx.ledger.release(user_id, session.wager, &key).await {
            log::error!(
                "Session {}: failed to roll back stake of {}: {}",
                session.id,
                user_id,
                err
            );
        }
    }

    async fn settle(&self, session: &mut GameSession, outcome: Outcome) -> SessionResult<()> {
        let both_escrowed =
            session.escrowed(Role::Challenger) && session.escrowed(Role::Opponent);

        if let (Some(winner), true) = (outcome.winner(), both_escrowed) {
            let (Some(winner_id), Some(loser_id)) = (
                session.participant(winner),
                session.participant(winner.other()),
            ) else {
                return Err(SessionError::InvalidState {
                    status: session.status,
                });
            };

            let key = format!("session:{}:settle", session.id);
            match self
                .ctx
                .ledger
                .settle(winner_id, loser_id, session.wager, false, &key)
                .await
            {
                Ok(()) => {}
                Err(err) if err.is_duplicate() => {
                    log::debug!("Session {}: already settled", session.id);
                }
                Err(err) => return Err(err.into()),
            }

            session.set_escrowed(Role::Challenger, false);
            session.set_escrowed(Role::Opponent, false);
            return Ok(());
        }

        if outcome.winner().is_some() {
            log::warn!(
                "Session {}: {} without both stakes escrowed, refunding instead",
                session.id,
                outcome
            );
        }
        for role in Role::BOTH {
            self.release_stake(session, role, "release").await?;
        }
        Ok(())
    }

    async fn finish(&mut self, session: &mut GameSession, outcome: Outcome) -> SessionResult<()> {
        let Some(status) = SessionStatus::from_outcome(outcome) else {
            return Ok(());
        };

        self.settle(session, outcome).await?;
        session.status = status;
        session.outcome = Some(outcome);
        self.save(session).await?;

        log::info!("Session {} finished: {}", session.id, outcome);
        self.ctx.notifier.session_finished(session, Some(outcome));
        Ok(())
    }

    async fn force_end(&mut self, session: &mut GameSession) -> SessionResult<bool> {
        if session.status.is_terminal() {
            return Ok(false);
        }

        for role in Role::BOTH {
            self.release_stake(session, role, "release").await?;
        }
        session.status = SessionStatus::ForcedEnd;
        session.outcome = None;
        self.save(session).await?;

        log::warn!("Session {} force-ended, stakes refunded", session.id);
        self.ctx.notifier.session_finished(session, None);
        Ok(true)
    }

    /// Refund the challenger and delete a session that never got confirmed.
    async fn withdraw(&mut self, session: &mut GameSession) -> SessionResult<()> {
        for role in Role::BOTH {
            self.release_stake(session, role, "refund").await?;
        }
        self.ctx.repository.delete(session.id).await?;
        self.done = true;

        log::info!("Session {} withdrawn, stake refunded", session.id);
        Ok(())
    }

    // Lifecycle handlers

    async fn handle_select_type(
        &mut self,
        user_id: UserId,
        game_type: GameType,
    ) -> SessionResult<GameSession> {
        let mut session = self.load().await?;
        if session.status.is_terminal() {
            return Err(SessionError::AlreadyFinished(self.id));
        }
        if session.challenger != user_id {
            return Err(SessionError::NotParticipant {
                session_id: self.id,
                user_id,
            });
        }
        if session.status != SessionStatus::AwaitingSelection {
            return Err(SessionError::InvalidState {
                status: session.status,
            });
        }

        session.game_type = Some(game_type);
        session.status = SessionStatus::AwaitingOpponentConfirmation;
        self.save(&mut session).await?;

        log::info!("Session {}: {} selected", self.id, game_type);
        Ok(session)
    }

    async fn handle_respond(
        &mut self,
        user_id: UserId,
        accept: bool,
    ) -> SessionResult<Option<GameSession>> {
        let mut session = self.load().await?;
        match session.status {
            SessionStatus::AwaitingOpponentConfirmation => {}
            SessionStatus::AwaitingSelection => {
                return Err(SessionError::TypeNotSelected(self.id));
            }
            status if status.is_terminal() => {
                return Err(SessionError::AlreadyFinished(self.id));
            }
            status => return Err(SessionError::InvalidState { status }),
        }

        // Global challenges are confirmed by their own author.
        let responder = if session.is_global {
            Role::Challenger
        } else {
            Role::Opponent
        };
        if session.participant(responder) != Some(user_id) {
            return Err(SessionError::NotParticipant {
                session_id: self.id,
                user_id,
            });
        }

        if !accept {
            self.withdraw(&mut session).await?;
            return Ok(None);
        }

        let now = self.now();
        if session.is_global {
            self.publish_global(&mut session, now).await?;
            return Ok(Some(session));
        }

        let reserve_key = self.reserve_stake(&mut session, Role::Opponent).await?;
        let countdown = self.ctx.config.countdown();
        session.status = SessionStatus::CountdownToStart;
        session.countdown_ends_at = Some(after(now, self.ctx.config.countdown_secs));
        if let Err(err) = self.save(&mut session).await {
            self.rollback_stake(&mut session, Role::Opponent, &reserve_key).await;
            return Err(err);
        }

        log::info!("Session {} accepted, starting in {:?}", self.id, countdown);
        self.schedule(SessionTask::CountdownElapsed, countdown);
        Ok(Some(session))
    }

    async fn publish_global(
        &mut self,
        session: &mut GameSession,
        now: DateTime<Utc>,
    ) -> SessionResult<()> {
        let game_type = session
            .game_type
            .ok_or(SessionError::TypeNotSelected(self.id))?;
        let setup = self
            .ctx
            .board_setup(session.difficulty, BoardMode::Solo(Role::Challenger));
        let board = Board::new(game_type, &setup, self.ctx.catalog.as_ref(), &mut self.rng)?;

        session.board = Some(board);
        session.status = SessionStatus::InProgress;
        session.started_at = Some(now);
        session.global_challenger_start_at = Some(now);
        session.last_interaction_at = Some(now);
        session.last_hint_at = game_type.is_guess().then_some(now);
        self.save(session).await?;

        log::info!("Session {}: global {} challenge published", self.id, game_type);
        self.ctx.notifier.session_started(session);
        self.arm_in_progress(session, now);
        Ok(())
    }

    async fn handle_cancel(&mut self, user_id: UserId) -> SessionResult<()> {
        let mut session = self.load().await?;
        if session.status.is_terminal() {
            return Err(SessionError::AlreadyFinished(self.id));
        }
        if session.challenger != user_id {
            return Err(SessionError::NotParticipant {
                session_id: self.id,
                user_id,
            });
        }
        if !session.status.is_pre_confirmation() {
            return Err(SessionError::InvalidState {
                status: session.status,
            });
        }

        self.withdraw(&mut session).await
    }

    async fn handle_join_global(&mut self, user_id: UserId) -> SessionResult<GameSession> {
        let mut session = self.load().await?;
        if session.status.is_terminal() {
            return Err(SessionError::AlreadyFinished(self.id));
        }
        if !session.is_global {
            return Err(SessionError::NotGlobal(self.id));
        }
        if session.opponent.is_some() {
            return Err(SessionError::OpponentAlreadyJoined(self.id));
        }
        if session.status != SessionStatus::InProgress {
            return Err(SessionError::NotStarted(self.id));
        }
        if session.challenger == user_id {
            return Err(SessionError::CannotChallengeSelf);
        }

        let now = self.now();
        let setup = self
            .ctx
            .board_setup(session.difficulty, BoardMode::Solo(Role::Opponent));
        let Some(challenger_board) = session.board.as_ref() else {
            return Err(SessionError::NotStarted(self.id));
        };
        let board =
            challenger_board.counterpart(&setup, self.ctx.catalog.as_ref(), &mut self.rng)?;
        let is_guess = board.as_guess().is_some();

        session.opponent = Some(user_id);
        let reserve_key = self.reserve_stake(&mut session, Role::Opponent).await?;

        session.opponent_board = Some(board);
        session.global_opponent_start_at = Some(now);
        session.last_interaction_opponent_at = Some(now);
        session.last_hint_opponent_at = is_guess.then_some(now);
        if let Err(err) = self.save(&mut session).await {
            self.rollback_stake(&mut session, Role::Opponent, &reserve_key).await;
            return Err(err);
        }

        log::info!("Session {}: user {} joined the global challenge", self.id, user_id);
        self.ctx.notifier.session_started(&session);
        self.arm_side(&session, Role::Opponent, now);
        Ok(session)
    }

    async fn handle_force_end(&mut self) -> SessionResult<bool> {
        match self.load().await {
            Ok(mut session) => self.force_end(&mut session).await,
            Err(SessionError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn handle_resume(&mut self) -> SessionResult<()> {
        let mut session = match self.load().await {
            Ok(session) => session,
            Err(SessionError::NotFound(_)) => return Ok(()),
            Err(err) => return Err(err),
        };
        let now = self.now();

        match session.status {
            SessionStatus::CountdownToStart => {
                let delay = session
                    .countdown_ends_at
                    .map_or(Duration::ZERO, |at| until(now, at));
                self.schedule(SessionTask::CountdownElapsed, delay);
            }
            SessionStatus::InProgress => {
                let changed = self.catch_up_all(&mut session, CatchUpTrigger::Resume, now);

                if let Some(outcome) = self.decided_outcome(&session, now)? {
                    return self.finish(&mut session, outcome).await;
                }
                if changed {
                    self.save(&mut session).await?;
                }
                self.arm_in_progress(&session, now);
                log::info!("Session {} resumed", self.id);
            }
            _ => {}
        }
        Ok(())
    }

    /// Outcome of an in-progress session whose boards already decided it.
    fn decided_outcome(
        &self,
        session: &GameSession,
        now: DateTime<Utc>,
    ) -> SessionResult<Option<Outcome>> {
        if session.is_global {
            if both_sides_done(session) {
                return global_outcome(session, now).map(Some);
            }
            return Ok(None);
        }
        Ok(session
            .board
            .as_ref()
            .filter(|board| board.is_finished())
            .map(Board::outcome)
            .filter(|outcome| outcome.is_decided()))
    }

    // Moves

    async fn handle_move(&mut self, user_id: UserId, mv: Move) -> SessionResult<MoveOutcome> {
        let mut session = self.load().await?;
        let role = self.role_of(&session, user_id)?;
        self.require_in_progress(&session)?;

        let now = self.now();
        let caught_up = self.catch_up_all(&mut session, CatchUpTrigger::Interaction, now);

        if session.is_global && session.side_end(role).is_some() {
            if caught_up {
                self.save(&mut session).await?;
            }
            return Err(GameError::SideFinished.into());
        }

        let Some(board) = session.board_for_mut(role) else {
            return Err(SessionError::NotStarted(self.id));
        };
        let report = match board.apply(role, &mv) {
            Ok(report) => report,
            Err(err) => {
                if caught_up {
                    self.save(&mut session).await?;
                }
                return Err(err.into());
            }
        };

        log::debug!("Session {}: {} played {}", self.id, role, mv);
        session.set_last_interaction(role, now);

        if session.is_global {
            self.advance_global(&mut session, role, now).await?;
        } else {
            self.advance_head_to_head(&mut session, now).await?;
        }

        Ok(MoveOutcome {
            correct: report.correct,
            side_finished: report.finished,
            status: session.status,
            outcome: session.outcome,
        })
    }

    /// Persist a head-to-head session whose board changed, finishing it once
    /// the board is decided.
    async fn advance_head_to_head(
        &mut self,
        session: &mut GameSession,
        now: DateTime<Utc>,
    ) -> SessionResult<()> {
        if let Some(outcome) = self.decided_outcome(session, now)? {
            return self.finish(session, outcome).await;
        }

        self.save(session).await?;

        let Some(board) = session.board.as_ref() else {
            return Ok(());
        };
        if board.as_turn().is_some() {
            self.arm_turn_timers(session, now);
            self.ctx.notifier.turn_changed(session, board.current_turn());
        } else {
            self.arm_hint(session, Role::Challenger, now);
        }
        Ok(())
    }

    /// Persist a global session after `side` acted, closing the side when its
    /// board is done and finishing the session once both sides are.
    async fn advance_global(
        &mut self,
        session: &mut GameSession,
        side: Role,
        now: DateTime<Utc>,
    ) -> SessionResult<()> {
        if session
            .board_for(side)
            .is_some_and(|board| board.is_finished_for(side))
        {
            self.close_side(session, side, now)?;
        }

        if let Some(outcome) = self.decided_outcome(session, now)? {
            return self.finish(session, outcome).await;
        }

        self.save(session).await?;
        self.arm_side(session, side, now);
        Ok(())
    }

    /// Close one side of a global session with its current board. A side that
    /// never moved gets its fallback move first.
    fn close_side(
        &mut self,
        session: &mut GameSession,
        side: Role,
        now: DateTime<Utc>,
    ) -> SessionResult<()> {
        if session.side_start(side).is_none() || session.side_end(side).is_some() {
            return Ok(());
        }

        let fallback = session
            .board_for(side)
            .filter(|board| board.move_count() == 0)
            .and_then(|board| {
                board.fallback_move(side, session.board_for(side.other()), &mut self.rng)
            });
        if let Some(mv) = fallback {
            if let Some(board) = session.board_for_mut(side) {
                board.apply(side, &mv)?;
            }
            log::info!("Session {}: auto-move {} for {}", self.id, mv, side);
            self.ctx.notifier.auto_move(session, side, &mv);
        }

        session.set_side_end(side, now);
        self.ctx.notifier.side_finished(session, side);
        Ok(())
    }

    // Timers

    async fn handle_timer(&mut self, task: SessionTask) -> SessionResult<()> {
        if matches!(
            task,
            SessionTask::HintDue { .. } | SessionTask::SideCheck { .. }
        ) {
            self.armed.remove(&task);
        }

        let mut session = match self.load().await {
            Ok(session) if session.status.is_terminal() => return Ok(()),
            Ok(session) => session,
            Err(SessionError::NotFound(_)) => {
                log::debug!("Session {}: {:?} fired for a deleted session", self.id, task);
                return Ok(());
            }
            Err(err) => return Err(err),
        };
        let now = self.now();

        match task {
            SessionTask::CountdownElapsed => self.on_countdown(&mut session, now).await,
            SessionTask::HintDue { side } => self.on_hint_due(&mut session, side, now).await,
            SessionTask::TurnWarning { move_count } => {
                self.on_turn_warning(&session, move_count, now);
                Ok(())
            }
            SessionTask::TurnDeadline { move_count } => {
                self.on_turn_deadline(&mut session, move_count, now).await
            }
            SessionTask::DurationCheck => self.on_duration_check(&mut session, now).await,
            SessionTask::SideCheck { side } => self.on_side_check(&mut session, side, now).await,
            SessionTask::JoinTimeout => self.on_join_timeout(&mut session, now).await,
        }
    }

    async fn on_countdown(
        &mut self,
        session: &mut GameSession,
        now: DateTime<Utc>,
    ) -> SessionResult<()> {
        if session.status != SessionStatus::CountdownToStart {
            return Ok(());
        }
        if let Some(ends_at) = session.countdown_ends_at
            && now < ends_at
        {
            self.schedule(SessionTask::CountdownElapsed, until(now, ends_at));
            return Ok(());
        }

        let game_type = session
            .game_type
            .ok_or(SessionError::TypeNotSelected(self.id))?;
        let setup = self
            .ctx
            .board_setup(session.difficulty, BoardMode::HeadToHead);
        let board = match Board::new(game_type, &setup, self.ctx.catalog.as_ref(), &mut self.rng)
        {
            Ok(board) => board,
            Err(err) => {
                log::error!("Session {}: cannot lay out board: {}", self.id, err);
                self.force_end(session).await?;
                return Err(err.into());
            }
        };

        session.board = Some(board);
        session.status = SessionStatus::InProgress;
        session.started_at = Some(now);
        session.last_interaction_at = Some(now);
        session.last_hint_at = game_type.is_guess().then_some(now);
        self.save(session).await?;

        log::info!("Session {}: {} started", self.id, game_type);
        self.ctx.notifier.session_started(session);
        if let Some(board) = session.board.as_ref()
            && board.as_turn().is_some()
        {
            self.ctx.notifier.turn_changed(session, board.current_turn());
        }
        self.arm_in_progress(session, now);
        Ok(())
    }

    async fn on_hint_due(
        &mut self,
        session: &mut GameSession,
        side: Role,
        now: DateTime<Utc>,
    ) -> SessionResult<()> {
        if session.status != SessionStatus::InProgress {
            return Ok(());
        }

        if self.catch_up_side(session, side, CatchUpTrigger::Timer, now) {
            self.save(session).await?;
        }
        self.arm_hint(session, side, now);
        Ok(())
    }

    fn on_turn_warning(&self, session: &GameSession, move_count: u32, now: DateTime<Utc>) {
        let Some(board) = self.pending_turn_board(session, move_count) else {
            return;
        };

        let deadline = turn_deadline(session, &self.ctx.config, now);
        for role in board.awaiting() {
            self.ctx
                .notifier
                .turn_warning(session, role, until(now, deadline));
        }
    }

    async fn on_turn_deadline(
        &mut self,
        session: &mut GameSession,
        move_count: u32,
        now: DateTime<Utc>,
    ) -> SessionResult<()> {
        let Some(board) = self.pending_turn_board(session, move_count) else {
            return Ok(());
        };

        let deadline = turn_deadline(session, &self.ctx.config, now);
        if now < deadline {
            self.schedule(SessionTask::TurnDeadline { move_count }, until(now, deadline));
            return Ok(());
        }

        // Only the players idle at the deadline get a move, in seat order, so
        // a later fallback can see an earlier injected choice.
        let idle = board.awaiting();
        let mut injected = Vec::with_capacity(idle.len());
        for role in idle {
            let Some(mv) = session
                .board
                .as_ref()
                .and_then(|board| board.fallback_move(role, None, &mut self.rng))
            else {
                continue;
            };
            if let Some(board) = session.board.as_mut() {
                board.apply(role, &mv)?;
            }
            injected.push((role, mv));
        }

        if injected.is_empty() {
            return Ok(());
        }

        session.last_interaction_at = Some(now);
        for (role, mv) in &injected {
            log::info!("Session {}: auto-move {} for idle {}", self.id, mv, role);
            self.ctx.notifier.auto_move(session, *role, mv);
        }
        self.advance_head_to_head(session, now).await
    }

    /// Shared turn-based board still waiting at `move_count`.
    fn pending_turn_board<'a>(
        &self,
        session: &'a GameSession,
        move_count: u32,
    ) -> Option<&'a Board> {
        if session.status != SessionStatus::InProgress || session.is_global {
            return None;
        }
        session.board.as_ref().filter(|board| {
            board.as_turn().is_some() && board.move_count() == move_count && !board.is_finished()
        })
    }

    async fn on_duration_check(
        &mut self,
        session: &mut GameSession,
        now: DateTime<Utc>,
    ) -> SessionResult<()> {
        if session.status != SessionStatus::InProgress || session.is_global {
            return Ok(());
        }
        let Some(started_at) = session.started_at else {
            return Ok(());
        };

        let deadline = after(started_at, self.ctx.config.guess_max_duration_secs);
        if now < deadline {
            self.schedule(SessionTask::DurationCheck, until(now, deadline));
            return Ok(());
        }

        log::info!("Session {} hit its duration ceiling", self.id);
        self.catch_up_all(session, CatchUpTrigger::Timer, now);
        self.finish(session, Outcome::Draw).await
    }

    async fn on_side_check(
        &mut self,
        session: &mut GameSession,
        side: Role,
        now: DateTime<Utc>,
    ) -> SessionResult<()> {
        if session.status != SessionStatus::InProgress || !session.is_global {
            return Ok(());
        }
        let Some(deadline) = side_deadline(session, side, &self.ctx.config) else {
            return Ok(());
        };

        if now < deadline {
            self.arm_once(SessionTask::SideCheck { side }, until(now, deadline));
            return Ok(());
        }

        log::info!("Session {}: {} side timed out", self.id, side);
        self.close_side(session, side, now)?;

        if let Some(outcome) = self.decided_outcome(session, now)? {
            return self.finish(session, outcome).await;
        }
        self.save(session).await
    }

    async fn on_join_timeout(
        &mut self,
        session: &mut GameSession,
        now: DateTime<Utc>,
    ) -> SessionResult<()> {
        if !session.is_open_global() {
            return Ok(());
        }
        let Some(started_at) = session.started_at else {
            return Ok(());
        };

        let deadline = after(started_at, self.ctx.config.global_join_timeout_secs);
        if now < deadline {
            self.schedule(SessionTask::JoinTimeout, until(now, deadline));
            return Ok(());
        }

        log::info!("Session {}: nobody joined, ending with refund", self.id);
        self.force_end(session).await.map(|_| ())
    }

    // Arming

    /// Arm every timer an in-progress session needs, from its timestamps.
    fn arm_in_progress(&mut self, session: &GameSession, now: DateTime<Utc>) {
        if session.is_global {
            for side in Role::BOTH {
                self.arm_side(session, side, now);
            }
            if session.opponent.is_none()
                && let Some(started_at) = session.started_at
            {
                let deadline = after(started_at, self.ctx.config.global_join_timeout_secs);
                self.schedule(SessionTask::JoinTimeout, until(now, deadline));
            }
            return;
        }

        let Some(board) = session.board.as_ref() else {
            return;
        };
        if board.as_turn().is_some() {
            self.arm_turn_timers(session, now);
            return;
        }

        self.arm_hint(session, Role::Challenger, now);
        if let Some(started_at) = session.started_at {
            let deadline = after(started_at, self.ctx.config.guess_max_duration_secs);
            self.schedule(SessionTask::DurationCheck, until(now, deadline));
        }
    }

    fn arm_turn_timers(&self, session: &GameSession, now: DateTime<Utc>) {
        let Some(board) = session.board.as_ref() else {
            return;
        };
        if board.is_finished() {
            return;
        }

        let move_count = board.move_count();
        let remaining = until(now, turn_deadline(session, &self.ctx.config, now));
        let warning = Duration::from_secs(self.ctx.config.turn_warning_secs);
        if !warning.is_zero() {
            self.schedule(
                SessionTask::TurnWarning { move_count },
                remaining.saturating_sub(warning),
            );
        }
        self.schedule(SessionTask::TurnDeadline { move_count }, remaining);
    }

    fn arm_hint(&mut self, session: &GameSession, side: Role, now: DateTime<Utc>) {
        let Some(board) = session.board_for(side) else {
            return;
        };
        let Some(guess) = board.as_guess() else {
            return;
        };
        if !guess.has_more_reveals() || board.is_finished_for(side) {
            return;
        }
        let Some(last_hint) = session.last_hint_for(side) else {
            return;
        };

        let step = catch_up(now - last_hint, self.ctx.config.hint_interval());
        self.arm_once(SessionTask::HintDue { side }, step.rearm_in);
    }

    /// Hint cadence plus inactivity and duration ceilings of a live global side.
    fn arm_side(&mut self, session: &GameSession, side: Role, now: DateTime<Utc>) {
        if session.side_end(side).is_some() {
            return;
        }
        let Some(deadline) = side_deadline(session, side, &self.ctx.config) else {
            return;
        };

        self.arm_hint(session, side, now);
        self.arm_once(SessionTask::SideCheck { side }, until(now, deadline));
    }

    // Hint catch-up

    fn catch_up_all(
        &mut self,
        session: &mut GameSession,
        trigger: CatchUpTrigger,
        now: DateTime<Utc>,
    ) -> bool {
        if !session.game_type.is_some_and(|kind| kind.is_guess()) {
            return false;
        }

        let mut changed = false;
        for side in session.hint_sides() {
            changed |= self.catch_up_side(session, side, trigger, now);
        }
        changed
    }

    /// Apply every reveal owed to `side` since its last hint and advance the
    /// hint timestamp by whole intervals. Returns whether anything changed.
    fn catch_up_side(
        &mut self,
        session: &mut GameSession,
        side: Role,
        trigger: CatchUpTrigger,
        now: DateTime<Utc>,
    ) -> bool {
        if session.is_global
            && (session.side_start(side).is_none() || session.side_end(side).is_some())
        {
            return false;
        }
        let Some(last_hint) = session.last_hint_for(side) else {
            return false;
        };

        let interval = self.ctx.config.hint_interval();
        let step = catch_up(now - last_hint, interval);
        if step.reveals_due == 0 {
            return false;
        }

        let mut applied = 0;
        let mut reveals = 0;
        if let Some(board) = session.board_for_mut(side) {
            while applied < step.reveals_due && board.reveal_next() {
                applied += 1;
            }
            reveals = board.reveal_count();
        }

        let next_hint = TimeDelta::from_std(interval.saturating_mul(step.reveals_due))
            .ok()
            .and_then(|advance| last_hint.checked_add_signed(advance))
            .unwrap_or(now);
        session.set_last_hint(side, next_hint);

        let caught_up = match trigger {
            CatchUpTrigger::Timer => applied > 1,
            CatchUpTrigger::Interaction | CatchUpTrigger::Resume => applied > 0,
        };
        if caught_up {
            session.hint_restart_count += 1;
            log::debug!(
                "Session {}: caught up {} reveal(s) for {} on {:?}",
                self.id,
                applied,
                side,
                trigger
            );
        }
        if applied > 0 {
            self.ctx.notifier.hint_issued(session, side, reveals);
        }
        true
    }
}

fn both_sides_done(session: &GameSession) -> bool {
    session.opponent.is_some()
        && session.side_end(Role::Challenger).is_some()
        && session.side_end(Role::Opponent).is_some()
}

fn global_outcome(session: &GameSession, now: DateTime<Utc>) -> SessionResult<Outcome> {
    let (Some(challenger), Some(opponent)) = (
        session.board_for(Role::Challenger),
        session.board_for(Role::Opponent),
    ) else {
        return Err(SessionError::InvalidState {
            status: session.status,
        });
    };

    Ok(Board::compare_global(
        challenger,
        opponent,
        session.side_elapsed(Role::Challenger, now),
        session.side_elapsed(Role::Opponent, now),
    )?)
}

fn turn_deadline(
    session: &GameSession,
    config: &SessionConfig,
    now: DateTime<Utc>,
) -> DateTime<Utc> {
    after(
        session.last_interaction_at.unwrap_or(now),
        config.turn_timeout_secs,
    )
}

/// Earlier of the inactivity and total-duration ceilings of a started side.
fn side_deadline(
    session: &GameSession,
    side: Role,
    config: &SessionConfig,
) -> Option<DateTime<Utc>> {
    if session.side_end(side).is_some() {
        return None;
    }
    let started_at = session.side_start(side)?;
    let last_active = session.last_interaction_for(side).unwrap_or(started_at);

    Some(
        after(last_active, config.global_inactivity_secs)
            .min(after(started_at, config.global_max_duration_secs)),
    )
}

fn after(at: DateTime<Utc>, secs: u64) -> DateTime<Utc> {
    i64::try_from(secs)
        .ok()
        .and_then(TimeDelta::try_seconds)
        .and_then(|delta| at.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn until(now: DateTime<Utc>, at: DateTime<Utc>) -> Duration {
    (at - now).to_std().unwrap_or(Duration::ZERO)
}
