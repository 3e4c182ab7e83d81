//! Session manager for spawning and routing to session actors.

use std::{collections::HashMap, sync::Arc};
use tokio::sync::{RwLock, mpsc, oneshot};
use uuid::Uuid;

use super::{
    actor::{SessionActor, SessionContext, SessionHandle},
    errors::{SessionError, SessionResult},
    messages::{MoveOutcome, SessionMessage},
    models::{GameSession, SessionId, UserId},
    scheduler::{ScheduledTask, SessionTask},
};
use crate::game::{Difficulty, GameType, Move};

/// Entry point of the session engine.
///
/// Session creation runs here directly; everything that touches an existing
/// session is routed to that session's actor, which is spawned on demand.
pub struct SessionManager {
    ctx: SessionContext,

    /// Live actor handles
    actors: Arc<RwLock<HashMap<SessionId, SessionHandle>>>,
}

impl SessionManager {
    /// Create a new session manager
    ///
    /// # Arguments
    ///
    /// * `ctx` - Ports and configuration shared with every actor
    ///
    /// # Returns
    ///
    /// * `SessionResult<SessionManager>` - Manager, or `InvalidConfig`
    pub fn new(ctx: SessionContext) -> SessionResult<Self> {
        ctx.config.validate().map_err(SessionError::InvalidConfig)?;

        Ok(Self {
            ctx,
            actors: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    /// Create a session and reserve the challenger's stake
    ///
    /// # Arguments
    ///
    /// * `challenger` - User issuing the challenge
    /// * `wager` - Stake each side puts up
    /// * `opponent` - Invited opponent, or `None` for a global challenge
    /// * `group_id` - Chat group the challenge was issued in
    ///
    /// # Returns
    ///
    /// * `SessionResult<GameSession>` - The stored session, awaiting type selection
    pub async fn create_session(
        &self,
        challenger: UserId,
        wager: i64,
        opponent: Option<UserId>,
        group_id: Option<i64>,
    ) -> SessionResult<GameSession> {
        let config = &self.ctx.config;
        if wager <= 0 {
            return Err(SessionError::InvalidWager(wager));
        }
        if wager < config.min_wager {
            return Err(SessionError::WagerBelowMinimum {
                wager,
                minimum: config.min_wager,
            });
        }
        if opponent == Some(challenger) {
            return Err(SessionError::CannotChallengeSelf);
        }

        let difficulty = Difficulty::from_wager(wager, &config.difficulty_thresholds);
        let mut session = GameSession::new(
            challenger,
            opponent,
            wager,
            group_id,
            difficulty,
            self.ctx.clock.now(),
        );

        // The id is unknown until insert, so the reservation gets its own key.
        let key = format!("create:{}:{}", challenger, Uuid::new_v4());
        self.ctx
            .ledger
            .reserve(challenger, wager, &key)
            .await
            .map_err(SessionError::from_reserve)?;

        match self.ctx.repository.insert(&session).await {
            Ok(id) => session.id = id,
            Err(err) => {
                let rollback = format!("{key}:rollback");
                if let Err(release_err) =
                    self.ctx.ledger.release(challenger, wager, &rollback).await
                {
                    log::error!(
                        "Failed to roll back stake of {} after insert failure: {}",
                        challenger,
                        release_err
                    );
                }
                return Err(err.into());
            }
        }

        log::info!(
            "Created session {} ({} vs {:?}, wager {}, {})",
            session.id,
            challenger,
            opponent,
            wager,
            difficulty
        );
        Ok(session)
    }

    /// Challenger picks the game type
    pub async fn select_type(
        &self,
        session_id: SessionId,
        user_id: UserId,
        game_type: GameType,
    ) -> SessionResult<GameSession> {
        self.call(session_id, |response| SessionMessage::SelectType {
            user_id,
            game_type,
            response,
        })
        .await
    }

    /// Accept or reject a challenge.
    ///
    /// For head-to-head sessions the opponent responds; accepting reserves
    /// their stake and starts the countdown. For global sessions the
    /// challenger responds; accepting publishes the open challenge.
    /// Rejecting deletes the session and refunds the challenger, returning
    /// `None`.
    pub async fn respond(
        &self,
        session_id: SessionId,
        user_id: UserId,
        accept: bool,
    ) -> SessionResult<Option<GameSession>> {
        self.call(session_id, |response| SessionMessage::Respond {
            user_id,
            accept,
            response,
        })
        .await
    }

    /// Challenger withdraws a session that was not confirmed yet
    pub async fn cancel(&self, session_id: SessionId, user_id: UserId) -> SessionResult<()> {
        self.call(session_id, |response| SessionMessage::Cancel {
            user_id,
            response,
        })
        .await
    }

    /// Submit a move or guess
    pub async fn submit_move(
        &self,
        session_id: SessionId,
        user_id: UserId,
        mv: Move,
    ) -> SessionResult<MoveOutcome> {
        self.call(session_id, |response| SessionMessage::SubmitMove {
            user_id,
            mv: mv.clone(),
            response,
        })
        .await
    }

    /// Take the open seat of a global challenge
    pub async fn join_global(
        &self,
        session_id: SessionId,
        user_id: UserId,
    ) -> SessionResult<GameSession> {
        self.call(session_id, |response| SessionMessage::JoinGlobal {
            user_id,
            response,
        })
        .await
    }

    /// Load a session as last persisted
    pub async fn get_session(&self, session_id: SessionId) -> SessionResult<GameSession> {
        self.ctx
            .repository
            .get(session_id)
            .await?
            .ok_or(SessionError::NotFound(session_id))
    }

    /// Non-terminal sessions as last persisted
    pub async fn list_active(&self) -> SessionResult<Vec<GameSession>> {
        Ok(self.ctx.repository.list_active().await?)
    }

    /// Global challenges still waiting for an opponent, oldest first
    pub async fn list_open_global(&self) -> SessionResult<Vec<GameSession>> {
        Ok(self.ctx.repository.list_open_global().await?)
    }

    /// Re-arm the timers of every non-terminal session after a host restart
    ///
    /// # Returns
    ///
    /// * `SessionResult<usize>` - Number of sessions resumed
    pub async fn resume_active(&self) -> SessionResult<usize> {
        let sessions = self.ctx.repository.list_active().await?;
        let mut resumed = 0;

        for session in sessions {
            match self
                .call(session.id, |response| SessionMessage::Resume { response })
                .await
            {
                Ok(()) => resumed += 1,
                Err(err) => log::error!("Failed to resume session {}: {}", session.id, err),
            }
        }

        log::info!("Resumed {} active session(s)", resumed);
        Ok(resumed)
    }

    /// End every non-terminal session with a full refund. Running it again
    /// finds nothing left to end.
    ///
    /// # Returns
    ///
    /// * `SessionResult<usize>` - Number of sessions ended by this sweep
    pub async fn force_end_all(&self) -> SessionResult<usize> {
        let sessions = self.ctx.repository.list_active().await?;
        let mut ended = 0;

        for session in sessions {
            match self
                .call(session.id, |response| SessionMessage::ForceEnd { response })
                .await
            {
                Ok(true) => ended += 1,
                Ok(false) => {}
                Err(err) => log::error!("Failed to force-end session {}: {}", session.id, err),
            }
        }

        log::warn!("Force-end sweep ended {} session(s)", ended);
        Ok(ended)
    }

    /// Deliver a fired task to its session
    pub async fn dispatch(&self, session_id: SessionId, task: SessionTask) -> SessionResult<()> {
        self.call(session_id, |response| SessionMessage::Timer { task, response })
            .await
    }

    /// Drain due tasks from the scheduler until the channel closes
    pub async fn run_dispatcher(self: Arc<Self>, mut due: mpsc::UnboundedReceiver<ScheduledTask>) {
        log::info!("Task dispatcher started");

        while let Some(ScheduledTask { session_id, task }) = due.recv().await {
            let manager = Arc::clone(&self);
            tokio::spawn(async move {
                if let Err(err) = manager.dispatch(session_id, task).await {
                    log::warn!("Session {}: {:?} failed: {}", session_id, task, err);
                }
            });
        }

        log::info!("Task dispatcher stopped");
    }

    /// Number of session actors currently running
    pub async fn active_session_count(&self) -> usize {
        self.actors
            .read()
            .await
            .values()
            .filter(|handle| !handle.is_closed())
            .count()
    }

    /// Send a request to the session's actor and wait for the reply.
    ///
    /// An actor that closed between lookup and send is replaced once.
    async fn call<T, F>(&self, session_id: SessionId, build: F) -> SessionResult<T>
    where
        F: Fn(oneshot::Sender<SessionResult<T>>) -> SessionMessage,
    {
        for _ in 0..2 {
            let handle = self.handle_for(session_id).await;
            let (tx, rx) = oneshot::channel();

            if handle.send(build(tx)).await.is_err() {
                self.forget(&handle).await;
                continue;
            }

            return rx
                .await
                .map_err(|_| SessionError::ActorUnavailable(session_id))?;
        }

        Err(SessionError::ActorUnavailable(session_id))
    }

    /// Live handle for a session, spawning its actor when needed
    async fn handle_for(&self, session_id: SessionId) -> SessionHandle {
        let mut actors = self.actors.write().await;
        if let Some(handle) = actors.get(&session_id)
            && !handle.is_closed()
        {
            return handle.clone();
        }

        let (actor, handle) = SessionActor::new(session_id, self.ctx.clone());
        actors.insert(session_id, handle.clone());
        drop(actors);

        let registry = Arc::clone(&self.actors);
        tokio::spawn(async move {
            actor.run().await;

            // A replacement actor may already own the slot.
            let mut actors = registry.write().await;
            if actors
                .get(&session_id)
                .is_some_and(SessionHandle::is_closed)
            {
                actors.remove(&session_id);
            }
        });

        handle
    }

    async fn forget(&self, handle: &SessionHandle) {
        let mut actors = self.actors.write().await;
        if actors
            .get(&handle.session_id())
            .is_some_and(SessionHandle::is_closed)
        {
            actors.remove(&handle.session_id());
        }
    }
}
