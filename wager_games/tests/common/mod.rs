//! Shared harness for the session integration tests.
#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::sync::mpsc;
use wager_games::{
    db::{InMemorySessionRepository, SessionRepository, StorageError, StorageResult},
    game::{Board, SecretCatalog, StaticCatalog},
    session::{
        ChannelNotifier, GameSession, ManualClock, RecordingScheduler, SessionConfig,
        SessionContext, SessionEvent, SessionId, SessionManager, SessionTask, UserId,
    },
    wallet::{Balance, InMemoryLedger, Ledger, LedgerError, LedgerResult},
};

pub const CHALLENGER: UserId = 1;
pub const OPPONENT: UserId = 2;
pub const BYSTANDER: UserId = 3;
pub const START_BALANCE: i64 = 10_000_000;

pub fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
}

pub fn config() -> SessionConfig {
    SessionConfig {
        rng_seed: Some(7),
        ..SessionConfig::default()
    }
}

/// Failures to inject into the next storage and ledger calls.
#[derive(Default)]
pub struct Faults {
    saves: AtomicUsize,
    inserts: AtomicUsize,
    releases: Mutex<HashMap<UserId, usize>>,
}

impl Faults {
    pub fn fail_saves(&self, count: usize) {
        self.saves.store(count, Ordering::SeqCst);
    }

    pub fn fail_inserts(&self, count: usize) {
        self.inserts.store(count, Ordering::SeqCst);
    }

    pub fn fail_releases(&self, user_id: UserId, count: usize) {
        self.releases.lock().unwrap().insert(user_id, count);
    }

    fn take(counter: &AtomicUsize) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok()
    }

    fn take_release(&self, user_id: UserId) -> bool {
        let mut releases = self.releases.lock().unwrap();
        match releases.get_mut(&user_id) {
            Some(left) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        }
    }
}

/// Session storage that fails on demand.
pub struct FaultyRepository {
    inner: Arc<InMemorySessionRepository>,
    faults: Arc<Faults>,
}

#[async_trait]
impl SessionRepository for FaultyRepository {
    async fn insert(&self, session: &GameSession) -> StorageResult<SessionId> {
        if Faults::take(&self.faults.inserts) {
            return Err(StorageError::Timeout(Duration::from_secs(5)));
        }
        self.inner.insert(session).await
    }

    async fn get(&self, id: SessionId) -> StorageResult<Option<GameSession>> {
        self.inner.get(id).await
    }

    async fn save(&self, session: &mut GameSession) -> StorageResult<()> {
        if Faults::take(&self.faults.saves) {
            return Err(StorageError::Timeout(Duration::from_secs(5)));
        }
        self.inner.save(session).await
    }

    async fn delete(&self, id: SessionId) -> StorageResult<bool> {
        self.inner.delete(id).await
    }

    async fn list_active(&self) -> StorageResult<Vec<GameSession>> {
        self.inner.list_active().await
    }

    async fn list_open_global(&self) -> StorageResult<Vec<GameSession>> {
        self.inner.list_open_global().await
    }
}

/// Ledger whose releases fail on demand.
pub struct FaultyLedger {
    inner: Arc<InMemoryLedger>,
    faults: Arc<Faults>,
}

#[async_trait]
impl Ledger for FaultyLedger {
    async fn reserve(&self, user_id: UserId, amount: i64, key: &str) -> LedgerResult<Balance> {
        self.inner.reserve(user_id, amount, key).await
    }

    async fn release(&self, user_id: UserId, amount: i64, key: &str) -> LedgerResult<Balance> {
        if self.faults.take_release(user_id) {
            return Err(LedgerError::Database(sqlx::Error::PoolTimedOut));
        }
        self.inner.release(user_id, amount, key).await
    }

    async fn settle(
        &self,
        winner: UserId,
        loser: UserId,
        amount: i64,
        taxable: bool,
        key: &str,
    ) -> LedgerResult<()> {
        self.inner.settle(winner, loser, amount, taxable, key).await
    }

    async fn balance(&self, user_id: UserId) -> LedgerResult<Balance> {
        self.inner.balance(user_id).await
    }
}

pub struct Harness {
    pub manager: SessionManager,
    pub ledger: Arc<InMemoryLedger>,
    pub repository: Arc<InMemorySessionRepository>,
    pub scheduler: Arc<RecordingScheduler>,
    pub clock: Arc<ManualClock>,
    pub events: mpsc::Receiver<SessionEvent>,
    pub faults: Arc<Faults>,
}

impl Harness {
    pub fn new(config: SessionConfig) -> Self {
        Self::with_catalog(config, Arc::new(StaticCatalog::builtin()))
    }

    pub fn with_catalog(config: SessionConfig, catalog: Arc<dyn SecretCatalog>) -> Self {
        let ledger = Arc::new(
            InMemoryLedger::new()
                .with_wallet(CHALLENGER, START_BALANCE)
                .with_wallet(OPPONENT, START_BALANCE)
                .with_wallet(BYSTANDER, START_BALANCE),
        );
        let repository = Arc::new(InMemorySessionRepository::new());
        let clock = Arc::new(ManualClock::new(epoch()));
        Self::assemble(config, catalog, ledger, repository, clock)
    }

    /// A fresh manager over existing storage, as after a host restart.
    pub fn restarted(&self, config: SessionConfig, catalog: Arc<dyn SecretCatalog>) -> Self {
        Self::assemble(
            config,
            catalog,
            Arc::clone(&self.ledger),
            Arc::clone(&self.repository),
            Arc::clone(&self.clock),
        )
    }

    fn assemble(
        config: SessionConfig,
        catalog: Arc<dyn SecretCatalog>,
        ledger: Arc<InMemoryLedger>,
        repository: Arc<InMemorySessionRepository>,
        clock: Arc<ManualClock>,
    ) -> Self {
        let scheduler = Arc::new(RecordingScheduler::new());
        let (notifier, events) = ChannelNotifier::new(1024);
        let faults = Arc::new(Faults::default());

        let ctx = SessionContext {
            config: Arc::new(config),
            repository: Arc::new(FaultyRepository {
                inner: Arc::clone(&repository),
                faults: Arc::clone(&faults),
            }),
            ledger: Arc::new(FaultyLedger {
                inner: Arc::clone(&ledger),
                faults: Arc::clone(&faults),
            }),
            catalog,
            notifier: Arc::new(notifier),
            scheduler: scheduler.clone(),
            clock: clock.clone(),
        };

        Self {
            manager: SessionManager::new(ctx).unwrap(),
            ledger,
            repository,
            scheduler,
            clock,
            events,
            faults,
        }
    }

    pub async fn session(&self, id: SessionId) -> GameSession {
        self.manager.get_session(id).await.unwrap()
    }

    pub async fn spendable(&self, user_id: UserId) -> i64 {
        self.ledger.balance(user_id).await.unwrap().spendable
    }

    pub async fn pending(&self, user_id: UserId) -> i64 {
        self.ledger.balance(user_id).await.unwrap().pending
    }

    pub fn drain_events(&mut self) -> Vec<SessionEvent> {
        let mut events = Vec::new();
        while let Ok(event) = self.events.try_recv() {
            events.push(event);
        }
        events
    }

    /// Whether a task was armed since the last `take`, ignoring its delay.
    pub fn armed(&self, task: SessionTask) -> Option<std::time::Duration> {
        self.scheduler
            .pending()
            .into_iter()
            .rev()
            .find(|armed| armed.task == task)
            .map(|armed| armed.delay)
    }

    /// Create, select, accept, and start a head-to-head session.
    pub async fn start_head_to_head(
        &self,
        wager: i64,
        game_type: wager_games::GameType,
    ) -> SessionId {
        let session = self
            .manager
            .create_session(CHALLENGER, wager, Some(OPPONENT), None)
            .await
            .unwrap();
        self.manager
            .select_type(session.id, CHALLENGER, game_type)
            .await
            .unwrap();
        self.manager
            .respond(session.id, OPPONENT, true)
            .await
            .unwrap();

        self.clock.advance_secs(5);
        self.manager
            .dispatch(session.id, SessionTask::CountdownElapsed)
            .await
            .unwrap();
        self.scheduler.take();
        session.id
    }

    /// Create, select, and publish a global challenge.
    pub async fn publish_global(&self, wager: i64, game_type: wager_games::GameType) -> SessionId {
        let session = self
            .manager
            .create_session(CHALLENGER, wager, None, None)
            .await
            .unwrap();
        self.manager
            .select_type(session.id, CHALLENGER, game_type)
            .await
            .unwrap();
        self.manager
            .respond(session.id, CHALLENGER, true)
            .await
            .unwrap();
        session.id
    }
}

pub fn answer_of(board: Option<&Board>) -> String {
    board
        .and_then(Board::as_guess)
        .map(|guess| guess.puzzle.answer().to_string())
        .unwrap()
}
