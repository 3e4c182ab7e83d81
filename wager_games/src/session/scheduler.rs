//! Delayed session tasks and the hint catch-up arithmetic.
//!
//! Timers never carry state of their own. A task only names the session and
//! what to re-check; when it fires, the session actor re-reads the persisted
//! session and acts only if the task still applies. Hint timing is rebuilt
//! from the persisted `last_hint_at` timestamps with [`catch_up`], so a host
//! restart loses nothing.

use chrono::TimeDelta;
use serde::{Deserialize, Serialize};
use std::{
    sync::{Mutex, PoisonError},
    time::Duration,
};
use tokio::sync::mpsc;

use super::models::SessionId;
use crate::game::Role;

/// What a delayed task re-checks when it fires
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "task", rename_all = "snake_case")]
pub enum SessionTask {
    /// Countdown to start elapsed
    CountdownElapsed,
    /// Next reveal of `side`'s guess board is due
    HintDue { side: Role },
    /// Warn idle players ahead of the turn deadline
    TurnWarning { move_count: u32 },
    /// Turn deadline; stale once the board's move count changed
    TurnDeadline { move_count: u32 },
    /// Head-to-head guess session hit its duration ceiling
    DurationCheck,
    /// Inactivity and total-duration ceilings of a global side
    SideCheck { side: Role },
    /// Open global challenge waited too long for an opponent
    JoinTimeout,
}

/// A task that is due now
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduledTask {
    pub session_id: SessionId,
    pub task: SessionTask,
}

/// A task together with the delay it was armed with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DelayedTask {
    pub session_id: SessionId,
    pub task: SessionTask,
    pub delay: Duration,
}

/// Arms fire-and-forget session tasks
pub trait TaskScheduler: Send + Sync {
    fn schedule(&self, session_id: SessionId, task: SessionTask, delay: Duration);
}

/// Sleeps on the tokio runtime and hands due tasks to a dispatcher channel
pub struct TokioScheduler {
    sender: mpsc::UnboundedSender<ScheduledTask>,
}

impl TokioScheduler {
    /// Create a scheduler and the receiving end the dispatcher drains
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ScheduledTask>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl TaskScheduler for TokioScheduler {
    fn schedule(&self, session_id: SessionId, task: SessionTask, delay: Duration) {
        let sender = self.sender.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if sender.send(ScheduledTask { session_id, task }).is_err() {
                log::debug!("Dispatcher gone, dropping {task:?} for session {session_id}");
            }
        });
    }
}

/// Keeps armed tasks in memory so tests can fire them by hand
#[derive(Debug, Default)]
pub struct RecordingScheduler {
    tasks: Mutex<Vec<DelayedTask>>,
}

impl RecordingScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remove and return every task armed so far
    pub fn take(&self) -> Vec<DelayedTask> {
        std::mem::take(&mut *self.tasks.lock().unwrap_or_else(PoisonError::into_inner))
    }

    /// Tasks armed so far, oldest first
    pub fn pending(&self) -> Vec<DelayedTask> {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl TaskScheduler for RecordingScheduler {
    fn schedule(&self, session_id: SessionId, task: SessionTask, delay: Duration) {
        self.tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(DelayedTask {
                session_id,
                task,
                delay,
            });
    }
}

/// Result of replaying missed hint intervals
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CatchUp {
    /// Whole intervals that elapsed, i.e. reveals owed
    pub reveals_due: u32,
    /// Time spent into the current interval
    pub remainder: Duration,
    /// Delay until the next reveal is due
    pub rearm_in: Duration,
}

/// Split the time since the last hint into owed reveals and the delay to the
/// next one. Negative elapsed time (clock skew) counts as zero.
pub fn catch_up(elapsed: TimeDelta, interval: Duration) -> CatchUp {
    let elapsed = elapsed.to_std().unwrap_or(Duration::ZERO);
    let interval_ms = interval.as_millis().max(1);
    let elapsed_ms = elapsed.as_millis();

    let reveals_due = u32::try_from(elapsed_ms / interval_ms).unwrap_or(u32::MAX);
    let remainder_ms = elapsed_ms % interval_ms;
    let rearm_ms = interval_ms - remainder_ms;

    CatchUp {
        reveals_due,
        remainder: millis(remainder_ms),
        rearm_in: millis(rearm_ms),
    }
}

fn millis(ms: u128) -> Duration {
    Duration::from_millis(u64::try_from(ms).unwrap_or(u64::MAX))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_catch_up_examples() {
        let interval = Duration::from_secs(30);

        let step = catch_up(TimeDelta::seconds(40), interval);
        assert_eq!(step.reveals_due, 1);
        assert_eq!(step.remainder, Duration::from_secs(10));
        assert_eq!(step.rearm_in, Duration::from_secs(20));

        let step = catch_up(TimeDelta::seconds(95), interval);
        assert_eq!(step.reveals_due, 3);
        assert_eq!(step.rearm_in, Duration::from_secs(25));

        let step = catch_up(TimeDelta::zero(), interval);
        assert_eq!(step.reveals_due, 0);
        assert_eq!(step.rearm_in, interval);
    }

    #[test]
    fn test_negative_elapsed_counts_as_zero() {
        let step = catch_up(TimeDelta::seconds(-5), Duration::from_secs(30));
        assert_eq!(step.reveals_due, 0);
        assert_eq!(step.rearm_in, Duration::from_secs(30));
    }

    #[test]
    fn test_recording_scheduler_keeps_order() {
        let scheduler = RecordingScheduler::new();
        scheduler.schedule(1, SessionTask::CountdownElapsed, Duration::from_secs(5));
        scheduler.schedule(1, SessionTask::JoinTimeout, Duration::from_secs(9));
        assert_eq!(scheduler.pending().len(), 2);

        let tasks = scheduler.take();
        assert_eq!(tasks[0].task, SessionTask::CountdownElapsed);
        assert_eq!(tasks[1].delay, Duration::from_secs(9));
        assert!(scheduler.pending().is_empty());
    }

    #[tokio::test]
    async fn test_tokio_scheduler_delivers_after_delay() {
        let (scheduler, mut due) = TokioScheduler::new();
        scheduler.schedule(3, SessionTask::DurationCheck, Duration::from_millis(10));
        let task = due.recv().await.unwrap();
        assert_eq!(
            task,
            ScheduledTask {
                session_id: 3,
                task: SessionTask::DurationCheck
            }
        );
    }

    proptest! {
        #[test]
        fn test_catch_up_partitions_elapsed(elapsed_ms in 0i64..10_000_000, interval_ms in 1u64..600_000) {
            let interval = Duration::from_millis(interval_ms);
            let step = catch_up(TimeDelta::milliseconds(elapsed_ms), interval);

            let rebuilt = interval * step.reveals_due + step.remainder;
            prop_assert_eq!(rebuilt, Duration::from_millis(elapsed_ms as u64));
            prop_assert!(step.remainder < interval);
            prop_assert_eq!(step.remainder + step.rearm_in, interval);
        }
    }
}
