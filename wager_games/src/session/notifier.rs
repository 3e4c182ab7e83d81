//! Outbound session notifications.

use serde::Serialize;
use std::time::Duration;
use tokio::sync::mpsc;

use super::models::{GameSession, SessionId, SessionStatus};
use crate::game::{GameType, Move, Outcome, Role};

/// Something participants should hear about
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    Started {
        session_id: SessionId,
        game_type: Option<GameType>,
        is_global: bool,
    },
    /// `on_turn` is `None` when both sides act independently
    TurnChanged {
        session_id: SessionId,
        on_turn: Option<Role>,
    },
    TurnWarning {
        session_id: SessionId,
        role: Role,
        remaining: Duration,
    },
    HintIssued {
        session_id: SessionId,
        side: Role,
        reveals: u32,
    },
    AutoMove {
        session_id: SessionId,
        role: Role,
        mv: Move,
    },
    /// One side of a global session is done
    SideFinished {
        session_id: SessionId,
        side: Role,
    },
    /// `outcome` is `None` for forced ends
    Finished {
        session_id: SessionId,
        status: SessionStatus,
        outcome: Option<Outcome>,
    },
}

impl SessionEvent {
    pub fn session_id(&self) -> SessionId {
        match self {
            Self::Started { session_id, .. }
            | Self::TurnChanged { session_id, .. }
            | Self::TurnWarning { session_id, .. }
            | Self::HintIssued { session_id, .. }
            | Self::AutoMove { session_id, .. }
            | Self::SideFinished { session_id, .. }
            | Self::Finished { session_id, .. } => *session_id,
        }
    }
}

/// Outbound port the session engine reports through.
///
/// Implementors only provide [`Notifier::notify`]; the named helpers build
/// the matching [`SessionEvent`].
pub trait Notifier: Send + Sync {
    fn notify(&self, event: SessionEvent);

    fn session_started(&self, session: &GameSession) {
        self.notify(SessionEvent::Started {
            session_id: session.id,
            game_type: session.game_type,
            is_global: session.is_global,
        });
    }

    fn turn_changed(&self, session: &GameSession, on_turn: Option<Role>) {
        self.notify(SessionEvent::TurnChanged {
            session_id: session.id,
            on_turn,
        });
    }

    fn turn_warning(&self, session: &GameSession, role: Role, remaining: Duration) {
        self.notify(SessionEvent::TurnWarning {
            session_id: session.id,
            role,
            remaining,
        });
    }

    fn hint_issued(&self, session: &GameSession, side: Role, reveals: u32) {
        self.notify(SessionEvent::HintIssued {
            session_id: session.id,
            side,
            reveals,
        });
    }

    fn auto_move(&self, session: &GameSession, role: Role, mv: &Move) {
        self.notify(SessionEvent::AutoMove {
            session_id: session.id,
            role,
            mv: mv.clone(),
        });
    }

    fn side_finished(&self, session: &GameSession, side: Role) {
        self.notify(SessionEvent::SideFinished {
            session_id: session.id,
            side,
        });
    }

    fn session_finished(&self, session: &GameSession, outcome: Option<Outcome>) {
        self.notify(SessionEvent::Finished {
            session_id: session.id,
            status: session.status,
            outcome,
        });
    }
}

/// Forwards events into a bounded channel, dropping them when it is full
pub struct ChannelNotifier {
    sender: mpsc::Sender<SessionEvent>,
}

impl ChannelNotifier {
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<SessionEvent>) {
        let (sender, receiver) = mpsc::channel(capacity);
        (Self { sender }, receiver)
    }
}

impl Notifier for ChannelNotifier {
    fn notify(&self, event: SessionEvent) {
        match self.sender.try_send(event) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(event)) => {
                log::warn!(
                    "Notification channel full, dropping event for session {}",
                    event.session_id()
                );
            }
            Err(mpsc::error::TrySendError::Closed(event)) => {
                log::debug!(
                    "Notification channel closed, dropping event for session {}",
                    event.session_id()
                );
            }
        }
    }
}

/// Writes every event to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, event: SessionEvent) {
        log::info!("Session {}: {:?}", event.session_id(), event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::Difficulty;
    use chrono::Utc;

    #[tokio::test]
    async fn test_channel_notifier_forwards_events() {
        let (notifier, mut events) = ChannelNotifier::new(4);
        let mut session = GameSession::new(1, Some(2), 10, None, Difficulty::Easy, Utc::now());
        session.id = 9;

        notifier.turn_changed(&session, Some(Role::Opponent));
        let event = events.recv().await.unwrap();
        assert_eq!(
            event,
            SessionEvent::TurnChanged {
                session_id: 9,
                on_turn: Some(Role::Opponent)
            }
        );
    }

    #[test]
    fn test_full_channel_drops_silently() {
        let (notifier, _events) = ChannelNotifier::new(1);
        let session = GameSession::new(1, Some(2), 10, None, Difficulty::Easy, Utc::now());
        notifier.side_finished(&session, Role::Challenger);
        notifier.side_finished(&session, Role::Opponent);
    }
}
