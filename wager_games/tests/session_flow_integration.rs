//! Head-to-head session lifecycle tests.
//!
//! Every test runs the real manager and actors over the in-memory ledger and
//! repository, with a manual clock and a recording scheduler so timers are
//! fired by hand.

#![allow(clippy::unreadable_literal)]

mod common;

use common::*;
use std::time::Duration;
use wager_games::{
    GameError, GameType, Move, Outcome, Role, SessionError, SessionStatus,
    game::{Board, RpsChoice},
    session::{SessionConfig, SessionEvent, SessionTask},
};

#[tokio::test]
async fn test_rock_rock_draw_restores_balances() {
    let h = Harness::new(config());
    let wager = 5_000_000;

    let session = h
        .manager
        .create_session(CHALLENGER, wager, Some(OPPONENT), None)
        .await
        .unwrap();
    assert_eq!(h.spendable(CHALLENGER).await, START_BALANCE - wager);
    assert_eq!(h.pending(CHALLENGER).await, wager);

    h.manager
        .select_type(session.id, CHALLENGER, GameType::RockPaperScissors)
        .await
        .unwrap();
    let accepted = h.manager.respond(session.id, OPPONENT, true).await.unwrap();
    assert_eq!(accepted.unwrap().status, SessionStatus::CountdownToStart);
    assert_eq!(h.pending(OPPONENT).await, wager);

    h.clock.advance_secs(5);
    h.manager
        .dispatch(session.id, SessionTask::CountdownElapsed)
        .await
        .unwrap();
    assert_eq!(h.session(session.id).await.status, SessionStatus::InProgress);

    let first = h
        .manager
        .submit_move(session.id, CHALLENGER, Move::Rps(RpsChoice::Rock))
        .await
        .unwrap();
    assert_eq!(first.status, SessionStatus::InProgress);
    assert_eq!(first.outcome, None);

    let second = h
        .manager
        .submit_move(session.id, OPPONENT, Move::Rps(RpsChoice::Rock))
        .await
        .unwrap();
    assert_eq!(second.status, SessionStatus::Draw);
    assert_eq!(second.outcome, Some(Outcome::Draw));

    for user in [CHALLENGER, OPPONENT] {
        assert_eq!(h.spendable(user).await, START_BALANCE);
        assert_eq!(h.pending(user).await, 0);
    }
    assert_eq!(h.ledger.total_money(), 3 * START_BALANCE);
}

#[tokio::test]
async fn test_winner_collects_both_stakes() {
    let h = Harness::new(config());
    let id = h.start_head_to_head(1_000, GameType::RockPaperScissors).await;

    h.manager
        .submit_move(id, CHALLENGER, Move::Rps(RpsChoice::Paper))
        .await
        .unwrap();
    let result = h
        .manager
        .submit_move(id, OPPONENT, Move::Rps(RpsChoice::Rock))
        .await
        .unwrap();

    assert_eq!(result.status, SessionStatus::Won);
    assert_eq!(h.spendable(CHALLENGER).await, START_BALANCE + 1_000);
    assert_eq!(h.spendable(OPPONENT).await, START_BALANCE - 1_000);
    assert_eq!(h.pending(OPPONENT).await, 0);

    let session = h.session(id).await;
    assert!(!session.challenger_escrowed && !session.opponent_escrowed);
}

#[tokio::test]
async fn test_second_commit_is_rejected_without_side_effects() {
    let h = Harness::new(config());
    let id = h.start_head_to_head(100, GameType::RockPaperScissors).await;

    h.manager
        .submit_move(id, CHALLENGER, Move::Rps(RpsChoice::Paper))
        .await
        .unwrap();
    let before = h.session(id).await;

    let err = h
        .manager
        .submit_move(id, CHALLENGER, Move::Rps(RpsChoice::Rock))
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Game(GameError::AlreadyCommitted)));
    assert!(!err.is_fatal());
    assert_eq!(h.session(id).await, before);
}

#[tokio::test]
async fn test_roulette_ends_when_bullet_is_fired() {
    let h = Harness::new(config());
    let id = h.start_head_to_head(100, GameType::RussianRoulette).await;

    let Some(Board::RussianRoulette(board)) = h.session(id).await.board else {
        panic!("expected a roulette board");
    };
    let safe: Vec<usize> = board
        .unfired_cells()
        .into_iter()
        .filter(|cell| *cell != board.bullet)
        .collect();

    let err = h
        .manager
        .submit_move(id, OPPONENT, Move::Fire { cell: safe[0] })
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Game(GameError::NotYourTurn)));

    let err = h
        .manager
        .submit_move(id, CHALLENGER, Move::Fire { cell: 4 })
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::Game(GameError::CenterCell)));

    h.manager
        .submit_move(id, CHALLENGER, Move::Fire { cell: safe[0] })
        .await
        .unwrap();
    let err = h
        .manager
        .submit_move(id, OPPONENT, Move::Fire { cell: safe[0] })
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::Game(GameError::CellAlreadyFired(_))
    ));

    let result = h
        .manager
        .submit_move(id, OPPONENT, Move::Fire { cell: board.bullet })
        .await
        .unwrap();
    assert_eq!(result.outcome, Some(Outcome::ChallengerWon));
    assert_eq!(result.status, SessionStatus::Won);
    assert_eq!(h.spendable(CHALLENGER).await, START_BALANCE + 100);
}

#[tokio::test]
async fn test_roulette_last_safe_cell_loses_for_player_on_turn() {
    let h = Harness::new(config());
    let id = h.start_head_to_head(100, GameType::RussianRoulette).await;

    let Some(Board::RussianRoulette(board)) = h.session(id).await.board else {
        panic!("expected a roulette board");
    };
    let safe: Vec<usize> = board
        .unfired_cells()
        .into_iter()
        .filter(|cell| *cell != board.bullet)
        .collect();
    assert_eq!(safe.len(), 7);

    let mut last = None;
    for (turn, cell) in safe.iter().enumerate() {
        let user = if turn % 2 == 0 { CHALLENGER } else { OPPONENT };
        last = Some(
            h.manager
                .submit_move(id, user, Move::Fire { cell: *cell })
                .await
                .unwrap(),
        );
    }

    // Seven safe fires leave only the bullet; the opponent is on turn.
    let last = last.unwrap();
    assert_eq!(last.outcome, Some(Outcome::ChallengerWon));
}

#[tokio::test]
async fn test_both_idle_players_still_get_a_decisive_result() {
    let mut h = Harness::new(config());
    let id = h.start_head_to_head(1_000, GameType::RockPaperScissors).await;
    h.drain_events();

    h.clock.advance_secs(60);
    h.manager
        .dispatch(id, SessionTask::TurnDeadline { move_count: 0 })
        .await
        .unwrap();

    let session = h.session(id).await;
    assert_eq!(session.status, SessionStatus::Won);
    assert_eq!(session.outcome, Some(Outcome::ChallengerWon));
    assert_eq!(h.spendable(CHALLENGER).await, START_BALANCE + 1_000);

    let auto_moves: Vec<Role> = h
        .drain_events()
        .into_iter()
        .filter_map(|event| match event {
            SessionEvent::AutoMove { role, .. } => Some(role),
            _ => None,
        })
        .collect();
    assert_eq!(auto_moves, vec![Role::Challenger, Role::Opponent]);
}

#[tokio::test]
async fn test_idle_player_gets_the_losing_choice() {
    let h = Harness::new(config());
    let id = h.start_head_to_head(1_000, GameType::RockPaperScissors).await;

    h.clock.advance_secs(10);
    h.manager
        .submit_move(id, CHALLENGER, Move::Rps(RpsChoice::Scissors))
        .await
        .unwrap();
    assert_eq!(
        h.armed(SessionTask::TurnDeadline { move_count: 1 }),
        Some(Duration::from_secs(60))
    );

    // The deadline armed before the move is stale now.
    h.clock.advance_secs(50);
    h.manager
        .dispatch(id, SessionTask::TurnDeadline { move_count: 0 })
        .await
        .unwrap();
    assert_eq!(h.session(id).await.status, SessionStatus::InProgress);

    h.clock.advance_secs(10);
    h.manager
        .dispatch(id, SessionTask::TurnDeadline { move_count: 1 })
        .await
        .unwrap();

    let session = h.session(id).await;
    assert_eq!(
        session.board.unwrap().rps_choice(Role::Opponent),
        Some(RpsChoice::Paper)
    );
    assert_eq!(session.status, SessionStatus::Won);
}

#[tokio::test]
async fn test_early_deadline_rearms_for_the_remainder() {
    let h = Harness::new(config());
    let id = h.start_head_to_head(100, GameType::Standoff).await;

    h.clock.advance_secs(20);
    h.manager
        .dispatch(id, SessionTask::TurnDeadline { move_count: 0 })
        .await
        .unwrap();

    assert_eq!(h.session(id).await.status, SessionStatus::InProgress);
    assert_eq!(
        h.armed(SessionTask::TurnDeadline { move_count: 0 }),
        Some(Duration::from_secs(40))
    );
}

#[tokio::test]
async fn test_turn_warning_reaches_idle_players() {
    let mut h = Harness::new(config());
    let id = h.start_head_to_head(100, GameType::RockPaperScissors).await;
    h.manager
        .submit_move(id, OPPONENT, Move::Rps(RpsChoice::Rock))
        .await
        .unwrap();
    h.drain_events();

    h.clock.advance_secs(45);
    h.manager
        .dispatch(id, SessionTask::TurnWarning { move_count: 1 })
        .await
        .unwrap();

    let warnings: Vec<SessionEvent> = h
        .drain_events()
        .into_iter()
        .filter(|event| matches!(event, SessionEvent::TurnWarning { .. }))
        .collect();
    assert_eq!(
        warnings,
        vec![SessionEvent::TurnWarning {
            session_id: id,
            role: Role::Challenger,
            remaining: Duration::from_secs(15),
        }]
    );
}

#[tokio::test]
async fn test_standoff_always_draws() {
    let h = Harness::new(config());
    let id = h.start_head_to_head(250, GameType::Standoff).await;

    h.manager
        .submit_move(id, OPPONENT, Move::Ready)
        .await
        .unwrap();
    let result = h
        .manager
        .submit_move(id, CHALLENGER, Move::Ready)
        .await
        .unwrap();

    assert_eq!(result.status, SessionStatus::Draw);
    assert_eq!(h.spendable(CHALLENGER).await, START_BALANCE);
    assert_eq!(h.spendable(OPPONENT).await, START_BALANCE);
}

#[tokio::test]
async fn test_unsupported_move_is_fatal() {
    let h = Harness::new(config());
    let id = h.start_head_to_head(100, GameType::Standoff).await;

    let err = h
        .manager
        .submit_move(id, CHALLENGER, Move::Guess("zoro".to_string()))
        .await
        .unwrap_err();
    assert!(err.is_fatal());
    assert_eq!(err.client_message(), "Internal server error");
}

#[tokio::test]
async fn test_countdown_fired_early_rearms() {
    let h = Harness::new(config());
    let session = h
        .manager
        .create_session(CHALLENGER, 100, Some(OPPONENT), None)
        .await
        .unwrap();
    h.manager
        .select_type(session.id, CHALLENGER, GameType::Standoff)
        .await
        .unwrap();
    h.manager.respond(session.id, OPPONENT, true).await.unwrap();
    assert_eq!(
        h.armed(SessionTask::CountdownElapsed),
        Some(Duration::from_secs(5))
    );
    h.scheduler.take();

    h.clock.advance_secs(2);
    h.manager
        .dispatch(session.id, SessionTask::CountdownElapsed)
        .await
        .unwrap();

    assert_eq!(
        h.session(session.id).await.status,
        SessionStatus::CountdownToStart
    );
    assert_eq!(
        h.armed(SessionTask::CountdownElapsed),
        Some(Duration::from_secs(3))
    );

    let err = h
        .manager
        .submit_move(session.id, CHALLENGER, Move::Ready)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NotStarted(_)));
}

#[tokio::test]
async fn test_guess_session_first_solver_wins() {
    let h = Harness::new(config());
    let id = h.start_head_to_head(100, GameType::WhosWho).await;

    h.clock.advance_secs(30);
    h.manager
        .dispatch(id, SessionTask::HintDue { side: Role::Challenger })
        .await
        .unwrap();
    let session = h.session(id).await;
    assert_eq!(session.board.as_ref().unwrap().reveal_count(), 1);
    assert_eq!(session.hint_restart_count, 0);

    let answer = answer_of(session.board.as_ref());
    let wrong = h
        .manager
        .submit_move(id, CHALLENGER, Move::Guess("definitely wrong".to_string()))
        .await
        .unwrap();
    assert_eq!(wrong.correct, Some(false));

    let result = h
        .manager
        .submit_move(id, OPPONENT, Move::Guess(answer.to_lowercase()))
        .await
        .unwrap();
    assert_eq!(result.correct, Some(true));
    assert_eq!(result.status, SessionStatus::Lost);
    assert_eq!(h.spendable(OPPONENT).await, START_BALANCE + 100);
}

#[tokio::test]
async fn test_guess_session_draws_at_duration_ceiling() {
    let h = Harness::new(config());
    let id = h.start_head_to_head(100, GameType::Shambles).await;

    h.clock.advance_secs(599);
    h.manager
        .dispatch(id, SessionTask::DurationCheck)
        .await
        .unwrap();
    assert_eq!(h.session(id).await.status, SessionStatus::InProgress);

    h.clock.advance_secs(1);
    h.manager
        .dispatch(id, SessionTask::DurationCheck)
        .await
        .unwrap();
    assert_eq!(h.session(id).await.status, SessionStatus::Draw);
    assert_eq!(h.spendable(CHALLENGER).await, START_BALANCE);
}

#[tokio::test]
async fn test_cancel_refunds_and_deletes() {
    let h = Harness::new(config());
    let session = h
        .manager
        .create_session(CHALLENGER, 700, Some(OPPONENT), None)
        .await
        .unwrap();

    let err = h.manager.cancel(session.id, OPPONENT).await.unwrap_err();
    assert!(matches!(err, SessionError::NotParticipant { .. }));

    h.manager.cancel(session.id, CHALLENGER).await.unwrap();
    assert_eq!(h.spendable(CHALLENGER).await, START_BALANCE);
    assert_eq!(h.pending(CHALLENGER).await, 0);
    assert!(matches!(
        h.manager.get_session(session.id).await,
        Err(SessionError::NotFound(_))
    ));

    // Timers for a deleted session are no-ops.
    h.manager
        .dispatch(session.id, SessionTask::CountdownElapsed)
        .await
        .unwrap();
}

#[tokio::test]
async fn test_cancel_after_confirmation_is_rejected() {
    let h = Harness::new(config());
    let id = h.start_head_to_head(100, GameType::Standoff).await;

    let err = h.manager.cancel(id, CHALLENGER).await.unwrap_err();
    assert!(matches!(
        err,
        SessionError::InvalidState {
            status: SessionStatus::InProgress
        }
    ));
}

#[tokio::test]
async fn test_rejection_refunds_challenger() {
    let h = Harness::new(config());
    let session = h
        .manager
        .create_session(CHALLENGER, 300, Some(OPPONENT), Some(-100))
        .await
        .unwrap();

    let err = h
        .manager
        .respond(session.id, OPPONENT, true)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::TypeNotSelected(_)));

    h.manager
        .select_type(session.id, CHALLENGER, GameType::PunkRecords)
        .await
        .unwrap();
    let err = h
        .manager
        .respond(session.id, BYSTANDER, true)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::NotParticipant { .. }));

    let rejected = h.manager.respond(session.id, OPPONENT, false).await.unwrap();
    assert!(rejected.is_none());
    assert_eq!(h.spendable(CHALLENGER).await, START_BALANCE);
    assert_eq!(h.spendable(OPPONENT).await, START_BALANCE);
    assert!(h.repository.is_empty());
}

#[tokio::test]
async fn test_creation_validation() {
    let h = Harness::new(SessionConfig {
        min_wager: 50,
        ..config()
    });

    let err = h
        .manager
        .create_session(CHALLENGER, 0, Some(OPPONENT), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InvalidWager(0)));

    let err = h
        .manager
        .create_session(CHALLENGER, 49, Some(OPPONENT), None)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        SessionError::WagerBelowMinimum {
            wager: 49,
            minimum: 50
        }
    ));

    let err = h
        .manager
        .create_session(CHALLENGER, 100, Some(CHALLENGER), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::CannotChallengeSelf));

    let err = h
        .manager
        .create_session(CHALLENGER, START_BALANCE + 1, Some(OPPONENT), None)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InsufficientStake { .. }));
    assert!(h.repository.is_empty());
    assert_eq!(h.spendable(CHALLENGER).await, START_BALANCE);
}

#[tokio::test]
async fn test_opponent_without_funds_cannot_accept() {
    let h = Harness::new(config());
    let session = h
        .manager
        .create_session(OPPONENT, START_BALANCE, Some(CHALLENGER), None)
        .await
        .unwrap();
    h.manager
        .select_type(session.id, OPPONENT, GameType::Standoff)
        .await
        .unwrap();

    // Drain the invited user's wallet through a second challenge.
    h.manager
        .create_session(CHALLENGER, START_BALANCE, Some(BYSTANDER), None)
        .await
        .unwrap();

    let err = h
        .manager
        .respond(session.id, CHALLENGER, true)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::InsufficientStake { .. }));
    assert_eq!(
        h.session(session.id).await.status,
        SessionStatus::AwaitingOpponentConfirmation
    );
}

#[tokio::test]
async fn test_terminal_session_rejects_everything() {
    let h = Harness::new(config());
    let id = h.start_head_to_head(100, GameType::Standoff).await;
    h.manager.submit_move(id, CHALLENGER, Move::Ready).await.unwrap();
    h.manager.submit_move(id, OPPONENT, Move::Ready).await.unwrap();
    let finished = h.session(id).await;

    let err = h
        .manager
        .submit_move(id, CHALLENGER, Move::Ready)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::AlreadyFinished(_)));
    let err = h
        .manager
        .select_type(id, CHALLENGER, GameType::Standoff)
        .await
        .unwrap_err();
    assert!(matches!(err, SessionError::AlreadyFinished(_)));

    h.clock.advance_secs(3600);
    for task in [
        SessionTask::TurnDeadline { move_count: 2 },
        SessionTask::DurationCheck,
        SessionTask::CountdownElapsed,
    ] {
        h.manager.dispatch(id, task).await.unwrap();
    }
    assert_eq!(h.manager.force_end_all().await.unwrap(), 0);
    assert_eq!(h.session(id).await, finished);
}

#[tokio::test]
async fn test_force_end_sweep_is_idempotent() {
    let h = Harness::new(config());

    let waiting = h
        .manager
        .create_session(CHALLENGER, 100, Some(OPPONENT), None)
        .await
        .unwrap();
    let counting = h
        .manager
        .create_session(CHALLENGER, 200, Some(OPPONENT), None)
        .await
        .unwrap();
    h.manager
        .select_type(counting.id, CHALLENGER, GameType::WhosWho)
        .await
        .unwrap();
    h.manager.respond(counting.id, OPPONENT, true).await.unwrap();
    let playing = h.start_head_to_head(300, GameType::RussianRoulette).await;
    let global = h.publish_global(400, GameType::GuessOrLife).await;
    h.manager.join_global(global, BYSTANDER).await.unwrap();

    assert_eq!(h.pending(CHALLENGER).await, 1_000);
    assert_eq!(h.manager.force_end_all().await.unwrap(), 4);

    for id in [waiting.id, counting.id, playing, global] {
        let session = h.session(id).await;
        assert_eq!(session.status, SessionStatus::ForcedEnd);
        assert_eq!(session.escrowed_amount(), 0);
    }
    for user in [CHALLENGER, OPPONENT, BYSTANDER] {
        assert_eq!(h.spendable(user).await, START_BALANCE);
        assert_eq!(h.pending(user).await, 0);
    }

    assert_eq!(h.manager.force_end_all().await.unwrap(), 0);
    assert_eq!(h.ledger.total_money(), 3 * START_BALANCE);
}
