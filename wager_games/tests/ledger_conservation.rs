//! Money is never created or destroyed by a session, whatever its ending.

mod common;

use common::*;
use std::sync::Arc;
use wager_games::{
    GameType, Move, Outcome, SessionStatus,
    game::{RpsChoice, rps},
    session::SessionTask,
    wallet::{EntryKind, Ledger},
};

#[tokio::test]
async fn test_every_rps_pair_conserves_money() {
    let h = Harness::new(config());
    let wager = 2_500;

    for challenger in RpsChoice::ALL {
        for opponent in RpsChoice::ALL {
            let before_challenger = h.spendable(CHALLENGER).await;
            let before_opponent = h.spendable(OPPONENT).await;

            let id = h.start_head_to_head(wager, GameType::RockPaperScissors).await;
            h.manager
                .submit_move(id, CHALLENGER, Move::Rps(challenger))
                .await
                .unwrap();
            let result = h
                .manager
                .submit_move(id, OPPONENT, Move::Rps(opponent))
                .await
                .unwrap();

            let expected = rps::resolve(challenger, opponent);
            assert_eq!(result.outcome, Some(expected), "{challenger} vs {opponent}");

            let (challenger_delta, opponent_delta) = match expected {
                Outcome::ChallengerWon => (wager, -wager),
                Outcome::OpponentWon => (-wager, wager),
                _ => (0, 0),
            };
            assert_eq!(
                h.spendable(CHALLENGER).await,
                before_challenger + challenger_delta
            );
            assert_eq!(h.spendable(OPPONENT).await, before_opponent + opponent_delta);
            assert_eq!(h.pending(CHALLENGER).await, 0);
            assert_eq!(h.pending(OPPONENT).await, 0);
            assert_eq!(h.ledger.total_money(), 3 * START_BALANCE);
        }
    }

    // Three wins each way cancel out.
    assert_eq!(h.spendable(CHALLENGER).await, START_BALANCE);
    assert_eq!(h.spendable(OPPONENT).await, START_BALANCE);
}

#[tokio::test]
async fn test_settlement_key_is_spent_once() {
    let h = Harness::new(config());
    let id = h.start_head_to_head(800, GameType::RockPaperScissors).await;
    h.manager
        .submit_move(id, CHALLENGER, Move::Rps(RpsChoice::Rock))
        .await
        .unwrap();
    h.manager
        .submit_move(id, OPPONENT, Move::Rps(RpsChoice::Scissors))
        .await
        .unwrap();

    let replay = h
        .ledger
        .settle(CHALLENGER, OPPONENT, 800, false, &format!("session:{id}:settle"))
        .await
        .unwrap_err();
    assert!(replay.is_duplicate());

    let kinds: Vec<EntryKind> = h
        .ledger
        .entries(CHALLENGER)
        .into_iter()
        .map(|entry| entry.kind)
        .collect();
    assert_eq!(kinds, vec![EntryKind::Reserve, EntryKind::SettleWin]);
    assert_eq!(h.spendable(CHALLENGER).await, START_BALANCE + 800);
}

#[tokio::test]
async fn test_simultaneous_commits_settle_once() {
    let h = Arc::new(Harness::new(config()));
    let id = h.start_head_to_head(1_000, GameType::RockPaperScissors).await;

    let (first, second) = tokio::join!(
        h.manager
            .submit_move(id, CHALLENGER, Move::Rps(RpsChoice::Scissors)),
        h.manager.submit_move(id, OPPONENT, Move::Rps(RpsChoice::Paper)),
    );
    let first = first.unwrap();
    let second = second.unwrap();

    let finishing: Vec<_> = [first, second]
        .into_iter()
        .filter(|outcome| outcome.status.is_terminal())
        .collect();
    assert_eq!(finishing.len(), 1);
    assert_eq!(finishing[0].status, SessionStatus::Won);

    assert_eq!(h.spendable(CHALLENGER).await, START_BALANCE + 1_000);
    assert_eq!(h.spendable(OPPONENT).await, START_BALANCE - 1_000);
    assert_eq!(h.ledger.total_money(), 3 * START_BALANCE);
}

#[tokio::test]
async fn test_mixed_endings_conserve_money() {
    let h = Harness::new(config());

    // Decided
    let won = h.start_head_to_head(100, GameType::RockPaperScissors).await;
    h.manager
        .submit_move(won, OPPONENT, Move::Rps(RpsChoice::Rock))
        .await
        .unwrap();
    h.clock.advance_secs(60);
    h.manager
        .dispatch(won, SessionTask::TurnDeadline { move_count: 1 })
        .await
        .unwrap();
    assert_eq!(h.session(won).await.status, SessionStatus::Lost);

    // Withdrawn
    let withdrawn = h
        .manager
        .create_session(OPPONENT, 300, Some(BYSTANDER), None)
        .await
        .unwrap();
    h.manager.cancel(withdrawn.id, OPPONENT).await.unwrap();

    // Expired global challenge
    let expired = h.publish_global(700, GameType::Standoff).await;
    h.clock.advance_secs(86_400);
    h.manager
        .dispatch(expired, SessionTask::JoinTimeout)
        .await
        .unwrap();

    // Swept
    h.start_head_to_head(900, GameType::RussianRoulette).await;
    assert_eq!(h.manager.force_end_all().await.unwrap(), 1);

    for user in [CHALLENGER, OPPONENT, BYSTANDER] {
        assert_eq!(h.pending(user).await, 0, "user {user}");
    }
    assert_eq!(h.spendable(CHALLENGER).await, START_BALANCE - 100);
    assert_eq!(h.spendable(OPPONENT).await, START_BALANCE + 100);
    assert_eq!(h.ledger.total_money(), 3 * START_BALANCE);
}
