//! End-to-end run protocol against the in-memory ledger.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeZone, Utc};
use uuid::Uuid;

use hashflow_core::{generator, Operation};
use hashflow_ledger::{
    ExclusivityMode, InMemoryLedger, LedgerCall, LedgerError, MockMinter, NftMinter, PlayerId,
};
use hashflow_session::{
    GameSession, RunConfig, RunCoordinator, RunError, RunOutcome, SessionConfig, DUPLICATE_NOTICE,
};

const REFERENCE_HASH: &str = "d8426315cda54b72f28d938fdd5b46f0caedbc5cfd30f49fb9d6e4db74df6e87";

fn now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 10, 9, 0, 0).unwrap()
}

fn session_with(ledger: Arc<InMemoryLedger>, player: PlayerId, config: SessionConfig) -> GameSession {
    GameSession::new(player, config, ledger)
}

async fn reference_run(level: &RunCoordinator) -> RunOutcome {
    level.restart().await.unwrap();
    level.push(Operation::shift_left(2)).await.unwrap();
    level.push(Operation::xor(92)).await.unwrap();
    level.run(now()).await.unwrap()
}

#[tokio::test]
async fn reference_pipeline_completes_once_then_duplicates() {
    let ledger = Arc::new(InMemoryLedger::new());
    let player = Uuid::new_v4();
    let session = session_with(ledger.clone(), player, SessionConfig::default());
    let level = session.open_level(generator::level_for(1), now()).await.unwrap();

    let first = reference_run(&level).await;
    let RunOutcome::Completed { fingerprint, award, .. } = &first else {
        panic!("expected completion, got {:?}", first);
    };
    assert_eq!(fingerprint.length, 2);
    assert_eq!(fingerprint.hash, REFERENCE_HASH);
    assert_eq!(award.respect, 5);
    assert_eq!(level.attempt_count().await, 1);

    {
        let engine = session.progression().await;
        assert!(engine.is_completed(1, now()));
        assert_eq!(engine.level_stats(1).completions, 1);
        assert_eq!(engine.progress().total_respect, 5);
    }

    let second = reference_run(&level).await;
    assert!(matches!(second, RunOutcome::Duplicate { .. }));
    assert_eq!(second.notice().as_deref(), Some(DUPLICATE_NOTICE));
    // The duplicate run's attempt is rolled back, its charge is not.
    assert_eq!(level.attempt_count().await, 1);
    assert!(!level.pipeline().await.is_frozen());
    assert_eq!(ledger.calls_of(LedgerCall::ConsumeRunResources), 2);

    let engine = session.progression().await;
    assert_eq!(engine.level_stats(1).completions, 1);
    assert_eq!(engine.level_stats(1).attempts, 2);
    assert_eq!(engine.progress().total_respect, 5);
    assert_eq!(ledger.solution_count(), 1);
}

#[tokio::test]
async fn open_mode_lets_each_player_register() {
    let ledger = Arc::new(InMemoryLedger::new());
    for _ in 0..2 {
        let session = session_with(ledger.clone(), Uuid::new_v4(), SessionConfig::default());
        let level = session.open_level(generator::level_for(1), now()).await.unwrap();
        assert!(reference_run(&level).await.is_completed());
    }
    assert_eq!(ledger.solution_count(), 2);
}

#[tokio::test]
async fn exclusive_mode_registers_once_across_players() {
    let ledger = Arc::new(InMemoryLedger::new().with_exclusivity(ExclusivityMode::Exclusive));

    let first = session_with(ledger.clone(), Uuid::new_v4(), SessionConfig::default());
    let level = first.open_level(generator::level_for(1), now()).await.unwrap();
    assert!(reference_run(&level).await.is_completed());

    let second = session_with(ledger.clone(), Uuid::new_v4(), SessionConfig::default());
    let level = second.open_level(generator::level_for(1), now()).await.unwrap();
    assert!(matches!(reference_run(&level).await, RunOutcome::Duplicate { .. }));
    assert!(!second.progression().await.is_completed(1, now()));
}

#[tokio::test]
async fn exhausted_resources_grant_nothing() {
    let player = Uuid::new_v4();
    let ledger = Arc::new(InMemoryLedger::new().with_economy(player, 0, 0));
    let session = session_with(ledger.clone(), player, SessionConfig::default());
    let level = session.open_level(generator::level_for(5), now()).await.unwrap();
    let target = level.level().target;
    let input = level.level().input;
    level.push(Operation::xor(target ^ input)).await.unwrap();

    let outcome = level.run(now()).await.unwrap();
    let RunOutcome::OutOfResources(consumption) = outcome else {
        panic!("expected out of resources, got {:?}", outcome);
    };
    assert!(!consumption.success);
    assert_eq!(consumption.remaining_moves, 0);

    let engine = session.progression().await;
    assert_eq!(engine.level_stats(5).completions, 0);
    assert_eq!(engine.level_stats(5).attempts, 0);
    assert!(!engine.can_play(6, now()));
    assert_eq!(level.attempt_count().await, 0);
    assert_eq!(ledger.calls_of(LedgerCall::RecordUniqueSolution), 0);
}

#[tokio::test]
async fn miss_counts_attempt_and_logs_history() {
    let ledger = Arc::new(InMemoryLedger::new());
    let session = session_with(ledger, Uuid::new_v4(), SessionConfig::default());
    let level = session.open_level(generator::level_for(1), now()).await.unwrap();
    level.push(Operation::xor(1)).await.unwrap();

    let outcome = level.run(now()).await.unwrap();
    assert!(matches!(outcome, RunOutcome::Miss { ref evaluation } if evaluation.result == 46));
    assert_eq!(outcome.notice().as_deref(), Some("Attempt counted."));
    assert_eq!(level.attempt_count().await, 1);

    let engine = session.progression().await;
    assert_eq!(engine.history(1), ["Miss. Result 46.".to_string()]);
    assert_eq!(engine.level_stats(1).max_value, 46);
}

#[tokio::test]
async fn watchdog_leaves_run_unresolved() {
    let ledger = Arc::new(
        InMemoryLedger::new().with_latency(LedgerCall::RecordUniqueSolution, Duration::from_millis(500)),
    );
    let config = SessionConfig {
        run: RunConfig {
            uniqueness_timeout_ms: 50,
            checking_overlay_delay_ms: 10,
            ..RunConfig::default()
        },
        ..SessionConfig::default()
    };
    let session = session_with(ledger, Uuid::new_v4(), config);
    let level = session.open_level(generator::level_for(1), now()).await.unwrap();

    let outcome = reference_run(&level).await;
    assert_eq!(outcome, RunOutcome::Unresolved { cause: LedgerError::Timeout });
    assert!(outcome.notice().is_some());
    assert!(!level.is_checking());
    assert!(!level.is_in_flight());
    assert!(!level.pipeline().await.is_frozen());
    assert_eq!(level.attempt_count().await, 0);
    assert!(!session.progression().await.is_completed(1, now()));
}

#[tokio::test]
async fn dropped_run_during_registration_restores_level() {
    let ledger = Arc::new(
        InMemoryLedger::new().with_latency(LedgerCall::RecordUniqueSolution, Duration::from_millis(500)),
    );
    let config = SessionConfig {
        run: RunConfig {
            checking_overlay_delay_ms: 10,
            ..RunConfig::default()
        },
        ..SessionConfig::default()
    };
    let session = session_with(ledger, Uuid::new_v4(), config);
    let level = Arc::new(session.open_level(generator::level_for(1), now()).await.unwrap());
    level.push(Operation::shift_left(2)).await.unwrap();
    level.push(Operation::xor(92)).await.unwrap();

    let run = {
        let level = Arc::clone(&level);
        tokio::spawn(async move { level.run(now()).await })
    };
    tokio::time::sleep(Duration::from_millis(60)).await;
    assert!(level.is_checking());
    assert!(level.pipeline().await.is_frozen());
    assert_eq!(level.attempt_count().await, 1);

    // The caller gives up while the ledger is still answering.
    run.abort();
    assert!(run.await.unwrap_err().is_cancelled());

    assert!(!level.is_checking());
    assert!(!level.is_in_flight());
    assert!(!level.pipeline().await.is_frozen());
    assert_eq!(level.attempt_count().await, 0);
    assert!(!session.progression().await.is_completed(1, now()));
    tokio_test::assert_ok!(level.push(Operation::xor(1)).await);
}

#[tokio::test]
async fn overlapping_runs_are_rejected() {
    let ledger = Arc::new(
        InMemoryLedger::new().with_latency(LedgerCall::RecordUniqueSolution, Duration::from_millis(200)),
    );
    let session = session_with(ledger, Uuid::new_v4(), SessionConfig::default());
    let level = Arc::new(session.open_level(generator::level_for(1), now()).await.unwrap());
    level.push(Operation::shift_left(2)).await.unwrap();
    level.push(Operation::xor(92)).await.unwrap();

    let first = {
        let level = Arc::clone(&level);
        tokio::spawn(async move { level.run(now()).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert!(level.is_in_flight());
    assert_eq!(level.run(now()).await, Err(RunError::InFlight));
    assert_eq!(level.push(Operation::xor(1)).await, Err(hashflow_core::PipelineError::Frozen));

    let first = first.await.unwrap().unwrap();
    assert!(first.is_completed());
    assert!(!level.is_in_flight());
}

#[tokio::test]
async fn ledger_failure_on_charge_is_surfaced() {
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.fail_next(LedgerCall::ConsumeRunResources, LedgerError::Network("reset".into()));
    let session = session_with(ledger, Uuid::new_v4(), SessionConfig::default());
    let level = session.open_level(generator::level_for(1), now()).await.unwrap();
    level.push(Operation::xor(1)).await.unwrap();

    let err = level.run(now()).await.unwrap_err();
    assert!(matches!(err, RunError::Ledger(LedgerError::Network(_))));
    assert!(err.notice().is_some());
    assert!(!level.pipeline().await.is_frozen());
    assert_eq!(level.attempt_count().await, 0);
}

#[tokio::test]
async fn completion_uploads_snapshot_and_unlocks_next() {
    let ledger = Arc::new(InMemoryLedger::new());
    let player = Uuid::new_v4();
    let session = session_with(ledger.clone(), player, SessionConfig::default());

    for id in 1..=5 {
        let level = session.open_level(generator::level_for(id), now()).await.unwrap();
        let info = level.level().clone();
        level.push(Operation::xor(info.input ^ info.target)).await.unwrap();
        assert!(level.run(now()).await.unwrap().is_completed(), "level {}", id);
    }

    let stored = ledger.stored_progress(player).unwrap();
    assert_eq!(stored.completed_level_ids, vec![1, 2, 3, 4, 5]);
    assert_eq!(stored.highest_unlocked_level_id, 6);
    assert!(session.open_level(generator::level_for(6), now()).await.is_ok());
    assert!(session.open_level(generator::level_for(7), now()).await.is_err());
    assert_eq!(session.stats().await.unique_solutions(3), 1);
}

#[tokio::test]
async fn upload_failure_keeps_completion() {
    let ledger = Arc::new(InMemoryLedger::new());
    ledger.fail_next(LedgerCall::UpsertPlayerProgress, LedgerError::Timeout);
    let session = session_with(ledger, Uuid::new_v4(), SessionConfig::default());
    let level = session.open_level(generator::level_for(1), now()).await.unwrap();

    assert!(reference_run(&level).await.is_completed());
    assert!(session.progression().await.is_completed(1, now()));
}

#[tokio::test]
async fn failed_mint_never_reverses_completion() {
    let ledger = Arc::new(InMemoryLedger::new());
    let minter = Arc::new(MockMinter::new().with_available(false));
    let session = session_with(ledger.clone(), Uuid::new_v4(), SessionConfig::default())
        .with_minter(minter.clone() as Arc<dyn NftMinter>);
    let level = session.open_level(generator::level_for(1), now()).await.unwrap();

    assert!(reference_run(&level).await.is_completed());
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(minter.call_count(), 1);
    assert!(session.progression().await.is_completed(1, now()));
    assert_eq!(ledger.solution_count(), 1);
}

#[tokio::test]
async fn third_distinct_solution_reaches_achievement() {
    let ledger = Arc::new(InMemoryLedger::new());
    let session = session_with(ledger, Uuid::new_v4(), SessionConfig::default());
    let level = session.open_level(generator::level_for(1), now()).await.unwrap();
    let info = level.level().clone();
    let mask = info.input ^ info.target;

    let pipelines = [
        vec![Operation::xor(mask)],
        vec![Operation::shift_left(2), Operation::xor(92)],
        vec![Operation::xor(mask ^ 1), Operation::xor(1)],
    ];
    let mut last = None;
    for ops in pipelines {
        level.restart().await.unwrap();
        for op in ops {
            level.push(op).await.unwrap();
        }
        last = Some(level.run(now()).await.unwrap());
    }

    let last = last.unwrap();
    assert!(matches!(
        last,
        RunOutcome::Completed { achievement: Some(hashflow_session::AchievementTier::Achievement), .. }
    ));
    assert_eq!(last.notice().as_deref(), Some("Achievement! 3 unique solutions."));
}
