//! The run protocol for one open level.
//!
//! A run charges the ledger, evaluates the pipeline locally and, on a target
//! match, asks the ledger to register the pipeline hash. Completion is only
//! committed once the ledger reports the hash as newly inserted.
//!
//! ```text
//! run ──▶ price ──▶ charge ──▶ evaluate ──┬─ miss ──▶ Miss
//!                     │                   └─ hit ──▶ register ──┬─ inserted ──▶ Completed
//!                     └─ declined ──▶ OutOfResources            ├─ present ───▶ Duplicate
//!                                                               └─ timeout ───▶ Unresolved
//! ```

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use hashflow_core::{
    evaluate, fingerprint, hint_for, palette, Candidate, Evaluation, Hint, Level, LevelId, Operation, Pipeline,
    PipelineError, PipelineFingerprint,
};
use hashflow_ledger::{
    LedgerError, MintRequest, ResourceConsumption, RunCostRequest, UniqueSolutionRecord,
};

use crate::progress::AchievementTier;
use crate::progression::CompletionAward;
use crate::session::GameSession;

/// Shown when the ledger already holds the submitted pipeline.
pub const DUPLICATE_NOTICE: &str =
    "This pipeline was already submitted. Build a new one to earn credits and respect.";

/// Why a run was not started.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RunError {
    /// Another run on this level has not finished
    #[error("A run is already in flight")]
    InFlight,

    /// The pipeline already produced a registered solution
    #[error("Pipeline is frozen")]
    Frozen,

    /// The level is not playable yet
    #[error("Level {0} is locked")]
    Locked(LevelId),

    /// Pricing or charging failed
    #[error("Ledger error: {0}")]
    Ledger(#[from] LedgerError),
}

impl RunError {
    /// Player-facing text. `None` when nothing should be shown.
    pub fn notice(&self) -> Option<String> {
        match self {
            RunError::InFlight => None,
            RunError::Frozen => Some("This pipeline is locked in. Restart to build a new one.".to_string()),
            RunError::Locked(_) => Some("This level is still locked.".to_string()),
            RunError::Ledger(e) => e.user_message(),
        }
    }
}

/// How a run ended.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// The ledger registered the pipeline for the first time
    Completed {
        evaluation: Evaluation,
        fingerprint: PipelineFingerprint,
        award: CompletionAward,
        achievement: Option<AchievementTier>,
    },
    /// Target reached, but the ledger already had this pipeline
    Duplicate { fingerprint: PipelineFingerprint },
    /// Target not reached
    Miss { evaluation: Evaluation },
    /// Nothing to run
    EmptyPipeline,
    /// The ledger declined the charge
    OutOfResources(ResourceConsumption),
    /// The uniqueness check did not answer; nothing was granted
    Unresolved { cause: LedgerError },
}

impl RunOutcome {
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed { .. })
    }

    /// Player-facing text. `None` when nothing should be shown.
    pub fn notice(&self) -> Option<String> {
        match self {
            RunOutcome::Completed { award, achievement, .. } => Some(match achievement {
                Some(tier) => tier.message().to_string(),
                None => format!("Unique solution! +{} respect", award.respect),
            }),
            RunOutcome::Duplicate { .. } => Some(DUPLICATE_NOTICE.to_string()),
            RunOutcome::Miss { .. } => Some("Attempt counted.".to_string()),
            RunOutcome::EmptyPipeline => Some("Add at least one node to the conveyor.".to_string()),
            RunOutcome::OutOfResources(_) => {
                Some("Out of moves and credits. Come back tomorrow or top up credits.".to_string())
            }
            RunOutcome::Unresolved { cause } => cause.user_message(),
        }
    }
}

/// Result of a paid hint request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HintOutcome {
    Granted(Hint),
    /// Not enough credits; nothing was charged
    OutOfResources(ResourceConsumption),
}

struct RunState {
    pipeline: Pipeline,
    attempt_count: u32,
    last_pipeline_hash: Option<String>,
    hint_usage: u32,
}

/// Restores the coordinator when a run ends, however it ends.
///
/// A run future dropped mid-flight still clears the in-flight and checking
/// flags, thaws the pipeline and takes back the attempt of an unanswered
/// registration.
struct RunGuard<'a> {
    coordinator: &'a RunCoordinator,
    /// Unfreeze the pipeline on drop
    thaw: bool,
    /// Take back the counted attempt on drop
    rollback_attempt: bool,
}

impl<'a> RunGuard<'a> {
    fn acquire(coordinator: &'a RunCoordinator) -> Option<Self> {
        coordinator
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                coordinator,
                thaw: false,
                rollback_attempt: false,
            })
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if self.thaw || self.rollback_attempt {
            let mut state = self.coordinator.lock_state();
            if self.rollback_attempt {
                state.attempt_count = state.attempt_count.saturating_sub(1);
            }
            if self.thaw {
                state.pipeline.unfreeze();
            }
        }
        self.coordinator.checking.store(false, Ordering::Release);
        self.coordinator.in_flight.store(false, Ordering::Release);
    }
}

/// Drives runs on one open level.
///
/// Overlapping runs are rejected with [`RunError::InFlight`], never queued.
/// The pipeline is frozen for the duration of a run and stays frozen once it
/// produced a registered solution; [`RunCoordinator::restart`] starts over.
pub struct RunCoordinator {
    game: GameSession,
    level: Level,
    state: Mutex<RunState>,
    in_flight: AtomicBool,
    checking: AtomicBool,
}

impl RunCoordinator {
    pub(crate) fn new(game: GameSession, level: Level) -> Self {
        Self {
            game,
            level,
            state: Mutex::new(RunState {
                pipeline: Pipeline::new(),
                attempt_count: 0,
                last_pipeline_hash: None,
                hint_usage: 0,
            }),
            in_flight: AtomicBool::new(false),
            checking: AtomicBool::new(false),
        }
    }

    /// Never held across an await.
    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn level(&self) -> &Level {
        &self.level
    }

    /// Whether a run is in progress.
    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Whether the "checking" state is showing.
    pub fn is_checking(&self) -> bool {
        self.checking.load(Ordering::Acquire)
    }

    pub async fn pipeline(&self) -> Pipeline {
        self.lock_state().pipeline.clone()
    }

    /// Attempts counted on this level since it was opened.
    pub async fn attempt_count(&self) -> u32 {
        self.lock_state().attempt_count
    }

    /// Value the current pipeline produces.
    pub async fn current_value(&self) -> u32 {
        self.lock_state().pipeline.evaluate(self.level.input).result
    }

    // ------------------------------------------------------------------
    // Editing
    // ------------------------------------------------------------------

    pub async fn push(&self, op: Operation) -> Result<(), PipelineError> {
        self.lock_state().pipeline.push(op)
    }

    pub async fn replace(&self, index: usize, op: Operation) -> Result<(), PipelineError> {
        self.lock_state().pipeline.replace(index, op)
    }

    pub async fn remove(&self, index: usize) -> Result<Operation, PipelineError> {
        self.lock_state().pipeline.remove(index)
    }

    pub async fn move_op(&self, from: usize, to: usize) -> Result<(), PipelineError> {
        self.lock_state().pipeline.move_op(from, to)
    }

    pub async fn clear(&self) -> Result<(), PipelineError> {
        self.lock_state().pipeline.clear()
    }

    /// Drop the pipeline and start over with an editable empty one.
    pub async fn restart(&self) -> Result<(), RunError> {
        if self.is_in_flight() {
            return Err(RunError::InFlight);
        }
        self.lock_state().pipeline = Pipeline::new();
        Ok(())
    }

    // ------------------------------------------------------------------
    // Assistant
    // ------------------------------------------------------------------

    /// Suggested operations for the current value. Empty in hardcore mode.
    pub async fn palette(&self) -> Vec<Candidate> {
        if self.game.progression().await.is_hardcore() {
            return Vec::new();
        }
        let current = self.current_value().await;
        palette(current, self.level.target, self.level.id)
    }

    /// Buy the next hint in the mask, shift, input cycle.
    pub async fn request_hint(&self) -> Result<HintOutcome, RunError> {
        let cost = self.game.config().run.hint_cost;
        let consumption = self.game.charge(cost).await?;
        self.game.refresh_economy_logged().await;
        if !consumption.success {
            return Ok(HintOutcome::OutOfResources(consumption));
        }

        let mut state = self.lock_state();
        state.hint_usage += 1;
        let current = state.pipeline.evaluate(self.level.input).result;
        let hint = hint_for(state.hint_usage, &self.level, current);
        debug!(level_id = self.level.id, usage = state.hint_usage, ?hint, "Hint granted");
        Ok(HintOutcome::Granted(hint))
    }

    // ------------------------------------------------------------------
    // Running
    // ------------------------------------------------------------------

    /// Run the current pipeline.
    pub async fn run(&self, now: DateTime<Utc>) -> Result<RunOutcome, RunError> {
        let mut guard = RunGuard::acquire(self).ok_or(RunError::InFlight)?;

        let (ops, last_pipeline_hash) = {
            let mut state = self.lock_state();
            if state.pipeline.is_frozen() {
                return Err(RunError::Frozen);
            }
            state.pipeline.freeze();
            (state.pipeline.ops().to_vec(), state.last_pipeline_hash.clone())
        };
        guard.thaw = true;

        self.execute(&mut guard, ops, last_pipeline_hash, now).await
    }

    async fn execute(
        &self,
        guard: &mut RunGuard<'_>,
        ops: Vec<Operation>,
        last_pipeline_hash: Option<String>,
        now: DateTime<Utc>,
    ) -> Result<RunOutcome, RunError> {
        let Some(fingerprint) = fingerprint(&ops) else {
            return Ok(RunOutcome::EmptyPipeline);
        };
        let level_id = self.level.id;

        let request = RunCostRequest {
            level_id,
            nodes_count: ops.len(),
            pipeline_hash: fingerprint.hash.clone(),
            last_pipeline_hash,
            level_tier: self.game.config().run.level_tier.clone(),
        };
        let cost = self
            .game
            .ledger()
            .calculate_run_cost(self.game.player_id(), &request)
            .await?;
        let consumption = self.game.charge(cost).await?;
        if !consumption.success {
            info!(level_id, cost, "Run declined: out of resources");
            self.game.refresh_economy_logged().await;
            return Ok(RunOutcome::OutOfResources(consumption));
        }

        let attempt = {
            let mut state = self.lock_state();
            state.attempt_count += 1;
            state.last_pipeline_hash = Some(fingerprint.hash.clone());
            state.attempt_count
        };

        let evaluation = evaluate(self.level.input, &ops);
        let thinking_units = ops.len().max(1) as u64 * u64::from(attempt.max(1));
        self.game
            .progression_mut()
            .await
            .record_attempt(level_id, thinking_units, evaluation.result);

        if !evaluation.reaches(self.level.target) {
            self.game
                .progression_mut()
                .await
                .add_history(level_id, format!("Miss. Result {}.", evaluation.result));
            debug!(level_id, attempt, result = evaluation.result, "Run missed");
            self.game.refresh_economy_logged().await;
            return Ok(RunOutcome::Miss { evaluation });
        }

        let solution_count = self
            .game
            .progression_mut()
            .await
            .record_solution(level_id, &fingerprint.hash);

        // Until the ledger answers, the attempt is provisional.
        guard.rollback_attempt = true;
        let verdict = self.register(&fingerprint).await;
        let outcome = match verdict {
            Ok(true) => {
                guard.rollback_attempt = false;
                guard.thaw = false;
                let award = self
                    .game
                    .progression_mut()
                    .await
                    .mark_level_completed(&self.level, now);
                let achievement = AchievementTier::reached_at(solution_count);

                if let Err(e) = self.game.upload_progress().await {
                    warn!(level_id, error = %e, "Progress upload failed");
                }
                self.game.spawn_mint(MintRequest {
                    player_id: self.game.player_id(),
                    level_id,
                    pipeline_hash: fingerprint.hash.clone(),
                    pipeline_length: fingerprint.length,
                    wallet_address: None,
                });

                RunOutcome::Completed {
                    evaluation,
                    fingerprint,
                    award,
                    achievement,
                }
            }
            Ok(false) => {
                info!(level_id, hash = %fingerprint.hash, "Duplicate pipeline");
                RunOutcome::Duplicate { fingerprint }
            }
            Err(cause) => {
                if !cause.is_cancelled() {
                    warn!(level_id, error = %cause, "Uniqueness check unresolved");
                }
                RunOutcome::Unresolved { cause }
            }
        };

        self.game.refresh_economy_logged().await;
        self.game.refresh_stats_logged(true).await;
        Ok(outcome)
    }

    /// Ask the ledger to register the hash, under the watchdog.
    ///
    /// The "checking" state shows only if the answer takes longer than the
    /// overlay delay. It is cleared here, or by the [`RunGuard`] if the run
    /// is dropped while waiting.
    async fn register(&self, fingerprint: &PipelineFingerprint) -> hashflow_ledger::Result<bool> {
        let run = &self.game.config().run;
        let record = UniqueSolutionRecord::new(self.game.player_id(), self.level.id, fingerprint);

        let call = tokio::time::timeout(
            run.uniqueness_timeout(),
            self.game.ledger().record_unique_solution(&record),
        );
        let overlay = tokio::time::sleep(run.checking_overlay_delay());
        tokio::pin!(call, overlay);

        let mut overlay_shown = false;
        let verdict = loop {
            tokio::select! {
                verdict = &mut call => break verdict,
                _ = &mut overlay, if !overlay_shown => {
                    overlay_shown = true;
                    self.checking.store(true, Ordering::Release);
                    debug!(level_id = self.level.id, "Checking uniqueness");
                }
            }
        };
        self.checking.store(false, Ordering::Release);

        match verdict {
            Ok(inserted) => inserted,
            Err(_) => Err(LedgerError::Timeout),
        }
    }
}
