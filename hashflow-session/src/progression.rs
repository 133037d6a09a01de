//! The progression state machine.
//!
//! Levels move `locked -> unlockable -> completed`. The last transition only
//! happens through [`ProgressionEngine::mark_level_completed`], which the run
//! protocol calls after the ledger confirmed a unique solution.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use hashflow_core::daily::{daily_index, daily_level_id, DAILY_LEVEL_COUNT};
use hashflow_core::{generator, DailyDifficulty, Level, LevelId, FIRST_LEVEL_ID};
use hashflow_ledger::ProgressSnapshot;

use crate::config::ProgressionConfig;
use crate::progress::{AchievementTier, LevelStats, PlayerProgress, PlayerRank};

/// Advisory shown after the frontier narrowed.
pub const NARROWING_MESSAGE: &str = "Looks like you are stuck at this height. The level range was narrowed \
     to help you build momentum. Climb again and it widens.";

/// Where a level stands for the player.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelState {
    Locked,
    Unlockable,
    Completed,
}

/// What a unique completion paid out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletionAward {
    pub respect: i64,
    /// Human-readable lines explaining `respect`
    pub breakdown: Vec<String>,
    /// Daily difficulty finished by this completion
    pub daily_completed: Option<DailyDifficulty>,
}

fn same_day(a: DateTime<Utc>, b: DateTime<Utc>) -> bool {
    a.date_naive() == b.date_naive()
}

/// Owns and mutates a player's [`PlayerProgress`].
#[derive(Debug, Clone)]
pub struct ProgressionEngine {
    config: ProgressionConfig,
    progress: PlayerProgress,
    adaptive_message: Option<String>,
}

impl ProgressionEngine {
    /// Create an engine with fresh progress.
    pub fn new(config: ProgressionConfig) -> Self {
        let progress = PlayerProgress::new(config.starter_top());
        Self::with_progress(config, progress)
    }

    /// Create an engine over existing progress.
    pub fn with_progress(config: ProgressionConfig, progress: PlayerProgress) -> Self {
        Self {
            config,
            progress,
            adaptive_message: None,
        }
    }

    pub fn config(&self) -> &ProgressionConfig {
        &self.config
    }

    /// Read-only view of the owned progress.
    pub fn progress(&self) -> &PlayerProgress {
        &self.progress
    }

    /// Advisory from the last narrowing, cleared by new progress.
    pub fn adaptive_message(&self) -> Option<&str> {
        self.adaptive_message.as_deref()
    }

    pub fn rank(&self) -> PlayerRank {
        self.progress.rank()
    }

    // ------------------------------------------------------------------
    // Unlocking
    // ------------------------------------------------------------------

    /// Whether the daily completion set belongs to the calendar day of `now`.
    ///
    /// Daily IDs repeat every day, so a set from an earlier day counts as empty
    /// even before [`Self::reset_daily_meta_if_needed`] clears it.
    fn daily_set_is_current(&self, now: DateTime<Utc>) -> bool {
        self.progress.last_daily_date.is_some_and(|last| same_day(last, now))
    }

    /// Whether a level has a confirmed unique completion.
    ///
    /// Daily levels only count for the calendar day of `now`.
    pub fn is_completed(&self, level_id: LevelId, now: DateTime<Utc>) -> bool {
        if daily_index(level_id).is_some() {
            self.daily_set_is_current(now) && self.progress.completed_daily_level_ids.contains(&level_id)
        } else {
            self.progress.completed_level_ids.contains(&level_id)
        }
    }

    /// Whether the player may open a level at `now`.
    pub fn can_play(&self, level_id: LevelId, now: DateTime<Utc>) -> bool {
        if let Some((difficulty, index)) = daily_index(level_id) {
            return index == 0 || self.is_completed(daily_level_id(difficulty, index - 1), now);
        }

        let last = self.config.campaign_last_level_id;
        if !(FIRST_LEVEL_ID..=last).contains(&level_id) {
            return false;
        }
        if level_id <= self.config.starter_top() || generator::is_category_opener(level_id) {
            return true;
        }
        if level_id > self.progress.current_top_level_id {
            return false;
        }
        level_id == FIRST_LEVEL_ID || self.is_completed(level_id - 1, now)
    }

    pub fn level_state(&self, level_id: LevelId, now: DateTime<Utc>) -> LevelState {
        if self.is_completed(level_id, now) {
            LevelState::Completed
        } else if self.can_play(level_id, now) {
            LevelState::Unlockable
        } else {
            LevelState::Locked
        }
    }

    /// The level after `level_id`: next in its campaign category, or the
    /// next daily level of the same set.
    pub fn next_level(&self, level_id: LevelId, today: NaiveDate) -> Option<Level> {
        if let Some((difficulty, index)) = daily_index(level_id) {
            return hashflow_core::daily_levels(today, difficulty)
                .into_iter()
                .nth(index + 1);
        }
        generator::next_in_category(level_id).cloned()
    }

    // ------------------------------------------------------------------
    // Attempts and solutions
    // ------------------------------------------------------------------

    /// Account for one charged run.
    pub fn record_attempt(&mut self, level_id: LevelId, thinking_units: u64, result: u32) {
        let stats = self.progress.level_stats.entry(level_id).or_default();
        stats.attempts += 1;
        stats.thinking_units += thinking_units.max(1);
        stats.max_value = stats.max_value.max(result);
    }

    pub fn level_stats(&self, level_id: LevelId) -> LevelStats {
        self.progress
            .level_stats
            .get(&level_id)
            .copied()
            .unwrap_or_default()
    }

    /// Remember a locally verified solution hash. Returns the level's count.
    pub fn record_solution(&mut self, level_id: LevelId, hash: &str) -> usize {
        let hashes = self.progress.tried_solution_hashes.entry(level_id).or_default();
        hashes.insert(hash.to_string());
        hashes.len()
    }

    pub fn has_tried_solution(&self, level_id: LevelId, hash: &str) -> bool {
        self.progress
            .tried_solution_hashes
            .get(&level_id)
            .is_some_and(|hashes| hashes.contains(hash))
    }

    pub fn solution_count(&self, level_id: LevelId) -> usize {
        self.progress
            .tried_solution_hashes
            .get(&level_id)
            .map_or(0, |hashes| hashes.len())
    }

    pub fn achievement_tier(&self, level_id: LevelId) -> Option<AchievementTier> {
        AchievementTier::for_count(self.solution_count(level_id))
    }

    /// Commit a ledger-confirmed unique completion.
    pub fn mark_level_completed(&mut self, level: &Level, now: DateTime<Utc>) -> CompletionAward {
        let respect = self.config.unique_completion_respect;
        self.add_respect(respect);
        self.progress.level_stats.entry(level.id).or_default().completions += 1;
        self.add_history(
            level.id,
            format!("Unique solution -> +{} respect", respect),
        );

        let mut daily_completed = None;
        if let Some((difficulty, _)) = daily_index(level.id) {
            self.reset_daily_meta_if_needed(now);
            self.progress.completed_daily_level_ids.insert(level.id);
            let all_done = (0..DAILY_LEVEL_COUNT)
                .all(|i| self.is_completed(daily_level_id(difficulty, i), now));
            if all_done && self.mark_daily_completed(difficulty, now) {
                daily_completed = Some(difficulty);
            }
        } else {
            self.progress.completed_level_ids.insert(level.id);
            self.register_progress(level.id, now);
        }

        info!(
            level_id = level.id,
            respect = self.progress.total_respect,
            frontier = self.progress.current_top_level_id,
            "Level completed"
        );

        CompletionAward {
            respect,
            breakdown: vec![format!("Unique solution -> +{}", respect)],
            daily_completed,
        }
    }

    fn register_progress(&mut self, level_id: LevelId, now: DateTime<Utc>) {
        let unlocked_next = (level_id + 1).min(self.config.campaign_last_level_id);
        self.progress.highest_unlocked_level_id = self.progress.highest_unlocked_level_id.max(unlocked_next);
        self.progress.current_top_level_id = self.progress.current_top_level_id.max(unlocked_next);
        self.progress.last_progress_date = Some(now);
        self.adaptive_message = None;
    }

    /// Add (or with a negative amount, remove) respect. Never drops below zero.
    pub fn add_respect(&mut self, amount: i64) {
        self.progress.total_respect = (self.progress.total_respect + amount).max(0);
    }

    pub fn add_history(&mut self, level_id: LevelId, entry: impl Into<String>) {
        self.progress
            .level_history
            .entry(level_id)
            .or_default()
            .push(entry.into());
    }

    pub fn history(&self, level_id: LevelId) -> &[String] {
        self.progress
            .level_history
            .get(&level_id)
            .map_or(&[], |entries| entries.as_slice())
    }

    // ------------------------------------------------------------------
    // Daily clocks
    // ------------------------------------------------------------------

    /// Start a new day for the daily challenges and the daily bonus.
    ///
    /// The two clocks are independent. Returns whether the daily
    /// challenge state was reset.
    pub fn reset_daily_meta_if_needed(&mut self, now: DateTime<Utc>) -> bool {
        self.reset_daily_bonus_if_needed(now);

        if self.daily_set_is_current(now) {
            return false;
        }
        self.progress.last_daily_date = Some(now);
        self.progress.completed_daily_difficulties.clear();
        self.progress.completed_daily_level_ids.clear();
        debug!("Daily challenges reset");
        true
    }

    /// Grant the daily bonus once per calendar day. Returns whether it was granted.
    pub fn reset_daily_bonus_if_needed(&mut self, now: DateTime<Utc>) -> bool {
        if self.progress.last_bonus_reset_date.is_some_and(|last| same_day(last, now)) {
            return false;
        }
        self.progress.last_bonus_reset_date = Some(now);
        self.progress.bonus_points += self.config.daily_bonus;
        true
    }

    /// Mark a daily difficulty done. Returns `false` if it already was.
    pub fn mark_daily_completed(&mut self, difficulty: DailyDifficulty, now: DateTime<Utc>) -> bool {
        let inserted = self
            .progress
            .completed_daily_difficulties
            .insert(difficulty.as_str().to_string());
        if inserted {
            self.progress.last_daily_date = Some(now);
        }
        inserted
    }

    pub fn is_daily_completed_today(&self, difficulty: DailyDifficulty, now: DateTime<Utc>) -> bool {
        self.daily_set_is_current(now)
            && self
                .progress
                .completed_daily_difficulties
                .contains(difficulty.as_str())
    }

    // ------------------------------------------------------------------
    // Adaptive narrowing
    // ------------------------------------------------------------------

    /// Narrow the frontier by one level after a long idle stretch.
    ///
    /// Never goes below the configured floor. Returns the advisory when the
    /// frontier moved.
    pub fn adjust_level_range_if_needed(&mut self, now: DateTime<Utc>) -> Option<&str> {
        let last = self.progress.last_progress_date?;
        let idle_days = (now - last).num_days();
        let floor = self.config.narrowing_floor();

        if idle_days >= self.config.narrowing_idle_days && self.progress.current_top_level_id > floor {
            self.progress.current_top_level_id = (self.progress.current_top_level_id - 1).max(floor);
            self.adaptive_message = Some(NARROWING_MESSAGE.to_string());
            info!(
                idle_days,
                frontier = self.progress.current_top_level_id,
                "Narrowed level range"
            );
            return self.adaptive_message.as_deref();
        }
        None
    }

    // ------------------------------------------------------------------
    // Modes
    // ------------------------------------------------------------------

    pub fn set_hardcore(&mut self, enabled: bool) {
        self.progress.hardcore_mode = enabled;
    }

    pub fn is_hardcore(&self) -> bool {
        self.progress.hardcore_mode
    }

    // ------------------------------------------------------------------
    // Snapshot sync
    // ------------------------------------------------------------------

    /// Campaign snapshot to upload: sorted completed IDs and the frontier.
    pub fn snapshot(&self) -> (Vec<LevelId>, LevelId) {
        let completed = self.progress.completed_level_ids.iter().copied().collect();
        let highest = self.progress.current_top_level_id.max(self.config.starter_top());
        (completed, highest)
    }

    /// Replace local campaign progress with the server snapshot.
    pub fn apply_remote_snapshot(&mut self, snapshot: &ProgressSnapshot, now: DateTime<Utc>) {
        let highest = snapshot.highest_unlocked_level_id.max(self.config.starter_top());
        self.progress.completed_level_ids = snapshot.completed_level_ids.iter().copied().collect();
        self.progress.highest_unlocked_level_id = highest;
        self.progress.current_top_level_id = highest;
        self.progress.last_progress_date = Some(snapshot.updated_at.unwrap_or(now));
        info!(
            completed = self.progress.completed_level_ids.len(),
            frontier = highest,
            "Applied remote progress"
        );
    }
}
