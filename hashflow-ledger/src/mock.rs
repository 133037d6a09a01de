//! In-memory ledger for tests and offline play.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::debug;

use hashflow_core::LevelId;

use super::traits::*;

/// Ledger operations, for failure/latency injection and call counting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerCall {
    CalculateRunCost,
    ConsumeRunResources,
    RecordUniqueSolution,
    FetchPlayerProgress,
    UpsertPlayerProgress,
    FetchLevelUniqueSolutionCounts,
    FetchPlayerLevelStats,
    FetchLeaderboard,
    FetchPlayerEconomy,
}

/// Dedup key: the player is part of the key only in open mode.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct SolutionKey {
    player_id: Option<PlayerId>,
    level_id: LevelId,
    pipeline_hash: String,
}

/// In-memory ledger.
///
/// Enforces the at-most-once insert with the same key semantics as the
/// backend, draws run costs from moves first and credits second, and lets
/// tests inject one-shot failures and per-call latency.
pub struct InMemoryLedger {
    id: String,
    available: AtomicBool,
    exclusivity: ExclusivityMode,
    run_cost: i64,
    solutions: DashMap<SolutionKey, UniqueSolutionRecord>,
    economies: DashMap<PlayerId, EconomySnapshot>,
    progress: DashMap<PlayerId, ProgressSnapshot>,
    usernames: DashMap<PlayerId, String>,
    failures: DashMap<LedgerCall, LedgerError>,
    latency: DashMap<LedgerCall, Duration>,
    calls: DashMap<LedgerCall, u32>,
    call_count: AtomicU32,
}

impl InMemoryLedger {
    /// Create an empty ledger in open mode with a run cost of 1.
    pub fn new() -> Self {
        Self {
            id: "in-memory".to_string(),
            available: AtomicBool::new(true),
            exclusivity: ExclusivityMode::Open,
            run_cost: 1,
            solutions: DashMap::new(),
            economies: DashMap::new(),
            progress: DashMap::new(),
            usernames: DashMap::new(),
            failures: DashMap::new(),
            latency: DashMap::new(),
            calls: DashMap::new(),
            call_count: AtomicU32::new(0),
        }
    }

    /// Set the dedup policy.
    pub fn with_exclusivity(mut self, mode: ExclusivityMode) -> Self {
        self.exclusivity = mode;
        self
    }

    /// Set the flat price of a run.
    pub fn with_run_cost(mut self, cost: i64) -> Self {
        self.run_cost = cost.max(0);
        self
    }

    /// Seed a player's balances.
    pub fn with_economy(self, player_id: PlayerId, moves: i64, credits: i64) -> Self {
        self.set_economy(player_id, moves, credits);
        self
    }

    /// Seed a player's progress snapshot.
    pub fn with_progress(self, player_id: PlayerId, snapshot: ProgressSnapshot) -> Self {
        self.progress.insert(player_id, snapshot);
        self
    }

    /// Set a display name for the leaderboard.
    pub fn with_username(self, player_id: PlayerId, username: impl Into<String>) -> Self {
        self.usernames.insert(player_id, username.into());
        self
    }

    /// Delay every call of a kind.
    pub fn with_latency(self, call: LedgerCall, delay: Duration) -> Self {
        self.latency.insert(call, delay);
        self
    }

    /// Set availability.
    pub fn with_available(self, available: bool) -> Self {
        self.available.store(available, Ordering::SeqCst);
        self
    }

    /// Overwrite a player's balances.
    pub fn set_economy(&self, player_id: PlayerId, moves: i64, credits: i64) {
        self.economies.insert(
            player_id,
            EconomySnapshot {
                daily_moves_left: moves,
                credit_balance: credits,
            },
        );
    }

    /// Fail the next call of a kind with `error`.
    pub fn fail_next(&self, call: LedgerCall, error: LedgerError) {
        self.failures.insert(call, error);
    }

    /// Total number of calls.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Number of calls of one kind.
    pub fn calls_of(&self, call: LedgerCall) -> u32 {
        self.calls.get(&call).map(|c| *c).unwrap_or(0)
    }

    /// Reset all call counters.
    pub fn reset_call_count(&self) {
        self.call_count.store(0, Ordering::SeqCst);
        self.calls.clear();
    }

    /// Number of registered solutions.
    pub fn solution_count(&self) -> usize {
        self.solutions.len()
    }

    /// Stored snapshot for a player.
    pub fn stored_progress(&self, player_id: PlayerId) -> Option<ProgressSnapshot> {
        self.progress.get(&player_id).map(|p| p.clone())
    }

    async fn enter(&self, call: LedgerCall) -> Result<()> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        *self.calls.entry(call).or_insert(0) += 1;

        let delay = self.latency.get(&call).map(|d| *d);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if !self.available.load(Ordering::SeqCst) {
            return Err(LedgerError::Unavailable("In-memory ledger disabled".to_string()));
        }
        if let Some((_, error)) = self.failures.remove(&call) {
            return Err(error);
        }
        Ok(())
    }

    fn economy_of(&self, player_id: PlayerId) -> EconomySnapshot {
        self.economies
            .get(&player_id)
            .map(|e| *e)
            .unwrap_or_default()
    }

    fn username_of(&self, player_id: PlayerId) -> String {
        self.usernames
            .get(&player_id)
            .map(|u| u.clone())
            .unwrap_or_else(|| format!("player-{}", &player_id.simple().to_string()[..8]))
    }
}

impl Default for InMemoryLedger {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteLedger for InMemoryLedger {
    fn id(&self) -> &str {
        &self.id
    }

    async fn calculate_run_cost(&self, _player_id: PlayerId, request: &RunCostRequest) -> Result<i64> {
        self.enter(LedgerCall::CalculateRunCost).await?;
        debug!(level_id = request.level_id, cost = self.run_cost, "Priced run");
        Ok(self.run_cost)
    }

    async fn consume_run_resources(&self, player_id: PlayerId, cost: i64) -> Result<ResourceConsumption> {
        self.enter(LedgerCall::ConsumeRunResources).await?;

        let mut entry = self.economies.entry(player_id).or_default();
        let economy = entry.value_mut();
        let cost = cost.max(0);

        let success = if economy.daily_moves_left >= cost {
            economy.daily_moves_left -= cost;
            true
        } else if economy.credit_balance >= cost {
            economy.credit_balance -= cost;
            true
        } else {
            false
        };

        Ok(ResourceConsumption {
            success,
            remaining_moves: economy.daily_moves_left,
            remaining_credits: economy.credit_balance,
        })
    }

    async fn record_unique_solution(&self, record: &UniqueSolutionRecord) -> Result<bool> {
        self.enter(LedgerCall::RecordUniqueSolution).await?;

        let key = SolutionKey {
            player_id: match self.exclusivity {
                ExclusivityMode::Open => Some(record.player_id),
                ExclusivityMode::Exclusive => None,
            },
            level_id: record.level_id,
            pipeline_hash: record.pipeline_hash.clone(),
        };

        let inserted = match self.solutions.entry(key) {
            Entry::Occupied(_) => false,
            Entry::Vacant(slot) => {
                slot.insert(record.clone());
                true
            }
        };
        debug!(
            level_id = record.level_id,
            hash = %record.pipeline_hash,
            inserted,
            "Recorded solution"
        );
        Ok(inserted)
    }

    async fn fetch_player_progress(&self, player_id: PlayerId) -> Result<Option<ProgressSnapshot>> {
        self.enter(LedgerCall::FetchPlayerProgress).await?;
        Ok(self.stored_progress(player_id))
    }

    async fn upsert_player_progress(
        &self,
        player_id: PlayerId,
        completed_level_ids: &[LevelId],
        highest_unlocked_level_id: LevelId,
    ) -> Result<()> {
        self.enter(LedgerCall::UpsertPlayerProgress).await?;
        self.progress.insert(
            player_id,
            ProgressSnapshot {
                completed_level_ids: completed_level_ids.to_vec(),
                highest_unlocked_level_id,
                updated_at: Some(Utc::now()),
            },
        );
        Ok(())
    }

    async fn fetch_level_unique_solution_counts(&self) -> Result<HashMap<LevelId, i64>> {
        self.enter(LedgerCall::FetchLevelUniqueSolutionCounts).await?;
        let mut counts = HashMap::new();
        for solution in self.solutions.iter() {
            *counts.entry(solution.key().level_id).or_insert(0) += 1;
        }
        Ok(counts)
    }

    async fn fetch_player_level_stats(&self, player_id: PlayerId) -> Result<Vec<PlayerLevelStat>> {
        self.enter(LedgerCall::FetchPlayerLevelStats).await?;

        // level -> (mine, all, my total length)
        let mut per_level: HashMap<LevelId, (i64, i64, i64)> = HashMap::new();
        for solution in self.solutions.iter() {
            let record = solution.value();
            let stat = per_level.entry(record.level_id).or_insert((0, 0, 0));
            stat.1 += 1;
            if record.player_id == player_id {
                stat.0 += 1;
                stat.2 += record.pipeline_length as i64;
            }
        }

        let mut stats: Vec<PlayerLevelStat> = per_level
            .into_iter()
            .filter(|(_, (mine, _, _))| *mine > 0)
            .map(|(level_id, (mine, all, length))| PlayerLevelStat {
                level_id,
                my_unique_solutions: mine,
                all_unique_solutions: all,
                player_share_percent: mine as f64 * 100.0 / all as f64,
                avg_pipeline_length: length as f64 / mine as f64,
            })
            .collect();
        stats.sort_by_key(|s| s.level_id);
        Ok(stats)
    }

    async fn fetch_leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>> {
        self.enter(LedgerCall::FetchLeaderboard).await?;

        // player -> (solutions, levels, total length)
        let mut per_player: HashMap<PlayerId, (i64, HashSet<LevelId>, i64)> = HashMap::new();
        for solution in self.solutions.iter() {
            let record = solution.value();
            let row = per_player
                .entry(record.player_id)
                .or_insert_with(|| (0, HashSet::new(), 0));
            row.0 += 1;
            row.1.insert(record.level_id);
            row.2 += record.pipeline_length as i64;
        }

        let mut entries: Vec<LeaderboardEntry> = per_player
            .into_iter()
            .map(|(player_id, (solutions, levels, length))| LeaderboardEntry {
                player_id,
                username: self.username_of(player_id),
                unique_solutions: solutions,
                unique_levels_completed: levels.len() as i64,
                total_pipeline_length: length,
                respect: solutions * 5,
                updated_at: None,
            })
            .collect();
        entries.sort_by(|a, b| {
            b.unique_solutions
                .cmp(&a.unique_solutions)
                .then_with(|| a.username.cmp(&b.username))
        });
        entries.truncate(limit);
        Ok(entries)
    }

    async fn fetch_player_economy(&self, player_id: PlayerId) -> Result<EconomySnapshot> {
        self.enter(LedgerCall::FetchPlayerEconomy).await?;
        Ok(self.economy_of(player_id))
    }
}
