//! Cached solution statistics and leaderboard.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::RwLock;
use tracing::debug;

use hashflow_core::LevelId;
use hashflow_ledger::{LeaderboardEntry, LedgerError, PlayerId, PlayerLevelStat, RemoteLedger, Result};

/// Entries fetched for the leaderboard.
pub const LEADERBOARD_LIMIT: usize = 20;

/// Everything the cache holds at one point in time.
#[derive(Debug, Clone, Default)]
pub struct StatsSnapshot {
    /// Unique solutions per level, across all players
    pub level_counts: HashMap<LevelId, i64>,
    pub player_stats: Vec<PlayerLevelStat>,
    pub leaderboard: Vec<LeaderboardEntry>,
    fetched: bool,
}

impl StatsSnapshot {
    pub fn unique_solutions(&self, level_id: LevelId) -> i64 {
        self.level_counts.get(&level_id).copied().unwrap_or(0)
    }

    pub fn player_stat(&self, level_id: LevelId) -> Option<&PlayerLevelStat> {
        self.player_stats.iter().find(|s| s.level_id == level_id)
    }
}

/// Stats fetched from the ledger.
///
/// Each refresh takes a generation number. A refresh that finishes after a
/// newer one started is dropped with [`LedgerError::Cancelled`] so stale data
/// never overwrites fresh data.
#[derive(Debug, Default)]
pub struct StatsCache {
    snapshot: RwLock<StatsSnapshot>,
    generation: AtomicU64,
}

impl StatsCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current contents.
    pub async fn snapshot(&self) -> StatsSnapshot {
        self.snapshot.read().await.clone()
    }

    /// Fetch counts, player stats and leaderboard concurrently.
    ///
    /// Without `force`, does nothing once the cache has been filled.
    /// Returns whether the cache was updated.
    pub async fn refresh(&self, ledger: &dyn RemoteLedger, player_id: PlayerId, force: bool) -> Result<bool> {
        if !force && self.snapshot.read().await.fetched {
            return Ok(false);
        }

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let (level_counts, player_stats, leaderboard) = futures::try_join!(
            ledger.fetch_level_unique_solution_counts(),
            ledger.fetch_player_level_stats(player_id),
            ledger.fetch_leaderboard(LEADERBOARD_LIMIT),
        )?;

        let mut snapshot = self.snapshot.write().await;
        if self.generation.load(Ordering::SeqCst) != generation {
            debug!(generation, "Dropping stale stats refresh");
            return Err(LedgerError::Cancelled);
        }
        *snapshot = StatsSnapshot {
            level_counts,
            player_stats,
            leaderboard,
            fetched: true,
        };
        debug!(
            generation,
            levels = snapshot.level_counts.len(),
            leaders = snapshot.leaderboard.len(),
            "Stats refreshed"
        );
        Ok(true)
    }
}
