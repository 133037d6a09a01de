//! Per-player game session.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info, warn};

use hashflow_core::Level;
use hashflow_ledger::{
    LedgerError, MintRequest, NftMinter, PlayerId, RemoteLedger, ResourceConsumption, Result,
};

use crate::config::SessionConfig;
use crate::economy::EconomyState;
use crate::progress::PlayerProgress;
use crate::progression::ProgressionEngine;
use crate::run::{RunCoordinator, RunError};
use crate::stats::{StatsCache, StatsSnapshot};

/// One player's session: progression, balances and stats over a ledger.
///
/// Cheap to clone. Clones share all state.
#[derive(Clone)]
pub struct GameSession {
    player_id: PlayerId,
    config: Arc<SessionConfig>,
    ledger: Arc<dyn RemoteLedger>,
    minter: Option<Arc<dyn NftMinter>>,
    engine: Arc<RwLock<ProgressionEngine>>,
    economy: Arc<RwLock<EconomyState>>,
    stats: Arc<StatsCache>,
}

impl GameSession {
    /// Create a session with fresh progress.
    pub fn new(player_id: PlayerId, config: SessionConfig, ledger: Arc<dyn RemoteLedger>) -> Self {
        let engine = ProgressionEngine::new(config.progression.clone());
        Self {
            player_id,
            config: Arc::new(config),
            ledger,
            minter: None,
            engine: Arc::new(RwLock::new(engine)),
            economy: Arc::new(RwLock::new(EconomyState::default())),
            stats: Arc::new(StatsCache::new()),
        }
    }

    /// Mint an NFT for every unique solution.
    pub fn with_minter(mut self, minter: Arc<dyn NftMinter>) -> Self {
        self.minter = Some(minter);
        self
    }

    /// Start from previously saved local progress.
    pub fn with_progress(mut self, progress: PlayerProgress) -> Self {
        let engine = ProgressionEngine::with_progress(self.config.progression.clone(), progress);
        self.engine = Arc::new(RwLock::new(engine));
        self
    }

    pub fn player_id(&self) -> PlayerId {
        self.player_id
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn ledger(&self) -> &dyn RemoteLedger {
        self.ledger.as_ref()
    }

    /// Read access to the progression engine.
    pub async fn progression(&self) -> RwLockReadGuard<'_, ProgressionEngine> {
        self.engine.read().await
    }

    /// Write access to the progression engine.
    pub async fn progression_mut(&self) -> RwLockWriteGuard<'_, ProgressionEngine> {
        self.engine.write().await
    }

    pub async fn economy(&self) -> EconomyState {
        *self.economy.read().await
    }

    pub async fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot().await
    }

    /// Bring the session up to date at launch.
    ///
    /// Syncs progress with the ledger first, so a fresh server snapshot
    /// counts as recent progress before the idle check runs. Network
    /// failures are logged and never block play. Returns the narrowing
    /// advisory, if the frontier moved.
    pub async fn bootstrap(&self, now: DateTime<Utc>) -> Option<String> {
        if let Err(e) = self.sync_progress(now).await {
            warn!(player_id = %self.player_id, error = %e, "Progress sync failed");
        }

        let advisory = {
            let mut engine = self.engine.write().await;
            engine.reset_daily_meta_if_needed(now);
            engine.adjust_level_range_if_needed(now).map(str::to_string)
        };

        if let Err(e) = self.refresh_economy().await {
            warn!(player_id = %self.player_id, error = %e, "Economy refresh failed");
        }
        self.refresh_stats_logged(false).await;

        info!(
            player_id = %self.player_id,
            ledger = self.ledger.id(),
            narrowed = advisory.is_some(),
            "Session ready"
        );
        advisory
    }

    /// Pull the server snapshot, or push ours when the server has none.
    ///
    /// A player without a session is skipped silently.
    pub async fn sync_progress(&self, now: DateTime<Utc>) -> Result<()> {
        match self.ledger.fetch_player_progress(self.player_id).await {
            Ok(Some(snapshot)) => {
                self.engine.write().await.apply_remote_snapshot(&snapshot, now);
                Ok(())
            }
            Ok(None) => {
                debug!(player_id = %self.player_id, "No remote progress, uploading local snapshot");
                self.upload_progress().await
            }
            Err(LedgerError::NotAuthenticated) => {
                debug!(player_id = %self.player_id, "Skipping progress sync without a session");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Upload the campaign snapshot.
    pub async fn upload_progress(&self) -> Result<()> {
        let (completed, highest) = self.engine.read().await.snapshot();
        self.ledger
            .upsert_player_progress(self.player_id, &completed, highest)
            .await?;
        debug!(
            player_id = %self.player_id,
            completed = completed.len(),
            highest,
            "Progress uploaded"
        );
        Ok(())
    }

    /// Re-fetch balances from the ledger.
    pub async fn refresh_economy(&self) -> Result<EconomyState> {
        let snapshot = self.ledger.fetch_player_economy(self.player_id).await?;
        let mut economy = self.economy.write().await;
        economy.apply_snapshot(&snapshot);
        Ok(*economy)
    }

    /// Refresh the stats cache. See [`StatsCache::refresh`].
    pub async fn refresh_stats(&self, force: bool) -> Result<bool> {
        self.stats.refresh(self.ledger.as_ref(), self.player_id, force).await
    }

    pub(crate) async fn refresh_stats_logged(&self, force: bool) {
        match self.refresh_stats(force).await {
            Ok(_) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => warn!(player_id = %self.player_id, error = %e, "Stats refresh failed"),
        }
    }

    pub(crate) async fn refresh_economy_logged(&self) {
        if let Err(e) = self.refresh_economy().await {
            if !e.is_cancelled() {
                warn!(player_id = %self.player_id, error = %e, "Economy refresh failed");
            }
        }
    }

    /// Charge `cost` and take the remaining balances the ledger reports.
    ///
    /// An unsuccessful charge is a normal outcome, not an error.
    pub async fn charge(&self, cost: i64) -> Result<ResourceConsumption> {
        let consumption = self.ledger.consume_run_resources(self.player_id, cost).await?;
        self.economy.write().await.apply_consumption(&consumption);
        debug!(
            player_id = %self.player_id,
            cost,
            success = consumption.success,
            moves = consumption.remaining_moves,
            credits = consumption.remaining_credits,
            "Charged"
        );
        Ok(consumption)
    }

    /// Open a level for play at `now`.
    pub async fn open_level(
        &self,
        level: Level,
        now: DateTime<Utc>,
    ) -> std::result::Result<RunCoordinator, RunError> {
        if !self.engine.read().await.can_play(level.id, now) {
            return Err(RunError::Locked(level.id));
        }
        Ok(RunCoordinator::new(self.clone(), level))
    }

    /// Request a mint in the background. Failures are only logged.
    pub(crate) fn spawn_mint(&self, request: MintRequest) {
        let Some(minter) = self.minter.clone() else {
            return;
        };
        tokio::spawn(async move {
            if let Err(e) = minter.mint(&request).await {
                warn!(
                    level_id = request.level_id,
                    hash = %request.pipeline_hash,
                    error = %e,
                    "Mint failed"
                );
            }
        });
    }
}
