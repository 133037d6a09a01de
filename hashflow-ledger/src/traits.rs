//! Core traits for remote ledgers.
//!
//! This module defines the `RemoteLedger` trait: the boundary between the
//! game session and the backend that charges runs, registers unique
//! solutions and stores progress snapshots.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use hashflow_core::{LevelId, PipelineFingerprint};

/// Player identifier as issued by the auth provider.
pub type PlayerId = Uuid;

/// Error types for ledger operations.
///
/// The set is closed. Player-facing text comes from [`LedgerError::user_message`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LedgerError {
    /// No session, or the session was rejected
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Transport failure
    #[error("Network error: {0}")]
    Network(String),

    /// Request was superseded by a newer one
    #[error("Request cancelled")]
    Cancelled,

    /// Request exceeded its deadline
    #[error("Request timed out")]
    Timeout,

    /// Rate limited by the backend
    #[error("Rate limited, retry after {retry_after_ms:?}ms")]
    RateLimited { retry_after_ms: Option<u64> },

    /// Backend answered with a non-success status
    #[error("Rejected with HTTP {status}: {body}")]
    Rejected { status: u16, body: String },

    /// Payload could not be decoded
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Ledger is not configured or disabled
    #[error("Ledger unavailable: {0}")]
    Unavailable(String),
}

impl LedgerError {
    /// Text to show the player. Cancelled requests show nothing.
    pub fn user_message(&self) -> Option<String> {
        let message = match self {
            LedgerError::Cancelled => return None,
            LedgerError::NotAuthenticated => "Sign in to keep playing.",
            LedgerError::Network(_) => "No connection to the server. Try again.",
            LedgerError::Timeout => "The server took too long to answer. Try again.",
            LedgerError::RateLimited { .. } => "Too many requests. Wait a moment.",
            LedgerError::Rejected { .. } => "Service error. Try again later.",
            LedgerError::MalformedResponse(_) => "Service error. Try again later.",
            LedgerError::Unavailable(_) => "The service is unavailable right now.",
        };
        Some(message.to_string())
    }

    /// Whether the error only means a newer request replaced this one.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, LedgerError::Cancelled)
    }
}

/// Result type for ledger operations.
pub type Result<T> = std::result::Result<T, LedgerError>;

/// How widely a pipeline hash is deduplicated.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExclusivityMode {
    /// At most once per player
    #[default]
    Open,
    /// At most once across all players
    Exclusive,
}

impl fmt::Display for ExclusivityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusivityMode::Open => write!(f, "open"),
            ExclusivityMode::Exclusive => write!(f, "exclusive"),
        }
    }
}

/// Inputs to the server-side run cost calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCostRequest {
    pub level_id: LevelId,
    pub nodes_count: usize,
    pub pipeline_hash: String,
    /// Hash of the player's previous run on this level
    pub last_pipeline_hash: Option<String>,
    pub level_tier: String,
}

/// Outcome of charging a run.
///
/// `success == false` is the normal "out of moves and credits" answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceConsumption {
    pub success: bool,
    pub remaining_moves: i64,
    pub remaining_credits: i64,
}

/// A solution submitted for at-most-once registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UniqueSolutionRecord {
    pub player_id: PlayerId,
    pub level_id: LevelId,
    pub pipeline_hash: String,
    /// Canonical form that produced `pipeline_hash`
    pub pipeline_raw: String,
    pub pipeline_length: usize,
}

impl UniqueSolutionRecord {
    /// Build a record from a pipeline fingerprint.
    pub fn new(player_id: PlayerId, level_id: LevelId, fingerprint: &PipelineFingerprint) -> Self {
        Self {
            player_id,
            level_id,
            pipeline_hash: fingerprint.hash.clone(),
            pipeline_raw: fingerprint.raw_canonical_form.clone(),
            pipeline_length: fingerprint.length,
        }
    }
}

/// Server copy of a player's campaign progress.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressSnapshot {
    #[serde(rename = "completed_levels")]
    pub completed_level_ids: Vec<LevelId>,
    pub highest_unlocked_level_id: LevelId,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Server-side balances.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EconomySnapshot {
    pub daily_moves_left: i64,
    pub credit_balance: i64,
}

impl EconomySnapshot {
    /// Daily moves granted to a player without an economy row.
    pub const DEFAULT_DAILY_MOVES: i64 = 50;
}

impl Default for EconomySnapshot {
    fn default() -> Self {
        Self {
            daily_moves_left: Self::DEFAULT_DAILY_MOVES,
            credit_balance: 0,
        }
    }
}

/// Per-level solution statistics for one player.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlayerLevelStat {
    pub level_id: LevelId,
    pub my_unique_solutions: i64,
    pub all_unique_solutions: i64,
    #[serde(default)]
    pub player_share_percent: f64,
    #[serde(default)]
    pub avg_pipeline_length: f64,
}

/// Leaderboard row, ranked by unique solutions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub player_id: PlayerId,
    pub username: String,
    pub unique_solutions: i64,
    pub unique_levels_completed: i64,
    pub total_pipeline_length: i64,
    pub respect: i64,
    pub updated_at: Option<DateTime<Utc>>,
}

/// Core trait for remote ledgers.
///
/// Every call is idempotent on the server except
/// [`consume_run_resources`](RemoteLedger::consume_run_resources), which must
/// be issued exactly once per run.
#[async_trait]
pub trait RemoteLedger: Send + Sync {
    /// Ledger identifier for logs.
    fn id(&self) -> &str;

    /// Price a run.
    async fn calculate_run_cost(&self, player_id: PlayerId, request: &RunCostRequest) -> Result<i64>;

    /// Charge a run against moves and credits.
    async fn consume_run_resources(&self, player_id: PlayerId, cost: i64) -> Result<ResourceConsumption>;

    /// Atomically insert a pipeline hash if absent. `true` means newly inserted.
    async fn record_unique_solution(&self, record: &UniqueSolutionRecord) -> Result<bool>;

    /// Load the stored progress snapshot, if any.
    async fn fetch_player_progress(&self, player_id: PlayerId) -> Result<Option<ProgressSnapshot>>;

    /// Replace the stored progress snapshot.
    async fn upsert_player_progress(
        &self,
        player_id: PlayerId,
        completed_level_ids: &[LevelId],
        highest_unlocked_level_id: LevelId,
    ) -> Result<()>;

    /// Unique solution count per level across all players.
    async fn fetch_level_unique_solution_counts(&self) -> Result<HashMap<LevelId, i64>>;

    /// Per-level statistics for one player.
    async fn fetch_player_level_stats(&self, player_id: PlayerId) -> Result<Vec<PlayerLevelStat>>;

    /// Top players by unique solutions.
    async fn fetch_leaderboard(&self, limit: usize) -> Result<Vec<LeaderboardEntry>>;

    /// Current balances. A player without a row gets the defaults.
    async fn fetch_player_economy(&self, player_id: PlayerId) -> Result<EconomySnapshot>;
}
