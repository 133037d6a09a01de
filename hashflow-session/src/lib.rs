//! Per-player HashFlow session.
//!
//! - [`ProgressionEngine`]: owns [`PlayerProgress`] and is the only thing
//!   that mutates it (unlocking, daily clocks, adaptive narrowing, snapshots)
//! - [`RunCoordinator`]: one open level; charges, evaluates and registers
//!   runs with the ledger, one at a time
//! - [`GameSession`]: ties both to a [`hashflow_ledger::RemoteLedger`] and
//!   caches balances and stats
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use chrono::Utc;
//! use hashflow_core::{generator, Operation};
//! use hashflow_ledger::InMemoryLedger;
//! use hashflow_session::{GameSession, SessionConfig};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let session = GameSession::new(uuid::Uuid::new_v4(), SessionConfig::default(), Arc::new(InMemoryLedger::new()));
//! session.bootstrap(Utc::now()).await;
//!
//! let level = session.open_level(generator::level_for(1), Utc::now()).await?;
//! level.push(Operation::shift_left(2)).await?;
//! level.push(Operation::xor(92)).await?;
//! let outcome = level.run(Utc::now()).await?;
//! println!("{:?}", outcome.notice());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod economy;
pub mod progress;
pub mod progression;
pub mod run;
pub mod session;
pub mod stats;

pub use config::{ConfigError, LedgerConfig, ProgressionConfig, RunConfig, SessionConfig};
pub use economy::EconomyState;
pub use progress::{AchievementTier, LevelStats, PlayerProgress, PlayerRank};
pub use progression::{CompletionAward, LevelState, ProgressionEngine, NARROWING_MESSAGE};
pub use run::{HintOutcome, RunCoordinator, RunError, RunOutcome, DUPLICATE_NOTICE};
pub use session::GameSession;
pub use stats::{StatsCache, StatsSnapshot, LEADERBOARD_LIMIT};
