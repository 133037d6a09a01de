//! Remote ledger abstraction for HashFlow.
//!
//! The ledger is the authority for everything a client could cheat on:
//! - run pricing and resource consumption (moves, credits)
//! - at-most-once registration of pipeline hashes
//! - progress snapshots, statistics and the leaderboard
//!
//! Backends:
//! - [`PostgrestLedger`]: Supabase over PostgREST
//! - [`InMemoryLedger`]: tests and offline play
//!
//! Errors form a closed set ([`LedgerError`]); player-facing text is derived
//! from the error kind, never from the message body.

pub mod minting;
pub mod mock;
pub mod postgrest;
pub mod traits;

pub use minting::{EdgeFunctionMinter, MintRequest, MockMinter, NftMinter};
pub use mock::{InMemoryLedger, LedgerCall};
pub use postgrest::{PostgrestLedger, SupabaseEndpoint};
pub use traits::{
    EconomySnapshot, ExclusivityMode, LeaderboardEntry, LedgerError, PlayerId, PlayerLevelStat,
    ProgressSnapshot, RemoteLedger, ResourceConsumption, Result, RunCostRequest,
    UniqueSolutionRecord,
};
