//! HashFlow core game logic.
//!
//! Pure, synchronous building blocks shared by the session layer and the CLI:
//!
//! - **Pipelines**: evaluate XOR / shift-left chains over 32-bit values and
//!   fingerprint them with SHA-256 over a sorted-key canonical form
//! - **Level generation**: the deterministic campaign catalog (IDs 1..=1000)
//!   and date-seeded daily challenges
//! - **Assistant**: candidate palettes and paid hints
//!
//! ## Example
//!
//! ```
//! use hashflow_core::{generator, Operation, Pipeline};
//!
//! let level = generator::level_for(1);
//! let mut pipeline = Pipeline::new();
//! pipeline.push(Operation::shift_left(2)).unwrap();
//! pipeline.push(Operation::xor(92)).unwrap();
//!
//! assert!(pipeline.evaluate(level.input).reaches(level.target));
//! assert!(pipeline.fingerprint().is_some());
//! ```

pub mod assistant;
pub mod daily;
pub mod generator;
pub mod pipeline;
pub mod types;

pub use assistant::{best_shift, hint_for, palette, palette_with_rng, Candidate, Hint};
pub use daily::{daily_index, daily_level_id, daily_levels, DAILY_ID_BASE};
pub use generator::{level, level_for, FIRST_LEVEL_ID, LAST_LEVEL_ID};
pub use pipeline::{
    canonical_form, compute_hash, evaluate, fingerprint, parse_canonical, Evaluation, Pipeline,
    PipelineError, PipelineFingerprint,
};
pub use types::{
    DailyDifficulty, Level, LevelCategory, LevelId, Operation, OperationKind, OperationRecord,
};
