//! Per-player progress state.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use hashflow_core::LevelId;

/// Per-level run statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LevelStats {
    /// Every charged run, hit or miss
    pub attempts: u32,
    /// Uniquely registered completions only
    pub completions: u32,
    pub thinking_units: u64,
    /// Largest result any run produced
    pub max_value: u32,
}

/// Everything the progression engine owns for one player.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProgress {
    pub total_respect: i64,
    pub completed_level_ids: BTreeSet<LevelId>,
    pub highest_unlocked_level_id: LevelId,
    pub current_top_level_id: LevelId,
    pub last_progress_date: Option<DateTime<Utc>>,
    pub tried_solution_hashes: BTreeMap<LevelId, BTreeSet<String>>,
    pub level_history: BTreeMap<LevelId, Vec<String>>,
    pub level_stats: BTreeMap<LevelId, LevelStats>,

    /// Daily difficulties finished on `last_daily_date`
    pub completed_daily_difficulties: BTreeSet<String>,
    /// Daily level IDs finished on `last_daily_date`
    pub completed_daily_level_ids: BTreeSet<LevelId>,
    pub last_daily_date: Option<DateTime<Utc>>,

    pub bonus_points: i64,
    pub last_bonus_reset_date: Option<DateTime<Utc>>,
    pub hardcore_mode: bool,
}

impl PlayerProgress {
    /// Fresh progress with the frontier at the top of the starter window.
    pub fn new(starter_top: LevelId) -> Self {
        Self {
            total_respect: 0,
            completed_level_ids: BTreeSet::new(),
            highest_unlocked_level_id: starter_top,
            current_top_level_id: starter_top,
            last_progress_date: None,
            tried_solution_hashes: BTreeMap::new(),
            level_history: BTreeMap::new(),
            level_stats: BTreeMap::new(),
            completed_daily_difficulties: BTreeSet::new(),
            completed_daily_level_ids: BTreeSet::new(),
            last_daily_date: None,
            bonus_points: 0,
            last_bonus_reset_date: None,
            hardcore_mode: false,
        }
    }

    /// Rank derived from respect.
    pub fn rank(&self) -> PlayerRank {
        PlayerRank::for_respect(self.total_respect)
    }
}

/// Player rank by total respect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlayerRank {
    Newbie,
    BitTinkerer,
    GpuMind,
    AsicBrain,
    ShaMaster,
}

impl PlayerRank {
    pub fn for_respect(respect: i64) -> Self {
        match respect {
            i64::MIN..=99 => PlayerRank::Newbie,
            100..=299 => PlayerRank::BitTinkerer,
            300..=799 => PlayerRank::GpuMind,
            800..=1499 => PlayerRank::AsicBrain,
            _ => PlayerRank::ShaMaster,
        }
    }
}

impl fmt::Display for PlayerRank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PlayerRank::Newbie => "Newbie",
            PlayerRank::BitTinkerer => "Bit Tinkerer",
            PlayerRank::GpuMind => "GPU Mind",
            PlayerRank::AsicBrain => "ASIC Brain",
            PlayerRank::ShaMaster => "SHA-256 Master",
        };
        f.write_str(name)
    }
}

/// Badge for the number of distinct solutions found on a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AchievementTier {
    Achievement,
    Mega,
    Legend,
}

impl AchievementTier {
    /// Largest tier whose threshold `count` meets.
    pub fn for_count(count: usize) -> Option<Self> {
        [AchievementTier::Legend, AchievementTier::Mega, AchievementTier::Achievement]
            .into_iter()
            .find(|tier| count >= tier.threshold())
    }

    /// Tier whose threshold is exactly `count`.
    pub fn reached_at(count: usize) -> Option<Self> {
        Self::for_count(count).filter(|tier| tier.threshold() == count)
    }

    pub fn threshold(&self) -> usize {
        match self {
            AchievementTier::Achievement => 3,
            AchievementTier::Mega => 10,
            AchievementTier::Legend => 100,
        }
    }

    /// Announcement shown when the tier is reached.
    pub fn message(&self) -> &'static str {
        match self {
            AchievementTier::Achievement => "Achievement! 3 unique solutions.",
            AchievementTier::Mega => "Mega achievement! 10 variations of SHA magic.",
            AchievementTier::Legend => "Legend! 100 solutions. The conveyors bow to you.",
        }
    }
}
