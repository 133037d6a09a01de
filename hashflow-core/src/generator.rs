//! Deterministic campaign level generation.
//!
//! Every campaign level is a pure function of its ID. The mapping must stay
//! bit-for-bit stable: recorded solutions are only meaningful against the
//! exact input/target pair the generator produces.

use std::ops::RangeInclusive;
use std::sync::OnceLock;

use crate::types::{Level, LevelCategory, LevelId};

/// First campaign level ID.
pub const FIRST_LEVEL_ID: LevelId = 1;
/// Last campaign level ID.
pub const LAST_LEVEL_ID: LevelId = 1000;

/// Generation parameters shared by a contiguous ID range.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tier {
    /// IDs covered by this tier
    pub ids: RangeInclusive<LevelId>,
    /// Shift amounts the tier draws from
    pub shift_range: RangeInclusive<u32>,
    /// Reward floor
    pub base_reward: i32,
    /// Reward spread (`base + id mod spread`)
    pub reward_spread: i32,
    /// Default level description
    pub description_hint: &'static str,
}

impl Tier {
    /// Number of shift values in the tier's range.
    pub fn shift_span(&self) -> u32 {
        (self.shift_range.end() + 1)
            .saturating_sub(*self.shift_range.start())
            .max(1)
    }
}

/// Tier for a level ID. IDs outside the first four tiers use the last one.
pub fn tier_for(id: LevelId) -> Tier {
    match id {
        1..=100 => Tier {
            ids: 1..=100,
            shift_range: 1..=4,
            base_reward: 40,
            reward_spread: 20,
            description_hint: "Learning to combine XOR and Shift.",
        },
        101..=300 => Tier {
            ids: 101..=300,
            shift_range: 1..=5,
            base_reward: 80,
            reward_spread: 30,
            description_hint: "Fewer nodes, more precision.",
        },
        301..=600 => Tier {
            ids: 301..=600,
            shift_range: 2..=6,
            base_reward: 130,
            reward_spread: 40,
            description_hint: "Working with masks and shifts.",
        },
        601..=900 => Tier {
            ids: 601..=900,
            shift_range: 3..=6,
            base_reward: 180,
            reward_spread: 50,
            description_hint: "Minimum blocks, maximum control.",
        },
        _ => Tier {
            ids: 901..=LAST_LEVEL_ID,
            shift_range: 4..=7,
            base_reward: 250,
            reward_spread: 80,
            description_hint: "Only for those who think like an ASIC.",
        },
    }
}

/// Conveyor slots available for a level.
pub fn conveyor_length_for(id: LevelId) -> i32 {
    match id {
        1..=100 => 6,
        101..=300 => 8,
        _ => 10,
    }
}

/// Raw generation parameters of a level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LevelSeed {
    pub base: u32,
    pub mask: u32,
    pub shift: u32,
}

impl LevelSeed {
    /// Derive the parameters for an ID.
    pub fn for_id(id: LevelId) -> Self {
        let tier = tier_for(id);
        let wide = i128::from(id);
        let base = ((wide * 37).rem_euclid(10_000) + 10) as u32;
        let mask = ((wide * 91).rem_euclid(255) + 1) as u32;
        let offset = id.rem_euclid(i64::from(tier.shift_span())) as u32;
        let shift = (tier.shift_range.start() + offset).min(31);
        Self { base, mask, shift }
    }

    /// `((base << shift) ^ mask) mod 2^32`
    pub fn target(&self) -> u32 {
        let shifted = ((u64::from(self.base) << self.shift) & 0xFFFF_FFFF) as u32;
        shifted ^ self.mask
    }
}

/// Generate campaign level `id`.
pub fn level_for(id: LevelId) -> Level {
    let tier = tier_for(id);
    let seed = LevelSeed::for_id(id);

    Level {
        id,
        name: name_for(id),
        description: description_for(id, &tier, &seed),
        input: seed.base,
        target: seed.target(),
        reward_respect: tier.base_reward + id.rem_euclid(i64::from(tier.reward_spread)) as i32,
        conveyor_length: conveyor_length_for(id),
    }
}

fn name_for(id: LevelId) -> String {
    const ASIC_TITLES: [&str; 5] = [
        "ASIC Trial",
        "GPU Dream",
        "Satoshi Mindset",
        "Hash Oracle",
        "Quantum Shift",
    ];
    const STAGE_TITLES: [&str; 6] = [
        "Warp Boost",
        "Shader Pulse",
        "Tensor Flux",
        "Memory Sweep",
        "Voltage Drift",
        "Pipeline Surge",
    ];
    let medium = (LevelCategory::EASY_COUNT + 1)..=(LevelCategory::EASY_COUNT + LevelCategory::MEDIUM_COUNT);

    match id {
        901..=1000 => format!("{} #{}", ASIC_TITLES[id.rem_euclid(5) as usize], id),
        601..=900 => format!("Hard #{}", id),
        301..=600 => format!("Puzzle #{}", id),
        _ if medium.contains(&id) => {
            let stage = id - LevelCategory::EASY_COUNT;
            let label = STAGE_TITLES[(stage - 1).rem_euclid(6) as usize];
            format!("{} · Stage {}", label, stage)
        }
        _ => format!("Basic level #{}", id),
    }
}

fn description_for(id: LevelId, tier: &Tier, seed: &LevelSeed) -> String {
    if (610..=619).contains(&id) {
        return format!(
            "Series 610: different inputs, shared goal. Mask {}, shift {}.",
            seed.mask, seed.shift
        );
    }
    tier.description_hint.to_string()
}

/// All campaign levels, generated once per process.
pub fn catalog() -> &'static [Level] {
    static CATALOG: OnceLock<Vec<Level>> = OnceLock::new();
    CATALOG.get_or_init(|| {
        let levels: Vec<Level> = (FIRST_LEVEL_ID..=LAST_LEVEL_ID).map(level_for).collect();
        tracing::debug!(count = levels.len(), "Generated level catalog");
        levels
    })
}

/// Look up a campaign level.
pub fn level(id: LevelId) -> Option<&'static Level> {
    if !(FIRST_LEVEL_ID..=LAST_LEVEL_ID).contains(&id) {
        return None;
    }
    catalog().get((id - FIRST_LEVEL_ID) as usize)
}

/// Campaign levels of a category in ascending ID order.
pub fn levels_in(category: LevelCategory) -> impl Iterator<Item = &'static Level> {
    catalog().iter().filter(move |l| l.category() == category)
}

/// The level following `id` within its category.
pub fn next_in_category(id: LevelId) -> Option<&'static Level> {
    let current = level(id)?;
    levels_in(current.category()).find(|l| l.id > id)
}

/// Whether `id` opens its category.
pub fn is_category_opener(id: LevelId) -> bool {
    level(id)
        .and_then(|l| levels_in(l.category()).next())
        .map(|first| first.id == id)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_level_one_matches_tutorial() {
        let level = level_for(1);
        assert_eq!(level.input, 47);
        assert_eq!(level.target, 224);
        assert_eq!(level.reward_respect, 41);
        assert_eq!(level.conveyor_length, 6);
        assert_eq!(level.name, "Basic level #1");
    }

    #[test]
    fn test_known_levels() {
        let cases: [(LevelId, u32, u32, i32); 6] = [
            (2, 84, 535, 42),
            (100, 3710, 7244, 40),
            (101, 3747, 14976, 91),
            (500, 8510, 33943, 150),
            (1000, 7010, 112381, 290),
            (1, 47, 224, 41),
        ];
        for (id, input, target, reward) in cases {
            let level = level_for(id);
            assert_eq!(level.input, input, "input of level {}", id);
            assert_eq!(level.target, target, "target of level {}", id);
            assert_eq!(level.reward_respect, reward, "reward of level {}", id);
        }
    }

    #[test]
    fn test_generation_is_pure() {
        for id in FIRST_LEVEL_ID..=LAST_LEVEL_ID {
            assert_eq!(level_for(id), level_for(id));
        }
        assert_eq!(catalog().len(), 1000);
        assert_eq!(level(1000).map(|l| l.id), Some(1000));
        assert!(level(0).is_none());
        assert!(level(1001).is_none());
    }

    #[test]
    fn test_seed_reaches_target() {
        for id in [1, 77, 300, 301, 615, 999] {
            let seed = LevelSeed::for_id(id);
            let tier = tier_for(id);
            assert!(tier.shift_range.contains(&seed.shift));
            assert_eq!(level_for(id).target, seed.target());
        }
    }

    #[test]
    fn test_names_and_descriptions() {
        assert_eq!(level_for(14).name, "Warp Boost · Stage 1");
        assert_eq!(level_for(19).name, "Pipeline Surge · Stage 6");
        assert_eq!(level_for(400).name, "Puzzle #400");
        assert_eq!(level_for(700).name, "Hard #700");
        assert_eq!(level_for(905).name, "ASIC Trial #905");
        assert!(level_for(612).description.starts_with("Series 610"));
    }

    #[test]
    fn test_extreme_ids_do_not_overflow() {
        for id in [i64::MAX, i64::MIN, i64::MAX / 37 + 1] {
            let seed = LevelSeed::for_id(id);
            assert!((10..10_010).contains(&seed.base));
            assert!((1..=255).contains(&seed.mask));
            assert!(seed.shift <= 31);
            assert_eq!(level_for(id).input, seed.base);
        }
        // Wide arithmetic leaves ordinary IDs unchanged.
        assert_eq!(LevelSeed::for_id(2).base, 84);
    }

    #[test]
    fn test_category_navigation() {
        assert!(is_category_opener(1));
        assert!(is_category_opener(14));
        assert!(is_category_opener(314));
        assert!(!is_category_opener(15));
        assert_eq!(next_in_category(13), None);
        assert_eq!(next_in_category(14).map(|l| l.id), Some(15));
    }
}
