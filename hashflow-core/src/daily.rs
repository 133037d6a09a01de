//! Date-seeded daily challenge levels.
//!
//! Daily levels are never stored. The same `(date, difficulty)` pair always
//! regenerates the same three levels.

use chrono::{Datelike, NaiveDate};

use crate::generator::conveyor_length_for;
use crate::types::{DailyDifficulty, Level, LevelId};

/// Lowest daily level ID.
pub const DAILY_ID_BASE: LevelId = 10_000;
/// Levels per difficulty per day.
pub const DAILY_LEVEL_COUNT: usize = 3;

const WORD: u64 = 0xFFFF_FFFF;

fn shl(value: u32, bits: i64) -> u32 {
    ((u64::from(value) << bits.clamp(0, 31)) & WORD) as u32
}

fn seed_offset(difficulty: DailyDifficulty) -> i64 {
    match difficulty {
        DailyDifficulty::Easy => 0,
        DailyDifficulty::Normal => 1_000,
        DailyDifficulty::Hard => 2_000,
    }
}

fn id_offset(difficulty: DailyDifficulty) -> LevelId {
    match difficulty {
        DailyDifficulty::Easy => 0,
        DailyDifficulty::Normal => 100,
        DailyDifficulty::Hard => 200,
    }
}

/// Stable ID of daily level `index` for a difficulty.
pub fn daily_level_id(difficulty: DailyDifficulty, index: usize) -> LevelId {
    DAILY_ID_BASE + id_offset(difficulty) + index as LevelId
}

/// `(input, target, reward)` for one daily seed.
fn derive(difficulty: DailyDifficulty, seed: i64) -> (u32, u32, i32) {
    match difficulty {
        DailyDifficulty::Easy => {
            let input = ((seed * 37).rem_euclid(200) + 10) as u32;
            let shift = seed.rem_euclid(3) + 1;
            (input, shl(input, shift), 20)
        }
        DailyDifficulty::Normal => {
            let input = ((seed * 73).rem_euclid(5_000) + 100) as u32;
            let mask = ((seed * 19).rem_euclid(255) + 1) as u32;
            let shift = seed.rem_euclid(4) + 1;
            (input, shl(input ^ mask, shift), 40)
        }
        DailyDifficulty::Hard => {
            let input = ((seed * 113).rem_euclid(50_000) + 1_000) as u32;
            let mask1 = (seed * 31).rem_euclid(0xFFFF) as u32;
            let mask2 = (seed * 47).rem_euclid(0xFFFF_FFFF) as u32;
            let shift1 = seed.rem_euclid(5) + 1;
            let shift2 = (seed / 3).rem_euclid(5) + 1;
            let step = shl(input ^ mask1, shift1) ^ mask2;
            (input, shl(step, shift2), 100)
        }
    }
}

fn description_for(difficulty: DailyDifficulty, index: usize) -> &'static str {
    match (difficulty, index) {
        (DailyDifficulty::Easy, 0) => "Warm-up: reach the target in a few simple steps.",
        (DailyDifficulty::Easy, 1) => "A bit harder: play with the mask and the shift.",
        (DailyDifficulty::Easy, 2) => "Final easy one: lock in the mechanics.",
        (DailyDifficulty::Normal, 0) => "Normal mode begins: bigger numbers, think carefully.",
        (DailyDifficulty::Normal, 1) => "XOR + ShiftLeft combination. Watch the trace.",
        (DailyDifficulty::Normal, 2) => "Tight node limit: optimise the chain.",
        (DailyDifficulty::Hard, 0) => "Reconnaissance: big numbers, limited nodes.",
        (DailyDifficulty::Hard, 1) => "Feel how a GPU thinks halfway to SHA-256.",
        (DailyDifficulty::Hard, 2) => "Hardcore: mindless brute force will not help.",
        _ => "Daily challenge: build the chain and hit the target.",
    }
}

/// The three daily levels for `date` and `difficulty`.
pub fn daily_levels(date: NaiveDate, difficulty: DailyDifficulty) -> Vec<Level> {
    let day_of_year = i64::from(date.ordinal());
    let base_seed = day_of_year + seed_offset(difficulty);

    (0..DAILY_LEVEL_COUNT)
        .map(|index| {
            let id = daily_level_id(difficulty, index);
            let seed = base_seed + index as i64 * 17;
            let (input, target, reward_respect) = derive(difficulty, seed);

            Level {
                id,
                name: format!(
                    "Day {}: {} {}/{}",
                    day_of_year,
                    difficulty.display_name(),
                    index + 1,
                    DAILY_LEVEL_COUNT
                ),
                description: description_for(difficulty, index).to_string(),
                input,
                target,
                reward_respect,
                conveyor_length: conveyor_length_for(id),
            }
        })
        .collect()
}

/// Position of a daily level within its day's set, if `id` is a daily ID.
pub fn daily_index(id: LevelId) -> Option<(DailyDifficulty, usize)> {
    DailyDifficulty::ALL.into_iter().find_map(|difficulty| {
        let first = daily_level_id(difficulty, 0);
        let offset = id - first;
        (0..DAILY_LEVEL_COUNT as LevelId)
            .contains(&offset)
            .then_some((difficulty, offset as usize))
    })
}
