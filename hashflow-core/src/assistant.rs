//! Candidate operations and hints offered to the player.
//!
//! Palette generation is deliberately stochastic. Callers that need
//! reproducible output pass their own seeded [`Rng`].

use std::collections::HashSet;

use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

#[cfg(feature = "typescript")]
use ts_rs::TS;

use crate::types::{Level, LevelId, Operation};

/// XOR options in a palette (the winning mask included).
pub const XOR_OPTIONS: usize = 6;
/// Total options in a palette.
pub const PALETTE_SIZE: usize = 9;
/// Largest shift the assistant proposes.
pub const MAX_SUGGESTED_SHIFT: u32 = 8;
/// Largest shift `best_shift` considers.
pub const BEST_SHIFT_SEARCH_LIMIT: u32 = 12;

/// A proposed next operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    #[cfg_attr(feature = "typescript", ts(type = "{ op: string, value: number }"))]
    pub operation: Operation,
    /// Set only when applying `operation` to the current value was
    /// verified to produce the target
    pub is_winning: bool,
}

impl Candidate {
    /// Build a candidate, verifying it against `current` and `target`.
    pub fn verified(operation: Operation, current: u32, target: u32) -> Self {
        Self {
            operation,
            is_winning: operation.apply(current) == target,
        }
    }

    /// Short palette label.
    pub fn label(&self) -> &'static str {
        match self.operation {
            Operation::Xor(_) => "XOR",
            Operation::ShiftLeft(_) => "SHIFT",
        }
    }
}

/// Shift in `0..=12` whose result lands closest to `target`.
///
/// Ties keep the smallest shift.
pub fn best_shift(current: u32, target: u32) -> u32 {
    let mut best = 0;
    let mut best_diff = u64::MAX;
    for bits in 0..=BEST_SHIFT_SEARCH_LIMIT {
        let shifted = u64::from(Operation::shift_left(bits).apply(current));
        let diff = shifted.abs_diff(u64::from(target));
        if diff < best_diff {
            best_diff = diff;
            best = bits;
        }
    }
    best
}

/// Palette for the current state using the thread-local RNG.
pub fn palette(current: u32, target: u32, level_id: LevelId) -> Vec<Candidate> {
    palette_with_rng(current, target, level_id, &mut rand::thread_rng())
}

/// Palette for the current state.
///
/// Always contains the exact winning XOR `target ^ current`, then XOR
/// variants of it up to [`XOR_OPTIONS`], then shift options around
/// [`best_shift`] up to [`PALETTE_SIZE`]. The result is shuffled.
pub fn palette_with_rng<R: Rng + ?Sized>(
    current: u32,
    target: u32,
    level_id: LevelId,
    rng: &mut R,
) -> Vec<Candidate> {
    let mut options = Vec::with_capacity(PALETTE_SIZE);
    let mut used_masks = HashSet::new();

    let winning = target ^ current;
    options.push(Candidate::verified(Operation::xor(winning), current, target));
    used_masks.insert(winning);

    let variants = [
        winning << 1,
        winning >> 1,
        winning ^ 0x00FF_00FF,
        winning ^ 0xFF00_FF00,
        (target & 0xFFFF_0000) | (current & 0x0000_FFFF),
        winning ^ (level_id & 0xFFFF) as u32,
        rng.gen_range(1..=u32::MAX),
    ];
    for mask in variants {
        if options.len() >= XOR_OPTIONS {
            break;
        }
        if used_masks.insert(mask) {
            options.push(Candidate::verified(Operation::xor(mask), current, target));
        }
    }
    while options.len() < XOR_OPTIONS {
        let mask = rng.gen_range(1..=u32::MAX);
        if used_masks.insert(mask) {
            options.push(Candidate::verified(Operation::xor(mask), current, target));
        }
    }

    let best = best_shift(current, target).clamp(1, MAX_SUGGESTED_SHIFT);
    let shift_seeds = [
        best,
        best.saturating_sub(1).max(1),
        (best + 1).min(MAX_SUGGESTED_SHIFT),
        level_id.rem_euclid(5) as u32 + 1,
    ];
    let mut used_shifts = HashSet::new();
    for bits in shift_seeds {
        if options.len() >= PALETTE_SIZE {
            break;
        }
        if used_shifts.insert(bits) {
            options.push(Candidate::verified(Operation::shift_left(bits), current, target));
        }
    }
    while options.len() < PALETTE_SIZE {
        let bits = rng.gen_range(1..=MAX_SUGGESTED_SHIFT);
        if used_shifts.insert(bits) {
            options.push(Candidate::verified(Operation::shift_left(bits), current, target));
        }
    }

    options.shuffle(rng);
    options
}

/// A paid assistant hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Hint {
    /// XOR the level input with this mask
    Mask(u32),
    /// Shift the current value by this many bits
    Shift(u32),
    /// Start from this value
    Input(u32),
}

impl Hint {
    /// Player-facing text.
    pub fn message(&self) -> String {
        match self {
            Hint::Mask(mask) => format!(
                "Hey, operator! Try XOR with mask {}. Switching off the extra bulbs brings the result closer to the target.",
                mask
            ),
            Hint::Shift(bits) => format!(
                "A shift of {} bits gives a nice trajectory. Give the number on the conveyor that push.",
                bits
            ),
            Hint::Input(value) => format!(
                "Let's start from {}. Enter it and watch the trace.",
                value
            ),
        }
    }
}

/// Hint for the `usage`-th paid request (1-based): mask, shift, input, repeat.
pub fn hint_for(usage: u32, level: &Level, current: u32) -> Hint {
    match usage.saturating_sub(1) % 3 {
        0 => Hint::Mask(level.target ^ level.input),
        1 => Hint::Shift(best_shift(current, level.target)),
        _ => {
            let mask = level.target ^ level.input;
            if mask != 0 {
                Hint::Input(level.target ^ mask)
            } else {
                Hint::Input(level.target)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::generator::level_for;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_best_shift() {
        assert_eq!(best_shift(5, 20), 2);
        assert_eq!(best_shift(7, 7), 0);
        // 47 << 2 = 188 is the closest to 224.
        assert_eq!(best_shift(47, 224), 2);
        // Wrapped values still compare without underflow.
        assert_eq!(best_shift(0x8000_0000, 0), 1);
    }

    #[test]
    fn test_palette_shape() {
        let mut rng = StdRng::seed_from_u64(7);
        let palette = palette_with_rng(47, 224, 1, &mut rng);

        assert_eq!(palette.len(), PALETTE_SIZE);
        let xors = palette
            .iter()
            .filter(|c| matches!(c.operation, Operation::Xor(_)))
            .count();
        assert_eq!(xors, XOR_OPTIONS);

        let masks: HashSet<u32> = palette
            .iter()
            .filter_map(|c| match c.operation {
                Operation::Xor(m) => Some(m),
                _ => None,
            })
            .collect();
        assert_eq!(masks.len(), XOR_OPTIONS);

        for candidate in &palette {
            if let Operation::ShiftLeft(bits) = candidate.operation {
                assert!((1..=8).contains(&bits));
            }
        }
    }

    #[test]
    fn test_palette_contains_verified_winner() {
        let mut rng = StdRng::seed_from_u64(42);
        for (current, target) in [(47, 224), (188, 224), (0, 0), (u32::MAX, 1), (5, 20)] {
            let palette = palette_with_rng(current, target, 3, &mut rng);
            assert!(palette
                .iter()
                .any(|c| c.operation == Operation::xor(target ^ current) && c.is_winning));
            for candidate in &palette {
                assert_eq!(
                    candidate.is_winning,
                    candidate.operation.apply(current) == target,
                    "winning flag must match a re-run of {}",
                    candidate.operation
                );
            }
        }
    }

    #[test]
    fn test_palette_flags_winning_shift() {
        let mut rng = StdRng::seed_from_u64(1);
        let palette = palette_with_rng(5, 20, 10, &mut rng);
        assert!(palette
            .iter()
            .any(|c| c.operation == Operation::ShiftLeft(2) && c.is_winning));
    }

    #[test]
    fn test_hint_cycle() {
        let level = level_for(1);
        assert_eq!(hint_for(1, &level, level.input), Hint::Mask(47 ^ 224));
        assert_eq!(hint_for(2, &level, level.input), Hint::Shift(2));
        assert_eq!(hint_for(3, &level, level.input), Hint::Input(47));
        assert_eq!(hint_for(4, &level, level.input), Hint::Mask(47 ^ 224));
        assert!(hint_for(1, &level, 0).message().contains("207"));
    }
}
