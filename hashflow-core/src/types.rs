//! Core domain types shared by every HashFlow crate.

use serde::{Deserialize, Serialize};
use std::fmt;

#[cfg(feature = "typescript")]
use ts_rs::TS;

/// Identifier of a campaign or daily level.
pub type LevelId = i64;

/// Largest shift amount a pipeline node can carry.
pub const MAX_SHIFT: u8 = 31;

/// A single step of a bit pipeline.
///
/// Serialized in the canonical wire shape `{"op": "...", "value": u32}`
/// (see [`OperationRecord`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "OperationRecord", from = "OperationRecord")]
pub enum Operation {
    /// `current ^ mask`
    Xor(u32),
    /// `(current << bits) mod 2^32`, `bits` in `[0, 31]`
    ShiftLeft(u8),
}

impl Operation {
    /// XOR with the given mask.
    pub fn xor(mask: u32) -> Self {
        Operation::Xor(mask)
    }

    /// Shift left, clamping the amount into `[0, 31]`.
    pub fn shift_left(bits: u32) -> Self {
        let clamped = bits.min(u32::from(MAX_SHIFT)) as u8;
        Operation::ShiftLeft(clamped)
    }

    /// The operation kind.
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Xor(_) => OperationKind::Xor,
            Operation::ShiftLeft(_) => OperationKind::ShiftLeft,
        }
    }

    /// The operation parameter as it appears in the canonical form.
    pub fn value(&self) -> u32 {
        match self {
            Operation::Xor(mask) => *mask,
            Operation::ShiftLeft(bits) => u32::from((*bits).min(MAX_SHIFT)),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operation::Xor(mask) => write!(f, "XOR({})", mask),
            Operation::ShiftLeft(bits) => write!(f, "SHL({})", bits),
        }
    }
}

/// Kind tag of an [`Operation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Xor,
    ShiftLeft,
}

impl OperationKind {
    /// Wire name used in the canonical pipeline form.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Xor => "xor",
            OperationKind::ShiftLeft => "shift_left",
        }
    }
}

/// Flat wire record for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
pub struct OperationRecord {
    pub op: OperationKind,
    pub value: u32,
}

impl From<Operation> for OperationRecord {
    fn from(op: Operation) -> Self {
        Self {
            op: op.kind(),
            value: op.value(),
        }
    }
}

impl From<OperationRecord> for Operation {
    fn from(record: OperationRecord) -> Self {
        match record.op {
            OperationKind::Xor => Operation::xor(record.value),
            OperationKind::ShiftLeft => Operation::shift_left(record.value),
        }
    }
}

/// A puzzle: turn `input` into `target` with a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct Level {
    /// Level ID (1..=1000 campaign, >= 10000 daily)
    #[cfg_attr(feature = "typescript", ts(type = "number"))]
    pub id: LevelId,
    /// Display name
    pub name: String,
    /// Short flavour description
    pub description: String,
    /// Value entering the pipeline
    pub input: u32,
    /// Value the pipeline must produce
    pub target: u32,
    /// Respect awarded by the level
    pub reward_respect: i32,
    /// Number of slots on the conveyor
    pub conveyor_length: i32,
}

impl Level {
    /// Campaign category of this level.
    pub fn category(&self) -> LevelCategory {
        LevelCategory::for_id(self.id)
    }

    /// Whether this is a date-seeded daily challenge level.
    pub fn is_daily(&self) -> bool {
        self.id >= crate::daily::DAILY_ID_BASE
    }

    /// Hand-written lore hint for a few special levels.
    pub fn legend_hint(&self) -> Option<&'static str> {
        match self.id {
            13 => Some("Odd bits whisper about the first escape. Here XOR is not an operation, it is a window."),
            42 => Some("The answer to everything is a combination, not a number. Find the mask that turns 42 into your freedom."),
            256 => Some("Shifting by eight is like breathing vacuum. If you feel the cold, you are close."),
            _ => None,
        }
    }
}

/// Campaign grouping shown in the level browser.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LevelCategory {
    /// Tutorial levels
    Easy,
    /// The medium band
    Medium,
    /// Everything after the medium band
    Asic,
}

impl LevelCategory {
    /// Number of tutorial levels.
    pub const EASY_COUNT: LevelId = 13;
    /// Number of medium levels following the tutorial.
    pub const MEDIUM_COUNT: LevelId = 300;

    /// Category of a campaign level ID.
    pub fn for_id(id: LevelId) -> Self {
        let offset = id - 1;
        if offset < Self::EASY_COUNT {
            LevelCategory::Easy
        } else if offset < Self::EASY_COUNT + Self::MEDIUM_COUNT {
            LevelCategory::Medium
        } else {
            LevelCategory::Asic
        }
    }

    /// Display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            LevelCategory::Easy => "Training",
            LevelCategory::Medium => "Medium",
            LevelCategory::Asic => "ASIC brain",
        }
    }
}

/// Daily challenge difficulty.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "lowercase")]
pub enum DailyDifficulty {
    Easy,
    Normal,
    Hard,
}

impl DailyDifficulty {
    /// All difficulties in menu order.
    pub const ALL: [DailyDifficulty; 3] = [
        DailyDifficulty::Easy,
        DailyDifficulty::Normal,
        DailyDifficulty::Hard,
    ];

    /// Stable key used when recording completion.
    pub fn as_str(&self) -> &'static str {
        match self {
            DailyDifficulty::Easy => "easy",
            DailyDifficulty::Normal => "normal",
            DailyDifficulty::Hard => "hard",
        }
    }

    /// Display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            DailyDifficulty::Easy => "Easy",
            DailyDifficulty::Normal => "Normal",
            DailyDifficulty::Hard => "Hardcore",
        }
    }

    /// Menu description.
    pub fn description(&self) -> &'static str {
        match self {
            DailyDifficulty::Easy => "Warm up and remember what XOR and shift do.",
            DailyDifficulty::Normal => "Now you have to think instead of just tapping.",
            DailyDifficulty::Hard => "Mode: climbing inside a graphics card's head.",
        }
    }
}

impl std::str::FromStr for DailyDifficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "easy" => Ok(DailyDifficulty::Easy),
            "normal" => Ok(DailyDifficulty::Normal),
            "hard" | "hardcore" => Ok(DailyDifficulty::Hard),
            other => Err(format!("unknown daily difficulty: {}", other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shift_is_clamped() {
        assert_eq!(Operation::shift_left(40), Operation::ShiftLeft(31));
        assert_eq!(Operation::shift_left(3).value(), 3);
    }

    #[test]
    fn test_operation_wire_shape() {
        let json = serde_json::to_string(&Operation::xor(92)).unwrap();
        assert_eq!(json, r#"{"op":"xor","value":92}"#);

        let op: Operation = serde_json::from_str(r#"{"op":"shift_left","value":2}"#).unwrap();
        assert_eq!(op, Operation::ShiftLeft(2));
    }

    #[test]
    fn test_level_categories() {
        assert_eq!(LevelCategory::for_id(1), LevelCategory::Easy);
        assert_eq!(LevelCategory::for_id(13), LevelCategory::Easy);
        assert_eq!(LevelCategory::for_id(14), LevelCategory::Medium);
        assert_eq!(LevelCategory::for_id(313), LevelCategory::Medium);
        assert_eq!(LevelCategory::for_id(314), LevelCategory::Asic);
    }

    #[test]
    fn test_daily_difficulty_parse() {
        assert_eq!("Hardcore".parse::<DailyDifficulty>(), Ok(DailyDifficulty::Hard));
        assert!("impossible".parse::<DailyDifficulty>().is_err());
    }
}
