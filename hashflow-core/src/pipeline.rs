//! Bit pipeline evaluation and canonical fingerprints.
//!
//! A pipeline is an ordered list of [`Operation`]s applied to a 32-bit value.
//! Its fingerprint is the SHA-256 of a sorted-key JSON serialization and is
//! the single source of truth for "is this the same solution".

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};

#[cfg(feature = "typescript")]
use ts_rs::TS;

use crate::types::Operation;

const WORD_MASK: u64 = 0xFFFF_FFFF;

/// Error types for pipeline editing and parsing.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    /// Pipeline is frozen while a successful run is being confirmed
    #[error("Pipeline is frozen")]
    Frozen,

    /// No node at the given position
    #[error("No operation at index {index} (pipeline has {len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// Canonical form could not be parsed
    #[error("Malformed canonical pipeline: {0}")]
    MalformedCanonical(String),
}

impl Operation {
    /// Apply this operation to a 32-bit value.
    ///
    /// Shifts are computed in 64 bits and reduced modulo 2^32.
    pub fn apply(self, value: u32) -> u32 {
        match self {
            Operation::Xor(mask) => value ^ mask,
            Operation::ShiftLeft(_) => {
                let bits = self.value();
                ((u64::from(value) << bits) & WORD_MASK) as u32
            }
        }
    }
}

/// Result of running a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Evaluation {
    /// Final value
    pub result: u32,
    /// One line for the input plus one per step
    pub trace: Vec<String>,
}

impl Evaluation {
    /// Whether the run produced the target.
    pub fn reaches(&self, target: u32) -> bool {
        self.result == target
    }

    /// Closing trace line for a run against a target.
    pub fn verdict(&self, target: u32) -> String {
        if self.reaches(target) {
            "Target reached!".to_string()
        } else {
            format!("Target: {}, result: {}", target, self.result)
        }
    }
}

/// Run `ops` over `input`.
pub fn evaluate(input: u32, ops: &[Operation]) -> Evaluation {
    let mut current = input;
    let mut trace = Vec::with_capacity(ops.len() + 1);
    trace.push(format!("Input: {}", current));

    for op in ops {
        let before = current;
        current = op.apply(before);
        let line = match op {
            Operation::Xor(mask) => format!("XOR(mask: {}): {} ^ {} = {}", mask, before, mask, current),
            Operation::ShiftLeft(_) => {
                let bits = op.value();
                format!("ShiftLeft(by: {}): {} << {} = {}", bits, before, bits, current)
            }
        };
        trace.push(line);
    }

    tracing::debug!(input, result = current, steps = ops.len(), "Evaluated pipeline");

    Evaluation {
        result: current,
        trace,
    }
}

/// Content fingerprint of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "typescript", derive(TS))]
#[cfg_attr(feature = "typescript", ts(export))]
#[serde(rename_all = "camelCase")]
pub struct PipelineFingerprint {
    /// Sorted-key JSON that was hashed
    pub raw_canonical_form: String,
    /// Lowercase hex SHA-256 of `raw_canonical_form`
    pub hash: String,
    /// Number of operations
    pub length: usize,
}

/// Canonical JSON form: `{"operations":[{"op":..,"value":..},..]}`.
///
/// Keys are inserted in sorted order so the output is sorted whichever map
/// implementation `serde_json` was built with.
pub fn canonical_form(ops: &[Operation]) -> String {
    let operations: Vec<Value> = ops
        .iter()
        .map(|op| json!({ "op": op.kind().as_str(), "value": op.value() }))
        .collect();
    json!({ "operations": operations }).to_string()
}

/// Fingerprint a pipeline. Empty pipelines have nothing to submit.
pub fn fingerprint(ops: &[Operation]) -> Option<PipelineFingerprint> {
    if ops.is_empty() {
        return None;
    }

    let raw = canonical_form(ops);
    let hash = compute_hash(raw.as_bytes());

    Some(PipelineFingerprint {
        raw_canonical_form: raw,
        hash,
        length: ops.len(),
    })
}

#[derive(Deserialize)]
struct CanonicalPipeline {
    operations: Vec<Operation>,
}

/// Parse a canonical form back into its operations.
pub fn parse_canonical(raw: &str) -> Result<Vec<Operation>, PipelineError> {
    serde_json::from_str::<CanonicalPipeline>(raw)
        .map(|p| p.operations)
        .map_err(|e| PipelineError::MalformedCanonical(e.to_string()))
}

/// Compute SHA256 hash of content as lowercase hex.
pub fn compute_hash(content: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(content);
    hex::encode(hasher.finalize())
}

/// An editable pipeline.
///
/// Edits are rejected while the pipeline is frozen, which happens between a
/// local target match and the ledger's verdict on it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pipeline {
    ops: Vec<Operation>,
    frozen: bool,
}

impl Pipeline {
    /// Create an empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create from existing operations.
    pub fn from_ops(ops: Vec<Operation>) -> Self {
        Self { ops, frozen: false }
    }

    /// Operations in order.
    pub fn ops(&self) -> &[Operation] {
        &self.ops
    }

    /// Number of nodes.
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Whether there are no nodes.
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Whether edits are currently rejected.
    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Reject further edits.
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    /// Accept edits again.
    pub fn unfreeze(&mut self) {
        self.frozen = false;
    }

    fn ensure_editable(&self) -> Result<(), PipelineError> {
        if self.frozen {
            Err(PipelineError::Frozen)
        } else {
            Ok(())
        }
    }

    fn ensure_index(&self, index: usize) -> Result<(), PipelineError> {
        if index < self.ops.len() {
            Ok(())
        } else {
            Err(PipelineError::IndexOutOfRange {
                index,
                len: self.ops.len(),
            })
        }
    }

    /// Append an operation.
    pub fn push(&mut self, op: Operation) -> Result<(), PipelineError> {
        self.ensure_editable()?;
        self.ops.push(op);
        Ok(())
    }

    /// Append an XOR node.
    pub fn push_xor(&mut self, mask: u32) -> Result<(), PipelineError> {
        self.push(Operation::xor(mask))
    }

    /// Append a shift node (amount clamped into `[0, 31]`).
    pub fn push_shift_left(&mut self, bits: u32) -> Result<(), PipelineError> {
        self.push(Operation::shift_left(bits))
    }

    /// Replace the node at `index`.
    pub fn replace(&mut self, index: usize, op: Operation) -> Result<(), PipelineError> {
        self.ensure_editable()?;
        self.ensure_index(index)?;
        self.ops[index] = op;
        Ok(())
    }

    /// Remove and return the node at `index`.
    pub fn remove(&mut self, index: usize) -> Result<Operation, PipelineError> {
        self.ensure_editable()?;
        self.ensure_index(index)?;
        Ok(self.ops.remove(index))
    }

    /// Move the node at `from` so it lands before position `to`.
    ///
    /// `to` counts positions in the pipeline before removal and is clamped
    /// into range.
    pub fn move_op(&mut self, from: usize, to: usize) -> Result<(), PipelineError> {
        self.ensure_editable()?;
        self.ensure_index(from)?;

        let mut destination = to;
        if from < destination {
            destination -= 1;
        }
        let op = self.ops.remove(from);
        let destination = destination.min(self.ops.len());
        self.ops.insert(destination, op);
        Ok(())
    }

    /// Remove every node.
    pub fn clear(&mut self) -> Result<(), PipelineError> {
        self.ensure_editable()?;
        self.ops.clear();
        Ok(())
    }

    /// Evaluate over `input`.
    pub fn evaluate(&self, input: u32) -> Evaluation {
        evaluate(input, &self.ops)
    }

    /// Fingerprint the current operations.
    pub fn fingerprint(&self) -> Option<PipelineFingerprint> {
        fingerprint(&self.ops)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hash of level 1's reference solution `[ShiftLeft(2), Xor(92)]`.
    const LEVEL_ONE_REFERENCE_HASH: &str =
        "d8426315cda54b72f28d938fdd5b46f0caedbc5cfd30f49fb9d6e4db74df6e87";

    #[test]
    fn test_tutorial_xor() {
        let eval = evaluate(47, &[Operation::xor(207)]);
        assert_eq!(eval.result, 224);
        assert_eq!(eval.trace[0], "Input: 47");
        assert_eq!(eval.trace[1], "XOR(mask: 207): 47 ^ 207 = 224");
    }

    #[test]
    fn test_tutorial_shift() {
        let eval = evaluate(5, &[Operation::shift_left(2)]);
        assert_eq!(eval.result, 20);
        assert_eq!(eval.trace.len(), 2);
    }

    #[test]
    fn test_shift_wraps_at_32_bits() {
        let eval = evaluate(0x8000_0001, &[Operation::shift_left(1)]);
        assert_eq!(eval.result, 2);

        let eval = evaluate(u32::MAX, &[Operation::shift_left(31)]);
        assert_eq!(eval.result, 0x8000_0000);
    }

    #[test]
    fn test_order_matters() {
        let a = evaluate(4, &[Operation::xor(5), Operation::shift_left(1)]);
        let b = evaluate(4, &[Operation::shift_left(1), Operation::xor(5)]);
        assert_eq!(a.result, 2);
        assert_eq!(b.result, 13);

        let fa = fingerprint(&[Operation::xor(5), Operation::shift_left(1)]).unwrap();
        let fb = fingerprint(&[Operation::shift_left(1), Operation::xor(5)]).unwrap();
        assert_ne!(fa.hash, fb.hash);
    }

    #[test]
    fn test_reference_fingerprint() {
        let ops = [Operation::shift_left(2), Operation::xor(92)];
        let fp = fingerprint(&ops).unwrap();

        assert_eq!(
            fp.raw_canonical_form,
            r#"{"operations":[{"op":"shift_left","value":2},{"op":"xor","value":92}]}"#
        );
        assert_eq!(fp.hash, LEVEL_ONE_REFERENCE_HASH);
        assert_eq!(fp.length, 2);
        assert_eq!(evaluate(47, &ops).result, 224);
    }

    #[test]
    fn test_fingerprint_distinguishes_parameters_and_types() {
        let base = fingerprint(&[Operation::xor(3)]).unwrap();
        assert_ne!(base.hash, fingerprint(&[Operation::xor(4)]).unwrap().hash);
        assert_ne!(base.hash, fingerprint(&[Operation::shift_left(3)]).unwrap().hash);
        assert_eq!(base.hash, fingerprint(&[Operation::xor(3)]).unwrap().hash);
    }

    #[test]
    fn test_empty_pipeline_has_no_fingerprint() {
        assert!(fingerprint(&[]).is_none());
        assert!(Pipeline::new().fingerprint().is_none());
    }

    #[test]
    fn test_canonical_round_trip_reevaluates() {
        let ops = vec![
            Operation::xor(0xDEAD_BEEF),
            Operation::shift_left(7),
            Operation::xor(1),
        ];
        let fp = fingerprint(&ops).unwrap();
        let parsed = parse_canonical(&fp.raw_canonical_form).unwrap();

        assert_eq!(parsed, ops);
        assert_eq!(evaluate(1234, &parsed).result, evaluate(1234, &ops).result);
    }

    #[test]
    fn test_parse_rejects_unknown_op() {
        let err = parse_canonical(r#"{"operations":[{"op":"rotate","value":1}]}"#).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedCanonical(_)));
    }

    #[test]
    fn test_frozen_pipeline_rejects_edits() {
        let mut pipeline = Pipeline::new();
        pipeline.push_xor(1).unwrap();
        pipeline.freeze();

        assert_eq!(pipeline.push_shift_left(2), Err(PipelineError::Frozen));
        assert_eq!(pipeline.replace(0, Operation::xor(2)), Err(PipelineError::Frozen));
        assert_eq!(pipeline.clear(), Err(PipelineError::Frozen));
        assert_eq!(pipeline.len(), 1);

        pipeline.unfreeze();
        pipeline.push_shift_left(2).unwrap();
        assert_eq!(pipeline.len(), 2);
    }

    #[test]
    fn test_move_op() {
        let mut pipeline = Pipeline::from_ops(vec![
            Operation::xor(1),
            Operation::xor(2),
            Operation::xor(3),
        ]);

        // Drop the first node after the last one.
        pipeline.move_op(0, 3).unwrap();
        assert_eq!(
            pipeline.ops(),
            &[Operation::xor(2), Operation::xor(3), Operation::xor(1)]
        );

        pipeline.move_op(2, 0).unwrap();
        assert_eq!(
            pipeline.ops(),
            &[Operation::xor(1), Operation::xor(2), Operation::xor(3)]
        );

        assert!(matches!(
            pipeline.move_op(5, 0),
            Err(PipelineError::IndexOutOfRange { index: 5, len: 3 })
        ));
    }
}
