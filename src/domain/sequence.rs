// ============================================================
// Layer 3 — Token Sequences and Masked Examples
// ============================================================
// A TokenSequence is one procedure recording after tokenisation:
// one id per keystep, in the order the keysteps happened.
//
// A MaskedExample is what the masking policy derives from it:
//
//   original:  [ 7, 12,  9, 31]
//   input_ids: [ 7,  2,  9,  2]      (2 = [MASK])
//   positions: [ 1,  3]
//   targets:   [12, 31]
//
// positions[i] and targets[i] always describe the same slot.

use serde::{Deserialize, Serialize};

/// Ordered keystep token ids. Owned by the data source; the
/// training core only ever borrows it.
pub type TokenSequence = Vec<u32>;

/// One batch as produced by a data source.
pub type Batch = Vec<TokenSequence>;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MaskedExample {
    /// The sequence with masked slots overwritten by the mask token
    pub input_ids: Vec<u32>,

    /// Masked slot indices, unique, ascending
    pub positions: Vec<usize>,

    /// Original token ids at `positions`
    pub targets: Vec<u32>,
}

impl MaskedExample {
    pub fn len(&self) -> usize {
        self.input_ids.len()
    }

    pub fn masked_count(&self) -> usize {
        self.positions.len()
    }

    /// Per-position supervision labels, `ignore_id` where nothing
    /// is masked. This is the layout the loss function consumes.
    pub fn labels(&self, ignore_id: u32) -> Vec<u32> {
        let mut labels = vec![ignore_id; self.input_ids.len()];
        for (&pos, &target) in self.positions.iter().zip(&self.targets) {
            labels[pos] = target;
        }
        labels
    }
}
