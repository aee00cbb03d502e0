// ============================================================
// Layer 4 — Keystep Encoding and In-Memory Source
// ============================================================
// Turns loaded procedures into token-id sequences and serves
// them as batches for either split:
//   - Training batches are reshuffled at the start of every epoch
//   - Validation batches keep one fixed order for the whole run
//
// Sequences longer than the model context are cut to max_seq_len.

use anyhow::Result;
use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

use crate::domain::procedure::Procedure;
use crate::domain::sequence::{Batch, TokenSequence};
use crate::domain::traits::{DataSource, Split};
use crate::infra::tokenizer_store::KeystepTokenizer;

/// Tokenises procedures, truncating each to the model context.
pub fn encode_procedures(
    procedures:  &[Procedure],
    tokenizer:   &KeystepTokenizer,
    max_seq_len: usize,
) -> Result<Vec<TokenSequence>> {
    let mut truncated = 0usize;
    let mut out = Vec::with_capacity(procedures.len());
    for p in procedures {
        let mut ids = tokenizer.encode(&p.tokens())?;
        if ids.len() > max_seq_len {
            ids.truncate(max_seq_len);
            truncated += 1;
        }
        out.push(ids);
    }
    if truncated > 0 {
        tracing::warn!("{truncated} procedure(s) truncated to {max_seq_len} keysteps");
    }
    Ok(out)
}

/// Both splits held in memory. Training order is reshuffled every
/// epoch from (seed, epoch), validation order never changes.
pub struct InMemorySource {
    train:      Vec<TokenSequence>,
    val:        Vec<TokenSequence>,
    batch_size: usize,
    seed:       u64,
}

impl InMemorySource {
    pub fn new(train: Vec<TokenSequence>, val: Vec<TokenSequence>, batch_size: usize, seed: u64) -> Self {
        Self { train, val, batch_size: batch_size.max(1), seed }
    }

    pub fn len(&self, split: Split) -> usize {
        match split {
            Split::Train      => self.train.len(),
            Split::Validation => self.val.len(),
        }
    }
}

impl DataSource for InMemorySource {
    fn batches(&mut self, split: Split, epoch: usize) -> Box<dyn Iterator<Item = Batch> + '_> {
        match split {
            Split::Train => {
                let mut order: Vec<usize> = (0..self.train.len()).collect();
                order.shuffle(&mut StdRng::seed_from_u64(self.seed.wrapping_add(epoch as u64)));

                let chunks: Vec<Vec<usize>> =
                    order.chunks(self.batch_size).map(<[usize]>::to_vec).collect();
                let train = &self.train;
                Box::new(
                    chunks
                        .into_iter()
                        .map(move |idx| idx.into_iter().map(|i| train[i].clone()).collect()),
                )
            }
            Split::Validation => Box::new(self.val.chunks(self.batch_size).map(<[TokenSequence]>::to_vec)),
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn source() -> InMemorySource {
        let train = (0..10u32).map(|i| vec![i + 3; 4]).collect();
        let val   = (0..5u32).map(|i| vec![i + 20; 3]).collect();
        InMemorySource::new(train, val, 4, 7)
    }

    fn flatten(batches: Vec<Batch>) -> Vec<u32> {
        batches.into_iter().flatten().map(|s| s[0]).collect()
    }

    #[test]
    fn test_batches_cover_split_once() {
        let mut src = source();
        let batches: Vec<Batch> = src.batches(Split::Train, 1).collect();
        assert_eq!(batches.iter().map(Vec::len).collect::<Vec<_>>(), vec![4, 4, 2]);

        let mut seen = flatten(batches);
        seen.sort();
        assert_eq!(seen, (3..13).collect::<Vec<_>>());
    }

    #[test]
    fn test_restartable_and_reshuffled_per_epoch() {
        let mut src = source();
        let e1a = flatten(src.batches(Split::Train, 1).collect());
        let e1b = flatten(src.batches(Split::Train, 1).collect());
        let e2  = flatten(src.batches(Split::Train, 2).collect());
        assert_eq!(e1a, e1b);
        assert_ne!(e1a, e2);
    }

    #[test]
    fn test_validation_order_is_fixed() {
        let mut src = source();
        let a = flatten(src.batches(Split::Validation, 1).collect());
        let b = flatten(src.batches(Split::Validation, 9).collect());
        assert_eq!(a, vec![20, 21, 22, 23, 24]);
        assert_eq!(a, b);
    }
}
