// ============================================================
// Layer 5 — Masking Policy
// ============================================================
// Turns a keystep sequence into an MLM training example.
//
//   PROB — BERT-style infilling: every position is hidden with
//          probability p. If the coin flips select nothing, one
//          position is picked uniformly so every example carries
//          at least one target.
//
//   END  — next-span prediction: the trailing span is hidden.
//          Span length = max(1, round(fraction * len)), or one
//          token when no fraction is configured.
//
// The policy holds no mutable state. All randomness comes from
// the generator passed in, so the same (sequence, config, rng
// state) always yields the same example.
//
// Reference: Devlin et al. (2019) BERT, §3.1 (Masked LM)

use rand::Rng;

use crate::domain::config::{MaskingConfig, MaskingStrategy};
use crate::domain::error::MlmError;
use crate::domain::sequence::{MaskedExample, TokenSequence};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MaskingPolicy {
    config:        MaskingConfig,
    mask_token_id: u32,
}

impl MaskingPolicy {
    /// `mask_token_id` is the tokenizer's reserved `[MASK]` id.
    pub fn new(config: MaskingConfig, mask_token_id: u32) -> Self {
        Self { config, mask_token_id }
    }

    pub fn apply<R: Rng + ?Sized>(
        &self,
        sequence: &[u32],
        rng:      &mut R,
    ) -> Result<MaskedExample, MlmError> {
        apply(sequence, &self.config, self.mask_token_id, rng)
    }

    /// Masks every sequence of a batch in order, drawing from one
    /// generator stream.
    pub fn apply_batch<R: Rng + ?Sized>(
        &self,
        batch: &[TokenSequence],
        rng:   &mut R,
    ) -> Result<Vec<MaskedExample>, MlmError> {
        batch.iter().map(|seq| self.apply(seq, rng)).collect()
    }
}

pub fn apply<R: Rng + ?Sized>(
    sequence:      &[u32],
    config:        &MaskingConfig,
    mask_token_id: u32,
    rng:           &mut R,
) -> Result<MaskedExample, MlmError> {
    let len = sequence.len();
    if len == 0 {
        return Err(MlmError::invalid("sequence", "cannot mask an empty sequence"));
    }

    let positions: Vec<usize> = match config.strategy() {
        MaskingStrategy::Prob { probability } => {
            // MaskingConfig::prob already rejected anything outside
            // [0, 1]; gen_bool relies on that.
            let mut picked: Vec<usize> = (0..len).filter(|_| rng.gen_bool(probability)).collect();
            if picked.is_empty() {
                picked.push(rng.gen_range(0..len));
            }
            picked
        }
        MaskingStrategy::End { fraction } => {
            let span = end_span_len(len, fraction);
            (len - span..len).collect()
        }
    };

    let targets: Vec<u32> = positions.iter().map(|&p| sequence[p]).collect();
    let mut input_ids = sequence.to_vec();
    for &p in &positions {
        input_ids[p] = mask_token_id;
    }

    Ok(MaskedExample { input_ids, positions, targets })
}

/// Length of the END span for a sequence of `len >= 1` tokens.
pub fn end_span_len(len: usize, fraction: Option<f64>) -> usize {
    match fraction {
        None    => 1,
        Some(f) => ((f * len as f64).round() as usize).clamp(1, len),
    }
}
