// ============================================================
// Layer 4 — MLM Batcher
// ============================================================
// Stacks masked examples into tensors for one forward pass.
//
// Procedures have different lengths, so every row is padded to
// the longest sequence in the batch (batch-first, [PAD] = 0):
//
//   input_ids  [batch, seq]   masked ids, [PAD] after the end
//   labels     [batch * seq]  original id at masked slots,
//                             [PAD] everywhere else
//   pad_mask   [batch, seq]   true where the slot is padding
//
// The loss ignores every [PAD] label, so only masked positions
// contribute to it.
//
// Reference: Burn Book §4 (Batcher)

use burn::prelude::*;

use crate::domain::sequence::MaskedExample;

#[derive(Debug, Clone)]
pub struct MlmBatch<B: Backend> {
    pub input_ids: Tensor<B, 2, Int>,
    pub labels:    Tensor<B, 1, Int>,
    pub pad_mask:  Tensor<B, 2, Bool>,
}

#[derive(Clone, Debug)]
pub struct MlmBatcher<B: Backend> {
    pub device: B::Device,
    pub pad_id: u32,
}

impl<B: Backend> MlmBatcher<B> {
    pub fn new(device: B::Device, pad_id: u32) -> Self {
        Self { device, pad_id }
    }

    /// Panics on an empty slice; the training loop never produces one.
    pub fn batch(&self, items: &[MaskedExample]) -> MlmBatch<B> {
        let batch_size = items.len();
        let seq_len    = items.iter().map(MaskedExample::len).max().unwrap_or(0);
        let pad        = self.pad_id as i32;

        let mut input_flat = Vec::with_capacity(batch_size * seq_len);
        let mut label_flat = Vec::with_capacity(batch_size * seq_len);
        for ex in items {
            let labels = ex.labels(self.pad_id);
            input_flat.extend(ex.input_ids.iter().map(|&x| x as i32));
            label_flat.extend(labels.iter().map(|&x| x as i32));

            let fill = seq_len - ex.len();
            input_flat.extend(std::iter::repeat(pad).take(fill));
            label_flat.extend(std::iter::repeat(pad).take(fill));
        }

        let input_ids = Tensor::<B, 1, Int>::from_ints(input_flat.as_slice(), &self.device)
            .reshape([batch_size, seq_len]);
        let labels    = Tensor::<B, 1, Int>::from_ints(label_flat.as_slice(), &self.device);
        let pad_mask  = input_ids.clone().equal_elem(pad);

        MlmBatch { input_ids, labels, pad_mask }
    }
}
