// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Next-keystep prediction with a trained encoder: the final
// keystep of the given procedure is END-masked and the model's
// distribution over the vocabulary at that slot is ranked.
use anyhow::{bail, Result};
use burn::prelude::*;
use rand::{rngs::StdRng, SeedableRng};

use crate::domain::config::MaskingConfig;
use crate::infra::checkpoint::CheckpointManager;
use crate::infra::tokenizer_store::{KeystepTokenizer, MASK_TOKEN, PAD_TOKEN, UNK_TOKEN};
use crate::ml::masking;
use crate::ml::model::{InferBackend, MlmEncoder, MlmEncoderConfig};

#[derive(Debug, Clone, PartialEq)]
pub struct Prediction {
    /// The keystep that was hidden from the model
    pub hidden:     String,
    /// (keystep, probability), most likely first
    pub candidates: Vec<(String, f32)>,
}

pub struct Inferencer<B: Backend = InferBackend> {
    model:       MlmEncoder<B>,
    max_seq_len: usize,
    device:      B::Device,
}

impl Inferencer<InferBackend> {
    pub fn from_checkpoint(
        ckpt_manager: &CheckpointManager,
        tokenizer:    &KeystepTokenizer,
    ) -> Result<Self> {
        let device = burn::backend::wgpu::WgpuDevice::default();
        let cfg    = ckpt_manager.load_config()?;
        if cfg.vocab_size != tokenizer.vocab_size() {
            bail!(
                "tokenizer has {} entries but the checkpoint was trained with {}",
                tokenizer.vocab_size(),
                cfg.vocab_size
            );
        }
        let model_cfg = MlmEncoderConfig::for_kind(
            cfg.training.model_kind(), cfg.vocab_size, cfg.max_seq_len, 0.0,
        );
        let model: MlmEncoder<InferBackend> = model_cfg.init(&device);
        let model = ckpt_manager.load_model(model, &device)?;
        tracing::info!("Model '{}' loaded from checkpoint", cfg.training.model_kind());
        Ok(Self::new(model, cfg.max_seq_len, device))
    }
}

impl<B: Backend> Inferencer<B> {
    pub fn new(model: MlmEncoder<B>, max_seq_len: usize, device: B::Device) -> Self {
        Self { model, max_seq_len, device }
    }

    pub fn predict(
        &self,
        keysteps:  &[String],
        tokenizer: &KeystepTokenizer,
        top_k:     usize,
    ) -> Result<Prediction> {
        let mut ids = tokenizer.encode(keysteps)?;
        if ids.is_empty() {
            bail!("at least one keystep is required");
        }
        // Keep the tail: the masked slot is the last one
        if ids.len() > self.max_seq_len {
            ids.drain(..ids.len() - self.max_seq_len);
        }

        // END with no fraction masks exactly the final keystep and
        // never draws from the generator.
        let end = MaskingConfig::end(None)?;
        let example = masking::apply(&ids, &end, tokenizer.mask_id(), &mut StdRng::seed_from_u64(0))?;
        let slot = example.positions[0];
        let hidden = keysteps.last().cloned().unwrap_or_default();

        let seq_len = example.len();
        let input_flat: Vec<i32> = example.input_ids.iter().map(|&x| x as i32).collect();
        let input_tensor = Tensor::<B, 1, Int>::from_ints(input_flat.as_slice(), &self.device)
            .reshape([1, seq_len]);
        let pad_mask = input_tensor.clone().equal_elem(tokenizer.pad_id() as i32);

        let logits = self.model.forward(input_tensor, pad_mask);
        let [_, _, vocab] = logits.dims();
        let slot_logits = logits.slice([0..1, slot..slot + 1, 0..vocab]).reshape([1, vocab]);
        let probs: Vec<f32> = burn::tensor::activation::softmax(slot_logits, 1)
            .into_data()
            .convert::<f32>()
            .to_vec::<f32>()
            .map_err(|e| anyhow::anyhow!("Cannot read probabilities: {e:?}"))?;

        Ok(Prediction { hidden, candidates: rank(&probs, tokenizer, top_k) })
    }
}

/// Top `k` vocabulary entries by probability, special tokens excluded.
fn rank(probs: &[f32], tokenizer: &KeystepTokenizer, k: usize) -> Vec<(String, f32)> {
    let mut order: Vec<usize> = (0..probs.len()).collect();
    order.sort_by(|&a, &b| probs[b].total_cmp(&probs[a]));

    order
        .into_iter()
        .filter_map(|id| tokenizer.id_to_token(id as u32).map(|t| (t, probs[id])))
        .filter(|(t, _)| ![PAD_TOKEN, UNK_TOKEN, MASK_TOKEN].contains(&t.as_str()))
        .take(k)
        .collect()
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::ModelKind;
    use crate::infra::tokenizer_store::TokenizerStore;
    use burn::backend::NdArray;

    fn tokenizer(dir: &std::path::Path) -> KeystepTokenizer {
        let corpus = vec![vec![
            "attach-cabin-chassis".to_string(),
            "attach-boom-arm".to_string(),
            "screw-wheel-chassis".to_string(),
        ]];
        TokenizerStore::new(dir.to_str().unwrap()).load_or_build(&corpus, 100).unwrap()
    }

    #[test]
    fn test_predicts_ranked_keysteps_only() {
        let dir = tempfile::tempdir().unwrap();
        let tok = tokenizer(dir.path());
        let device = Default::default();

        let cfg = MlmEncoderConfig::for_kind(ModelKind::KeystepTiny, tok.vocab_size(), 8, 0.0);
        let inferencer = Inferencer::<NdArray>::new(cfg.init(&device), 8, device);

        let steps: Vec<String> = vec!["attach-cabin-chassis".into(), "attach-boom-arm".into()];
        let pred = inferencer.predict(&steps, &tok, 2).unwrap();

        assert_eq!(pred.hidden, "attach-boom-arm");
        assert_eq!(pred.candidates.len(), 2);
        assert!(pred.candidates[0].1 >= pred.candidates[1].1);
        assert!(pred.candidates.iter().all(|(t, _)| !t.starts_with('[')));
    }

    #[test]
    fn test_empty_input_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let tok = tokenizer(dir.path());
        let device = Default::default();
        let cfg = MlmEncoderConfig::for_kind(ModelKind::KeystepTiny, tok.vocab_size(), 8, 0.0);
        let inferencer = Inferencer::<NdArray>::new(cfg.init(&device), 8, device);
        assert!(inferencer.predict(&[], &tok, 3).is_err());
    }
}
