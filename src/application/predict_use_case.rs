// ============================================================
// Layer 2 — Predict Use Case
// ============================================================
// Loads the tokenizer and the newest checkpoint from a training
// run, then ranks candidates for the final keystep of a
// procedure given on the command line.

use anyhow::Result;

use crate::infra::{
    checkpoint::CheckpointManager,
    tokenizer_store::{KeystepTokenizer, TokenizerStore},
};
use crate::ml::inferencer::{Inferencer, Prediction};

pub struct PredictUseCase {
    tokenizer:  KeystepTokenizer,
    inferencer: Inferencer,
}

impl PredictUseCase {
    pub fn new(checkpoint_dir: &str) -> Result<Self> {
        let tokenizer  = TokenizerStore::new(checkpoint_dir).load()?;
        let ckpt       = CheckpointManager::new(checkpoint_dir)?;
        let inferencer = Inferencer::from_checkpoint(&ckpt, &tokenizer)?;
        Ok(Self { tokenizer, inferencer })
    }

    pub fn predict(&self, keysteps: &[String], top_k: usize) -> Result<Prediction> {
        let prediction = self.inferencer.predict(keysteps, &self.tokenizer, top_k)?;
        tracing::debug!(
            "Hidden '{}', best guess {:?}",
            prediction.hidden,
            prediction.candidates.first()
        );
        Ok(prediction)
    }
}
