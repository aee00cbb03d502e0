// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores encoder weights with Burn's CompactRecorder.
//
// Layout of a checkpoint directory:
//
//   checkpoints/
//     tokenizer.json          keystep vocabulary
//     train_config.json       everything needed to rebuild the model
//     model_epoch_2.mpk.gz    weights after the validation at epoch 2
//     model_epoch_4.mpk.gz
//     latest_epoch.json       epoch of the newest weights file
//
// A record only loads into an encoder of the same architecture,
// so `train_config.json` is written before the first epoch.
//
// Reference: Burn Book §5 (Records and Checkpointing)

use anyhow::{Context, Result};
use std::{fs, path::PathBuf};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};

use crate::application::train_use_case::TrainConfig;
use crate::ml::model::MlmEncoder;

#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory (and parents) if needed.
    pub fn new(dir: impl Into<String>) -> Result<Self> {
        let dir = PathBuf::from(dir.into());
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Writes `model_epoch_{epoch}` and moves the latest pointer to it.
    pub fn save_model<B: Backend>(&self, model: &MlmEncoder<B>, epoch: usize) -> Result<()> {
        // recorder appends the extension
        let path = self.dir.join(format!("model_epoch_{epoch}"));

        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        let latest_path = self.dir.join("latest_epoch.json");
        fs::write(&latest_path, serde_json::to_string(&epoch)?)
            .with_context(|| "Failed to write latest_epoch.json")?;

        tracing::debug!("Saved checkpoint: epoch {}", epoch);
        Ok(())
    }

    /// Loads the newest weights into `model`, which must have the
    /// saved architecture.
    pub fn load_model<B: Backend>(
        &self,
        model:  MlmEncoder<B>,
        device: &B::Device,
    ) -> Result<MlmEncoder<B>> {
        let epoch = self.latest_epoch()?;
        let path  = self.dir.join(format!("model_epoch_{epoch}"));

        tracing::info!("Loading checkpoint from epoch {}", epoch);

        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| {
                format!("Cannot load checkpoint '{}'. Has a validation pass run yet?",
                    path.display())
            })?;

        Ok(model.load_record(record))
    }

    pub fn save_config(&self, cfg: &TrainConfig) -> Result<()> {
        let path = self.dir.join("train_config.json");
        let json = serde_json::to_string_pretty(cfg)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write config to '{}'", path.display()))?;

        tracing::debug!("Saved training config to '{}'", path.display());
        Ok(())
    }

    pub fn load_config(&self) -> Result<TrainConfig> {
        let path = self.dir.join("train_config.json");
        let json = fs::read_to_string(&path)
            .with_context(|| {
                format!(
                    "Cannot read config from '{}'. \
                     Make sure you have run 'train' before 'predict'.",
                    path.display()
                )
            })?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed config in '{}'", path.display()))
    }

    pub fn latest_epoch(&self) -> Result<usize> {
        let path = self.dir.join("latest_epoch.json");
        let s = fs::read_to_string(&path)
            .with_context(|| "Cannot find 'latest_epoch.json'. Have you run 'train' first?")?;
        Ok(serde_json::from_str::<usize>(&s)?)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::ModelKind;
    use crate::ml::model::MlmEncoderConfig;
    use burn::backend::NdArray;

    type TestBackend = NdArray;

    #[test]
    fn test_save_then_load_weights() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path().join("ckpt").to_str().unwrap()).unwrap();
        let device = Default::default();

        let cfg = MlmEncoderConfig::for_kind(ModelKind::KeystepTiny, 10, 8, 0.0);
        let model: MlmEncoder<TestBackend> = cfg.init(&device);
        ckpt.save_model(&model, 2).unwrap();
        ckpt.save_model(&model, 4).unwrap();
        assert_eq!(ckpt.latest_epoch().unwrap(), 4);

        let fresh: MlmEncoder<TestBackend> = cfg.init(&device);
        let loaded = ckpt.load_model(fresh, &device).unwrap();

        let ids: Tensor<TestBackend, 2, Int> = Tensor::from_ints([[3, 4, 5]], &device);
        let pad = ids.clone().equal_elem(0);
        let a: Vec<f32> = model.forward(ids.clone(), pad.clone()).into_data().to_vec().unwrap();
        let b: Vec<f32> = loaded.forward(ids, pad).into_data().to_vec().unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_missing_checkpoint_is_an_error() {
        let dir  = tempfile::tempdir().unwrap();
        let ckpt = CheckpointManager::new(dir.path().to_str().unwrap()).unwrap();
        assert!(ckpt.latest_epoch().is_err());
        assert!(ckpt.load_config().is_err());
    }
}
