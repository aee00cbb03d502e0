// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Orchestrates the full training pipeline in order:
//
//   Step 1: Load procedure recordings  (Layer 4 - data)
//   Step 2: Build / load tokenizer     (Layer 6 - infra)
//   Step 3: Encode keystep sequences   (Layer 4 - data)
//   Step 4: Seeded train/val split     (Layer 4 - data)
//   Step 5: Save config                (Layer 6 - infra)
//   Step 6: Open the run tracker       (Layer 6 - infra)
//   Step 7: Build model + optimiser    (Layer 5 - ml)
//   Step 8: Run the training loop      (Layer 5 - ml)
//
// Every option is validated when the TrainConfig is built, so a
// bad probability or cadence fails before any file is read.
//
// Reference: Rust Book §13 (Iterators and Closures)
//            Burn Book §5 (Training)

use anyhow::{bail, Result};
use rand::{rngs::StdRng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::data::{
    dataset::{encode_procedures, InMemorySource},
    loader::ProcedureLoader,
    splitter::split_non_empty,
};
use crate::domain::{
    config::{MaskingConfig, RunIdentity, TrainingConfig},
    error::MlmError,
    procedure::{Procedure, ProcedureFilter},
    traits::Split,
};
use crate::infra::{
    checkpoint::CheckpointManager,
    tokenizer_store::TokenizerStore,
    tracker::tracker_for,
};
use crate::ml::{
    masking::MaskingPolicy,
    model::{with_adam, MlmEncoderConfig, TrainBackend},
    training_loop::{FinalMetrics, StopSignal, TrainingLoop},
};

// ─── Training Configuration ──────────────────────────────────────────────────
// Everything a run needs, saved as train_config.json so that
// `predict` can rebuild the same encoder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    pub data_dir:       String,
    pub checkpoint_dir: String,
    pub runs_dir:       String,
    pub procedures:     ProcedureFilter,
    pub training:       TrainingConfig,
    pub masking:        MaskingConfig,
    pub identity:       RunIdentity,
    pub max_seq_len:    usize,
    pub batch_size:     usize,
    pub lr:             f64,
    pub dropout:        f64,
    /// Upper bound when the vocabulary is built
    pub max_vocab:      usize,
    /// Actual vocabulary size, filled in once the tokenizer exists
    #[serde(default)]
    pub vocab_size:     usize,
    pub train_fraction: f64,
    pub seed:           u64,
}

impl TrainConfig {
    /// Range checks for the numeric options the domain types do not own.
    pub fn validate(&self) -> Result<(), MlmError> {
        if self.batch_size == 0 {
            return Err(MlmError::invalid("batch_size", "must be a positive integer"));
        }
        if self.max_seq_len == 0 {
            return Err(MlmError::invalid("max_seq_len", "must be a positive integer"));
        }
        if !(self.train_fraction > 0.0 && self.train_fraction < 1.0) {
            return Err(MlmError::invalid(
                "train_fraction",
                format!("{} is outside (0, 1)", self.train_fraction),
            ));
        }
        if !(self.lr > 0.0 && self.lr.is_finite()) {
            return Err(MlmError::invalid("lr", format!("{} is not a positive number", self.lr)));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(MlmError::invalid("dropout", format!("{} is outside [0, 1)", self.dropout)));
        }
        Ok(())
    }

    pub fn encoder_config(&self) -> MlmEncoderConfig {
        MlmEncoderConfig::for_kind(
            self.training.model_kind(),
            self.vocab_size,
            self.max_seq_len,
            self.dropout,
        )
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
    stop:   StopSignal,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Result<Self, MlmError> {
        config.validate()?;
        Ok(Self { config, stop: StopSignal::new() })
    }

    /// The signal the training loop polls between batches.
    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Execute the full training pipeline end to end
    pub fn execute(&self) -> Result<FinalMetrics> {
        let cfg = &self.config;

        // ── Step 1: Load procedures ──────────────────────────────────────────
        tracing::info!("Loading procedures from '{}'", cfg.data_dir);
        let procedures = ProcedureLoader::new(&cfg.data_dir, cfg.procedures).load_all()?;
        if procedures.is_empty() {
            bail!("no {:?} procedures found in '{}'", cfg.procedures, cfg.data_dir);
        }

        // ── Step 2: Build / load tokenizer ────────────────────────────────────
        let corpus: Vec<Vec<String>> = procedures.iter().map(Procedure::tokens).collect();
        let tokenizer = TokenizerStore::new(&cfg.checkpoint_dir)
            .load_or_build(&corpus, cfg.max_vocab)?;

        // ── Step 3: Encode ────────────────────────────────────────────────────
        let sequences = encode_procedures(&procedures, &tokenizer, cfg.max_seq_len)?;

        // ── Step 4: Train / validation split ──────────────────────────────────
        let mut split_rng = StdRng::seed_from_u64(cfg.seed);
        let (train, val) = split_non_empty(sequences, cfg.train_fraction, &mut split_rng)?;
        let mut source = InMemorySource::new(train, val, cfg.batch_size, cfg.seed);
        tracing::info!(
            "Split: {} train, {} validation",
            source.len(Split::Train),
            source.len(Split::Validation)
        );

        // ── Step 5: Save config for inference ─────────────────────────────────
        let mut saved = cfg.clone();
        saved.vocab_size = tokenizer.vocab_size();
        let ckpt_manager = CheckpointManager::new(&cfg.checkpoint_dir)?;
        ckpt_manager.save_config(&saved)?;

        // ── Step 6: Tracker ───────────────────────────────────────────────────
        let mut tracker = tracker_for(&cfg.identity, &cfg.runs_dir);
        tracker.log_config(&serde_json::to_value(&saved)?);

        // ── Step 7: Model ─────────────────────────────────────────────────────
        let device = burn::backend::wgpu::WgpuDevice::default();
        let mut model = with_adam::<TrainBackend>(
            &saved.encoder_config(),
            cfg.lr,
            tokenizer.pad_id(),
            &device,
        )
        .with_checkpoints(ckpt_manager);
        tracing::info!(
            "Model '{}' built (vocab={}, max_seq_len={})",
            cfg.training.model_kind(),
            saved.vocab_size,
            cfg.max_seq_len
        );

        // ── Step 8: Training loop ─────────────────────────────────────────────
        let masking = MaskingPolicy::new(cfg.masking, tokenizer.mask_id());
        let training_loop = TrainingLoop::new(cfg.training, masking, cfg.seed)
            .with_stop_signal(self.stop.clone());

        let metrics = training_loop.run(&mut source, &mut model, tracker.as_mut())?;
        Ok(metrics)
    }
}
