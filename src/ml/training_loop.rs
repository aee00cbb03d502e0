// ============================================================
// Layer 5 — Training Loop
// ============================================================
// Drives the run through its states:
//
//   Idle ──▶ Training(1) ──▶ … ──▶ Training(e) ──┬──▶ Training(e+1)
//                                                 │
//                                                 └──▶ Validating(e) ──▶ Training(e+1) | Done
//
// Training(e) goes to Validating(e) when e % validate_every == 0
// or e is the final epoch, so every run ends with a validation.
//
// Every training batch: mask → forward + loss → optimizer step
// → record loss. Batches and epochs run strictly in order.
//
// Validation re-seeds its own generator stream on every pass, so
// each pass scores exactly the same masked examples and the
// numbers stay comparable across epochs.
//
// Exit paths, each finalizing the tracker exactly once:
//   Done             → FinalMetrics { complete: true }
//   stop signal      → FinalMetrics { complete: false }
//   batch failure    → Err(MlmError::BatchProcessing)

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use rand::{rngs::StdRng, SeedableRng};
use serde::Serialize;

use crate::domain::config::TrainingConfig;
use crate::domain::error::{MlmError, Phase};
use crate::domain::traits::{metrics, DataSource, MaskedLmModel, RunTracker, Scope, Split};
use crate::ml::masking::MaskingPolicy;

/// Mixed into the run seed for the validation stream.
const VALIDATION_STREAM: u64 = 0x5EED_0F_7A11D;

// ─── Stop signal ──────────────────────────────────────────────────────────────

/// Cooperative cancellation flag, checked between batches.
#[derive(Debug, Clone, Default)]
pub struct StopSignal(Arc<AtomicBool>);

impl StopSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raise(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_raised(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ─── Results ──────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ValidationMetrics {
    pub epoch:    usize,
    pub loss:     f64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FinalMetrics {
    pub last_validation:  Option<ValidationMetrics>,
    pub epochs_completed: usize,
    pub steps:            usize,
    /// False when the run was stopped before reaching Done
    pub complete:         bool,
}

// ─── State machine ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    Idle,
    Training(usize),
    Validating(usize),
    Done,
}

impl LoopState {
    pub fn next(self, cfg: &TrainingConfig) -> LoopState {
        match self {
            LoopState::Idle => LoopState::Training(1),
            LoopState::Training(e) if cfg.should_validate(e) => LoopState::Validating(e),
            LoopState::Training(e) => LoopState::Training(e + 1),
            LoopState::Validating(e) if e == cfg.epochs() => LoopState::Done,
            LoopState::Validating(e) => LoopState::Training(e + 1),
            LoopState::Done => LoopState::Done,
        }
    }
}

enum PassOutcome<T> {
    Finished(T),
    Stopped,
}

/// Counters carried across the whole run.
#[derive(Debug, Default)]
struct Progress {
    steps:            usize,
    epochs_completed: usize,
    last_validation:  Option<ValidationMetrics>,
}

impl Progress {
    fn finish(&self, complete: bool) -> FinalMetrics {
        FinalMetrics {
            last_validation:  self.last_validation,
            epochs_completed: self.epochs_completed,
            steps:            self.steps,
            complete,
        }
    }
}

// ─── TrainingLoop ─────────────────────────────────────────────────────────────

pub struct TrainingLoop {
    config:  TrainingConfig,
    masking: MaskingPolicy,
    seed:    u64,
    stop:    StopSignal,
}

impl TrainingLoop {
    pub fn new(config: TrainingConfig, masking: MaskingPolicy, seed: u64) -> Self {
        Self { config, masking, seed, stop: StopSignal::new() }
    }

    pub fn with_stop_signal(mut self, stop: StopSignal) -> Self {
        self.stop = stop;
        self
    }

    pub fn stop_signal(&self) -> StopSignal {
        self.stop.clone()
    }

    /// Run to completion, cancellation or the first failed batch.
    /// The tracker is finalized exactly once on every path.
    pub fn run(
        &self,
        data:    &mut dyn DataSource,
        model:   &mut dyn MaskedLmModel,
        tracker: &mut dyn RunTracker,
    ) -> Result<FinalMetrics, MlmError> {
        let outcome = self.drive(data, model, tracker);
        tracker.finalize();

        match &outcome {
            Ok(m) if m.complete => tracing::info!(
                epochs = m.epochs_completed,
                steps = m.steps,
                "Training complete"
            ),
            Ok(m) => tracing::warn!(
                epochs = m.epochs_completed,
                steps = m.steps,
                "Training stopped before the final epoch"
            ),
            Err(e) => tracing::error!("Training aborted: {e}"),
        }
        outcome
    }

    fn drive(
        &self,
        data:    &mut dyn DataSource,
        model:   &mut dyn MaskedLmModel,
        tracker: &mut dyn RunTracker,
    ) -> Result<FinalMetrics, MlmError> {
        let mut rng      = StdRng::seed_from_u64(self.seed);
        let mut progress = Progress::default();
        let mut state    = LoopState::Idle;

        loop {
            match state {
                LoopState::Idle => {}
                LoopState::Training(epoch) => {
                    match self.train_epoch(epoch, &mut rng, &mut progress, data, model, tracker)? {
                        PassOutcome::Finished(()) => progress.epochs_completed = epoch,
                        PassOutcome::Stopped      => return Ok(progress.finish(false)),
                    }
                }
                LoopState::Validating(epoch) => {
                    match self.validate(epoch, progress.steps, data, model, tracker)? {
                        PassOutcome::Finished(v) => progress.last_validation = Some(v),
                        PassOutcome::Stopped     => return Ok(progress.finish(false)),
                    }
                    model
                        .checkpoint(epoch)
                        .map_err(|e| MlmError::Checkpoint { epoch, reason: format!("{e:#}") })?;
                }
                LoopState::Done => return Ok(progress.finish(true)),
            }
            state = state.next(&self.config);
        }
    }

    fn train_epoch(
        &self,
        epoch:    usize,
        rng:      &mut StdRng,
        progress: &mut Progress,
        data:     &mut dyn DataSource,
        model:    &mut dyn MaskedLmModel,
        tracker:  &mut dyn RunTracker,
    ) -> Result<PassOutcome<()>, MlmError> {
        let fail = |batch: usize, reason: String| MlmError::BatchProcessing {
            phase: Phase::Training,
            epoch,
            batch,
            reason,
        };

        let mut loss_sum = 0.0f64;
        let mut batches  = 0usize;

        for (index, batch) in data.batches(Split::Train, epoch).enumerate() {
            if self.stop.is_raised() {
                tracker.flush();
                return Ok(PassOutcome::Stopped);
            }
            if batch.is_empty() {
                return Err(fail(index, "batch contains no sequences".into()));
            }

            let masked = self
                .masking
                .apply_batch(&batch, rng)
                .map_err(|e| fail(index, e.to_string()))?;
            let score = model
                .forward_loss(&masked)
                .map_err(|e| fail(index, format!("{e:#}")))?;
            model
                .optimizer_step()
                .map_err(|e| fail(index, format!("{e:#}")))?;

            progress.steps += 1;
            loss_sum += score.loss;
            batches  += 1;
            tracker.record(
                Scope { epoch, step: progress.steps },
                metrics([("train/loss", score.loss)]),
            );
        }

        // A stop raised during the last batch still ends the run
        // here instead of starting validation.
        if self.stop.is_raised() {
            tracker.flush();
            return Ok(PassOutcome::Stopped);
        }

        let avg_loss = if batches > 0 {
            loss_sum / batches as f64
        } else {
            tracing::warn!(epoch, "training split produced no batches");
            f64::NAN
        };
        tracker.record(
            Scope { epoch, step: progress.steps },
            metrics([("train/epoch_loss", avg_loss)]),
        );
        tracker.flush();

        tracing::info!(
            "Epoch {:>3}/{} | train_loss={:.4} | batches={}",
            epoch, self.config.epochs(), avg_loss, batches,
        );
        Ok(PassOutcome::Finished(()))
    }

    fn validate(
        &self,
        epoch:   usize,
        step:    usize,
        data:    &mut dyn DataSource,
        model:   &mut dyn MaskedLmModel,
        tracker: &mut dyn RunTracker,
    ) -> Result<PassOutcome<ValidationMetrics>, MlmError> {
        let fail = |batch: usize, reason: String| MlmError::BatchProcessing {
            phase: Phase::Validation,
            epoch,
            batch,
            reason,
        };

        let mut rng      = StdRng::seed_from_u64(self.seed ^ VALIDATION_STREAM);
        let mut loss_sum = 0.0f64;
        let mut batches  = 0usize;
        let mut correct  = 0usize;
        let mut masked_n = 0usize;

        for (index, batch) in data.batches(Split::Validation, epoch).enumerate() {
            if self.stop.is_raised() {
                tracker.flush();
                return Ok(PassOutcome::Stopped);
            }
            if batch.is_empty() {
                return Err(fail(index, "batch contains no sequences".into()));
            }

            let masked = self
                .masking
                .apply_batch(&batch, &mut rng)
                .map_err(|e| fail(index, e.to_string()))?;
            let score = model
                .evaluate(&masked)
                .map_err(|e| fail(index, format!("{e:#}")))?;

            loss_sum += score.loss;
            batches  += 1;
            correct  += score.correct;
            masked_n += score.masked;
        }

        let loss     = if batches  > 0 { loss_sum / batches as f64 } else { f64::NAN };
        let accuracy = if masked_n > 0 { correct as f64 / masked_n as f64 } else { 0.0 };

        tracker.record(
            Scope { epoch, step },
            metrics([("val/loss", loss), ("val/accuracy", accuracy)]),
        );
        tracker.flush();

        tracing::info!(
            "Epoch {:>3}/{} | val_loss={:.4} | masked_acc={:.1}%",
            epoch, self.config.epochs(), loss, accuracy * 100.0,
        );
        Ok(PassOutcome::Finished(ValidationMetrics { epoch, loss, accuracy }))
    }
}
