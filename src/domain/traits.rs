// ============================================================
// Layer 3 — Core Traits (Abstractions)
// ============================================================
// The training loop only ever talks to these traits:
//
//   DataSource     — where batches come from
//   MaskedLmModel  — what scores them and learns from them
//   RunTracker     — where metrics go
//   TrackingSink   — the backend an enabled RunTracker writes to
//
// Concrete implementations live in data/, ml/ and infra/, and
// tests swap in in-memory mocks without touching the loop.
//
// Reference: Rust Book §10 (Traits: Defining Shared Behaviour)

use std::collections::BTreeMap;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::domain::error::TrackingDeliveryError;
use crate::domain::sequence::{Batch, MaskedExample};

// ─── DataSource ───────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Split {
    Train,
    Validation,
}

/// A finite, restartable supply of batches.
///
/// Every call to `batches` starts a fresh pass over the split; the
/// epoch number lets a source reshuffle deterministically.
pub trait DataSource {
    fn batches(&mut self, split: Split, epoch: usize) -> Box<dyn Iterator<Item = Batch> + '_>;
}

// ─── MaskedLmModel ────────────────────────────────────────────────────────────

/// Loss and masked-token hit count for one batch.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BatchScore {
    pub loss:    f64,
    pub correct: usize,
    pub masked:  usize,
}

/// The model collaborator. Owns its parameters and its optimizer.
///
/// `forward_loss` is always followed by exactly one `optimizer_step`
/// for the same batch during training. `evaluate` never changes
/// parameters.
pub trait MaskedLmModel {
    fn forward_loss(&mut self, batch: &[MaskedExample]) -> Result<BatchScore>;

    fn optimizer_step(&mut self) -> Result<()>;

    fn evaluate(&mut self, batch: &[MaskedExample]) -> Result<BatchScore>;

    /// Persist parameters after a validation pass. Models without
    /// storage keep the default.
    fn checkpoint(&mut self, _epoch: usize) -> Result<()> {
        Ok(())
    }
}

// ─── RunTracker ───────────────────────────────────────────────────────────────

/// Where in the run a record was taken. `step` counts optimizer
/// steps since the start of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Scope {
    pub epoch: usize,
    pub step:  usize,
}

pub type Metrics = BTreeMap<String, f64>;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedRecord {
    #[serde(flatten)]
    pub scope:   Scope,
    pub metrics: Metrics,
}

/// Best-effort metric recording. None of these calls can fail:
/// a tracker that cannot deliver logs the problem and moves on.
pub trait RunTracker {
    fn log_config(&mut self, config: &serde_json::Value);

    fn record(&mut self, scope: Scope, metrics: Metrics);

    /// Deliver everything recorded so far, in recording order.
    fn flush(&mut self);

    /// Flush and close. Later calls are no-ops.
    fn finalize(&mut self);
}

/// The external backend behind an enabled tracker.
pub trait TrackingSink {
    fn write_config(&mut self, config: &serde_json::Value) -> Result<(), TrackingDeliveryError>;

    fn write_records(&mut self, records: &[TrackedRecord]) -> Result<(), TrackingDeliveryError>;

    fn finish(&mut self) -> Result<(), TrackingDeliveryError>;
}

/// Shorthand for building a metrics map.
pub fn metrics<const N: usize>(pairs: [(&str, f64); N]) -> Metrics {
    pairs.into_iter().map(|(k, v)| (k.to_string(), v)).collect()
}
