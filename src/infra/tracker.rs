// ============================================================
// Layer 6 — Run Trackers
// ============================================================
// Two implementations of the RunTracker capability, chosen once
// at start-up from RunIdentity.mode:
//
//   NullTracker  — DISABLED mode. Every call is a no-op; no
//                  filesystem or network access ever happens.
//
//   SinkTracker  — ENABLED mode. Buffers records in the order
//                  they arrive and hands them to a TrackingSink
//                  in that same order. A sink failure is logged
//                  and swallowed: training never depends on it.
//
// The training loop only sees `dyn RunTracker`, so there is no
// "if tracking enabled" branch anywhere in the loop.

use std::path::Path;

use crate::domain::config::{RunIdentity, TrackingMode};
use crate::domain::traits::{Metrics, RunTracker, Scope, TrackedRecord, TrackingSink};
use crate::infra::metrics::JsonlSink;

/// Records buffered before an automatic flush.
pub const DEFAULT_FLUSH_EVERY: usize = 32;

/// Builds the tracker for this run. A disabled identity never
/// looks at `root`.
pub fn tracker_for(identity: &RunIdentity, root: impl AsRef<Path>) -> Box<dyn RunTracker> {
    match identity.mode {
        TrackingMode::Disabled => {
            tracing::info!("Experiment tracking disabled");
            Box::new(NullTracker)
        }
        TrackingMode::Enabled => {
            let sink = JsonlSink::new(root, identity);
            tracing::info!(
                "Tracking run '{}' (group '{}') in '{}'",
                identity.name,
                identity.group,
                sink.run_dir().display()
            );
            Box::new(SinkTracker::new(identity.clone(), sink, DEFAULT_FLUSH_EVERY))
        }
    }
}

// ─── NullTracker ──────────────────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy)]
pub struct NullTracker;

impl RunTracker for NullTracker {
    fn log_config(&mut self, _config: &serde_json::Value) {}

    fn record(&mut self, _scope: Scope, _metrics: Metrics) {}

    fn flush(&mut self) {}

    fn finalize(&mut self) {}
}

// ─── SinkTracker ──────────────────────────────────────────────────────────────

pub struct SinkTracker<S: TrackingSink> {
    identity:    RunIdentity,
    sink:        S,
    buffer:      Vec<TrackedRecord>,
    flush_every: usize,
    finalized:   bool,
    dropped:     usize,
}

impl<S: TrackingSink> SinkTracker<S> {
    pub fn new(identity: RunIdentity, sink: S, flush_every: usize) -> Self {
        Self {
            identity,
            sink,
            buffer: Vec::new(),
            flush_every: flush_every.max(1),
            finalized: false,
            dropped: 0,
        }
    }

    /// Records lost to delivery failures so far.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }
}

impl<S: TrackingSink> RunTracker for SinkTracker<S> {
    fn log_config(&mut self, config: &serde_json::Value) {
        let mut config = config.clone();
        if let Some(obj) = config.as_object_mut() {
            obj.insert("run_name".into(), self.identity.name.clone().into());
            obj.insert("run_group".into(), self.identity.group.clone().into());
        }
        if let Err(e) = self.sink.write_config(&config) {
            tracing::warn!("Tracking: could not deliver run config: {e}");
        }
    }

    fn record(&mut self, scope: Scope, metrics: Metrics) {
        if self.finalized {
            tracing::debug!("Tracking: record after finalize ignored (epoch {})", scope.epoch);
            return;
        }
        self.buffer.push(TrackedRecord { scope, metrics });
        if self.buffer.len() >= self.flush_every {
            self.flush();
        }
    }

    fn flush(&mut self) {
        if self.buffer.is_empty() {
            return;
        }
        match self.sink.write_records(&self.buffer) {
            Ok(()) => self.buffer.clear(),
            Err(e) => {
                self.dropped += self.buffer.len();
                tracing::warn!(
                    "Tracking: dropping {} record(s) after delivery failure: {e}",
                    self.buffer.len()
                );
                self.buffer.clear();
            }
        }
    }

    fn finalize(&mut self) {
        if self.finalized {
            return;
        }
        self.flush();
        if let Err(e) = self.sink.finish() {
            tracing::warn!("Tracking: could not finalize run '{}': {e}", self.identity.name);
        }
        self.finalized = true;
        if self.dropped > 0 {
            tracing::warn!("Tracking: {} record(s) were never delivered", self.dropped);
        }
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::config::{MaskingConfig, ModelKind, TrainingConfig};
    use crate::domain::error::TrackingDeliveryError;
    use crate::domain::sequence::{Batch, MaskedExample};
    use crate::domain::traits::{metrics, BatchScore, DataSource, MaskedLmModel, Split};
    use crate::ml::masking::MaskingPolicy;
    use crate::ml::training_loop::TrainingLoop;

    /// In-memory sink that can be told to fail.
    #[derive(Default)]
    struct MemorySink {
        written:  Vec<TrackedRecord>,
        configs:  usize,
        finished: usize,
        fail:     bool,
    }

    impl TrackingSink for MemorySink {
        fn write_config(&mut self, _config: &serde_json::Value) -> Result<(), TrackingDeliveryError> {
            self.configs += 1;
            Ok(())
        }

        fn write_records(&mut self, records: &[TrackedRecord]) -> Result<(), TrackingDeliveryError> {
            if self.fail {
                return Err(std::io::Error::other("sink unreachable").into());
            }
            self.written.extend_from_slice(records);
            Ok(())
        }

        fn finish(&mut self) -> Result<(), TrackingDeliveryError> {
            self.finished += 1;
            if self.fail {
                return Err(std::io::Error::other("sink unreachable").into());
            }
            Ok(())
        }
    }

    struct TinySource;

    impl DataSource for TinySource {
        fn batches(&mut self, _split: Split, _epoch: usize) -> Box<dyn Iterator<Item = Batch> + '_> {
            Box::new(vec![vec![vec![3, 4, 5]], vec![vec![6, 7]]].into_iter())
        }
    }

    struct ConstModel;

    impl MaskedLmModel for ConstModel {
        fn forward_loss(&mut self, _batch: &[MaskedExample]) -> anyhow::Result<BatchScore> {
            Ok(BatchScore { loss: 1.0, ..Default::default() })
        }

        fn optimizer_step(&mut self) -> anyhow::Result<()> {
            Ok(())
        }

        fn evaluate(&mut self, _batch: &[MaskedExample]) -> anyhow::Result<BatchScore> {
            Ok(BatchScore { loss: 1.0, correct: 1, masked: 2 })
        }
    }

    fn identity(mode: TrackingMode) -> RunIdentity {
        RunIdentity::new("run", "group", mode)
    }

    fn scope(step: usize) -> Scope {
        Scope { epoch: 1, step }
    }

    #[test]
    fn test_buffer_preserves_order_across_flushes() {
        let mut tracker = SinkTracker::new(identity(TrackingMode::Enabled), MemorySink::default(), 2);
        for step in 1..=5 {
            tracker.record(scope(step), metrics([("train/loss", step as f64)]));
        }
        // two automatic flushes so far, one record still buffered
        assert_eq!(tracker.sink().written.len(), 4);

        tracker.finalize();
        let steps: Vec<usize> = tracker.sink().written.iter().map(|r| r.scope.step).collect();
        assert_eq!(steps, vec![1, 2, 3, 4, 5]);
        assert_eq!(tracker.sink().finished, 1);
    }

    #[test]
    fn test_finalize_is_idempotent() {
        let mut tracker = SinkTracker::new(identity(TrackingMode::Enabled), MemorySink::default(), 8);
        tracker.finalize();
        tracker.finalize();
        tracker.record(scope(1), metrics([("train/loss", 1.0)]));
        tracker.flush();
        assert_eq!(tracker.sink().finished, 1);
        assert!(tracker.sink().written.is_empty());
    }

    #[test]
    fn test_delivery_failures_are_absorbed() {
        let sink = MemorySink { fail: true, ..Default::default() };
        let mut tracker = SinkTracker::new(identity(TrackingMode::Enabled), sink, 1);
        tracker.log_config(&serde_json::json!({ "epochs": 2 }));
        tracker.record(scope(1), metrics([("train/loss", 1.0)]));
        tracker.record(scope(2), metrics([("train/loss", 0.5)]));
        tracker.finalize();
        assert_eq!(tracker.dropped(), 2);
        assert_eq!(tracker.sink().configs, 1);
    }

    #[test]
    fn test_disabled_run_completes_without_touching_sink_path() {
        let root = tempfile::tempdir().unwrap();
        // a file where the sink would need a directory: unreachable
        let blocked = root.path().join("not-a-dir");
        std::fs::write(&blocked, b"x").unwrap();

        let mut tracker = tracker_for(&identity(TrackingMode::Disabled), &blocked);
        let cfg  = TrainingConfig::new(2, 1, ModelKind::KeystepTiny).unwrap();
        let lp   = TrainingLoop::new(cfg, MaskingPolicy::new(MaskingConfig::prob(0.5).unwrap(), 2), 1);

        tracker.log_config(&serde_json::json!({ "epochs": 2 }));
        let result = lp.run(&mut TinySource, &mut ConstModel, tracker.as_mut()).unwrap();

        assert!(result.complete);
        assert_eq!(std::fs::read(&blocked).unwrap(), b"x");
        assert_eq!(std::fs::read_dir(root.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_enabled_run_survives_unreachable_sink() {
        let root = tempfile::tempdir().unwrap();
        let blocked = root.path().join("not-a-dir");
        std::fs::write(&blocked, b"x").unwrap();

        let mut tracker = tracker_for(&identity(TrackingMode::Enabled), &blocked);
        let cfg  = TrainingConfig::new(2, 1, ModelKind::KeystepTiny).unwrap();
        let lp   = TrainingLoop::new(cfg, MaskingPolicy::new(MaskingConfig::end(None).unwrap(), 2), 1);

        let result = lp.run(&mut TinySource, &mut ConstModel, tracker.as_mut()).unwrap();
        assert!(result.complete);
        assert_eq!(result.last_validation.unwrap().accuracy, 0.5);
    }

    #[test]
    fn test_enabled_run_writes_jsonl() {
        let root = tempfile::tempdir().unwrap();
        let mut tracker = tracker_for(&identity(TrackingMode::Enabled), root.path());
        let cfg = TrainingConfig::new(1, 1, ModelKind::KeystepTiny).unwrap();
        let lp  = TrainingLoop::new(cfg, MaskingPolicy::new(MaskingConfig::end(None).unwrap(), 2), 1);

        tracker.log_config(&serde_json::json!({ "epochs": 1 }));
        lp.run(&mut TinySource, &mut ConstModel, tracker.as_mut()).unwrap();

        let run_dir = root.path().join("group/run");
        let lines = std::fs::read_to_string(run_dir.join("metrics.jsonl")).unwrap();
        // two batches, one epoch summary, one validation record
        assert_eq!(lines.lines().count(), 4);
        let config: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(run_dir.join("config.json")).unwrap()).unwrap();
        assert_eq!(config["run_group"], "group");
        assert!(run_dir.join("status.json").exists());
    }
}
