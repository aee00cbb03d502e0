// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns used by several layers:
//
//   checkpoint.rs      — encoder weights via Burn's CompactRecorder,
//                        plus train_config.json so `predict` can
//                        rebuild the same architecture.
//
//   tokenizer_store.rs — keystep vocabulary: built from the corpus
//                        on the first run, loaded afterwards.
//
//   tracker.rs         — RunTracker implementations (null object
//                        for DISABLED, buffered sink for ENABLED).
//
//   metrics.rs         — JSONL tracking sink on the filesystem.
//
//   signal.rs          — Ctrl-C → stop signal.
//
// Reference: Rust Book §7 (Modules)
//            Rust Book §9 (Error Handling with anyhow)
//            Burn Book §5 (Checkpointing)

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Tokenizer building, saving, and loading
pub mod tokenizer_store;

/// Run trackers
pub mod tracker;

/// JSONL tracking sink
pub mod metrics;

/// Interrupt handling
pub mod signal;
