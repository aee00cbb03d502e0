// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// From CSV recordings to padded tensor batches:
//
//   procedure CSVs
//       │
//       ▼
//   ProcedureLoader   → keysteps + labels per recording
//       │
//       ▼
//   encode_procedures → token ids, truncated to the context size
//       │
//       ▼
//   split_non_empty   → seeded train / validation split
//       │
//       ▼
//   InMemorySource    → restartable batches per split and epoch
//       │
//       ▼   (masking happens in Layer 5)
//   MlmBatcher        → padded [batch, seq] tensors for the model
//
// Reference: Burn Book §4 (Datasets and Dataloaders)
//            Rust Book §13 (Iterators and Closures)

/// Loads procedure CSV files
pub mod loader;

/// Keystep encoding and the in-memory DataSource
pub mod dataset;

/// Pads masked examples into tensor batches
pub mod batcher;

/// Shuffles and splits data into train/validation sets
pub mod splitter;
