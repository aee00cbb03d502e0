// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// Orchestrates the other layers for one goal each (training a
// model, predicting with a trained one). No tensor code and no
// printing here: that belongs to Layers 5 and 1.
//
// Reference: Clean Architecture pattern
//            Rust Book §7 (Module System)

// The training workflow
pub mod train_use_case;

// Next-keystep prediction from a checkpoint
pub mod predict_use_case;
