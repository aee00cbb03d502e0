// ============================================================
// Layer 5 — ML / Model Layer
// ============================================================
// The masking policy and training loop only talk to the model
// through the MaskedLmModel trait; Burn types stay inside
// model.rs and inferencer.rs.
//
//   masking.rs       — PROB / END masking of one sequence
//
//   training_loop.rs — epoch / validation state machine,
//                      stop signal, final metrics
//
//   model.rs         — transformer encoder with a vocabulary
//                      head, and its MaskedLmModel adapter
//
//   inferencer.rs    — loads a checkpoint and ranks candidates
//                      for the final keystep
//
// Reference: Burn Book §3 (Building Blocks)
//            Devlin et al. (2019) BERT

/// Masking strategies
pub mod masking;

/// Training / validation scheduling
pub mod training_loop;

/// Transformer encoder MLM
pub mod model;

/// Next-keystep prediction
pub mod inferencer;
