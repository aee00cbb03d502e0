// ============================================================
// Layer 3 — Error Taxonomy
// ============================================================
// Typed failures the training core can surface to its caller:
//
//   InvalidConfig    — bad launch parameters, detected before any
//                      data is read or any model work starts
//   BatchProcessing  — a batch could not be masked or scored;
//                      aborts the run after the tracker is finalized
//   Checkpoint       — the model collaborator failed to persist
//
// Tracking delivery failures have their own type because they
// never leave the tracker (see infra::tracker).

use std::fmt;

use thiserror::Error;

/// Which half of an epoch a batch belonged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Training,
    Validation,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Training => f.write_str("training"),
            Phase::Validation => f.write_str("validation"),
        }
    }
}

#[derive(Debug, Error, PartialEq)]
pub enum MlmError {
    #[error("invalid configuration for `{field}`: {reason}")]
    InvalidConfig { field: &'static str, reason: String },

    #[error("{phase} batch {batch} of epoch {epoch} failed: {reason}")]
    BatchProcessing {
        phase:  Phase,
        epoch:  usize,
        batch:  usize,
        reason: String,
    },

    #[error("checkpoint after epoch {epoch} failed: {reason}")]
    Checkpoint { epoch: usize, reason: String },
}

impl MlmError {
    pub fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        MlmError::InvalidConfig { field, reason: reason.into() }
    }
}

/// A record or finalize call that the tracking sink could not accept.
/// Absorbed by the tracker; never propagated into the training loop.
#[derive(Debug, Error)]
pub enum TrackingDeliveryError {
    #[error("tracking sink I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("tracking record could not be encoded: {0}")]
    Encode(#[from] serde_json::Error),
}
