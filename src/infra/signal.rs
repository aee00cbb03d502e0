// ============================================================
// Layer 6 — Interrupt Handling
// ============================================================
// Ctrl-C raises the training loop's stop signal. The loop only
// looks at it between batches, so a batch in flight always
// completes and the tracker is still flushed and finalized.
//
// A second Ctrl-C while that wind-down is running exits at once.

use anyhow::{Context, Result};

use crate::ml::training_loop::StopSignal;

/// Status used when the process is killed by a repeated interrupt.
const EXIT_FORCED: i32 = 130;

/// Can be installed once per process.
pub fn install_interrupt_handler(stop: &StopSignal) -> Result<()> {
    let stop = stop.clone();
    ctrlc::set_handler(move || {
        if on_interrupt(&stop) == Interrupt::Force {
            std::process::exit(EXIT_FORCED);
        }
    })
    .context("Cannot install the Ctrl-C handler")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Interrupt {
    /// First signal: stop after the current batch
    Graceful,
    /// Signal arrived while already stopping
    Force,
}

fn on_interrupt(stop: &StopSignal) -> Interrupt {
    if stop.is_raised() {
        tracing::warn!("Second interrupt received, exiting without waiting for the loop");
        return Interrupt::Force;
    }
    tracing::warn!("Interrupt received, stopping after the current batch (Ctrl-C again to exit now)");
    stop.raise();
    Interrupt::Graceful
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_interrupt_stops_gracefully() {
        let stop = StopSignal::new();
        assert_eq!(on_interrupt(&stop), Interrupt::Graceful);
        assert!(stop.is_raised());
    }

    #[test]
    fn test_second_interrupt_forces_exit() {
        let stop = StopSignal::new();
        on_interrupt(&stop);
        assert_eq!(on_interrupt(&stop), Interrupt::Force);
        assert_eq!(on_interrupt(&stop.clone()), Interrupt::Force);
    }
}
