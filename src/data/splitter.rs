// ============================================================
// Layer 4 — Train/Validation Splitter
// ============================================================
// Shuffles procedures and splits them into two sets:
//   - Training set:   masked and used to update model weights
//   - Validation set: masked identically, scored without updates
//
// Recordings are grouped by user and toy on disk, so without a
// shuffle the validation set would only hold the last toys.
//
// The generator is passed in: the same seed always gives the
// same split, which keeps validation numbers comparable across
// runs of the same corpus.
//
// Reference: rand crate documentation (SliceRandom)

use anyhow::{bail, Result};
use rand::{seq::SliceRandom, Rng};

/// Shuffle `samples` and split into (train, validation).
///
/// # Arguments
/// * `samples`        - All available samples (consumed by this function)
/// * `train_fraction` - Proportion for training, e.g. 0.8 = 80%
///
/// # Returns
/// A tuple (train_samples, val_samples)
pub fn split_train_val<T, R: Rng + ?Sized>(
    mut samples:    Vec<T>,
    train_fraction: f64,
    rng:            &mut R,
) -> (Vec<T>, Vec<T>) {
    samples.shuffle(rng);

    let total    = samples.len();
    let split_at = ((total as f64) * train_fraction).round() as usize;
    let split_at = split_at.min(total);

    let val = samples.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} training, {} validation ({}% / {}%)",
        samples.len(),
        val.len(),
        (samples.len() * 100) / total.max(1),
        (val.len()     * 100) / total.max(1),
    );

    (samples, val)
}

/// Like [`split_train_val`], but both halves must end up non-empty.
pub fn split_non_empty<T, R: Rng + ?Sized>(
    samples:        Vec<T>,
    train_fraction: f64,
    rng:            &mut R,
) -> Result<(Vec<T>, Vec<T>)> {
    if !(train_fraction > 0.0 && train_fraction < 1.0) {
        bail!("train fraction {train_fraction} must be strictly between 0 and 1");
    }
    let total = samples.len();
    let (train, val) = split_train_val(samples, train_fraction, rng);
    if train.is_empty() || val.is_empty() {
        bail!(
            "{total} procedure(s) cannot be split {:.0}/{:.0} into two non-empty sets",
            train_fraction * 100.0,
            (1.0 - train_fraction) * 100.0,
        );
    }
    Ok((train, val))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_correct_split_sizes() {
        let items: Vec<usize> = (0..100).collect();
        let (train, val) = split_train_val(items, 0.8, &mut StdRng::seed_from_u64(1));
        assert_eq!(train.len(), 80);
        assert_eq!(val.len(),   20);
    }

    #[test]
    fn test_all_items_preserved() {
        let items: Vec<usize> = (0..50).collect();
        let (train, val) = split_train_val(items, 0.7, &mut StdRng::seed_from_u64(1));
        let mut all: Vec<usize> = train.into_iter().chain(val).collect();
        all.sort();
        assert_eq!(all, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_same_seed_same_split() {
        let a = split_train_val((0..30).collect::<Vec<u32>>(), 0.8, &mut StdRng::seed_from_u64(9));
        let b = split_train_val((0..30).collect::<Vec<u32>>(), 0.8, &mut StdRng::seed_from_u64(9));
        assert_eq!(a, b);
    }

    #[test]
    fn test_empty_dataset() {
        let items: Vec<usize> = Vec::new();
        let (train, val) = split_train_val(items, 0.8, &mut StdRng::seed_from_u64(1));
        assert!(train.is_empty());
        assert!(val.is_empty());
    }

    #[test]
    fn test_non_empty_split_rejects_tiny_corpus() {
        let mut rng = StdRng::seed_from_u64(1);
        assert!(split_non_empty(vec![1], 0.8, &mut rng).is_err());
        assert!(split_non_empty(vec![1, 2, 3], 1.0, &mut rng).is_err());
        let (train, val) = split_non_empty(vec![1, 2, 3, 4, 5], 0.8, &mut rng).unwrap();
        assert_eq!((train.len(), val.len()), (4, 1));
    }
}
