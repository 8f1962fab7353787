//! Stratified train / validation / test partitioning

use crate::error::{ClassifierError, Result};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Row indices of the three partitions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataSplit {
    pub train: Vec<usize>,
    pub validation: Vec<usize>,
    pub test: Vec<usize>,
}

impl DataSplit {
    pub fn sizes(&self) -> (usize, usize, usize) {
        (self.train.len(), self.validation.len(), self.test.len())
    }
}

/// Split rows into a training part and a hold-out part of
/// `ceil(n * test_size)` rows, preserving class proportions.
///
/// Each class contributes its proportional share of the hold-out, with the
/// leftover rows after flooring going to the classes with the largest
/// fractional shares.
pub fn stratified_split<S: AsRef<str>>(
    labels: &[S],
    test_size: f64,
    seed: u64,
) -> Result<(Vec<usize>, Vec<usize>)> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(ClassifierError::Training(format!(
            "split fraction must be in (0, 1), got {}",
            test_size
        )));
    }

    let n = labels.len();
    // tolerance keeps float noise such as 300 * 0.4 from rounding up
    let n_holdout = (n as f64 * test_size - 1e-9).ceil() as usize;
    if n_holdout == 0 || n_holdout >= n {
        return Err(ClassifierError::Training(format!(
            "cannot split {} rows with fraction {}: a partition would be empty",
            n, test_size
        )));
    }

    let mut by_class: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, label) in labels.iter().enumerate() {
        by_class.entry(label.as_ref()).or_default().push(i);
    }
    if let Some((class, rows)) = by_class.iter().find(|(_, rows)| rows.len() < 2) {
        return Err(ClassifierError::Training(format!(
            "class `{}` has {} member(s); stratified splitting needs at least 2",
            class,
            rows.len()
        )));
    }

    let counts: Vec<usize> = by_class.values().map(Vec::len).collect();
    let allocation = largest_remainder(&counts, n, n_holdout);

    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut train = Vec::with_capacity(n - n_holdout);
    let mut holdout = Vec::with_capacity(n_holdout);

    for ((class, rows), take) in by_class.iter_mut().zip(allocation) {
        if take >= rows.len() {
            return Err(ClassifierError::Training(format!(
                "class `{}` would be missing from the training partition",
                class
            )));
        }
        rows.shuffle(&mut rng);
        holdout.extend_from_slice(&rows[..take]);
        train.extend_from_slice(&rows[take..]);
    }

    train.shuffle(&mut rng);
    holdout.shuffle(&mut rng);
    Ok((train, holdout))
}

/// Two-stage 60/20/20 style split.
///
/// Stage one holds out `test_size` of the rows. Stage two splits the
/// hold-out again, sending `val_size` of it to the test partition and the
/// rest to validation. Both stages are stratified and use `seed`.
pub fn train_validation_test_split<S: AsRef<str>>(
    labels: &[S],
    test_size: f64,
    val_size: f64,
    seed: u64,
) -> Result<DataSplit> {
    let (train, holdout) = stratified_split(labels, test_size, seed)?;

    let holdout_labels: Vec<&str> = holdout.iter().map(|&i| labels[i].as_ref()).collect();
    let (validation, test) = stratified_split(&holdout_labels, val_size, seed)?;

    Ok(DataSplit {
        train,
        validation: validation.into_iter().map(|i| holdout[i]).collect(),
        test: test.into_iter().map(|i| holdout[i]).collect(),
    })
}

/// Distribute `n_take` rows over classes proportionally to `counts`
fn largest_remainder(counts: &[usize], total: usize, n_take: usize) -> Vec<usize> {
    let quotas: Vec<f64> = counts
        .iter()
        .map(|&c| c as f64 * n_take as f64 / total as f64)
        .collect();
    let mut allocation: Vec<usize> = quotas.iter().map(|q| q.floor() as usize).collect();

    let mut order: Vec<usize> = (0..counts.len()).collect();
    order.sort_by(|&a, &b| {
        let frac_a = quotas[a] - quotas[a].floor();
        let frac_b = quotas[b] - quotas[b].floor();
        frac_b
            .total_cmp(&frac_a)
            .then(counts[b].cmp(&counts[a]))
            .then(a.cmp(&b))
    });

    let mut remaining = n_take.saturating_sub(allocation.iter().sum());
    for &class in order.iter().cycle().take(order.len() * 2) {
        if remaining == 0 {
            break;
        }
        if allocation[class] < counts[class] {
            allocation[class] += 1;
            remaining -= 1;
        }
    }
    allocation
}
