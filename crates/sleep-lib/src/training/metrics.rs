//! Evaluation metrics for candidate models

use crate::error::{ClassifierError, Result};
use ndarray::{Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Probabilities are clipped to `[EPS, 1 - EPS]` before taking logs
const LOG_LOSS_EPS: f64 = 1e-15;

/// Scores of one model on one partition
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationMetrics {
    pub accuracy: f64,
    pub macro_f1: f64,
    pub log_loss: f64,
    pub n_samples: usize,
}

/// Index of the largest value; ties go to the lowest index
pub fn argmax(row: ArrayView1<f64>) -> usize {
    let mut best = 0;
    for (i, &v) in row.iter().enumerate() {
        if v > row[best] {
            best = i;
        }
    }
    best
}

/// Score probabilities whose columns are class indices
pub fn evaluate(proba: &Array2<f64>, y_true: &[usize]) -> Result<EvaluationMetrics> {
    if proba.nrows() != y_true.len() {
        return Err(ClassifierError::Training(format!(
            "{} probability rows for {} labels",
            proba.nrows(),
            y_true.len()
        )));
    }
    if y_true.is_empty() {
        return Err(ClassifierError::Training(
            "cannot evaluate on an empty partition".to_string(),
        ));
    }
    if let Some(&bad) = y_true.iter().find(|&&c| c >= proba.ncols()) {
        return Err(ClassifierError::Training(format!(
            "label index {} outside {} probability columns",
            bad,
            proba.ncols()
        )));
    }

    let y_pred: Vec<usize> = proba.rows().into_iter().map(argmax).collect();

    Ok(EvaluationMetrics {
        accuracy: accuracy(y_true, &y_pred),
        macro_f1: macro_f1(y_true, &y_pred, proba.ncols()),
        log_loss: log_loss(proba, y_true),
        n_samples: y_true.len(),
    })
}

pub fn accuracy(y_true: &[usize], y_pred: &[usize]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let correct = y_true.iter().zip(y_pred).filter(|(t, p)| t == p).count();
    correct as f64 / y_true.len() as f64
}

/// Unweighted mean of per-class F1 over classes present in either vector
pub fn macro_f1(y_true: &[usize], y_pred: &[usize], n_classes: usize) -> f64 {
    let mut tp = vec![0usize; n_classes];
    let mut fp = vec![0usize; n_classes];
    let mut fn_ = vec![0usize; n_classes];

    for (&t, &p) in y_true.iter().zip(y_pred) {
        if t == p {
            tp[t] += 1;
        } else {
            fp[p] += 1;
            fn_[t] += 1;
        }
    }

    let scores: Vec<f64> = (0..n_classes)
        .filter(|&k| tp[k] + fp[k] + fn_[k] > 0)
        .map(|k| {
            let denom = 2 * tp[k] + fp[k] + fn_[k];
            2.0 * tp[k] as f64 / denom as f64
        })
        .collect();

    if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

/// Mean negative log-likelihood of the true class
pub fn log_loss(proba: &Array2<f64>, y_true: &[usize]) -> f64 {
    if y_true.is_empty() {
        return 0.0;
    }
    let total: f64 = y_true
        .iter()
        .enumerate()
        .map(|(i, &c)| -proba[[i, c]].clamp(LOG_LOSS_EPS, 1.0 - LOG_LOSS_EPS).ln())
        .sum();
    total / y_true.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_argmax_ties_go_low() {
        assert_eq!(argmax(array![0.4, 0.4, 0.2].view()), 0);
        assert_eq!(argmax(array![0.2, 0.4, 0.4].view()), 1);
    }

    #[test]
    fn test_perfect_predictions() {
        let proba = array![[1.0, 0.0, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]];
        let m = evaluate(&proba, &[0, 1, 2]).unwrap();
        assert_eq!(m.accuracy, 1.0);
        assert_eq!(m.macro_f1, 1.0);
        assert!(m.log_loss < 1e-12);
        assert_eq!(m.n_samples, 3);
    }

    #[test]
    fn test_macro_f1_by_hand() {
        // class 0: tp 1, fn 1 -> 2/3; class 1: tp 1, fp 1 -> 2/3
        let y_true = [0, 0, 1];
        let y_pred = [0, 1, 1];
        assert!((macro_f1(&y_true, &y_pred, 3) - 2.0 / 3.0).abs() < 1e-12);
        assert!((accuracy(&y_true, &y_pred) - 2.0 / 3.0).abs() < 1e-12);
    }

    #[test]
    fn test_uniform_log_loss() {
        let proba = array![[0.5, 0.5], [0.5, 0.5]];
        assert!((log_loss(&proba, &[0, 1]) - std::f64::consts::LN_2).abs() < 1e-12);
    }

    #[test]
    fn test_evaluate_rejects_mismatched_rows() {
        let proba = array![[0.5, 0.5]];
        assert!(evaluate(&proba, &[0, 1]).is_err());
        assert!(evaluate(&proba, &[2]).is_err());
    }
}
