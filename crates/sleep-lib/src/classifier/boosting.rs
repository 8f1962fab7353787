//! Gradient boosted trees with a softmax objective
//!
//! Each round fits one second-order regression tree per class on the
//! gradients and hessians of the multi-class log loss, using a row
//! subsample and a per-tree column subsample.

use super::softmax_rows;
use super::tree::{RegressionTree, RegressionTreeParams};
use ndarray::Array2;
use rand::seq::index::sample;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

/// Lower bound on per-row hessians
const MIN_HESSIAN: f64 = 1e-16;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub subsample: f64,
    pub colsample_bytree: f64,
    pub reg_lambda: f64,
    pub min_child_weight: f64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            learning_rate: 0.1,
            max_depth: 4,
            subsample: 0.9,
            colsample_bytree: 0.9,
            reg_lambda: 1.0,
            min_child_weight: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoosting {
    /// `rounds[r][k]` is the tree for class `k` in round `r`
    rounds: Vec<Vec<RegressionTree>>,
    learning_rate: f64,
    n_classes: usize,
    n_features: usize,
}

fn sample_size(n: usize, fraction: f64) -> usize {
    ((n as f64 * fraction).round() as usize).clamp(1, n)
}

impl GradientBoosting {
    pub fn fit(
        x: &Array2<f64>,
        y: &[usize],
        n_classes: usize,
        params: &BoostingParams,
        seed: u64,
    ) -> Self {
        let n_samples = x.nrows();
        let n_features = x.ncols();
        let mut rng = ChaCha8Rng::seed_from_u64(seed);

        let tree_params = RegressionTreeParams {
            max_depth: params.max_depth,
            reg_lambda: params.reg_lambda,
            min_child_weight: params.min_child_weight,
        };

        // Raw margins start equal, i.e. a uniform distribution
        let mut margins = Array2::<f64>::zeros((n_samples, n_classes));
        let mut rounds = Vec::with_capacity(params.n_estimators);
        let mut grad = vec![0.0; n_samples];
        let mut hess = vec![0.0; n_samples];

        for _ in 0..params.n_estimators {
            let mut proba = margins.clone();
            softmax_rows(&mut proba);

            let mut rows = sample(&mut rng, n_samples, sample_size(n_samples, params.subsample)).into_vec();
            rows.sort_unstable();

            let mut trees = Vec::with_capacity(n_classes);
            for class in 0..n_classes {
                for i in 0..n_samples {
                    let p = proba[[i, class]];
                    let target = if y[i] == class { 1.0 } else { 0.0 };
                    grad[i] = p - target;
                    hess[i] = (2.0 * p * (1.0 - p)).max(MIN_HESSIAN);
                }

                let mut features =
                    sample(&mut rng, n_features, sample_size(n_features, params.colsample_bytree)).into_vec();
                features.sort_unstable();

                trees.push(RegressionTree::fit(x, &grad, &hess, &rows, &features, &tree_params));
            }

            for (i, row) in x.rows().into_iter().enumerate() {
                for (class, tree) in trees.iter().enumerate() {
                    margins[[i, class]] += params.learning_rate * tree.predict_row(row);
                }
            }
            rounds.push(trees);
        }

        Self {
            rounds,
            learning_rate: params.learning_rate,
            n_classes,
            n_features,
        }
    }

    /// Raw per-class scores before the softmax
    pub fn decision_function(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut margins = Array2::<f64>::zeros((x.nrows(), self.n_classes));
        for (i, row) in x.rows().into_iter().enumerate() {
            for trees in &self.rounds {
                for (class, tree) in trees.iter().enumerate() {
                    margins[[i, class]] += self.learning_rate * tree.predict_row(row);
                }
            }
        }
        margins
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut proba = self.decision_function(x);
        softmax_rows(&mut proba);
        proba
    }

    pub fn n_rounds(&self) -> usize {
        self.rounds.len()
    }

    pub fn n_classes(&self) -> usize {
        self.n_classes
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    fn data() -> (Array2<f64>, Vec<usize>) {
        let x = array![
            [0.0, 0.0],
            [0.1, 0.2],
            [0.2, 0.1],
            [1.0, 1.0],
            [1.1, 1.2],
            [1.2, 0.9],
            [2.0, 0.0],
            [2.1, 0.2],
            [1.9, 0.1],
        ];
        (x, vec![0, 0, 0, 1, 1, 1, 2, 2, 2])
    }

    fn params(rounds: usize) -> BoostingParams {
        BoostingParams {
            n_estimators: rounds,
            min_child_weight: 0.0,
            subsample: 1.0,
            colsample_bytree: 1.0,
            ..BoostingParams::default()
        }
    }

    #[test]
    fn test_zero_rounds_is_uniform() {
        let (x, y) = data();
        let model = GradientBoosting::fit(&x, &y, 3, &params(0), 1);
        let proba = model.predict_proba(&x);
        assert!(proba.iter().all(|&p| (p - 1.0 / 3.0).abs() < 1e-12));
    }

    #[test]
    fn test_more_rounds_lower_training_loss() {
        let (x, y) = data();
        let log_loss = |m: &GradientBoosting| {
            let proba = m.predict_proba(&x);
            y.iter()
                .enumerate()
                .map(|(i, &c)| -proba[[i, c]].ln())
                .sum::<f64>()
        };

        let short = GradientBoosting::fit(&x, &y, 3, &params(5), 1);
        let long = GradientBoosting::fit(&x, &y, 3, &params(40), 1);
        assert!(log_loss(&long) < log_loss(&short));
        assert_eq!(long.n_rounds(), 40);
    }

    #[test]
    fn test_seeded_subsampling_is_deterministic() {
        let (x, y) = data();
        let p = BoostingParams {
            n_estimators: 10,
            min_child_weight: 0.0,
            ..BoostingParams::default()
        };
        let a = GradientBoosting::fit(&x, &y, 3, &p, 9);
        let b = GradientBoosting::fit(&x, &y, 3, &p, 9);
        assert_eq!(a.predict_proba(&x), b.predict_proba(&x));
    }
}
