//! Multinomial logistic regression
//!
//! Softmax regression with an L2 penalty on the weights (not the
//! intercepts), fit by full-batch gradient descent. The objective is
//! `mean cross-entropy + ||W||^2 / (2 C n)`, which has the same minimiser
//! as the usual `C * sum cross-entropy + ||W||^2 / 2` formulation.

use super::softmax_rows;
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogisticParams {
    /// Inverse regularization strength
    pub c: f64,
    pub max_iter: usize,
    /// Stop once the gradient norm drops below this
    pub tol: f64,
    pub learning_rate: f64,
}

impl Default for LogisticParams {
    fn default() -> Self {
        Self {
            c: 1.0,
            max_iter: 1000,
            tol: 1e-6,
            learning_rate: 0.1,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogisticRegression {
    /// `n_features x n_classes`
    weights: Array2<f64>,
    intercept: Array1<f64>,
    n_iter: usize,
}

impl LogisticRegression {
    pub fn fit(x: &Array2<f64>, y: &[usize], n_classes: usize, params: &LogisticParams) -> Self {
        let n_samples = x.nrows() as f64;
        let n_features = x.ncols();

        let mut targets = Array2::<f64>::zeros((x.nrows(), n_classes));
        for (i, &class) in y.iter().enumerate() {
            targets[[i, class]] = 1.0;
        }

        let mut weights = Array2::<f64>::zeros((n_features, n_classes));
        let mut intercept = Array1::<f64>::zeros(n_classes);
        let penalty = 1.0 / (params.c * n_samples);
        // the penalty term alone must stay a contraction
        let step = params.learning_rate.min(1.0 / penalty);

        let mut n_iter = 0;
        for _ in 0..params.max_iter {
            n_iter += 1;

            let mut proba = x.dot(&weights) + &intercept;
            softmax_rows(&mut proba);

            let errors = proba - &targets;
            let dw = x.t().dot(&errors) / n_samples + &weights * penalty;
            let db = errors.mean_axis(Axis(0)).unwrap_or_else(|| Array1::zeros(n_classes));

            let grad_norm = (dw.mapv(|v| v * v).sum() + db.mapv(|v| v * v).sum()).sqrt();
            if grad_norm < params.tol {
                break;
            }

            weights.scaled_add(-step, &dw);
            intercept.scaled_add(-step, &db);
        }

        Self {
            weights,
            intercept,
            n_iter,
        }
    }

    pub fn predict_proba(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut proba = x.dot(&self.weights) + &self.intercept;
        softmax_rows(&mut proba);
        proba
    }

    pub fn n_classes(&self) -> usize {
        self.intercept.len()
    }

    pub fn n_features(&self) -> usize {
        self.weights.nrows()
    }

    /// Gradient steps taken before convergence or the iteration cap
    pub fn n_iter(&self) -> usize {
        self.n_iter
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_stops_on_tolerance() {
        let x = array![[-1.0], [1.0]];
        let y = vec![0, 1];
        let params = LogisticParams {
            tol: 10.0,
            ..LogisticParams::default()
        };
        let model = LogisticRegression::fit(&x, &y, 2, &params);
        assert_eq!(model.n_iter(), 1);
    }

    #[test]
    fn test_regularization_shrinks_weights() {
        let x = array![[-1.0], [-0.5], [0.5], [1.0]];
        let y = vec![0, 0, 1, 1];

        let loose = LogisticRegression::fit(&x, &y, 2, &LogisticParams::default());
        let tight = LogisticRegression::fit(
            &x,
            &y,
            2,
            &LogisticParams {
                c: 0.1,
                ..LogisticParams::default()
            },
        );

        let spread = |m: &LogisticRegression| (m.weights[[0, 1]] - m.weights[[0, 0]]).abs();
        assert!(spread(&tight) < spread(&loose));
        assert!(spread(&loose) > 0.0);
    }

    #[test]
    fn test_symmetric_data_gives_symmetric_probabilities() {
        let x = array![[-1.0], [1.0]];
        let y = vec![0, 1];
        let model = LogisticRegression::fit(&x, &y, 2, &LogisticParams::default());
        let proba = model.predict_proba(&array![[0.0]]);
        assert!((proba[[0, 0]] - 0.5).abs() < 1e-9);
    }
}
