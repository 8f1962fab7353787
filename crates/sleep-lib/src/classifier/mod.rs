//! Candidate classifiers
//!
//! Three model families are trained on the same preprocessed matrix:
//! multinomial logistic regression, a random forest and a gradient boosted
//! tree ensemble. All of them work on dense class indices `0..n_classes`;
//! how those indices map back to class names is recorded separately in
//! [`OutputLabels`].

pub mod boosting;
pub mod forest;
pub mod logistic;
pub mod tree;

pub use boosting::{BoostingParams, GradientBoosting};
pub use forest::{ForestParams, MaxFeatures, RandomForest};
pub use logistic::{LogisticParams, LogisticRegression};

use crate::error::{ClassifierError, Result};
use ndarray::{Array2, ArrayViewMut1, Axis};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The three candidate model families
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    LogisticRegression,
    RandomForest,
    GradientBoosting,
}

impl ModelKind {
    pub const ALL: [ModelKind; 3] = [
        ModelKind::LogisticRegression,
        ModelKind::RandomForest,
        ModelKind::GradientBoosting,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelKind::LogisticRegression => "logistic_regression",
            ModelKind::RandomForest => "random_forest",
            ModelKind::GradientBoosting => "gradient_boosting",
        }
    }

    /// File name of the persisted pipeline for this family
    pub fn artifact_file(&self) -> &'static str {
        match self {
            ModelKind::LogisticRegression => "logreg_model.json",
            ModelKind::RandomForest => "random_forest_model.json",
            ModelKind::GradientBoosting => "gradient_boosting_model.json",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = ClassifierError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "logistic_regression" | "logreg" => Ok(ModelKind::LogisticRegression),
            "random_forest" | "rf" => Ok(ModelKind::RandomForest),
            "gradient_boosting" | "xgboost" | "gbm" => Ok(ModelKind::GradientBoosting),
            other => Err(ClassifierError::InvalidInput(format!(
                "unknown model variant `{}`",
                other
            ))),
        }
    }
}

/// How a classifier's output columns map to class names.
///
/// `Encoded` models were fit on label codec indices, so column `i` is codec
/// class `i`. `Named` models were fit on class names and order their columns
/// by the sorted distinct names seen in training.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutputLabels {
    Encoded { n_classes: usize },
    Named { classes: Vec<String> },
}

impl OutputLabels {
    pub fn len(&self) -> usize {
        match self {
            OutputLabels::Encoded { n_classes } => *n_classes,
            OutputLabels::Named { classes } => classes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Hyperparameters for every family
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    pub logistic_regression: LogisticParams,
    pub random_forest: ForestParams,
    pub gradient_boosting: BoostingParams,
}

/// A fitted classifier of any family
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Classifier {
    LogisticRegression(LogisticRegression),
    RandomForest(RandomForest),
    GradientBoosting(GradientBoosting),
}

impl Classifier {
    /// Fit a classifier of `kind` on class indices `y`
    pub fn fit(
        kind: ModelKind,
        x: &Array2<f64>,
        y: &[usize],
        n_classes: usize,
        params: &Hyperparameters,
        seed: u64,
    ) -> Result<Self> {
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(ClassifierError::Training(format!(
                "cannot fit {} on an empty {}x{} matrix",
                kind,
                x.nrows(),
                x.ncols()
            )));
        }
        if x.nrows() != y.len() {
            return Err(ClassifierError::Training(format!(
                "feature matrix has {} rows but {} labels were given",
                x.nrows(),
                y.len()
            )));
        }
        if n_classes < 2 {
            return Err(ClassifierError::Training(format!(
                "need at least two classes, got {}",
                n_classes
            )));
        }
        if let Some(&bad) = y.iter().find(|&&c| c >= n_classes) {
            return Err(ClassifierError::Training(format!(
                "label index {} outside 0..{}",
                bad, n_classes
            )));
        }

        let model = match kind {
            ModelKind::LogisticRegression => Classifier::LogisticRegression(
                LogisticRegression::fit(x, y, n_classes, &params.logistic_regression),
            ),
            ModelKind::RandomForest => Classifier::RandomForest(RandomForest::fit(
                x,
                y,
                n_classes,
                &params.random_forest,
                seed,
            )),
            ModelKind::GradientBoosting => Classifier::GradientBoosting(GradientBoosting::fit(
                x,
                y,
                n_classes,
                &params.gradient_boosting,
                seed,
            )),
        };

        // a diverged fit shows up as non-finite training probabilities
        if model.predict_proba(x)?.iter().any(|p| !p.is_finite()) {
            return Err(ClassifierError::Training(format!(
                "{} produced non-finite probabilities on its training data",
                kind
            )));
        }
        Ok(model)
    }

    pub fn kind(&self) -> ModelKind {
        match self {
            Classifier::LogisticRegression(_) => ModelKind::LogisticRegression,
            Classifier::RandomForest(_) => ModelKind::RandomForest,
            Classifier::GradientBoosting(_) => ModelKind::GradientBoosting,
        }
    }

    pub fn n_classes(&self) -> usize {
        match self {
            Classifier::LogisticRegression(m) => m.n_classes(),
            Classifier::RandomForest(m) => m.n_classes(),
            Classifier::GradientBoosting(m) => m.n_classes(),
        }
    }

    pub fn n_features(&self) -> usize {
        match self {
            Classifier::LogisticRegression(m) => m.n_features(),
            Classifier::RandomForest(m) => m.n_features(),
            Classifier::GradientBoosting(m) => m.n_features(),
        }
    }

    /// Class probabilities, one row per input row, each row summing to 1
    pub fn predict_proba(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features() {
            return Err(ClassifierError::SchemaMismatch(format!(
                "{} expects {} features, got {}",
                self.kind(),
                self.n_features(),
                x.ncols()
            )));
        }

        Ok(match self {
            Classifier::LogisticRegression(m) => m.predict_proba(x),
            Classifier::RandomForest(m) => m.predict_proba(x),
            Classifier::GradientBoosting(m) => m.predict_proba(x),
        })
    }
}

/// Numerically stable in-place softmax of a score vector
pub(crate) fn softmax(mut row: ArrayViewMut1<f64>) {
    let max = row.fold(f64::NEG_INFINITY, |m, &v| m.max(v));
    row.mapv_inplace(|v| (v - max).exp());
    let sum = row.sum();
    row.mapv_inplace(|v| v / sum);
}

/// Row-wise softmax of a score matrix
pub(crate) fn softmax_rows(scores: &mut Array2<f64>) {
    for row in scores.axis_iter_mut(Axis(0)) {
        softmax(row);
    }
}
