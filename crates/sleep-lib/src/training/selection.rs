//! Deployment model selection

use crate::classifier::ModelKind;
use crate::error::{ClassifierError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::metrics::EvaluationMetrics;

/// How the deployed variant is chosen among the trained candidates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum SelectionPolicy {
    /// Always deploy this family
    Fixed(ModelKind),
    /// Highest validation macro-F1, ties broken by candidate order
    BestValidation,
}

impl Default for SelectionPolicy {
    fn default() -> Self {
        SelectionPolicy::Fixed(ModelKind::GradientBoosting)
    }
}

impl fmt::Display for SelectionPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SelectionPolicy::Fixed(kind) => write!(f, "{}", kind),
            SelectionPolicy::BestValidation => write!(f, "best_validation"),
        }
    }
}

impl FromStr for SelectionPolicy {
    type Err = ClassifierError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "best_validation" | "best" => Ok(SelectionPolicy::BestValidation),
            other => other.parse().map(SelectionPolicy::Fixed),
        }
    }
}

impl TryFrom<String> for SelectionPolicy {
    type Error = ClassifierError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<SelectionPolicy> for String {
    fn from(policy: SelectionPolicy) -> Self {
        policy.to_string()
    }
}

impl SelectionPolicy {
    /// Pick a variant from `(kind, validation metrics)` pairs in candidate order
    pub fn select(&self, candidates: &[(ModelKind, EvaluationMetrics)]) -> Result<ModelKind> {
        match self {
            SelectionPolicy::Fixed(kind) => candidates
                .iter()
                .find(|(k, _)| k == kind)
                .map(|(k, _)| *k)
                .ok_or_else(|| {
                    ClassifierError::Training(format!("selected variant {} was not trained", kind))
                }),
            SelectionPolicy::BestValidation => {
                let mut best: Option<(ModelKind, f64)> = None;
                for (kind, metrics) in candidates {
                    if best.map_or(true, |(_, f1)| metrics.macro_f1 > f1) {
                        best = Some((*kind, metrics.macro_f1));
                    }
                }
                best.map(|(kind, _)| kind).ok_or_else(|| {
                    ClassifierError::Training("no candidates to select from".to_string())
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scored(f1: f64) -> EvaluationMetrics {
        EvaluationMetrics {
            accuracy: f1,
            macro_f1: f1,
            log_loss: 0.5,
            n_samples: 10,
        }
    }

    #[test]
    fn test_default_deploys_gradient_boosting() {
        let candidates = vec![
            (ModelKind::LogisticRegression, scored(0.95)),
            (ModelKind::RandomForest, scored(0.90)),
            (ModelKind::GradientBoosting, scored(0.80)),
        ];
        assert_eq!(
            SelectionPolicy::default().select(&candidates).unwrap(),
            ModelKind::GradientBoosting
        );
    }

    #[test]
    fn test_best_validation_breaks_ties_by_order() {
        let candidates = vec![
            (ModelKind::LogisticRegression, scored(0.80)),
            (ModelKind::RandomForest, scored(0.90)),
            (ModelKind::GradientBoosting, scored(0.90)),
        ];
        assert_eq!(
            SelectionPolicy::BestValidation.select(&candidates).unwrap(),
            ModelKind::RandomForest
        );
    }

    #[test]
    fn test_fixed_missing_candidate() {
        let candidates = vec![(ModelKind::LogisticRegression, scored(0.8))];
        assert!(SelectionPolicy::Fixed(ModelKind::RandomForest)
            .select(&candidates)
            .is_err());
        assert!(SelectionPolicy::BestValidation.select(&[]).is_err());
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(
            "best_validation".parse::<SelectionPolicy>().unwrap(),
            SelectionPolicy::BestValidation
        );
        let fixed: SelectionPolicy = "random_forest".parse().unwrap();
        assert_eq!(fixed, SelectionPolicy::Fixed(ModelKind::RandomForest));
        assert_eq!(fixed.to_string(), "random_forest");
        assert!("coin_flip".parse::<SelectionPolicy>().is_err());
    }

    #[test]
    fn test_serialized_as_plain_string() {
        let json = serde_json::to_string(&SelectionPolicy::BestValidation).unwrap();
        assert_eq!(json, "\"best_validation\"");
        let policy: SelectionPolicy = serde_json::from_str("\"xgboost\"").unwrap();
        assert_eq!(policy, SelectionPolicy::Fixed(ModelKind::GradientBoosting));
    }
}
