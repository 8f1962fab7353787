//! Feature preprocessing: standardized numerics + one-hot categoricals
//!
//! A `Preprocessor` is fit once on the training partition and is immutable
//! afterwards. The serving path only ever calls `transform`, so the numeric
//! column layout seen by the classifier is identical at training and
//! serving time:
//!
//! ```text
//! [numeric fields in schema order] [one block per categorical field, sorted vocabulary]
//! ```

use crate::dataset::{ColumnData, Table};
use crate::error::{ClassifierError, Result};
use crate::schema::{FeatureKind, FeatureSchema, Observation};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// What to do with a categorical value that was not seen during fit
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownCategoryPolicy {
    /// Encode the whole block for that field as zeros
    #[default]
    ZeroEncode,
    /// Fail the transform with a schema mismatch
    Reject,
}

/// Centering/scaling statistics of one numeric field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericStats {
    pub field: String,
    pub mean: f64,
    /// Population standard deviation
    pub std: f64,
}

impl NumericStats {
    fn fit(field: &str, values: &[f64]) -> Self {
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Self {
            field: field.to_string(),
            mean,
            std: var.sqrt(),
        }
    }

    /// `(value - mean) / std`, or 0 for a constant field
    pub fn scale(&self, value: f64) -> f64 {
        if self.std > 0.0 {
            (value - self.mean) / self.std
        } else {
            0.0
        }
    }
}

/// Sorted category vocabulary of one categorical field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryVocabulary {
    pub field: String,
    pub categories: Vec<String>,
}

impl CategoryVocabulary {
    fn fit(field: &str, values: &[String]) -> Self {
        let categories: BTreeSet<&String> = values.iter().collect();
        Self {
            field: field.to_string(),
            categories: categories.into_iter().cloned().collect(),
        }
    }

    pub fn index_of(&self, value: &str) -> Option<usize> {
        self.categories
            .binary_search_by(|c| c.as_str().cmp(value))
            .ok()
    }
}

/// Fitted feature transformer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Preprocessor {
    schema: FeatureSchema,
    numeric: Vec<NumericStats>,
    categorical: Vec<CategoryVocabulary>,
    #[serde(default)]
    unknown_category_policy: UnknownCategoryPolicy,
}

impl Preprocessor {
    /// Fit scaling statistics and vocabularies on a training table
    pub fn fit(schema: &FeatureSchema, table: &Table) -> Result<Self> {
        if table.n_rows() == 0 {
            return Err(ClassifierError::Training(
                "cannot fit preprocessor on an empty table".to_string(),
            ));
        }

        let mut numeric = Vec::new();
        for field in schema.numeric_fields() {
            match table.column_of_kind(&field.name, FeatureKind::Numeric)? {
                ColumnData::Numeric(values) => {
                    if let Some(row) = values.iter().position(|v| !v.is_finite()) {
                        return Err(ClassifierError::Training(format!(
                            "field `{}` has non-finite value {} at row {}",
                            field.name, values[row], row
                        )));
                    }
                    numeric.push(NumericStats::fit(&field.name, values))
                }
                ColumnData::Categorical(_) => unreachable!("kind checked by column_of_kind"),
            }
        }

        let mut categorical = Vec::new();
        for field in schema.categorical_fields() {
            match table.column_of_kind(&field.name, FeatureKind::Categorical)? {
                ColumnData::Categorical(values) => {
                    categorical.push(CategoryVocabulary::fit(&field.name, values))
                }
                ColumnData::Numeric(_) => unreachable!("kind checked by column_of_kind"),
            }
        }

        Ok(Self {
            schema: schema.clone(),
            numeric,
            categorical,
            unknown_category_policy: UnknownCategoryPolicy::default(),
        })
    }

    pub fn with_unknown_category_policy(mut self, policy: UnknownCategoryPolicy) -> Self {
        self.unknown_category_policy = policy;
        self
    }

    pub fn unknown_category_policy(&self) -> UnknownCategoryPolicy {
        self.unknown_category_policy
    }

    /// Schema the preprocessor was fit with
    pub fn schema(&self) -> &FeatureSchema {
        &self.schema
    }

    pub fn numeric_stats(&self) -> &[NumericStats] {
        &self.numeric
    }

    pub fn vocabularies(&self) -> &[CategoryVocabulary] {
        &self.categorical
    }

    /// Width of the transformed matrix
    pub fn n_output_features(&self) -> usize {
        self.numeric.len()
            + self
                .categorical
                .iter()
                .map(|v| v.categories.len())
                .sum::<usize>()
    }

    /// Output column names, e.g. `age` or `gender=male`
    pub fn output_feature_names(&self) -> Vec<String> {
        self.numeric
            .iter()
            .map(|s| s.field.clone())
            .chain(self.categorical.iter().flat_map(|v| {
                v.categories
                    .iter()
                    .map(move |c| format!("{}={}", v.field, c))
            }))
            .collect()
    }

    /// Transform a table into the numeric design matrix
    pub fn transform(&self, table: &Table) -> Result<Array2<f64>> {
        let n_rows = table.n_rows();
        let mut out = Array2::<f64>::zeros((n_rows, self.n_output_features()));

        for (col, stats) in self.numeric.iter().enumerate() {
            if let ColumnData::Numeric(values) =
                table.column_of_kind(&stats.field, FeatureKind::Numeric)?
            {
                for (row, &value) in values.iter().enumerate() {
                    out[[row, col]] = stats.scale(value);
                }
            }
        }

        let mut offset = self.numeric.len();
        for vocab in &self.categorical {
            if let ColumnData::Categorical(values) =
                table.column_of_kind(&vocab.field, FeatureKind::Categorical)?
            {
                for (row, value) in values.iter().enumerate() {
                    match vocab.index_of(value) {
                        Some(idx) => out[[row, offset + idx]] = 1.0,
                        None => {
                            if self.unknown_category_policy == UnknownCategoryPolicy::Reject {
                                return Err(ClassifierError::SchemaMismatch(format!(
                                    "unseen category `{}` for field `{}`",
                                    value, vocab.field
                                )));
                            }
                        }
                    }
                }
            }
            offset += vocab.categories.len();
        }

        Ok(out)
    }

    /// Validate and transform a single observation into a one-row matrix
    pub fn transform_observation(&self, observation: &Observation) -> Result<Array2<f64>> {
        let table = Table::from_observation(&self.schema, observation)?;
        self.transform(&table)
    }

    /// `(field, value)` pairs that fall outside the fitted vocabularies
    pub fn unseen_categories(&self, table: &Table) -> Result<Vec<(String, String)>> {
        let mut unseen = Vec::new();
        for vocab in &self.categorical {
            if let ColumnData::Categorical(values) =
                table.column_of_kind(&vocab.field, FeatureKind::Categorical)?
            {
                for value in values {
                    if vocab.index_of(value).is_none() {
                        unseen.push((vocab.field.clone(), value.clone()));
                    }
                }
            }
        }
        Ok(unseen)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::Column;
    use crate::schema::FieldSpec;

    fn small_schema() -> FeatureSchema {
        FeatureSchema::new(vec![
            FieldSpec::categorical("color"),
            FieldSpec::numeric("size"),
            FieldSpec::numeric("constant"),
        ])
        .unwrap()
    }

    fn small_table() -> Table {
        Table::new(vec![
            Column::categorical("color", vec!["red", "blue", "red", "green"]),
            Column::numeric("size", vec![1.0, 2.0, 3.0, 4.0]),
            Column::numeric("constant", vec![5.0, 5.0, 5.0, 5.0]),
        ])
        .unwrap()
    }

    #[test]
    fn test_fit_statistics() {
        let pre = Preprocessor::fit(&small_schema(), &small_table()).unwrap();

        let size = &pre.numeric_stats()[0];
        assert_eq!(size.field, "size");
        assert!((size.mean - 2.5).abs() < 1e-12);
        // population std of 1..4
        assert!((size.std - 1.25_f64.sqrt()).abs() < 1e-12);

        assert_eq!(pre.vocabularies()[0].categories, vec!["blue", "green", "red"]);
        assert_eq!(pre.n_output_features(), 5);
        assert_eq!(
            pre.output_feature_names(),
            vec!["size", "constant", "color=blue", "color=green", "color=red"]
        );
    }

    #[test]
    fn test_transform_layout() {
        let pre = Preprocessor::fit(&small_schema(), &small_table()).unwrap();
        let x = pre.transform(&small_table()).unwrap();

        assert_eq!(x.dim(), (4, 5));
        // constant field maps to 0 instead of dividing by zero
        assert!(x.column(1).iter().all(|&v| v == 0.0));
        // row 1 is blue
        assert_eq!(&x.row(1).to_vec()[2..], &[1.0, 0.0, 0.0]);
        // standardized column has zero mean
        assert!(x.column(0).sum().abs() < 1e-12);
    }

    #[test]
    fn test_transform_is_deterministic() {
        let pre = Preprocessor::fit(&small_schema(), &small_table()).unwrap();
        let a = pre.transform(&small_table()).unwrap();
        let b = pre.transform(&small_table()).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_unseen_category_zero_encoded() {
        let pre = Preprocessor::fit(&small_schema(), &small_table()).unwrap();
        let table = Table::new(vec![
            Column::categorical("color", vec!["purple"]),
            Column::numeric("size", vec![2.5]),
            Column::numeric("constant", vec![9.0]),
        ])
        .unwrap();

        let x = pre.transform(&table).unwrap();
        assert_eq!(x.row(0).to_vec(), vec![0.0, 0.0, 0.0, 0.0, 0.0]);
        assert_eq!(
            pre.unseen_categories(&table).unwrap(),
            vec![("color".to_string(), "purple".to_string())]
        );
    }

    #[test]
    fn test_reject_policy() {
        let pre = Preprocessor::fit(&small_schema(), &small_table())
            .unwrap()
            .with_unknown_category_policy(UnknownCategoryPolicy::Reject);
        let table = Table::new(vec![
            Column::categorical("color", vec!["purple"]),
            Column::numeric("size", vec![2.5]),
            Column::numeric("constant", vec![9.0]),
        ])
        .unwrap();

        assert!(matches!(
            pre.transform(&table),
            Err(ClassifierError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_fit_missing_field() {
        let table = Table::new(vec![Column::categorical("color", vec!["red"])]).unwrap();
        assert!(matches!(
            Preprocessor::fit(&small_schema(), &table),
            Err(ClassifierError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_fit_wrong_kind() {
        let table = Table::new(vec![
            Column::numeric("color", vec![1.0]),
            Column::numeric("size", vec![1.0]),
            Column::numeric("constant", vec![1.0]),
        ])
        .unwrap();
        assert!(matches!(
            Preprocessor::fit(&small_schema(), &table),
            Err(ClassifierError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_fit_empty_table() {
        let table = Table::new(vec![
            Column::categorical("color", Vec::<String>::new()),
            Column::numeric("size", vec![]),
            Column::numeric("constant", vec![]),
        ])
        .unwrap();
        assert!(matches!(
            Preprocessor::fit(&small_schema(), &table),
            Err(ClassifierError::Training(_))
        ));
    }

    #[test]
    fn test_fit_non_finite_column() {
        let table = Table::new(vec![
            Column::categorical("color", vec!["red", "blue", "red", "green"]),
            Column::numeric("size", vec![1.0, f64::NAN, 3.0, 4.0]),
            Column::numeric("constant", vec![5.0, 5.0, 5.0, 5.0]),
        ])
        .unwrap();

        let err = Preprocessor::fit(&small_schema(), &table).unwrap_err();
        assert!(matches!(err, ClassifierError::Training(_)));
        assert!(err.to_string().contains("`size`"));
    }

    #[test]
    fn test_transform_observation_validates() {
        let schema = FeatureSchema::sleep_health();
        let data = crate::dataset::synthetic_dataset(60, 1);
        let pre = Preprocessor::fit(&schema, data.features()).unwrap();

        let x = pre.transform_observation(&Observation::sample()).unwrap();
        assert_eq!(x.dim(), (1, pre.n_output_features()));

        let mut missing = Observation::sample();
        missing.remove("heart_rate");
        assert!(matches!(
            pre.transform_observation(&missing),
            Err(ClassifierError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_serde_round_trip_preserves_transform() {
        let pre = Preprocessor::fit(&small_schema(), &small_table()).unwrap();
        let json = serde_json::to_string(&pre).unwrap();
        let restored: Preprocessor = serde_json::from_str(&json).unwrap();
        assert_eq!(
            pre.transform(&small_table()).unwrap(),
            restored.transform(&small_table()).unwrap()
        );
    }
}
