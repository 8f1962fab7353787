//! Two-stage classification pipeline: preprocessor then classifier

use crate::classifier::{Classifier, Hyperparameters, ModelKind, OutputLabels};
use crate::dataset::{LabeledDataset, Table};
use crate::error::{ClassifierError, Result};
use crate::labels::LabelCodec;
use crate::preprocess::{Preprocessor, UnknownCategoryPolicy};
use crate::schema::{FeatureSchema, Observation};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Fitted preprocessor and classifier, persisted together
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    preprocessor: Preprocessor,
    classifier: Classifier,
    output_labels: OutputLabels,
}

impl Pipeline {
    /// Fit a fresh preprocessor and a `kind` classifier on `dataset`.
    ///
    /// Gradient boosting is fit on codec indices. The other families are fit
    /// on class names, so their output columns follow the sorted distinct
    /// names of the training labels.
    pub fn fit(
        kind: ModelKind,
        schema: &FeatureSchema,
        dataset: &LabeledDataset,
        codec: &LabelCodec,
        params: &Hyperparameters,
        seed: u64,
    ) -> Result<Self> {
        let preprocessor = Preprocessor::fit(schema, dataset.features())?;
        let x = preprocessor.transform(dataset.features())?;

        let (y, output_labels) = match kind {
            ModelKind::GradientBoosting => (
                codec.encode_all(dataset.labels())?,
                OutputLabels::Encoded {
                    n_classes: codec.len(),
                },
            ),
            ModelKind::LogisticRegression | ModelKind::RandomForest => {
                let classes: Vec<String> = dataset
                    .labels()
                    .iter()
                    .cloned()
                    .collect::<BTreeSet<_>>()
                    .into_iter()
                    .collect();
                let y = dataset
                    .labels()
                    .iter()
                    .map(|label| classes.binary_search(label).unwrap_or_default())
                    .collect();
                (y, OutputLabels::Named { classes })
            }
        };

        let classifier = Classifier::fit(kind, &x, &y, output_labels.len(), params, seed)?;

        Ok(Self {
            preprocessor,
            classifier,
            output_labels,
        })
    }

    /// Assemble a pipeline from fitted parts
    pub fn from_parts(
        preprocessor: Preprocessor,
        classifier: Classifier,
        output_labels: OutputLabels,
    ) -> Result<Self> {
        let pipeline = Self {
            preprocessor,
            classifier,
            output_labels,
        };
        pipeline.validate()?;
        Ok(pipeline)
    }

    /// Check that the stages agree on feature and class counts
    pub fn validate(&self) -> Result<()> {
        if self.classifier.n_classes() != self.output_labels.len() {
            return Err(ClassifierError::ArtifactConsistency(format!(
                "classifier emits {} columns but {} output labels are recorded",
                self.classifier.n_classes(),
                self.output_labels.len()
            )));
        }
        if self.classifier.n_features() != self.preprocessor.n_output_features() {
            return Err(ClassifierError::ArtifactConsistency(format!(
                "classifier expects {} features but the preprocessor produces {}",
                self.classifier.n_features(),
                self.preprocessor.n_output_features()
            )));
        }
        Ok(())
    }

    pub fn with_unknown_category_policy(mut self, policy: UnknownCategoryPolicy) -> Self {
        self.preprocessor = self.preprocessor.with_unknown_category_policy(policy);
        self
    }

    pub fn kind(&self) -> ModelKind {
        self.classifier.kind()
    }

    pub fn schema(&self) -> &FeatureSchema {
        self.preprocessor.schema()
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    pub fn classifier(&self) -> &Classifier {
        &self.classifier
    }

    pub fn output_labels(&self) -> &OutputLabels {
        &self.output_labels
    }

    /// Raw classifier probabilities in the classifier's own column order
    pub fn predict_proba(&self, table: &Table) -> Result<Array2<f64>> {
        let x = self.preprocessor.transform(table)?;
        self.classifier.predict_proba(&x)
    }

    pub fn predict_proba_observation(&self, observation: &Observation) -> Result<Array2<f64>> {
        let x = self.preprocessor.transform_observation(observation)?;
        self.classifier.predict_proba(&x)
    }

    /// Map each output column to its codec index
    pub fn column_classes(&self, codec: &LabelCodec) -> Result<Vec<usize>> {
        match &self.output_labels {
            OutputLabels::Encoded { n_classes } => {
                if *n_classes != codec.len() {
                    return Err(ClassifierError::ArtifactConsistency(format!(
                        "model emits {} classes, label codec has {}",
                        n_classes,
                        codec.len()
                    )));
                }
                Ok((0..*n_classes).collect())
            }
            OutputLabels::Named { classes } => {
                if classes.len() != codec.len() {
                    return Err(ClassifierError::ArtifactConsistency(format!(
                        "model emits {} classes, label codec has {}",
                        classes.len(),
                        codec.len()
                    )));
                }
                classes
                    .iter()
                    .map(|name| {
                        codec.encode(name).map_err(|_| {
                            ClassifierError::ArtifactConsistency(format!(
                                "model class `{}` is unknown to the label codec",
                                name
                            ))
                        })
                    })
                    .collect()
            }
        }
    }

    /// Probabilities re-ordered into codec index order
    pub fn predict_proba_aligned(&self, table: &Table, codec: &LabelCodec) -> Result<Array2<f64>> {
        let columns = self.column_classes(codec)?;
        let raw = self.predict_proba(table)?;

        let mut aligned = Array2::<f64>::zeros((raw.nrows(), codec.len()));
        for (col, &class) in columns.iter().enumerate() {
            aligned.column_mut(class).assign(&raw.column(col));
        }
        Ok(aligned)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{BoostingParams, ForestParams};
    use crate::dataset::synthetic_dataset;

    fn fast_params() -> Hyperparameters {
        Hyperparameters {
            random_forest: ForestParams {
                n_estimators: 15,
                ..ForestParams::default()
            },
            gradient_boosting: BoostingParams {
                n_estimators: 15,
                ..BoostingParams::default()
            },
            ..Hyperparameters::default()
        }
    }

    #[test]
    fn test_output_labels_per_family() {
        let data = synthetic_dataset(120, 5);
        let schema = FeatureSchema::sleep_health();
        let codec = LabelCodec::sleep_disorders();

        let gb = Pipeline::fit(ModelKind::GradientBoosting, &schema, &data, &codec, &fast_params(), 42).unwrap();
        assert_eq!(gb.output_labels(), &OutputLabels::Encoded { n_classes: 3 });
        assert_eq!(gb.column_classes(&codec).unwrap(), vec![0, 1, 2]);

        let rf = Pipeline::fit(ModelKind::RandomForest, &schema, &data, &codec, &fast_params(), 42).unwrap();
        assert_eq!(
            rf.output_labels(),
            &OutputLabels::Named {
                classes: vec!["insomnia".into(), "no_disorder".into(), "sleep_apnea".into()]
            }
        );
        // sorted names map back to codec indices
        assert_eq!(rf.column_classes(&codec).unwrap(), vec![2, 0, 1]);
    }

    #[test]
    fn test_aligned_probabilities_follow_codec() {
        let data = synthetic_dataset(120, 6);
        let schema = FeatureSchema::sleep_health();
        let codec = LabelCodec::sleep_disorders();
        let pipeline = Pipeline::fit(ModelKind::LogisticRegression, &schema, &data, &codec, &fast_params(), 42).unwrap();

        let raw = pipeline.predict_proba(data.features()).unwrap();
        let aligned = pipeline.predict_proba_aligned(data.features(), &codec).unwrap();
        // raw column 0 is "insomnia", codec index 2
        assert_eq!(raw.column(0), aligned.column(2));
        assert_eq!(raw.column(1), aligned.column(0));
    }

    #[test]
    fn test_codec_mismatch_is_artifact_error() {
        let data = synthetic_dataset(90, 7);
        let schema = FeatureSchema::sleep_health();
        let codec = LabelCodec::sleep_disorders();
        let pipeline = Pipeline::fit(ModelKind::RandomForest, &schema, &data, &codec, &fast_params(), 1).unwrap();

        let renamed = LabelCodec::new(["no_disorder", "sleep_apnea", "narcolepsy"]).unwrap();
        assert!(matches!(
            pipeline.column_classes(&renamed),
            Err(ClassifierError::ArtifactConsistency(_))
        ));

        let wider = LabelCodec::new(["no_disorder", "sleep_apnea", "insomnia", "narcolepsy"]).unwrap();
        assert!(matches!(
            pipeline.column_classes(&wider),
            Err(ClassifierError::ArtifactConsistency(_))
        ));
    }

    #[test]
    fn test_unknown_label_rejected_for_boosting() {
        let data = synthetic_dataset(60, 8);
        let schema = FeatureSchema::sleep_health();
        let codec = LabelCodec::new(["no_disorder", "sleep_apnea"]).unwrap();
        assert!(matches!(
            Pipeline::fit(ModelKind::GradientBoosting, &schema, &data, &codec, &fast_params(), 1),
            Err(ClassifierError::UnknownClass(_))
        ));
    }

    #[test]
    fn test_from_parts_checks_widths() {
        let data = synthetic_dataset(60, 9);
        let schema = FeatureSchema::sleep_health();
        let codec = LabelCodec::sleep_disorders();
        let pipeline = Pipeline::fit(ModelKind::GradientBoosting, &schema, &data, &codec, &fast_params(), 1).unwrap();

        let result = Pipeline::from_parts(
            pipeline.preprocessor().clone(),
            pipeline.classifier().clone(),
            OutputLabels::Encoded { n_classes: 2 },
        );
        assert!(matches!(result, Err(ClassifierError::ArtifactConsistency(_))));
    }
}
