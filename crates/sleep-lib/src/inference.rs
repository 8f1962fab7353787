//! Single-observation inference
//!
//! The engine owns an immutable pipeline and label codec. `predict` takes
//! `&self` and only touches atomic counters, so one engine can be shared
//! across request handlers.

use crate::artifact::LoadedArtifacts;
use crate::classifier::ModelKind;
use crate::dataset::Table;
use crate::error::{ClassifierError, Result};
use crate::labels::LabelCodec;
use crate::observability::{ClassifierMetrics, StructuredLogger};
use crate::pipeline::Pipeline;
use crate::schema::{FeatureSchema, Observation};
use crate::training::argmax;
use ndarray::ArrayView1;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Predicted class and the full distribution over codec classes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Prediction {
    pub predicted_class: String,
    pub class_probabilities: BTreeMap<String, f64>,
}

impl Prediction {
    pub fn confidence(&self) -> f64 {
        self.class_probabilities
            .get(&self.predicted_class)
            .copied()
            .unwrap_or(0.0)
    }
}

/// Counters since the engine was built
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InferenceStats {
    pub predictions_served: u64,
    pub predictions_failed: u64,
    pub unseen_categories: u64,
}

pub struct InferenceEngine {
    pipeline: Pipeline,
    codec: LabelCodec,
    /// Codec index of every classifier output column
    column_classes: Vec<usize>,
    metrics: ClassifierMetrics,
    logger: StructuredLogger,
    served: AtomicU64,
    failed: AtomicU64,
    unseen: AtomicU64,
}

impl InferenceEngine {
    /// Bind a pipeline to a codec, failing if their class sets disagree
    pub fn new(pipeline: Pipeline, codec: LabelCodec) -> Result<Self> {
        let column_classes = pipeline.column_classes(&codec)?;
        Ok(Self {
            pipeline,
            codec,
            column_classes,
            metrics: ClassifierMetrics::new(),
            logger: StructuredLogger::new("inference"),
            served: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            unseen: AtomicU64::new(0),
        })
    }

    pub fn from_artifacts(artifacts: LoadedArtifacts) -> Result<Self> {
        Self::new(artifacts.pipeline, artifacts.codec)
    }

    pub fn kind(&self) -> ModelKind {
        self.pipeline.kind()
    }

    pub fn schema(&self) -> &FeatureSchema {
        self.pipeline.schema()
    }

    pub fn codec(&self) -> &LabelCodec {
        &self.codec
    }

    pub fn stats(&self) -> InferenceStats {
        InferenceStats {
            predictions_served: self.served.load(Ordering::Relaxed),
            predictions_failed: self.failed.load(Ordering::Relaxed),
            unseen_categories: self.unseen.load(Ordering::Relaxed),
        }
    }

    /// Classify one observation
    pub fn predict(&self, observation: &Observation) -> Result<Prediction> {
        let started = Instant::now();

        match self.score(observation) {
            Ok(prediction) => {
                let latency = started.elapsed().as_secs_f64();
                self.served.fetch_add(1, Ordering::Relaxed);
                self.metrics.observe_prediction_latency(latency);
                self.metrics.inc_predictions(&prediction.predicted_class);
                self.logger
                    .log_prediction(&prediction.predicted_class, prediction.confidence(), latency);
                Ok(prediction)
            }
            Err(e) => {
                self.failed.fetch_add(1, Ordering::Relaxed);
                self.metrics.inc_prediction_errors(e.code());
                self.logger.log_prediction_error(e.code(), &e.to_string());
                Err(e)
            }
        }
    }

    fn score(&self, observation: &Observation) -> Result<Prediction> {
        let schema = self.pipeline.schema();
        schema.validate(observation)?;
        let table = Table::from_observation(schema, observation)?;

        for (field, value) in self.pipeline.preprocessor().unseen_categories(&table)? {
            self.unseen.fetch_add(1, Ordering::Relaxed);
            self.metrics.inc_unseen_category(&field);
            self.logger.log_unseen_category(&field, &value);
        }

        let raw = self.pipeline.predict_proba(&table)?;
        if raw.nrows() != 1 || raw.ncols() != self.codec.len() {
            return Err(ClassifierError::ArtifactConsistency(format!(
                "model produced a {}x{} probability matrix for {} classes",
                raw.nrows(),
                raw.ncols(),
                self.codec.len()
            )));
        }

        let mut probabilities = vec![0.0; self.codec.len()];
        for (col, &class) in self.column_classes.iter().enumerate() {
            let p = raw[[0, col]];
            probabilities[class] = if p.is_finite() { p.clamp(0.0, 1.0) } else { 0.0 };
        }

        let total: f64 = probabilities.iter().sum();
        if total <= 0.0 {
            return Err(ClassifierError::ArtifactConsistency(
                "model produced an all-zero probability vector".to_string(),
            ));
        }
        probabilities.iter_mut().for_each(|p| *p /= total);

        let best = argmax(ArrayView1::from(&probabilities[..]));

        let class_probabilities = self
            .codec
            .classes()
            .iter()
            .cloned()
            .zip(probabilities)
            .collect();

        Ok(Prediction {
            predicted_class: self.codec.decode(best)?.to_string(),
            class_probabilities,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::{BoostingParams, ForestParams, Hyperparameters, OutputLabels};
    use crate::dataset::{synthetic_dataset, ColumnData};
    use crate::labels::{INSOMNIA, NO_DISORDER, SLEEP_APNEA};
    use crate::schema::FeatureValue;
    use std::sync::Arc;

    fn engine(kind: ModelKind) -> InferenceEngine {
        let params = Hyperparameters {
            random_forest: ForestParams {
                n_estimators: 15,
                ..ForestParams::default()
            },
            gradient_boosting: BoostingParams {
                n_estimators: 15,
                ..BoostingParams::default()
            },
            ..Hyperparameters::default()
        };
        let codec = LabelCodec::sleep_disorders();
        let pipeline = Pipeline::fit(
            kind,
            &FeatureSchema::sleep_health(),
            &synthetic_dataset(150, 21),
            &codec,
            &params,
            42,
        )
        .unwrap();
        InferenceEngine::new(pipeline, codec).unwrap()
    }

    fn assert_well_formed(prediction: &Prediction) {
        let probs = &prediction.class_probabilities;
        let keys: Vec<&str> = probs.keys().map(String::as_str).collect();
        assert_eq!(keys, vec![INSOMNIA, NO_DISORDER, SLEEP_APNEA]);
        assert!(probs.values().all(|&p| (0.0..=1.0).contains(&p)));
        assert!((probs.values().sum::<f64>() - 1.0).abs() < 1e-6);

        let max = probs.values().cloned().fold(f64::NEG_INFINITY, f64::max);
        assert_eq!(probs[&prediction.predicted_class], max);
    }

    #[test]
    fn test_sample_observation_every_family() {
        for kind in ModelKind::ALL {
            let engine = engine(kind);
            let prediction = engine.predict(&Observation::sample()).unwrap();
            assert!([NO_DISORDER, SLEEP_APNEA, INSOMNIA].contains(&prediction.predicted_class.as_str()));
            assert_well_formed(&prediction);
        }
    }

    #[test]
    fn test_predictions_over_dataset_are_well_formed() {
        let engine = engine(ModelKind::GradientBoosting);
        let data = synthetic_dataset(30, 77);
        let schema = FeatureSchema::sleep_health();

        for row in 0..data.len() {
            let table = data.features().take(&[row]);
            let mut observation = Observation::new();
            for field in schema.fields() {
                let value = match table.column(&field.name).map(|c| &c.data) {
                    Some(ColumnData::Numeric(v)) => FeatureValue::from(v[0]),
                    Some(ColumnData::Categorical(v)) => FeatureValue::from(v[0].clone()),
                    None => panic!("missing column {}", field.name),
                };
                observation.insert(field.name.clone(), value);
            }
            assert_well_formed(&engine.predict(&observation).unwrap());
        }
        assert_eq!(engine.stats().predictions_served, 30);
    }

    #[test]
    fn test_unseen_category_still_predicts() {
        let engine = engine(ModelKind::RandomForest);
        let observation = Observation::sample().with("occupation", "astronaut");

        let prediction = engine.predict(&observation).unwrap();
        assert_well_formed(&prediction);
        assert_eq!(engine.stats().unseen_categories, 1);
    }

    #[test]
    fn test_missing_field_fails_before_scoring() {
        let engine = engine(ModelKind::LogisticRegression);
        let mut observation = Observation::sample();
        observation.remove("heart_rate");

        let err = engine.predict(&observation).unwrap_err();
        assert!(matches!(err, ClassifierError::InvalidInput(_)));
        assert!(err.to_string().contains("heart_rate"));

        let stats = engine.stats();
        assert_eq!(stats.predictions_failed, 1);
        assert_eq!(stats.predictions_served, 0);
    }

    #[test]
    fn test_wrong_kind_is_invalid_input() {
        let engine = engine(ModelKind::GradientBoosting);
        let observation = Observation::sample().with("stress_level", "high");
        assert!(matches!(
            engine.predict(&observation),
            Err(ClassifierError::InvalidInput(_))
        ));
    }

    #[test]
    fn test_mismatched_codec_rejected() {
        let trained = engine(ModelKind::GradientBoosting);
        let wider = LabelCodec::new([NO_DISORDER, SLEEP_APNEA, INSOMNIA, "narcolepsy"]).unwrap();
        assert!(matches!(
            InferenceEngine::new(trained.pipeline.clone(), wider),
            Err(ClassifierError::ArtifactConsistency(_))
        ));

        let named = engine(ModelKind::RandomForest);
        let renamed = LabelCodec::new([NO_DISORDER, SLEEP_APNEA, "restless_legs"]).unwrap();
        assert!(matches!(
            InferenceEngine::new(named.pipeline.clone(), renamed),
            Err(ClassifierError::ArtifactConsistency(_))
        ));
        assert!(matches!(
            named.pipeline.output_labels(),
            OutputLabels::Named { .. }
        ));
    }

    #[test]
    fn test_engine_is_shareable_across_threads() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<InferenceEngine>();

        let engine = Arc::new(engine(ModelKind::GradientBoosting));
        let expected = engine.predict(&Observation::sample()).unwrap();

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let engine = Arc::clone(&engine);
                std::thread::spawn(move || engine.predict(&Observation::sample()).unwrap())
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), expected);
        }
        assert_eq!(engine.stats().predictions_served, 5);
    }
}
