//! Offline training run
//!
//! Load data, split 60/20/20, fit every candidate family, score them on the
//! validation and test partitions, pick the deployed variant and persist the
//! artifact set. Nothing is written until every candidate has been fit.

use super::metrics::{evaluate, EvaluationMetrics};
use super::selection::SelectionPolicy;
use super::split::{train_validation_test_split, DataSplit};
use crate::artifact::{ArtifactStore, Manifest, PendingCandidate, RunSummary, SplitSizes};
use crate::classifier::{Hyperparameters, ModelKind};
use crate::dataset::LabeledDataset;
use crate::error::{ClassifierError, Result};
use crate::labels::LabelCodec;
use crate::observability::StructuredLogger;
use crate::pipeline::Pipeline;
use crate::schema::FeatureSchema;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Instant;

/// Training run configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,

    #[serde(default = "default_model_dir")]
    pub model_dir: PathBuf,

    #[serde(default = "default_random_seed")]
    pub random_seed: u64,

    /// Fraction of rows held out from training
    #[serde(default = "default_test_size")]
    pub test_size: f64,

    /// Fraction of the hold-out that becomes the test partition
    #[serde(default = "default_val_size")]
    pub val_size: f64,

    #[serde(default)]
    pub selection: SelectionPolicy,

    #[serde(default)]
    pub hyperparameters: Hyperparameters,
}

fn default_data_path() -> PathBuf {
    PathBuf::from("data/processed/data_clean.csv")
}

fn default_model_dir() -> PathBuf {
    PathBuf::from("models")
}

fn default_random_seed() -> u64 {
    42
}

fn default_test_size() -> f64 {
    0.4
}

fn default_val_size() -> f64 {
    0.5
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            model_dir: default_model_dir(),
            random_seed: default_random_seed(),
            test_size: default_test_size(),
            val_size: default_val_size(),
            selection: SelectionPolicy::default(),
            hyperparameters: Hyperparameters::default(),
        }
    }
}

impl TrainingConfig {
    /// Load from `SLEEP_TRAIN_*` environment variables.
    ///
    /// Nested hyperparameters use `__`, e.g.
    /// `SLEEP_TRAIN_HYPERPARAMETERS__RANDOM_FOREST__N_ESTIMATORS=200`.
    pub fn from_env() -> Result<Self> {
        Self::from_environment(config::Environment::with_prefix("SLEEP_TRAIN"))
    }

    pub fn from_environment(env: config::Environment) -> Result<Self> {
        let config = config::Config::builder()
            .add_source(env.prefix_separator("_").separator("__").try_parsing(true))
            .build()?;
        Ok(config.try_deserialize()?)
    }
}

/// One fitted and scored candidate
#[derive(Debug, Clone)]
pub struct TrainedCandidate {
    pub pipeline: Pipeline,
    pub validation: EvaluationMetrics,
    pub test: EvaluationMetrics,
    pub fit_secs: f64,
}

impl TrainedCandidate {
    pub fn kind(&self) -> ModelKind {
        self.pipeline.kind()
    }
}

/// Fitted candidates before anything is persisted
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub split: DataSplit,
    pub candidates: Vec<TrainedCandidate>,
    pub deployed_variant: ModelKind,
}

impl TrainingOutcome {
    pub fn candidate(&self, kind: ModelKind) -> Option<&TrainedCandidate> {
        self.candidates.iter().find(|c| c.kind() == kind)
    }

    pub fn deployed(&self) -> Option<&TrainedCandidate> {
        self.candidate(self.deployed_variant)
    }
}

/// Result of a completed, persisted run
#[derive(Debug, Clone)]
pub struct TrainingReport {
    pub model_dir: PathBuf,
    pub manifest: Manifest,
}

pub struct Trainer {
    config: TrainingConfig,
    schema: FeatureSchema,
    codec: LabelCodec,
    candidates: Vec<ModelKind>,
    logger: StructuredLogger,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self {
            config,
            schema: FeatureSchema::sleep_health(),
            codec: LabelCodec::sleep_disorders(),
            candidates: ModelKind::ALL.to_vec(),
            logger: StructuredLogger::new("trainer"),
        }
    }

    pub fn with_schema(mut self, schema: FeatureSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_codec(mut self, codec: LabelCodec) -> Self {
        self.codec = codec;
        self
    }

    /// Restrict the trained families; order decides selection ties
    pub fn with_candidates(mut self, candidates: Vec<ModelKind>) -> Self {
        self.candidates = candidates;
        self
    }

    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// Load the configured CSV, train and persist
    pub fn run(&self) -> Result<TrainingReport> {
        let dataset = LabeledDataset::from_csv_path(&self.config.data_path, &self.schema)
            .map_err(|e| {
                self.logger.log_training_failed(&e.to_string());
                e
            })?;
        self.train_and_persist(&dataset)
    }

    pub fn train_and_persist(&self, dataset: &LabeledDataset) -> Result<TrainingReport> {
        let result = self.fit_candidates(dataset).and_then(|outcome| self.persist(&outcome));
        if let Err(e) = &result {
            self.logger.log_training_failed(&e.to_string());
        }
        result
    }

    /// Split, fit and score every candidate without touching the disk
    pub fn fit_candidates(&self, dataset: &LabeledDataset) -> Result<TrainingOutcome> {
        self.logger.log_training_started(
            &self.config.data_path.display().to_string(),
            dataset.len(),
            self.config.random_seed,
        );

        if self.candidates.is_empty() {
            return Err(ClassifierError::Training("no candidate families configured".to_string()));
        }

        // Every label must be known before anything is fit
        self.codec.encode_all(dataset.labels())?;

        let split = train_validation_test_split(
            dataset.labels(),
            self.config.test_size,
            self.config.val_size,
            self.config.random_seed,
        )?;
        let train = dataset.take(&split.train);
        let validation = dataset.take(&split.validation);
        let test = dataset.take(&split.test);

        for class in self.codec.classes() {
            if !train.labels().contains(class) {
                return Err(ClassifierError::Training(format!(
                    "class `{}` is missing from the training partition",
                    class
                )));
            }
        }

        let y_validation = self.codec.encode_all(validation.labels())?;
        let y_test = self.codec.encode_all(test.labels())?;

        let mut candidates = Vec::with_capacity(self.candidates.len());
        for &kind in &self.candidates {
            let started = Instant::now();
            let pipeline = Pipeline::fit(
                kind,
                &self.schema,
                &train,
                &self.codec,
                &self.config.hyperparameters,
                self.config.random_seed,
            )?;
            let fit_secs = started.elapsed().as_secs_f64();

            let validation_metrics = evaluate(
                &pipeline.predict_proba_aligned(validation.features(), &self.codec)?,
                &y_validation,
            )?;
            let test_metrics = evaluate(
                &pipeline.predict_proba_aligned(test.features(), &self.codec)?,
                &y_test,
            )?;

            self.logger.log_candidate_trained(
                kind.as_str(),
                validation_metrics.accuracy,
                validation_metrics.macro_f1,
                test_metrics.accuracy,
                fit_secs,
            );

            candidates.push(TrainedCandidate {
                pipeline,
                validation: validation_metrics,
                test: test_metrics,
                fit_secs,
            });
        }

        let scores: Vec<(ModelKind, EvaluationMetrics)> =
            candidates.iter().map(|c| (c.kind(), c.validation)).collect();
        let deployed_variant = self.config.selection.select(&scores)?;
        self.logger
            .log_model_selected(deployed_variant.as_str(), &self.config.selection.to_string());

        Ok(TrainingOutcome {
            split,
            candidates,
            deployed_variant,
        })
    }

    /// Write the artifact set of a successful run
    pub fn persist(&self, outcome: &TrainingOutcome) -> Result<TrainingReport> {
        let store = ArtifactStore::new(&self.config.model_dir);
        let pending: Vec<PendingCandidate<'_>> = outcome
            .candidates
            .iter()
            .map(|c| PendingCandidate {
                pipeline: &c.pipeline,
                validation: c.validation,
                test: c.test,
            })
            .collect();

        let (train, validation, test) = outcome.split.sizes();
        let manifest = store.persist(
            &self.codec,
            &pending,
            RunSummary {
                trained_at: Utc::now(),
                random_seed: self.config.random_seed,
                split: SplitSizes {
                    train,
                    validation,
                    test,
                },
                selection_policy: self.config.selection,
                deployed_variant: outcome.deployed_variant,
            },
        )?;

        self.logger.log_artifacts_written(
            &self.config.model_dir.display().to_string(),
            pending.len() + 2,
        );

        Ok(TrainingReport {
            model_dir: self.config.model_dir.clone(),
            manifest,
        })
    }
}
