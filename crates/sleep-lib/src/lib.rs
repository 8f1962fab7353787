//! Sleep disorder classifier library
//!
//! This crate provides the core functionality for:
//! - Feature schema, observations and CSV loading
//! - Preprocessing (standard scaling, one-hot encoding)
//! - Logistic regression, random forest and gradient boosting classifiers
//! - Stratified splitting, evaluation and model selection
//! - Checksummed artifact persistence
//! - Single-observation inference
//! - Health checks and observability

pub mod artifact;
pub mod classifier;
pub mod dataset;
pub mod error;
pub mod health;
pub mod inference;
pub mod labels;
pub mod observability;
pub mod pipeline;
pub mod preprocess;
pub mod schema;
pub mod training;

pub use artifact::{ArtifactStore, LoadedArtifacts, Manifest};
pub use classifier::{Classifier, Hyperparameters, ModelKind, OutputLabels};
pub use dataset::{LabeledDataset, Table};
pub use error::{ClassifierError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use inference::{InferenceEngine, InferenceStats, Prediction};
pub use labels::LabelCodec;
pub use observability::{ClassifierMetrics, StructuredLogger};
pub use pipeline::Pipeline;
pub use preprocess::{Preprocessor, UnknownCategoryPolicy};
pub use schema::{FeatureSchema, FeatureValue, Observation};
pub use training::{SelectionPolicy, Trainer, TrainingConfig, TrainingReport};
