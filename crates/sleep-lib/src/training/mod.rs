//! Training: stratified splitting, evaluation, selection and the run driver

pub mod metrics;
pub mod selection;
pub mod split;
pub mod trainer;

pub use metrics::{argmax, evaluate, EvaluationMetrics};
pub use selection::SelectionPolicy;
pub use split::{stratified_split, train_validation_test_split, DataSplit};
pub use trainer::{TrainedCandidate, Trainer, TrainingConfig, TrainingOutcome, TrainingReport};
