//! Error types for the classifier core

use thiserror::Error;

/// Result type alias for classifier operations
pub type Result<T> = std::result::Result<T, ClassifierError>;

/// Errors raised by the training and inference pipeline
#[derive(Error, Debug)]
pub enum ClassifierError {
    /// A table is missing a declared field or carries a field of the wrong kind
    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    /// A single observation failed presence/type checks before inference
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A class name that the label codec does not know
    #[error("Unknown class: {0}")]
    UnknownClass(String),

    /// A fit step failed; the whole training run is aborted
    #[error("Training failed: {0}")]
    Training(String),

    /// Loaded pipeline and label mapping disagree on the class set
    #[error("Artifact consistency error: {0}")]
    ArtifactConsistency(String),

    #[error("Checksum mismatch for {artifact}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        artifact: String,
        expected: String,
        actual: String,
    },

    #[error("Artifact not found: {0}")]
    MissingArtifact(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl ClassifierError {
    /// True for errors caused by the caller's input rather than the service
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            ClassifierError::InvalidInput(_) | ClassifierError::SchemaMismatch(_)
        )
    }

    /// Stable machine-readable code for API responses
    pub fn code(&self) -> &'static str {
        match self {
            ClassifierError::SchemaMismatch(_) => "schema_mismatch",
            ClassifierError::InvalidInput(_) => "invalid_input",
            ClassifierError::UnknownClass(_) => "unknown_class",
            ClassifierError::Training(_) => "training_failure",
            ClassifierError::ArtifactConsistency(_) => "artifact_consistency",
            ClassifierError::ChecksumMismatch { .. } => "checksum_mismatch",
            ClassifierError::MissingArtifact(_) => "missing_artifact",
            ClassifierError::Io(_) => "io_error",
            ClassifierError::Csv(_) => "csv_error",
            ClassifierError::Serialization(_) => "serialization_error",
            ClassifierError::Config(_) => "config_error",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ClassifierError::InvalidInput("missing field `heart_rate`".to_string());
        assert_eq!(err.to_string(), "Invalid input: missing field `heart_rate`");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: ClassifierError = io_err.into();
        assert!(matches!(err, ClassifierError::Io(_)));
        assert!(!err.is_client_error());
    }

    #[test]
    fn test_client_errors() {
        assert!(ClassifierError::InvalidInput("x".into()).is_client_error());
        assert!(ClassifierError::SchemaMismatch("x".into()).is_client_error());
        assert!(!ClassifierError::ArtifactConsistency("x".into()).is_client_error());
        assert_eq!(ClassifierError::Training("x".into()).code(), "training_failure");
    }
}
