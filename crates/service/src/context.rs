//! Loaded model state shared by every request

use crate::config::ServiceConfig;
use sleep_lib::{
    artifact::ArtifactStore, ClassifierMetrics, HealthRegistry, InferenceEngine, Manifest,
    ModelKind, Result, StructuredLogger,
};
use std::path::{Path, PathBuf};

/// Everything a request needs, built once at startup
pub struct AppContext {
    engine: InferenceEngine,
    manifest: Manifest,
    model_dir: PathBuf,
}

impl AppContext {
    /// Load the configured artifact set or fail, recording the outcome in `health`
    pub async fn load(config: &ServiceConfig, health: &HealthRegistry) -> Result<Self> {
        let loaded = config
            .variant()
            .and_then(|variant| Self::load_from(&config.model_dir, variant));

        match &loaded {
            Ok(context) => health.model_loaded(context.engine().kind()).await,
            Err(e) => health.model_load_failed(e).await,
        }
        loaded
    }

    pub fn load_from(model_dir: &Path, variant: Option<ModelKind>) -> Result<Self> {
        let artifacts = ArtifactStore::new(model_dir).load_deployed(variant)?;
        let manifest = artifacts.manifest.clone();
        let engine = InferenceEngine::from_artifacts(artifacts)?;

        let trained_at = manifest.trained_at.to_rfc3339();
        ClassifierMetrics::new().set_model_info(engine.kind().as_str(), &trained_at);
        StructuredLogger::new("service").log_model_loaded(
            engine.kind().as_str(),
            &model_dir.display().to_string(),
            &trained_at,
        );

        Ok(Self {
            engine,
            manifest,
            model_dir: model_dir.to_path_buf(),
        })
    }

    pub fn engine(&self) -> &InferenceEngine {
        &self.engine
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn model_dir(&self) -> &Path {
        &self.model_dir
    }
}
