//! Model and inference health for the classification service
//!
//! Two components are tracked. `model` follows the artifact set: unhealthy
//! until a load succeeds, healthy while a pipeline is being served.
//! `inference` follows request outcomes: server-side failures degrade it,
//! failures that mean the loaded artifacts disagree with each other mark it
//! unhealthy until restart. Client errors never change health.

use crate::classifier::ModelKind;
use crate::error::ClassifierError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Component names reported by `/healthz`
pub mod components {
    /// Deployed pipeline and label codec
    pub const MODEL: &str = "model";
    /// Request scoring
    pub const INFERENCE: &str = "inference";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

/// Current state of one component and when it last changed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub since: DateTime<Utc>,
}

impl ComponentHealth {
    fn new(status: ComponentStatus, detail: Option<String>) -> Self {
        Self {
            status,
            detail,
            since: Utc::now(),
        }
    }
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub serving: Option<ModelKind>,
    pub components: BTreeMap<String, ComponentHealth>,
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug)]
struct ServiceHealth {
    serving: Option<ModelKind>,
    model: ComponentHealth,
    inference: ComponentHealth,
}

impl ServiceHealth {
    /// Worst component status
    fn overall(&self) -> ComponentStatus {
        self.model.status.max(self.inference.status)
    }
}

/// Shared health state, cloned into every request handler
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    state: Arc<RwLock<ServiceHealth>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(ServiceHealth {
                serving: None,
                model: ComponentHealth::new(
                    ComponentStatus::Unhealthy,
                    Some("Model not loaded".to_string()),
                ),
                inference: ComponentHealth::new(ComponentStatus::Healthy, None),
            })),
        }
    }

    /// A pipeline of `kind` is loaded and serving
    pub async fn model_loaded(&self, kind: ModelKind) {
        let mut state = self.state.write().await;
        state.serving = Some(kind);
        state.model = ComponentHealth::new(
            ComponentStatus::Healthy,
            Some(format!("serving {}", kind)),
        );
    }

    /// Loading the artifact set failed; nothing is served
    pub async fn model_load_failed(&self, err: &ClassifierError) {
        let mut state = self.state.write().await;
        state.serving = None;
        state.model = ComponentHealth::new(
            ComponentStatus::Unhealthy,
            Some(format!("Model not loaded: {}", err)),
        );
    }

    /// Record a failed prediction
    pub async fn record_inference_error(&self, err: &ClassifierError) {
        if err.is_client_error() {
            return;
        }
        let status = match err {
            ClassifierError::ArtifactConsistency(_)
            | ClassifierError::ChecksumMismatch { .. }
            | ClassifierError::MissingArtifact(_) => ComponentStatus::Unhealthy,
            _ => ComponentStatus::Degraded,
        };

        let mut state = self.state.write().await;
        // unhealthy is sticky
        if state.inference.status < status {
            state.inference = ComponentHealth::new(status, Some(format!("[{}] {}", err.code(), err)));
        }
    }

    /// Record a served prediction; clears a degraded inference state
    pub async fn record_inference_ok(&self) {
        if self.state.read().await.inference.status != ComponentStatus::Degraded {
            return;
        }
        let mut state = self.state.write().await;
        if state.inference.status == ComponentStatus::Degraded {
            state.inference = ComponentHealth::new(ComponentStatus::Healthy, None);
        }
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        let components = BTreeMap::from([
            (components::MODEL.to_string(), state.model.clone()),
            (components::INFERENCE.to_string(), state.inference.clone()),
        ]);
        HealthResponse {
            status: state.overall(),
            serving: state.serving,
            components,
        }
    }

    /// Ready while a model is served and no component is unhealthy
    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        let reason = if state.serving.is_none() {
            Some(
                state
                    .model
                    .detail
                    .clone()
                    .unwrap_or_else(|| "Model not loaded".to_string()),
            )
        } else if state.inference.status == ComponentStatus::Unhealthy {
            Some(format!(
                "Inference unhealthy: {}",
                state.inference.detail.as_deref().unwrap_or("unknown")
            ))
        } else {
            None
        };

        ReadinessResponse {
            ready: reason.is_none(),
            reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_not_ready_before_model_loaded() {
        let registry = HealthRegistry::new();

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert_eq!(readiness.reason.as_deref(), Some("Model not loaded"));

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Unhealthy);
        assert_eq!(health.serving, None);
    }

    #[tokio::test]
    async fn test_model_loaded_makes_service_ready() {
        let registry = HealthRegistry::new();
        registry.model_loaded(ModelKind::GradientBoosting).await;

        assert!(registry.readiness().await.ready);

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
        assert_eq!(health.serving, Some(ModelKind::GradientBoosting));
        assert_eq!(
            health.components[components::MODEL].detail.as_deref(),
            Some("serving gradient_boosting")
        );
    }

    #[tokio::test]
    async fn test_load_failure_reason_is_reported() {
        let registry = HealthRegistry::new();
        registry
            .model_load_failed(&ClassifierError::MissingArtifact("manifest.json".into()))
            .await;

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert!(readiness.reason.unwrap().contains("manifest.json"));
    }

    #[tokio::test]
    async fn test_client_errors_leave_health_unchanged() {
        let registry = HealthRegistry::new();
        registry.model_loaded(ModelKind::RandomForest).await;
        registry
            .record_inference_error(&ClassifierError::InvalidInput("missing `age`".into()))
            .await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_server_error_degrades_until_next_success() {
        let registry = HealthRegistry::new();
        registry.model_loaded(ModelKind::RandomForest).await;
        registry
            .record_inference_error(&ClassifierError::Training("diverged".into()))
            .await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Degraded);
        assert!(registry.readiness().await.ready);

        registry.record_inference_ok().await;
        assert_eq!(registry.health().await.status, ComponentStatus::Healthy);
    }

    #[tokio::test]
    async fn test_artifact_disagreement_is_sticky_and_unready() {
        let registry = HealthRegistry::new();
        registry.model_loaded(ModelKind::LogisticRegression).await;
        registry
            .record_inference_error(&ClassifierError::ArtifactConsistency(
                "expected 3 probability columns, got 2".into(),
            ))
            .await;
        registry.record_inference_ok().await;

        let health = registry.health().await;
        assert_eq!(health.status, ComponentStatus::Unhealthy);
        assert!(health.components[components::INFERENCE]
            .detail
            .as_deref()
            .unwrap()
            .starts_with("[artifact_consistency]"));

        let readiness = registry.readiness().await;
        assert!(!readiness.ready);
        assert!(readiness.reason.unwrap().starts_with("Inference unhealthy"));
    }
}
