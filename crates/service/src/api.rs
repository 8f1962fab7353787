//! HTTP API for predictions, health checks and Prometheus metrics

use crate::context::AppContext;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use sleep_lib::{
    artifact::SplitSizes, health::ComponentStatus, training::EvaluationMetrics, ClassifierError,
    ClassifierMetrics, HealthRegistry, InferenceStats, ModelKind, Observation, Prediction,
};
use std::sync::Arc;
use tracing::info;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub context: Arc<AppContext>,
    pub health_registry: HealthRegistry,
    pub metrics: ClassifierMetrics,
}

impl AppState {
    pub fn new(context: Arc<AppContext>, health_registry: HealthRegistry) -> Self {
        Self {
            context,
            health_registry,
            metrics: ClassifierMetrics::new(),
        }
    }
}

/// Request body of `POST /predict`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SleepFeatures {
    pub gender: String,
    pub age: i64,
    pub occupation: String,
    pub sleep_duration: f64,
    pub quality_of_sleep: i64,
    pub physical_activity_level: i64,
    pub stress_level: i64,
    pub bmi_category: String,
    pub heart_rate: i64,
    pub daily_steps: i64,
    pub systolic_blood_pressure: i64,
    pub diastolic_blood_pressure: i64,
}

impl From<SleepFeatures> for Observation {
    fn from(f: SleepFeatures) -> Self {
        Observation::new()
            .with("gender", f.gender)
            .with("age", f.age)
            .with("occupation", f.occupation)
            .with("sleep_duration", f.sleep_duration)
            .with("quality_of_sleep", f.quality_of_sleep)
            .with("physical_activity_level", f.physical_activity_level)
            .with("stress_level", f.stress_level)
            .with("bmi_category", f.bmi_category)
            .with("heart_rate", f.heart_rate)
            .with("daily_steps", f.daily_steps)
            .with("systolic_blood_pressure", f.systolic_blood_pressure)
            .with("diastolic_blood_pressure", f.diastolic_blood_pressure)
    }
}

/// JSON error body
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: String,
}

/// A failed request
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    fn new(status: StatusCode, code: &str, error: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                error: error.into(),
                code: code.to_string(),
            },
        }
    }
}

impl From<ClassifierError> for ApiError {
    fn from(err: ClassifierError) -> Self {
        let status = if err.is_client_error() {
            StatusCode::UNPROCESSABLE_ENTITY
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        };
        ApiError::new(status, err.code(), err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::new(rejection.status(), "invalid_request", rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Classify one observation
async fn predict(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SleepFeatures>, JsonRejection>,
) -> Result<Json<Prediction>, ApiError> {
    let Json(features) = payload.map_err(|rejection| {
        state.metrics.inc_prediction_errors("invalid_request");
        ApiError::from(rejection)
    })?;

    match state.context.engine().predict(&Observation::from(features)) {
        Ok(prediction) => {
            state.health_registry.record_inference_ok().await;
            Ok(Json(prediction))
        }
        Err(e) => {
            state.health_registry.record_inference_error(&e).await;
            Err(e.into())
        }
    }
}

/// Liveness only; does not depend on the model
async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Component health - returns 200 if healthy, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy => StatusCode::OK,
        ComponentStatus::Degraded => StatusCode::OK, // Still operational
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

/// Readiness check response - returns 200 if ready, 503 if not ready
async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

/// Summary of the served model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub variant: ModelKind,
    pub deployed_variant: ModelKind,
    pub trained_at: String,
    pub classes: Vec<String>,
    pub split: SplitSizes,
    pub validation: Option<EvaluationMetrics>,
    pub test: Option<EvaluationMetrics>,
    pub stats: InferenceStats,
}

async fn model(State(state): State<Arc<AppState>>) -> Json<ModelInfo> {
    let engine = state.context.engine();
    let manifest = state.context.manifest();
    let record = manifest.candidate(engine.kind());

    Json(ModelInfo {
        variant: engine.kind(),
        deployed_variant: manifest.deployed_variant,
        trained_at: manifest.trained_at.to_rfc3339(),
        classes: engine.codec().classes().to_vec(),
        split: manifest.split,
        validation: record.map(|r| r.validation),
        test: record.map(|r| r.test),
        stats: engine.stats(),
    })
}

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        return ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "metrics_error", e.to_string())
            .into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .route("/health", get(health))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/model", get(model))
        .route("/metrics", get(metrics))
        .with_state(state)
}

/// Start the API server and run until `shutdown` resolves
pub async fn serve(
    addr: &str,
    state: Arc<AppState>,
    shutdown: impl std::future::Future<Output = ()> + Send + 'static,
) -> anyhow::Result<()> {
    let app = create_router(state);

    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
