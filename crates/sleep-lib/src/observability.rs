//! Observability infrastructure for the sleep disorder classifier
//!
//! Provides:
//! - Prometheus metrics (prediction latency, predictions per class, errors,
//!   unseen categories, deployed model info)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter_vec, GaugeVec, Histogram,
    IntCounterVec,
};
use std::sync::OnceLock;
use tracing::{debug, error, info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.00005, 0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<ClassifierMetricsInner> = OnceLock::new();

struct ClassifierMetricsInner {
    prediction_latency_seconds: Histogram,
    predictions_total: IntCounterVec,
    prediction_errors_total: IntCounterVec,
    unseen_categories_total: IntCounterVec,
    model_info: GaugeVec,
}

impl ClassifierMetricsInner {
    fn new() -> Self {
        Self {
            prediction_latency_seconds: register_histogram!(
                "sleep_classifier_prediction_latency_seconds",
                "Time spent classifying a single observation",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            predictions_total: register_int_counter_vec!(
                "sleep_classifier_predictions_total",
                "Predictions served, by predicted class",
                &["class"]
            )
            .expect("Failed to register predictions_total"),

            prediction_errors_total: register_int_counter_vec!(
                "sleep_classifier_prediction_errors_total",
                "Failed predictions, by error code",
                &["code"]
            )
            .expect("Failed to register prediction_errors_total"),

            unseen_categories_total: register_int_counter_vec!(
                "sleep_classifier_unseen_categories_total",
                "Categorical values not seen during training, by field",
                &["field"]
            )
            .expect("Failed to register unseen_categories_total"),

            model_info: register_gauge_vec!(
                "sleep_classifier_model_info",
                "Information about the currently deployed model",
                &["variant", "trained_at"]
            )
            .expect("Failed to register model_info"),
        }
    }
}

/// Classifier metrics for Prometheus exposition
///
/// Lightweight handle to the global metrics instance; clones share the same
/// underlying metrics.
#[derive(Clone)]
pub struct ClassifierMetrics {
    _private: (),
}

impl Default for ClassifierMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ClassifierMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(ClassifierMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &ClassifierMetricsInner {
        GLOBAL_METRICS.get_or_init(ClassifierMetricsInner::new)
    }

    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    pub fn inc_predictions(&self, class: &str) {
        self.inner().predictions_total.with_label_values(&[class]).inc();
    }

    pub fn inc_prediction_errors(&self, code: &str) {
        self.inner()
            .prediction_errors_total
            .with_label_values(&[code])
            .inc();
    }

    pub fn inc_unseen_category(&self, field: &str) {
        self.inner()
            .unseen_categories_total
            .with_label_values(&[field])
            .inc();
    }

    /// Replace the deployed model info series
    pub fn set_model_info(&self, variant: &str, trained_at: &str) {
        self.inner().model_info.reset();
        self.inner()
            .model_info
            .with_label_values(&[variant, trained_at])
            .set(1.0);
    }
}

/// Structured logger for training and serving events
///
/// Every line carries an `event` tag and the emitting component so log
/// pipelines can filter without parsing messages.
#[derive(Clone)]
pub struct StructuredLogger {
    component: String,
}

impl StructuredLogger {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
        }
    }

    pub fn component(&self) -> &str {
        &self.component
    }

    pub fn log_service_started(&self, version: &str, bind_addr: &str, model_variant: &str) {
        info!(
            event = "service_started",
            component = %self.component,
            service_version = %version,
            bind_addr = %bind_addr,
            model_variant = %model_variant,
            "Sleep disorder service started"
        );
    }

    pub fn log_service_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            component = %self.component,
            reason = %reason,
            "Sleep disorder service shutting down"
        );
    }

    pub fn log_model_loaded(&self, variant: &str, model_dir: &str, trained_at: &str) {
        info!(
            event = "model_loaded",
            component = %self.component,
            model_variant = %variant,
            model_dir = %model_dir,
            trained_at = %trained_at,
            "Loaded classification pipeline"
        );
    }

    pub fn log_prediction(&self, predicted_class: &str, confidence: f64, latency_secs: f64) {
        info!(
            event = "prediction_served",
            component = %self.component,
            predicted_class = %predicted_class,
            confidence = confidence,
            latency_secs = latency_secs,
            "Classified observation"
        );
    }

    pub fn log_prediction_error(&self, code: &str, details: &str) {
        warn!(
            event = "prediction_failed",
            component = %self.component,
            code = %code,
            details = %details,
            "Prediction request failed"
        );
    }

    pub fn log_unseen_category(&self, field: &str, value: &str) {
        debug!(
            event = "unseen_category",
            component = %self.component,
            field = %field,
            value = %value,
            "Categorical value not seen during training, encoding as all zeros"
        );
    }

    pub fn log_training_started(&self, data_path: &str, n_rows: usize, seed: u64) {
        info!(
            event = "training_started",
            component = %self.component,
            data_path = %data_path,
            n_rows = n_rows,
            seed = seed,
            "Training run started"
        );
    }

    pub fn log_candidate_trained(
        &self,
        variant: &str,
        validation_accuracy: f64,
        validation_macro_f1: f64,
        test_accuracy: f64,
        fit_secs: f64,
    ) {
        info!(
            event = "candidate_trained",
            component = %self.component,
            model_variant = %variant,
            validation_accuracy = validation_accuracy,
            validation_macro_f1 = validation_macro_f1,
            test_accuracy = test_accuracy,
            fit_secs = fit_secs,
            "Candidate model trained"
        );
    }

    pub fn log_model_selected(&self, variant: &str, policy: &str) {
        info!(
            event = "model_selected",
            component = %self.component,
            model_variant = %variant,
            policy = %policy,
            "Selected deployment model"
        );
    }

    pub fn log_artifacts_written(&self, model_dir: &str, n_files: usize) {
        info!(
            event = "artifacts_written",
            component = %self.component,
            model_dir = %model_dir,
            n_files = n_files,
            "Persisted model artifacts"
        );
    }

    pub fn log_training_failed(&self, details: &str) {
        error!(
            event = "training_failed",
            component = %self.component,
            details = %details,
            "Training run failed, no artifacts written"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classifier_metrics_creation() {
        let metrics = ClassifierMetrics::new();

        metrics.observe_prediction_latency(0.001);
        metrics.inc_predictions("insomnia");
        metrics.inc_prediction_errors("invalid_input");
        metrics.inc_unseen_category("occupation");
        metrics.set_model_info("gradient_boosting", "2024-01-01T00:00:00Z");

        // A second handle shares the registered collectors
        let again = ClassifierMetrics::new();
        again.inc_predictions("insomnia");

        let families = prometheus::gather();
        assert!(families
            .iter()
            .any(|f| f.get_name() == "sleep_classifier_predictions_total"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("inference");
        assert_eq!(logger.component(), "inference");
        logger.log_unseen_category("occupation", "astronaut");
    }
}
