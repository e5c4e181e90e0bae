//! Observability infrastructure for the risk service
//!
//! Provides:
//! - Prometheus metrics (prediction latency, outcomes, errors, model state)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter_vec, register_int_gauge,
    GaugeVec, Histogram, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{error, info, warn};

/// Default histogram buckets for latency measurements (in seconds)
const LATENCY_BUCKETS: &[f64] = &[
    0.0001, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0,
];

/// Buckets for the number of applications per batch request
const BATCH_SIZE_BUCKETS: &[f64] = &[1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<RiskMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct RiskMetricsInner {
    prediction_latency_seconds: Histogram,
    batch_size: Histogram,
    predictions_total: IntCounterVec,
    prediction_errors_total: IntCounterVec,
    model_loaded: IntGauge,
    model_version_info: GaugeVec,
}

impl RiskMetricsInner {
    fn new() -> Self {
        Self {
            prediction_latency_seconds: register_histogram!(
                "credit_risk_prediction_latency_seconds",
                "Time spent aligning features and running inference",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            batch_size: register_histogram!(
                "credit_risk_batch_size",
                "Number of applications per batch request",
                BATCH_SIZE_BUCKETS.to_vec()
            )
            .expect("Failed to register batch_size"),

            predictions_total: register_int_counter_vec!(
                "credit_risk_predictions_total",
                "Total number of predictions by risk label",
                &["label"]
            )
            .expect("Failed to register predictions_total"),

            prediction_errors_total: register_int_counter_vec!(
                "credit_risk_prediction_errors_total",
                "Total number of failed predictions by error kind",
                &["kind"]
            )
            .expect("Failed to register prediction_errors_total"),

            model_loaded: register_int_gauge!(
                "credit_risk_model_loaded",
                "Whether a model is loaded (1) or absent (0)"
            )
            .expect("Failed to register model_loaded"),

            model_version_info: register_gauge_vec!(
                "credit_risk_model_version_info",
                "Information about the currently loaded model",
                &["version", "kind"]
            )
            .expect("Failed to register model_version_info"),
        }
    }
}

/// Service metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct RiskMetrics {
    _private: (),
}

impl Default for RiskMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl RiskMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(RiskMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &RiskMetricsInner {
        GLOBAL_METRICS.get().expect("Metrics not initialized")
    }

    /// Record a prediction latency observation
    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner().prediction_latency_seconds.observe(duration_secs);
    }

    pub fn observe_batch_size(&self, size: usize) {
        self.inner().batch_size.observe(size as f64);
    }

    /// Count a successful prediction under its label
    pub fn inc_prediction(&self, label: &str) {
        self.inner().predictions_total.with_label_values(&[label]).inc();
    }

    /// Count a failed prediction under its error kind
    pub fn inc_prediction_error(&self, kind: &str) {
        self.inner()
            .prediction_errors_total
            .with_label_values(&[kind])
            .inc();
    }

    /// Record the loaded model, or its absence when `version` is `None`
    pub fn set_model(&self, version: Option<&str>, kind: &str) {
        self.inner().model_version_info.reset();
        match version {
            Some(v) => {
                self.inner().model_loaded.set(1);
                self.inner()
                    .model_version_info
                    .with_label_values(&[v, kind])
                    .set(1.0);
            }
            None => self.inner().model_loaded.set(0),
        }
    }
}

/// Structured logger for service events
///
/// Provides consistent JSON-formatted logging for predictions,
/// model lifecycle and failures.
#[derive(Clone)]
pub struct StructuredLogger {
    instance: String,
}

impl StructuredLogger {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
        }
    }

    /// Log a prediction event
    pub fn log_prediction(
        &self,
        label: &str,
        probability_default: f64,
        model_version: &str,
        elapsed_us: u64,
    ) {
        info!(
            event = "prediction_generated",
            instance = %self.instance,
            label = %label,
            probability_default = probability_default,
            model_version = %model_version,
            elapsed_us = elapsed_us,
            "Generated credit risk prediction"
        );
    }

    /// Log an inference failure with its full cause chain
    pub fn log_inference_failure(&self, kind: &str, cause: &(dyn std::error::Error + 'static)) {
        let mut chain = vec![cause.to_string()];
        let mut source = cause.source();
        while let Some(inner) = source {
            chain.push(inner.to_string());
            source = inner.source();
        }
        error!(
            event = "inference_failed",
            instance = %self.instance,
            kind = %kind,
            cause = %chain.join(": "),
            "Prediction failed"
        );
    }

    /// Log service startup
    pub fn log_startup(&self, api_version: &str, model_version: Option<&str>) {
        info!(
            event = "service_started",
            instance = %self.instance,
            api_version = %api_version,
            model_version = ?model_version,
            "Credit risk service started"
        );
    }

    /// Log a successful model load
    pub fn log_model_loaded(&self, path: &str, version: &str, kind: &str, features: usize) {
        info!(
            event = "model_loaded",
            instance = %self.instance,
            path = %path,
            model_version = %version,
            kind = %kind,
            features = features,
            "Model loaded"
        );
    }

    /// Log that the service runs without a model
    pub fn log_model_unavailable(&self, path: &str, reason: &str) {
        warn!(
            event = "model_unavailable",
            instance = %self.instance,
            path = %path,
            reason = %reason,
            "Model not loaded, predictions will be rejected"
        );
    }

    /// Log service shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            instance = %self.instance,
            reason = %reason,
            "Credit risk service shutting down"
        );
    }
}
