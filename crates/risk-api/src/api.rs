//! HTTP API for predictions, health checks and Prometheus metrics

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use prometheus::{Encoder, TextEncoder};
use risk_lib::{
    contract::{
        BatchItem, BatchPredictionResponse, CreditApplication, ErrorResponse, HealthSummary,
        PredictionResponse, ValidationErrors,
    },
    health::{ComponentStatus, HealthRegistry},
    PredictionService, ServiceError,
};
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
    pub health_registry: HealthRegistry,
    pub api_version: String,
}

impl AppState {
    pub fn new(
        service: Arc<PredictionService>,
        health_registry: HealthRegistry,
        api_version: impl Into<String>,
    ) -> Self {
        Self {
            service,
            health_registry,
            api_version: api_version.into(),
        }
    }

    fn model_version(&self) -> String {
        self.service.model_version().unwrap_or_default().to_string()
    }
}

/// A service error on its way to the caller
#[derive(Debug)]
pub struct ApiError(pub ServiceError);

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self.0 {
            ServiceError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            ServiceError::ModelUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ServiceError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
            ServiceError::InferenceFailed(_) | ServiceError::WorkerFailed(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<ServiceError> for ApiError {
    fn from(err: ServiceError) -> Self {
        ApiError(err)
    }
}

impl From<ValidationErrors> for ApiError {
    fn from(errors: ValidationErrors) -> Self {
        ApiError(ServiceError::InvalidInput(errors))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(ErrorResponse::from_service_error(&self.0))).into_response()
    }
}

/// Unwrap a JSON body, turning a malformed one into a validation error
fn json_body(body: Result<Json<Value>, JsonRejection>) -> Result<Value, ApiError> {
    match body {
        Ok(Json(value)) => Ok(value),
        Err(rejection) => Err(ValidationErrors::single("body", rejection.body_text()).into()),
    }
}

/// Root summary: service status, whether a model is loaded and the API version
async fn root(State(state): State<Arc<AppState>>) -> Json<HealthSummary> {
    let model_loaded = state.service.is_model_loaded();
    Json(HealthSummary {
        status: if model_loaded { "healthy" } else { "degraded" }.to_string(),
        model_loaded,
        api_version: state.api_version.clone(),
        model_version: state.service.model_version().map(str::to_string),
    })
}

/// Health check response - returns 200 if operational, 503 if unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
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

/// Prometheus metrics endpoint
async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

async fn predict(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<PredictionResponse>, ApiError> {
    let application = CreditApplication::from_value(&json_body(body)?)?;
    let outcome = state.service.predict_async(application).await;
    state.health_registry.record_inference(&outcome).await;
    let prediction = outcome?;

    Ok(Json(PredictionResponse::new(prediction, state.model_version())))
}

/// Score `applications` item by item; malformed items fail in place
async fn predict_batch(
    State(state): State<Arc<AppState>>,
    body: Result<Json<Value>, JsonRejection>,
) -> Result<Json<BatchPredictionResponse>, ApiError> {
    let body = json_body(body)?;
    let items = body
        .get("applications")
        .and_then(Value::as_array)
        .ok_or_else(|| ValidationErrors::single("applications", "must be an array of applications"))?;

    state.service.admit_batch(items.len())?;

    let mut results: Vec<Option<BatchItem>> = vec![None; items.len()];
    let mut accepted = Vec::with_capacity(items.len());
    let mut positions = Vec::with_capacity(items.len());
    for (index, item) in items.iter().enumerate() {
        match CreditApplication::from_value(item) {
            Ok(application) => {
                accepted.push(application);
                positions.push(index);
            }
            Err(errors) => {
                results[index] = Some(BatchItem::from_error(index, ErrorResponse::validation(&errors)));
            }
        }
    }

    let outcome = state.service.predict_batch_async(accepted).await;
    state.health_registry.record_inference(&outcome).await;
    let outcomes = outcome?;
    for (index, outcome) in positions.into_iter().zip(outcomes) {
        results[index] = Some(BatchItem::from_outcome(index, outcome));
    }

    Ok(Json(BatchPredictionResponse {
        success: true,
        model_version: state.model_version(),
        results: results.into_iter().flatten().collect(),
    }))
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/predict", post(predict))
        .route("/predict/batch", post(predict_batch))
        .with_state(state)
}

/// Serve the API on `listener` until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, state: Arc<AppState>, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let app = create_router(state);

    info!(addr = %listener.local_addr()?, "Starting API server");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    Ok(())
}
