//! Serving core for the credit risk model
//!
//! This crate provides the core functionality for:
//! - Request/response contract and field validation
//! - Feature alignment against a model's declared schema
//! - Binary classifier adaptation (random forest, logistic regression, ONNX)
//! - Model artifact loading
//! - The prediction service
//! - Health checks and observability

pub mod artifact;
pub mod classifier;
pub mod contract;
pub mod error;
pub mod features;
pub mod health;
pub mod models;
pub mod observability;
pub mod service;

pub use artifact::{load_model, LoadedModel, ModelSlot};
pub use classifier::{BinaryClassifier, ClassifierAdapter};
pub use contract::{
    CreditApplication, ErrorResponse, PredictionResponse, PredictionResult, RiskLabel,
};
pub use error::{AdapterError, ClassifierError, LoadError, ModelContractViolation, ServiceError};
pub use features::{align, AlignedFeatureRow, FeatureSchema, MISSING_FEATURE_DEFAULT};
pub use health::{
    Component, ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse,
    ReadinessResponse,
};
pub use models::FeatureRecord;
pub use observability::{RiskMetrics, StructuredLogger};
pub use service::{BatchOutcome, PredictionService, ServiceConfig};
