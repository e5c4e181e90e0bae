//! Error taxonomy for model loading and prediction

use crate::contract::ValidationErrors;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// The artifact does not honour the binary classifier contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("model contract violation: {reason}")]
pub struct ModelContractViolation {
    pub reason: String,
}

impl ModelContractViolation {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Errors raised by a concrete classifier implementation
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("expected {expected} features, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("classifier backend error: {0}")]
    Backend(#[source] anyhow::Error),
}

/// Errors raised while interpreting classifier output
#[derive(Debug, Error)]
pub enum AdapterError {
    #[error(transparent)]
    Contract(#[from] ModelContractViolation),

    #[error(transparent)]
    Classifier(#[from] ClassifierError),
}

/// Errors raised while loading a model artifact. Any of these leaves the
/// model slot absent.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse model manifest: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("checksum mismatch for {path:?}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error(transparent)]
    Contract(#[from] ModelContractViolation),

    #[error("failed to build classifier: {0}")]
    Backend(#[source] anyhow::Error),
}

/// Errors surfaced by the prediction service
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid input: {0}")]
    InvalidInput(ValidationErrors),

    #[error("model not loaded")]
    ModelUnavailable,

    #[error("inference failed: {0}")]
    InferenceFailed(#[source] AdapterError),

    #[error("inference timed out after {0:?}")]
    Timeout(Duration),

    #[error("inference worker failed: {0}")]
    WorkerFailed(String),
}

impl ServiceError {
    /// True when the caller caused the failure and can fix it by changing the request
    pub fn is_client_error(&self) -> bool {
        matches!(self, ServiceError::InvalidInput(_))
    }

    /// Stable identifier used as a metric label
    pub fn kind(&self) -> &'static str {
        match self {
            ServiceError::InvalidInput(_) => "invalid_input",
            ServiceError::ModelUnavailable => "model_unavailable",
            ServiceError::InferenceFailed(AdapterError::Contract(_)) => "model_contract_violation",
            ServiceError::InferenceFailed(AdapterError::Classifier(_)) => "inference_failed",
            ServiceError::Timeout(_) => "timeout",
            ServiceError::WorkerFailed(_) => "worker_failed",
        }
    }
}
