//! Liveness and readiness tracking for the risk service
//!
//! The service is live as long as the process answers. It is ready only
//! when a model is installed and every tracked component is operational.

use crate::artifact::ModelSlot;
use crate::error::ServiceError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Healthy,
    /// Serving, but with reduced guarantees (e.g. slow inference)
    Degraded,
    Unhealthy,
}

impl ComponentStatus {
    pub fn is_operational(&self) -> bool {
        !matches!(self, ComponentStatus::Unhealthy)
    }

    fn severity(&self) -> u8 {
        match self {
            ComponentStatus::Healthy => 0,
            ComponentStatus::Degraded => 1,
            ComponentStatus::Unhealthy => 2,
        }
    }
}

/// Parts of the service whose state feeds the health report
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    /// The loaded classifier artifact
    Model,
    /// The inference worker pool
    Inference,
}

impl fmt::Display for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Component::Model => f.write_str("model"),
            Component::Inference => f.write_str("inference"),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// Unix seconds of the last status change
    pub updated_at: i64,
}

impl ComponentHealth {
    fn with_status(status: ComponentStatus, message: Option<String>) -> Self {
        Self {
            status,
            message,
            updated_at: chrono::Utc::now().timestamp(),
        }
    }

    pub fn healthy() -> Self {
        Self::with_status(ComponentStatus::Healthy, None)
    }

    pub fn degraded(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Degraded, Some(message.into()))
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self::with_status(ComponentStatus::Unhealthy, Some(message.into()))
    }
}

/// Body of `GET /healthz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub model_loaded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_version: Option<String>,
    pub components: BTreeMap<Component, ComponentHealth>,
}

/// Body of `GET /readyz`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadinessResponse {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug, Default)]
struct RegistryState {
    components: BTreeMap<Component, ComponentHealth>,
    model_version: Option<String>,
    started: bool,
}

/// Shared, cloneable view of the service's health
#[derive(Debug, Clone, Default)]
pub struct HealthRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed the registry from the model slot installed at startup
    pub async fn from_slot(slot: &ModelSlot) -> Self {
        let registry = Self::new();
        registry.record_model(slot).await;
        registry.set(Component::Inference, ComponentHealth::healthy()).await;
        registry
    }

    pub async fn set(&self, component: Component, health: ComponentHealth) {
        self.state.write().await.components.insert(component, health);
    }

    /// Mirror the slot into the `model` component
    pub async fn record_model(&self, slot: &ModelSlot) {
        let mut state = self.state.write().await;
        match slot.get() {
            Some(model) => {
                state.model_version = Some(model.model_version().to_string());
                state
                    .components
                    .insert(Component::Model, ComponentHealth::healthy());
            }
            None => {
                let reason = slot.absence_reason().unwrap_or("model not loaded");
                state.model_version = None;
                state
                    .components
                    .insert(Component::Model, ComponentHealth::unhealthy(reason));
            }
        }
    }

    /// Mirror an async inference outcome into the `inference` component.
    ///
    /// Deadline and worker failures degrade it; the next completed run
    /// restores it. Other errors leave it unchanged.
    pub async fn record_inference<T>(&self, outcome: &Result<T, ServiceError>) {
        let next = match outcome {
            Ok(_) => ComponentStatus::Healthy,
            Err(ServiceError::Timeout(_) | ServiceError::WorkerFailed(_)) => ComponentStatus::Degraded,
            Err(_) => return,
        };

        let current = self
            .state
            .read()
            .await
            .components
            .get(&Component::Inference)
            .map(|h| h.status);
        if current == Some(next) {
            return;
        }

        let health = match outcome {
            Err(e) => ComponentHealth::degraded(e.to_string()),
            Ok(_) => ComponentHealth::healthy(),
        };
        self.set(Component::Inference, health).await;
    }

    /// Mark startup complete; readiness is withheld until then
    pub async fn mark_started(&self) {
        self.state.write().await.started = true;
    }

    pub async fn health(&self) -> HealthResponse {
        let state = self.state.read().await;
        let status = state
            .components
            .values()
            .map(|h| h.status)
            .max_by_key(ComponentStatus::severity)
            .unwrap_or(ComponentStatus::Healthy);

        HealthResponse {
            status,
            model_loaded: state.model_version.is_some(),
            model_version: state.model_version.clone(),
            components: state.components.clone(),
        }
    }

    pub async fn readiness(&self) -> ReadinessResponse {
        let state = self.state.read().await;
        if !state.started {
            return ReadinessResponse {
                ready: false,
                reason: Some("service is starting".to_string()),
            };
        }

        let failing: Vec<String> = state
            .components
            .iter()
            .filter(|(_, h)| !h.status.is_operational())
            .map(|(c, h)| match &h.message {
                Some(msg) => format!("{c} ({msg})"),
                None => c.to_string(),
            })
            .collect();

        if failing.is_empty() {
            ReadinessResponse {
                ready: true,
                reason: None,
            }
        } else {
            ReadinessResponse {
                ready: false,
                reason: Some(format!("unhealthy: {}", failing.join(", "))),
            }
        }
    }
}
