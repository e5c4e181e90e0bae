//! Credit risk API - serves default-risk predictions for loan applications
//!
//! Loads one model artifact at startup and answers prediction, health and
//! metrics requests until interrupted.

use anyhow::{bail, Context, Result};
use risk_api::{AppState, ServerConfig};
use risk_lib::{HealthRegistry, ModelSlot, PredictionService, StructuredLogger};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting risk-api");

    let config = ServerConfig::load()?;
    info!(
        port = config.port,
        model_path = %config.model_path.display(),
        "Server configured"
    );

    let logger = StructuredLogger::new("risk-api");
    let model_path = config.model_path.display().to_string();

    let slot = ModelSlot::load(&config.model_path);
    match &slot {
        ModelSlot::Loaded(model) => logger.log_model_loaded(
            &model_path,
            model.model_version(),
            model.kind(),
            model.schema().len(),
        ),
        ModelSlot::Absent { reason } => {
            logger.log_model_unavailable(&model_path, reason);
            if config.require_model {
                bail!("model required but not loaded from {}: {}", model_path, reason);
            }
        }
    }

    let health_registry = HealthRegistry::from_slot(&slot).await;
    let service = Arc::new(PredictionService::new(slot, config.service_config()));
    logger.log_startup(&config.api_version, service.model_version());

    let app_state = Arc::new(AppState::new(
        service,
        health_registry.clone(),
        config.api_version.clone(),
    ));

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;

    health_registry.mark_started().await;

    risk_api::serve(listener, app_state, shutdown_signal(logger)).await?;
    info!("Shut down");

    Ok(())
}

async fn shutdown_signal(logger: StructuredLogger) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for SIGINT");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    let reason = tokio::select! {
        _ = ctrl_c => "SIGINT received",
        _ = terminate => "SIGTERM received",
    };
    logger.log_shutdown(reason);
}
