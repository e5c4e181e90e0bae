//! HTTP boundary for the credit risk prediction service

pub mod api;
pub mod config;

pub use api::{create_router, serve, ApiError, AppState};
pub use config::ServerConfig;
