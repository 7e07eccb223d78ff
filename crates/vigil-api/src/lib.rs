//! Axum HTTP API server.
//!
//! This crate provides:
//! - The detection query front-end (`GET /api/detections`)
//! - Media ingestion onto the worker stream (`POST /api/media`)
//! - Per-IP rate limiting and security headers
//! - Health, readiness and Prometheus metrics endpoints

pub mod alerts;
pub mod config;
pub mod error;
pub mod handlers;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod state;

pub use alerts::QueryAlertSink;
pub use config::ApiConfig;
pub use error::{ApiError, ApiResult};
pub use routes::create_router;
pub use state::{AppState, MediaIngest};
