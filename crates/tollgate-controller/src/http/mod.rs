//! HTTP server for controller operations.
//!
//! Provides endpoints for:
//! - Health check (`/health`)
//! - Prometheus metrics (`/metrics`)

use std::sync::Arc;

use axum::{routing::get, Router};
use tower_http::trace::TraceLayer;

use crate::state::ControllerState;

mod handlers;

/// Create the HTTP router.
pub fn create_router(state: Arc<ControllerState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health_check))
        .route("/metrics", get(handlers::metrics_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
