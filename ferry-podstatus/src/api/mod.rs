//! API Module
//!
//! HTTP API of the status service. Responses are plain text so that shell
//! scripts can consume them directly.

pub mod error;
pub mod health;
pub mod pod;

use std::sync::Arc;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;

use crate::source::PodSource;

/// Shared state of the handlers
#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn PodSource>,
}

/// Create the main API router with all endpoints
pub fn create_router(source: Arc<dyn PodSource>) -> Router {
    Router::new()
        // Health check
        .route("/health", get(health::health_check))
        // Pod state
        .route("/pod/{pod}", get(pod::get_pod_state))
        .fallback(error::usage)
        .with_state(AppState { source })
        .layer(TraceLayer::new_for_http())
}
