//! mss-intake library interface
//!
//! Submission intake service: placeholder admission plus its HTTP API.
//! Exposes public APIs for integration testing.

pub mod admission;
pub mod api;
pub mod error;
pub mod utils;

pub use crate::error::{ApiError, ApiResult};

use axum::{routing::get, Router};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use tower_http::trace::TraceLayer;

use crate::admission::PlaceholderService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Placeholder admission service
    pub service: Arc<PlaceholderService>,
    /// Budget for retrying transient storage failures on create
    pub max_retry_wait_ms: u64,
    /// Service startup timestamp for uptime tracking
    pub startup_time: DateTime<Utc>,
}

impl AppState {
    pub fn new(service: Arc<PlaceholderService>, max_retry_wait_ms: u64) -> Self {
        Self {
            service,
            max_retry_wait_ms,
            startup_time: Utc::now(),
        }
    }
}

/// Build application router
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .merge(api::placeholder_routes())
        .route("/events", get(api::event_stream))
        .merge(api::health_routes())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
