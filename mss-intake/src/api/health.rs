//! Health check endpoint

use axum::{extract::State, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use crate::AppState;

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    /// Service status ("ok")
    pub status: String,
    /// Module name ("mss-intake")
    pub module: String,
    /// Crate version from Cargo.toml
    pub version: String,
    /// Seconds since service started
    pub uptime_seconds: u64,
    /// Keys with a placeholder insert currently in flight
    pub in_flight: usize,
}

/// GET /health
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let uptime = Utc::now().signed_duration_since(state.startup_time);
    let uptime_seconds = u64::try_from(uptime.num_seconds()).unwrap_or(0);

    Json(HealthResponse {
        status: "ok".to_string(),
        module: "mss-intake".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        uptime_seconds,
        in_flight: state.service.in_flight_count(),
    })
}

/// Build health check routes
pub fn health_routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}
