//! Health and metrics endpoints

use axum::{extract::State, http::StatusCode, response::Json};
use chrono::Utc;

use clipper_guard_core::infrastructure::resilience::CircuitState;

use crate::presentation::models::{HealthResponse, MetricsResponse};
use crate::presentation::routes::AppState;

fn store_health(state: &AppState) -> HealthResponse {
    let store = state.guard.circuit_state();
    let status = match store {
        CircuitState::Primary => "healthy",
        CircuitState::Fallback => "degraded",
    };

    HealthResponse {
        status: status.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: Utc::now(),
        details: Some(serde_json::json!({ "store": store.as_str() })),
    }
}

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is running", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(store_health(&state))
}

/// Liveness probe: the process answers
#[utoipa::path(
    get,
    path = "/health/live",
    tag = "health",
    responses(
        (status = 200, description = "Process is alive")
    )
)]
pub async fn liveness() -> StatusCode {
    StatusCode::OK
}

/// Readiness probe
///
/// Stays ready while the fallback counter answers; the details report
/// which store is active.
#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "health",
    responses(
        (status = 200, description = "Ready to serve decisions", body = HealthResponse)
    )
)]
pub async fn readiness(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(store_health(&state))
}

/// Guard counters as JSON
#[utoipa::path(
    get,
    path = "/metrics",
    tag = "health",
    responses(
        (status = 200, description = "Current guard counters", body = MetricsResponse)
    )
)]
pub async fn metrics(State(state): State<AppState>) -> Json<MetricsResponse> {
    Json(MetricsResponse::new(
        state.guard.circuit_state().as_str(),
        state.guard.metrics().snapshot(),
    ))
}
