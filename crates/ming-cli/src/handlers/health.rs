//! Liveness and readiness checks

use crate::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse};
use std::sync::Arc;

/// GET /ming/health/live
pub async fn health_live() -> impl IntoResponse {
    StatusCode::OK
}

/// GET /ming/health/ready - 200 once the object layer is installed
pub async fn health_ready(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    if state.globals.object_layer().is_some() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
