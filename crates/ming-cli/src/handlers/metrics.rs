//! Prometheus scrape endpoint

use crate::{ApiError, AppState};
use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
};
use prometheus::{Encoder, TextEncoder};
use std::sync::Arc;

/// GET /ming/v2/metrics
pub async fn prometheus_metrics(State(state): State<Arc<AppState>>) -> Result<impl IntoResponse, ApiError> {
    let text = crate::metrics::render(&state).map_err(|e| ApiError::Internal(e.to_string()))?;
    Ok(([(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())], text))
}
