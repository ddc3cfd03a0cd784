//! Service-level handlers

use super::xml_response;
use crate::{xml, ApiError, AppState};
use axum::{extract::State, http::StatusCode, response::Response};
use ming_core::SYSTEM_META_BUCKET;
use std::sync::Arc;

/// GET / - List buckets
pub async fn list_buckets(State(state): State<Arc<AppState>>) -> Result<Response, ApiError> {
    let layer = state.object_layer()?;
    let mut buckets = layer.list_buckets().await?;
    buckets.retain(|bucket| bucket.name != SYSTEM_META_BUCKET);

    Ok(xml_response(
        StatusCode::OK,
        xml::list_all_my_buckets_result(&state.info.deployment_id, &buckets),
    ))
}
