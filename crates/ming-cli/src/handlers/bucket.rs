//! Bucket operation handlers

use super::{check_user_bucket, xml_response};
use crate::xml::{self, ListRequest};
use crate::{ApiError, AppState, S3ErrorCode};
use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ming_core::ListObjectsInfo;
use serde::Deserialize;
use std::sync::Arc;

/// Largest page a client may ask for
pub const MAX_KEYS: usize = 1000;

/// PUT /{bucket} - Create bucket
pub async fn create_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
) -> Result<Response, ApiError> {
    check_user_bucket(&bucket)?;
    let layer = state.object_layer()?;
    layer.make_bucket(&bucket).await?;

    if let Some(notification) = state.globals.notification() {
        notification.add_bucket(&bucket);
    }

    Ok((StatusCode::OK, [("Location", format!("/{}", bucket))], "").into_response())
}

/// DELETE /{bucket} - Delete bucket
pub async fn delete_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
) -> Result<Response, ApiError> {
    check_user_bucket(&bucket)?;
    let layer = state.object_layer()?;
    layer.delete_bucket(&bucket).await?;

    if let Some(notification) = state.globals.notification() {
        notification.remove_bucket(&bucket);
    }

    Ok(StatusCode::NO_CONTENT.into_response())
}

/// HEAD /{bucket} - Check if bucket exists
pub async fn head_bucket(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
) -> Result<Response, ApiError> {
    check_user_bucket(&bucket)?;
    let layer = state.object_layer()?;
    layer.get_bucket_info(&bucket).await?;
    Ok(StatusCode::OK.into_response())
}

/// Query parameters for ListObjects (v1)
#[derive(Debug, Default, Deserialize)]
pub struct ListObjectsParams {
    pub prefix: Option<String>,
    pub marker: Option<String>,
    pub delimiter: Option<String>,
    #[serde(rename = "max-keys")]
    pub max_keys: Option<usize>,
}

/// GET /{bucket} - List objects
pub async fn list_objects(
    State(state): State<Arc<AppState>>,
    Path(bucket): Path<String>,
    params: Result<Query<ListObjectsParams>, QueryRejection>,
) -> Result<Response, ApiError> {
    check_user_bucket(&bucket)?;
    let Query(params) = params.map_err(|e| ApiError::s3(S3ErrorCode::InvalidArgument, e.body_text()))?;
    let layer = state.object_layer()?;
    let prefix = params.prefix.unwrap_or_default();
    let marker = params.marker.unwrap_or_default();
    let delimiter = params.delimiter.unwrap_or_default();
    let max_keys = params.max_keys.unwrap_or(MAX_KEYS).min(MAX_KEYS);

    let page = if max_keys == 0 {
        layer.get_bucket_info(&bucket).await?;
        ListObjectsInfo::default()
    } else {
        layer
            .list_objects(&bucket, &prefix, &marker, &delimiter, Some(max_keys))
            .await?
    };

    let req = ListRequest {
        bucket: &bucket,
        prefix: &prefix,
        marker: &marker,
        delimiter: &delimiter,
        max_keys,
    };
    Ok(xml_response(StatusCode::OK, xml::list_bucket_result(&req, &page)))
}
