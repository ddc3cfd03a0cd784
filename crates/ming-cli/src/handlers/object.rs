//! Object operation handlers

use super::check_user_bucket;
use crate::subsys::notification::{BucketEvent, EventName};
use crate::{ApiError, AppState};
use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use ming_core::{LockMode, NsLockGuard, ObjectInfo, ObjectLayer, ObjectLayerError, ObjectOptions};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// How long a handler waits for a namespace lock
pub const LOCK_TIMEOUT: Duration = Duration::from_secs(30);

const USER_META_PREFIX: &str = "x-amz-meta-";

/// Lock `bucket/key` through the layer, when it provides locking
async fn lock_object(
    state: &AppState,
    layer: &dyn ObjectLayer,
    bucket: &str,
    key: &str,
    mode: LockMode,
) -> Result<Option<NsLockGuard>, ApiError> {
    let Some(lock) = layer.new_ns_lock(bucket, &[key]) else {
        return Ok(None);
    };
    let guard = lock.lock_timeout(mode, LOCK_TIMEOUT).await?;
    state.metrics.record_ns_lock();
    Ok(Some(guard))
}

/// Content type and `x-amz-meta-*` headers of a put
fn object_options(headers: &HeaderMap) -> ObjectOptions {
    let mut opts = ObjectOptions {
        content_type: headers
            .get(header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string()),
        ..Default::default()
    };
    for (name, value) in headers.iter() {
        if name.as_str().starts_with(USER_META_PREFIX) {
            if let Ok(v) = value.to_str() {
                opts.user_defined.insert(name.as_str().to_string(), v.to_string());
            }
        }
    }
    opts
}

fn object_response(info: &ObjectInfo, body: Body) -> Result<Response, ApiError> {
    let mut builder = Response::builder()
        .status(StatusCode::OK)
        .header(header::ETAG, format!("\"{}\"", info.etag))
        .header(header::CONTENT_LENGTH, info.size)
        .header(
            header::CONTENT_TYPE,
            info.content_type.as_deref().unwrap_or("application/octet-stream"),
        )
        .header(
            header::LAST_MODIFIED,
            info.mod_time.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
        );
    for (name, value) in &info.user_defined {
        if name.starts_with(USER_META_PREFIX) {
            builder = builder.header(name.as_str(), value.as_str());
        }
    }
    builder.body(body).map_err(|e| ApiError::Internal(e.to_string()))
}

/// PUT /{bucket}/{key} - Put object
pub async fn put_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    check_user_bucket(&bucket)?;
    let layer = state.object_layer()?;
    let opts = object_options(&headers);

    let info = {
        let _guard = lock_object(&state, layer.as_ref(), &bucket, &key, LockMode::Exclusive).await?;
        let info = layer.put_object(&bucket, &key, body, &opts).await?;
        if let Some(cache) = state.globals.cache_layer() {
            cache.invalidate(&bucket, &key).await;
        }
        info
    };

    debug!(bucket = %bucket, key = %key, size = info.size, "object stored");
    state.notify(BucketEvent::new(EventName::ObjectCreatedPut, &info));

    Ok((StatusCode::OK, [("ETag", format!("\"{}\"", info.etag))], "").into_response())
}

/// GET /{bucket}/{key} - Get object, through the disk cache when one is installed
pub async fn get_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    check_user_bucket(&bucket)?;
    let layer = state.object_layer()?;
    let opts = ObjectOptions::default();
    let _guard = lock_object(&state, layer.as_ref(), &bucket, &key, LockMode::Shared).await?;

    let (info, data) = match state.globals.cache_layer() {
        Some(cache) if !cache.is_excluded(&bucket, &key) => {
            let info = layer.get_object_info(&bucket, &key, &opts).await?;
            match cache.get(&bucket, &key, &info.etag).await {
                Some(data) => (info, data),
                None => {
                    let (info, data) = layer.get_object(&bucket, &key, &opts).await?;
                    if let Err(e) = cache.put(&bucket, &key, &info.etag, &data).await {
                        warn!(bucket = %bucket, key = %key, error = %e, "unable to cache object");
                    }
                    (info, data)
                }
            }
        }
        _ => layer.get_object(&bucket, &key, &opts).await?,
    };

    object_response(&info, Body::from(data))
}

/// HEAD /{bucket}/{key} - Object metadata
pub async fn head_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    check_user_bucket(&bucket)?;
    let layer = state.object_layer()?;
    let _guard = lock_object(&state, layer.as_ref(), &bucket, &key, LockMode::Shared).await?;
    let info = layer.get_object_info(&bucket, &key, &ObjectOptions::default()).await?;
    object_response(&info, Body::empty())
}

/// DELETE /{bucket}/{key} - Delete object. Deleting a missing key succeeds.
pub async fn delete_object(
    State(state): State<Arc<AppState>>,
    Path((bucket, key)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    check_user_bucket(&bucket)?;
    let layer = state.object_layer()?;

    let deleted = {
        let _guard = lock_object(&state, layer.as_ref(), &bucket, &key, LockMode::Exclusive).await?;
        let deleted = match layer.delete_object(&bucket, &key, &ObjectOptions::default()).await {
            Ok(info) => Some(info),
            Err(ObjectLayerError::ObjectNotFound { .. }) => None,
            Err(e) => return Err(e.into()),
        };
        if let Some(cache) = state.globals.cache_layer() {
            cache.invalidate(&bucket, &key).await;
        }
        deleted
    };

    if let Some(info) = deleted {
        state.notify(BucketEvent::new(EventName::ObjectRemovedDelete, &info));
    }

    Ok(StatusCode::NO_CONTENT.into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_object_options_from_headers() {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));
        headers.insert("x-amz-meta-color", HeaderValue::from_static("blue"));
        headers.insert("x-other", HeaderValue::from_static("ignored"));

        let opts = object_options(&headers);
        assert_eq!(opts.content_type.as_deref(), Some("text/plain"));
        assert_eq!(opts.user_defined.len(), 1);
        assert_eq!(opts.user_defined.get("x-amz-meta-color").map(String::as_str), Some("blue"));
    }

    #[test]
    fn test_object_response_headers() {
        let mut info = ObjectInfo::new("b", "k", 4, "abc");
        info.user_defined.insert("x-amz-meta-color".into(), "blue".into());
        let response = object_response(&info, Body::empty()).unwrap();
        let headers = response.headers();
        assert_eq!(headers.get(header::ETAG).unwrap(), "\"abc\"");
        assert_eq!(headers.get(header::CONTENT_LENGTH).unwrap(), "4");
        assert_eq!(headers.get(header::CONTENT_TYPE).unwrap(), "application/octet-stream");
        assert_eq!(headers.get("x-amz-meta-color").unwrap(), "blue");
    }
}
