//! S3 API and operator request handlers

pub mod admin;
pub mod bucket;
pub mod health;
pub mod metrics;
pub mod object;
pub mod service;

pub use admin::*;
pub use bucket::*;
pub use health::*;
pub use metrics::*;
pub use object::*;
pub use service::*;

use crate::error::{ApiError, S3ErrorCode};
use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use ming_core::SYSTEM_META_BUCKET;

/// An XML body with the matching content type
pub(crate) fn xml_response(status: StatusCode, body: String) -> Response {
    (status, [(header::CONTENT_TYPE, "application/xml")], body).into_response()
}

/// Refuse S3 requests addressed to the gateway's own metadata bucket
pub(crate) fn check_user_bucket(bucket: &str) -> Result<(), ApiError> {
    if bucket == SYSTEM_META_BUCKET {
        return Err(ApiError::s3_with_resource(
            S3ErrorCode::AccessDenied,
            "Access Denied.",
            format!("/{bucket}"),
        ));
    }
    Ok(())
}
