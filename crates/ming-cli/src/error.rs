//! Error types and S3 error codes

use crate::bootstrap::Stage;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use ming_core::ObjectLayerError;
use std::error::Error as StdError;
use thiserror::Error;

/// S3 error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S3ErrorCode {
    AccessDenied,
    BucketAlreadyExists,
    BucketAlreadyOwnedByYou,
    BucketNotEmpty,
    InternalError,
    InvalidArgument,
    InvalidBucketName,
    InvalidRequest,
    KeyTooLong,
    MethodNotAllowed,
    NoSuchBucket,
    NoSuchKey,
    NotImplemented,
    RequestTimeout,
    ServerNotInitialized,
    SlowDown,
}

impl S3ErrorCode {
    /// Get the error code string
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessDenied => "AccessDenied",
            Self::BucketAlreadyExists => "BucketAlreadyExists",
            Self::BucketAlreadyOwnedByYou => "BucketAlreadyOwnedByYou",
            Self::BucketNotEmpty => "BucketNotEmpty",
            Self::InternalError => "InternalError",
            Self::InvalidArgument => "InvalidArgument",
            Self::InvalidBucketName => "InvalidBucketName",
            Self::InvalidRequest => "InvalidRequest",
            Self::KeyTooLong => "KeyTooLong",
            Self::MethodNotAllowed => "MethodNotAllowed",
            Self::NoSuchBucket => "NoSuchBucket",
            Self::NoSuchKey => "NoSuchKey",
            Self::NotImplemented => "NotImplemented",
            Self::RequestTimeout => "RequestTimeout",
            Self::ServerNotInitialized => "ServerNotInitialized",
            Self::SlowDown => "SlowDown",
        }
    }

    /// Get the HTTP status code
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::AccessDenied => StatusCode::FORBIDDEN,
            Self::BucketAlreadyExists | Self::BucketAlreadyOwnedByYou | Self::BucketNotEmpty => StatusCode::CONFLICT,
            Self::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
            Self::InvalidArgument | Self::InvalidBucketName | Self::InvalidRequest | Self::KeyTooLong => {
                StatusCode::BAD_REQUEST
            }
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::NoSuchBucket | Self::NoSuchKey => StatusCode::NOT_FOUND,
            Self::NotImplemented => StatusCode::NOT_IMPLEMENTED,
            Self::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            Self::ServerNotInitialized | Self::SlowDown => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// API error type
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("S3 error: {code:?} - {message}")]
    S3Error {
        code: S3ErrorCode,
        message: String,
        resource: Option<String>,
        request_id: String,
    },

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Object layer error: {0}")]
    ObjectLayer(#[from] ObjectLayerError),
}

impl ApiError {
    /// Create a new S3 error
    pub fn s3(code: S3ErrorCode, message: impl Into<String>) -> Self {
        Self::S3Error {
            code,
            message: message.into(),
            resource: None,
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// Create with resource
    pub fn s3_with_resource(code: S3ErrorCode, message: impl Into<String>, resource: impl Into<String>) -> Self {
        Self::S3Error {
            code,
            message: message.into(),
            resource: Some(resource.into()),
            request_id: uuid::Uuid::new_v4().to_string(),
        }
    }

    /// The object layer has not been installed yet
    pub fn not_initialized() -> Self {
        Self::s3(
            S3ErrorCode::ServerNotInitialized,
            "Server not initialized, please try again.",
        )
    }

    /// Get the error code
    pub fn error_code(&self) -> S3ErrorCode {
        match self {
            Self::S3Error { code, .. } => *code,
            Self::Internal(_) => S3ErrorCode::InternalError,
            Self::ObjectLayer(e) => match e {
                ObjectLayerError::BucketNotFound(_) => S3ErrorCode::NoSuchBucket,
                ObjectLayerError::BucketExists(_) => S3ErrorCode::BucketAlreadyOwnedByYou,
                ObjectLayerError::BucketNotEmpty(_) => S3ErrorCode::BucketNotEmpty,
                ObjectLayerError::InvalidBucketName(_) => S3ErrorCode::InvalidBucketName,
                ObjectLayerError::ObjectNotFound { .. } => S3ErrorCode::NoSuchKey,
                ObjectLayerError::InvalidObjectName(name) if name.len() > 1024 => S3ErrorCode::KeyTooLong,
                ObjectLayerError::InvalidObjectName(_) => S3ErrorCode::InvalidArgument,
                ObjectLayerError::NotImplemented(_) => S3ErrorCode::NotImplemented,
                ObjectLayerError::LockTimeout { .. } => S3ErrorCode::RequestTimeout,
                ObjectLayerError::Backend(_) | ObjectLayerError::Io(_) => S3ErrorCode::InternalError,
            },
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = self.error_code();
        let status = code.status_code();
        let (request_id, resource) = match &self {
            ApiError::S3Error {
                request_id, resource, ..
            } => (request_id.clone(), resource.clone().unwrap_or_default()),
            _ => (uuid::Uuid::new_v4().to_string(), String::new()),
        };

        let xml = format!(
            r#"<?xml version="1.0" encoding="UTF-8"?>
<Error>
    <Code>{}</Code>
    <Message>{}</Message>
    <Resource>{}</Resource>
    <RequestId>{}</RequestId>
</Error>"#,
            code.as_str(),
            escape(&self.to_string()),
            escape(&resource),
            request_id
        );

        // HEAD responses carry no body, so the code also travels as a header
        (
            status,
            [
                ("Content-Type", "application/xml"),
                ("x-amz-request-id", request_id.as_str()),
                ("x-amz-error-code", code.as_str()),
            ],
            xml,
        )
            .into_response()
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;").replace('<', "&lt;").replace('>', "&gt;")
}

/// A fatal startup failure, tagged with the bootstrap stage that produced it
#[derive(Error, Debug)]
#[error("{stage}: {source}")]
pub struct BootstrapError {
    pub stage: Stage,
    #[source]
    pub source: Box<dyn StdError + Send + Sync + 'static>,
}

impl BootstrapError {
    pub fn new(stage: Stage, source: impl Into<Box<dyn StdError + Send + Sync + 'static>>) -> Self {
        Self {
            stage,
            source: source.into(),
        }
    }
}

/// Attach a bootstrap stage to any error
pub trait StageExt<T> {
    fn stage(self, stage: Stage) -> Result<T, BootstrapError>;
}

impl<T, E> StageExt<T> for Result<T, E>
where
    E: Into<Box<dyn StdError + Send + Sync + 'static>>,
{
    fn stage(self, stage: Stage) -> Result<T, BootstrapError> {
        self.map_err(|e| BootstrapError::new(stage, e))
    }
}
