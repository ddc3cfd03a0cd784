//! Error types for the ming-core crate

use thiserror::Error;

/// Result type alias using `ObjectLayerError`
pub type Result<T> = std::result::Result<T, ObjectLayerError>;

/// Errors returned by object layer operations
#[derive(Error, Debug)]
pub enum ObjectLayerError {
    /// Bucket not found
    #[error("bucket not found: {0}")]
    BucketNotFound(String),

    /// Bucket already exists
    #[error("bucket already exists: {0}")]
    BucketExists(String),

    /// Bucket still holds objects
    #[error("bucket not empty: {0}")]
    BucketNotEmpty(String),

    /// Invalid bucket name
    #[error("invalid bucket name: {0}")]
    InvalidBucketName(String),

    /// Object not found
    #[error("object not found: {bucket}/{key}")]
    ObjectNotFound { bucket: String, key: String },

    /// Invalid object key
    #[error("invalid object name: {0}")]
    InvalidObjectName(String),

    /// Operation not implemented by this backend
    #[error("not implemented: {0}")]
    NotImplemented(String),

    /// Lock could not be acquired in time
    #[error("lock timed out after {millis}ms on {resource}")]
    LockTimeout { resource: String, millis: u128 },

    /// Remote or storage backend failure
    #[error("backend error: {0}")]
    Backend(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl ObjectLayerError {
    /// Whether the error means the addressed bucket or object does not exist
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::BucketNotFound(_) | Self::ObjectNotFound { .. })
    }
}
