//! Data types exchanged with object layers

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Bucket information
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BucketInfo {
    /// Bucket name
    pub name: String,
    /// Creation time
    pub created: DateTime<Utc>,
}

impl BucketInfo {
    pub fn new(name: impl Into<String>, created: DateTime<Utc>) -> Self {
        Self {
            name: name.into(),
            created,
        }
    }
}

/// Object information
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    /// Bucket name
    pub bucket: String,
    /// Object key
    pub name: String,
    /// Size in bytes
    pub size: u64,
    /// Entity tag without quotes
    pub etag: String,
    /// Last modification time
    pub mod_time: DateTime<Utc>,
    /// Content type
    pub content_type: Option<String>,
    /// True for common-prefix placeholders
    pub is_dir: bool,
    /// User-defined metadata
    pub user_defined: BTreeMap<String, String>,
}

impl ObjectInfo {
    /// Create object info for a regular object
    pub fn new(bucket: impl Into<String>, name: impl Into<String>, size: u64, etag: impl Into<String>) -> Self {
        Self {
            bucket: bucket.into(),
            name: name.into(),
            size,
            etag: etag.into(),
            mod_time: Utc::now(),
            content_type: None,
            is_dir: false,
            user_defined: BTreeMap::new(),
        }
    }

    pub fn with_mod_time(mut self, mod_time: DateTime<Utc>) -> Self {
        self.mod_time = mod_time;
        self
    }

    pub fn with_content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = Some(content_type.into());
        self
    }
}

/// One page of a listing
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListObjectsInfo {
    /// Objects in key order
    pub objects: Vec<ObjectInfo>,
    /// Common prefixes when a delimiter was given
    pub prefixes: Vec<String>,
    /// Marker to resume from; may be empty when no delimiter was given
    pub next_marker: String,
    /// Whether more results follow
    pub is_truncated: bool,
}

/// Per-request object options
#[derive(Clone, Debug, Default)]
pub struct ObjectOptions {
    /// Content type to store with a put
    pub content_type: Option<String>,
    /// User metadata to store with a put
    pub user_defined: BTreeMap<String, String>,
}

/// Backend description reported by a layer
#[derive(Clone, Debug, Serialize)]
pub struct BackendInfo {
    /// Backend type (e.g. "nas", "s3")
    pub backend_type: String,
    /// Whether the backend answered its last health check
    pub online: bool,
}
