//! # Ming Backend
//!
//! Storage backends the ming gateway can front.
//!
//! - **memory**: in-process maps with a native walk, for development
//! - **nas**: a local or network-mounted directory tree
//! - **s3**: a remote S3-compatible endpoint, requests signed with SigV4
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │          Gateway (ming-core)            │
//! ├─────────────┬─────────────┬─────────────┤
//! │   memory    │     nas     │     s3      │
//! ├─────────────┴─────────────┼─────────────┤
//! │   process memory / disk   │ remote HTTP │
//! └───────────────────────────┴─────────────┘
//! ```

pub mod listing;
pub mod memory;
pub mod nas;
pub mod s3;
pub mod sigv4;

pub use memory::{MemoryGateway, MemoryLayer};
pub use nas::{NasGateway, NasLayer};
pub use s3::{S3Gateway, S3Layer};

use ming_core::{ObjectLayerError, Result, SYSTEM_META_BUCKET};

/// Largest page a local backend returns from one listing call
pub const MAX_OBJECT_LIST: usize = 1000;

/// Check a bucket name against S3 naming rules.
/// The gateway system bucket is always accepted.
pub fn check_bucket_name(bucket: &str) -> Result<()> {
    if bucket == SYSTEM_META_BUCKET {
        return Ok(());
    }
    let valid = (3..=63).contains(&bucket.len())
        && bucket
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-' || c == '.')
        && bucket.starts_with(|c: char| c.is_ascii_alphanumeric())
        && bucket.ends_with(|c: char| c.is_ascii_alphanumeric())
        && !bucket.contains("..");
    if valid {
        Ok(())
    } else {
        Err(ObjectLayerError::InvalidBucketName(bucket.to_string()))
    }
}

/// Reject keys that are empty, absolute, or escape the bucket
pub fn check_object_name(key: &str) -> Result<()> {
    let escapes = key.split('/').any(|part| part == ".." || part == ".");
    if key.is_empty() || key.starts_with('/') || key.ends_with('/') || key.len() > 1024 || escapes {
        return Err(ObjectLayerError::InvalidObjectName(key.to_string()));
    }
    Ok(())
}
