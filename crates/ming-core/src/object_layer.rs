//! The object layer trait

use crate::nslock::NsLock;
use crate::types::{BackendInfo, BucketInfo, ListObjectsInfo, ObjectInfo, ObjectOptions};
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Sending half of a walk result stream. The stream ends when the sender is dropped.
pub type WalkSink = mpsc::Sender<ObjectInfo>;

/// Outcome of asking a layer to walk a prefix
#[derive(Debug)]
pub enum WalkStatus {
    /// The layer took ownership of the sink and is streaming into it
    Started,
    /// The layer cannot walk natively; the sink is handed back untouched
    Unsupported(WalkSink),
}

/// Storage capability interface implemented by every backend
#[async_trait]
pub trait ObjectLayer: Send + Sync {
    /// Describe the backend
    fn backend_info(&self) -> BackendInfo;

    /// Create a bucket
    async fn make_bucket(&self, bucket: &str) -> Result<()>;

    /// Get bucket information
    async fn get_bucket_info(&self, bucket: &str) -> Result<BucketInfo>;

    /// List all buckets
    async fn list_buckets(&self) -> Result<Vec<BucketInfo>>;

    /// Delete an empty bucket
    async fn delete_bucket(&self, bucket: &str) -> Result<()>;

    /// List one page of objects. `max_keys == None` asks for the largest page the backend serves.
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        marker: &str,
        delimiter: &str,
        max_keys: Option<usize>,
    ) -> Result<ListObjectsInfo>;

    /// Read an object
    async fn get_object(&self, bucket: &str, key: &str, opts: &ObjectOptions) -> Result<(ObjectInfo, Bytes)>;

    /// Read object metadata
    async fn get_object_info(&self, bucket: &str, key: &str, opts: &ObjectOptions) -> Result<ObjectInfo>;

    /// Write an object
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes, opts: &ObjectOptions) -> Result<ObjectInfo>;

    /// Delete an object
    async fn delete_object(&self, bucket: &str, key: &str, opts: &ObjectOptions) -> Result<ObjectInfo>;

    /// Recursively stream every object under `prefix` into `results`.
    ///
    /// Backends without a native walk return [`WalkStatus::Unsupported`] with the sink.
    async fn walk(
        &self,
        _ctx: CancellationToken,
        _bucket: &str,
        _prefix: &str,
        results: WalkSink,
        _opts: &ObjectOptions,
    ) -> Result<WalkStatus> {
        Ok(WalkStatus::Unsupported(results))
    }

    /// Namespace lock for a bucket and set of objects, if the layer provides locking
    fn new_ns_lock(&self, _bucket: &str, _objects: &[&str]) -> Option<NsLock> {
        None
    }

    /// Whether the backend can store encrypted objects
    fn is_encryption_supported(&self) -> bool {
        false
    }

    /// Whether the backend can store compressed objects
    fn is_compression_supported(&self) -> bool {
        false
    }

    /// Release backend resources
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
}
