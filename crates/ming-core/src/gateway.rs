//! Gateway layer decorator
//!
//! Wraps any backend object layer with process-local namespace locking and a
//! generic recursive walk for backends that cannot walk natively.

use crate::nslock::{NsLock, NsLockMap};
use crate::object_layer::{ObjectLayer, WalkSink, WalkStatus};
use crate::types::{BackendInfo, BucketInfo, ListObjectsInfo, ObjectInfo, ObjectOptions};
use crate::walk::spawn_paginated_walk;
use crate::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Object layer decorated with namespace locking and the fallback walk
pub struct GatewayLayer {
    inner: Arc<dyn ObjectLayer>,
    ns_mutex: NsLockMap,
}

impl GatewayLayer {
    /// Wrap a backend layer
    pub fn new(inner: Arc<dyn ObjectLayer>) -> Self {
        Self {
            inner,
            ns_mutex: NsLockMap::new(),
        }
    }

    /// Wrap a backend layer and erase the type
    pub fn wrap(inner: Arc<dyn ObjectLayer>) -> Arc<dyn ObjectLayer> {
        Arc::new(Self::new(inner))
    }

    /// The namespace lock map used by this layer
    pub fn ns_mutex(&self) -> &NsLockMap {
        &self.ns_mutex
    }
}

#[async_trait]
impl ObjectLayer for GatewayLayer {
    fn backend_info(&self) -> BackendInfo {
        self.inner.backend_info()
    }

    async fn make_bucket(&self, bucket: &str) -> Result<()> {
        self.inner.make_bucket(bucket).await
    }

    async fn get_bucket_info(&self, bucket: &str) -> Result<BucketInfo> {
        self.inner.get_bucket_info(bucket).await
    }

    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        self.inner.list_buckets().await
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        self.inner.delete_bucket(bucket).await
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        marker: &str,
        delimiter: &str,
        max_keys: Option<usize>,
    ) -> Result<ListObjectsInfo> {
        self.inner.list_objects(bucket, prefix, marker, delimiter, max_keys).await
    }

    async fn get_object(&self, bucket: &str, key: &str, opts: &ObjectOptions) -> Result<(ObjectInfo, Bytes)> {
        self.inner.get_object(bucket, key, opts).await
    }

    async fn get_object_info(&self, bucket: &str, key: &str, opts: &ObjectOptions) -> Result<ObjectInfo> {
        self.inner.get_object_info(bucket, key, opts).await
    }

    async fn put_object(&self, bucket: &str, key: &str, data: Bytes, opts: &ObjectOptions) -> Result<ObjectInfo> {
        self.inner.put_object(bucket, key, data, opts).await
    }

    async fn delete_object(&self, bucket: &str, key: &str, opts: &ObjectOptions) -> Result<ObjectInfo> {
        self.inner.delete_object(bucket, key, opts).await
    }

    async fn walk(
        &self,
        ctx: CancellationToken,
        bucket: &str,
        prefix: &str,
        results: WalkSink,
        opts: &ObjectOptions,
    ) -> Result<WalkStatus> {
        match self.inner.walk(ctx.clone(), bucket, prefix, results, opts).await? {
            WalkStatus::Started => Ok(WalkStatus::Started),
            WalkStatus::Unsupported(results) => {
                debug!(bucket = %bucket, prefix = %prefix, "backend has no native walk, paging through listings");
                spawn_paginated_walk(
                    Arc::clone(&self.inner),
                    ctx,
                    bucket.to_string(),
                    prefix.to_string(),
                    results,
                );
                Ok(WalkStatus::Started)
            }
        }
    }

    fn new_ns_lock(&self, bucket: &str, objects: &[&str]) -> Option<NsLock> {
        Some(self.ns_mutex.new_ns_lock(bucket, objects))
    }

    fn is_encryption_supported(&self) -> bool {
        self.inner.is_encryption_supported()
    }

    fn is_compression_supported(&self) -> bool {
        self.inner.is_compression_supported()
    }

    async fn shutdown(&self) -> Result<()> {
        self.inner.shutdown().await
    }
}
