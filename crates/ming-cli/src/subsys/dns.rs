//! Bucket DNS federation

use async_trait::async_trait;
use ming_core::{BucketInfo, ObjectLayer};
use std::sync::Arc;

/// Publishes bucket records so federated gateways can route by bucket name
#[async_trait]
pub trait DnsFederator: Send + Sync {
    /// Publish the buckets that exist at startup
    async fn sync_buckets(&self, buckets: &[BucketInfo], layer: Arc<dyn ObjectLayer>) -> anyhow::Result<()>;

    /// Stop background refreshing
    async fn shutdown(&self) {}
}
