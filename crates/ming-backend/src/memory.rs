//! In-memory object layer for development and testing

use crate::listing::paginate;
use crate::{check_bucket_name, check_object_name};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use md5::{Digest, Md5};
use ming_core::{
    BackendInfo, BucketInfo, Credentials, Gateway, ListObjectsInfo, ObjectInfo, ObjectLayer, ObjectLayerError,
    ObjectOptions, Result, WalkSink, WalkStatus,
};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument};

struct MemoryBucket {
    created: DateTime<Utc>,
    objects: BTreeMap<String, (ObjectInfo, Bytes)>,
}

/// An in-memory object layer
#[derive(Clone, Default)]
pub struct MemoryLayer {
    buckets: Arc<DashMap<String, MemoryBucket>>,
}

impl MemoryLayer {
    /// Create an empty layer
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of stored objects
    pub fn object_count(&self) -> usize {
        self.buckets.iter().map(|b| b.value().objects.len()).sum()
    }

    fn snapshot(&self, bucket: &str) -> Result<Vec<ObjectInfo>> {
        let entry = self
            .buckets
            .get(bucket)
            .ok_or_else(|| ObjectLayerError::BucketNotFound(bucket.to_string()))?;
        Ok(entry.objects.values().map(|(info, _)| info.clone()).collect())
    }
}

#[async_trait]
impl ObjectLayer for MemoryLayer {
    fn backend_info(&self) -> BackendInfo {
        BackendInfo {
            backend_type: "memory".to_string(),
            online: true,
        }
    }

    async fn make_bucket(&self, bucket: &str) -> Result<()> {
        check_bucket_name(bucket)?;
        match self.buckets.entry(bucket.to_string()) {
            Entry::Occupied(_) => Err(ObjectLayerError::BucketExists(bucket.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(MemoryBucket {
                    created: Utc::now(),
                    objects: BTreeMap::new(),
                });
                Ok(())
            }
        }
    }

    async fn get_bucket_info(&self, bucket: &str) -> Result<BucketInfo> {
        self.buckets
            .get(bucket)
            .map(|entry| BucketInfo::new(bucket, entry.created))
            .ok_or_else(|| ObjectLayerError::BucketNotFound(bucket.to_string()))
    }

    async fn list_buckets(&self) -> Result<Vec<BucketInfo>> {
        let mut buckets: Vec<BucketInfo> = self
            .buckets
            .iter()
            .filter(|entry| !entry.key().starts_with('.'))
            .map(|entry| BucketInfo::new(entry.key().clone(), entry.value().created))
            .collect();
        buckets.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(buckets)
    }

    async fn delete_bucket(&self, bucket: &str) -> Result<()> {
        let removed = self.buckets.remove_if(bucket, |_, b| b.objects.is_empty());
        if removed.is_some() {
            return Ok(());
        }
        if self.buckets.contains_key(bucket) {
            Err(ObjectLayerError::BucketNotEmpty(bucket.to_string()))
        } else {
            Err(ObjectLayerError::BucketNotFound(bucket.to_string()))
        }
    }

    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
        marker: &str,
        delimiter: &str,
        max_keys: Option<usize>,
    ) -> Result<ListObjectsInfo> {
        let objects = self.snapshot(bucket)?;
        Ok(paginate(objects, prefix, marker, delimiter, max_keys))
    }

    async fn get_object(&self, bucket: &str, key: &str, _opts: &ObjectOptions) -> Result<(ObjectInfo, Bytes)> {
        let entry = self
            .buckets
            .get(bucket)
            .ok_or_else(|| ObjectLayerError::BucketNotFound(bucket.to_string()))?;
        entry
            .objects
            .get(key)
            .cloned()
            .ok_or_else(|| ObjectLayerError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn get_object_info(&self, bucket: &str, key: &str, opts: &ObjectOptions) -> Result<ObjectInfo> {
        self.get_object(bucket, key, opts).await.map(|(info, _)| info)
    }

    #[instrument(skip(self, data, opts), fields(size = data.len()))]
    async fn put_object(&self, bucket: &str, key: &str, data: Bytes, opts: &ObjectOptions) -> Result<ObjectInfo> {
        check_object_name(key)?;
        let mut entry = self
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| ObjectLayerError::BucketNotFound(bucket.to_string()))?;

        let etag = hex::encode(Md5::digest(&data));
        let mut info = ObjectInfo::new(bucket, key, data.len() as u64, etag);
        info.content_type = opts.content_type.clone();
        info.user_defined = opts.user_defined.clone();

        entry.objects.insert(key.to_string(), (info.clone(), data));
        Ok(info)
    }

    async fn delete_object(&self, bucket: &str, key: &str, _opts: &ObjectOptions) -> Result<ObjectInfo> {
        let mut entry = self
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| ObjectLayerError::BucketNotFound(bucket.to_string()))?;
        entry
            .objects
            .remove(key)
            .map(|(info, _)| info)
            .ok_or_else(|| ObjectLayerError::ObjectNotFound {
                bucket: bucket.to_string(),
                key: key.to_string(),
            })
    }

    async fn walk(
        &self,
        ctx: CancellationToken,
        bucket: &str,
        prefix: &str,
        results: WalkSink,
        _opts: &ObjectOptions,
    ) -> Result<WalkStatus> {
        let objects: Vec<ObjectInfo> = self
            .snapshot(bucket)?
            .into_iter()
            .filter(|obj| obj.name.starts_with(prefix))
            .collect();
        debug!(bucket = %bucket, prefix = %prefix, count = objects.len(), "native walk");

        tokio::spawn(async move {
            for obj in objects {
                tokio::select! {
                    biased;
                    _ = ctx.cancelled() => return,
                    sent = results.send(obj) => {
                        if sent.is_err() {
                            return;
                        }
                    }
                }
            }
        });
        Ok(WalkStatus::Started)
    }
}

/// The `memory` backend
#[derive(Clone, Default)]
pub struct MemoryGateway {
    layer: MemoryLayer,
}

impl MemoryGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Share an existing layer, so callers can inspect what the gateway stored
    pub fn with_layer(layer: MemoryLayer) -> Self {
        Self { layer }
    }
}

#[async_trait]
impl Gateway for MemoryGateway {
    fn name(&self) -> &str {
        "memory"
    }

    fn production(&self) -> bool {
        false
    }

    async fn new_gateway_layer(&self, _creds: Credentials) -> Result<Arc<dyn ObjectLayer>> {
        Ok(Arc::new(self.layer.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    async fn layer_with(keys: &[&str]) -> MemoryLayer {
        let layer = MemoryLayer::new();
        layer.make_bucket("bucket").await.unwrap();
        for key in keys {
            layer
                .put_object("bucket", key, Bytes::from(key.to_string()), &ObjectOptions::default())
                .await
                .unwrap();
        }
        layer
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let layer = layer_with(&[]).await;
        let opts = ObjectOptions {
            content_type: Some("text/plain".into()),
            ..Default::default()
        };
        let info = layer
            .put_object("bucket", "hello.txt", Bytes::from_static(b"hello"), &opts)
            .await
            .unwrap();
        assert_eq!(info.etag, "5d41402abc4b2a76b9719d911017c592");

        let (got, data) = layer.get_object("bucket", "hello.txt", &opts).await.unwrap();
        assert_eq!(data.as_ref(), b"hello");
        assert_eq!(got.content_type.as_deref(), Some("text/plain"));

        layer.delete_object("bucket", "hello.txt", &opts).await.unwrap();
        let err = layer.get_object_info("bucket", "hello.txt", &opts).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_bucket_lifecycle() {
        let layer = layer_with(&["k"]).await;
        assert!(matches!(
            layer.make_bucket("bucket").await,
            Err(ObjectLayerError::BucketExists(_))
        ));
        assert!(matches!(
            layer.delete_bucket("bucket").await,
            Err(ObjectLayerError::BucketNotEmpty(_))
        ));
        layer.delete_object("bucket", "k", &ObjectOptions::default()).await.unwrap();
        layer.delete_bucket("bucket").await.unwrap();
        assert!(layer.list_buckets().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_system_bucket_hidden_from_listing() {
        let layer = layer_with(&[]).await;
        layer.make_bucket(ming_core::SYSTEM_META_BUCKET).await.unwrap();
        let names: Vec<String> = layer.list_buckets().await.unwrap().into_iter().map(|b| b.name).collect();
        assert_eq!(names, vec!["bucket"]);
    }

    #[tokio::test]
    async fn test_native_walk_streams_prefix() {
        let layer = layer_with(&["a/1", "a/2", "b/1"]).await;
        let (tx, mut rx) = mpsc::channel(8);
        let status = layer
            .walk(CancellationToken::new(), "bucket", "a/", tx, &ObjectOptions::default())
            .await
            .unwrap();
        assert!(matches!(status, WalkStatus::Started));

        let mut names = Vec::new();
        while let Some(obj) = rx.recv().await {
            names.push(obj.name);
        }
        assert_eq!(names, vec!["a/1", "a/2"]);
    }

    #[tokio::test]
    async fn test_walk_missing_bucket_is_error() {
        let layer = MemoryLayer::new();
        let (tx, _rx) = mpsc::channel(1);
        let err = layer
            .walk(CancellationToken::new(), "nope", "", tx, &ObjectOptions::default())
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }
}
