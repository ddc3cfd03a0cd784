//! Bucket event notification

use async_trait::async_trait;
use ming_core::{BucketInfo, ObjectInfo, ObjectLayer};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info};

/// Backends whose buckets need explicit event wiring
pub const NOTIFICATION_BACKENDS: &[&str] = &["nas"];

/// Kinds of bucket events
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum EventName {
    #[serde(rename = "s3:ObjectCreated:Put")]
    ObjectCreatedPut,
    #[serde(rename = "s3:ObjectRemoved:Delete")]
    ObjectRemovedDelete,
}

impl EventName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ObjectCreatedPut => "s3:ObjectCreated:Put",
            Self::ObjectRemovedDelete => "s3:ObjectRemoved:Delete",
        }
    }
}

/// One object change
#[derive(Clone, Debug, Serialize)]
pub struct BucketEvent {
    pub name: EventName,
    pub bucket: String,
    pub key: String,
    pub size: u64,
    pub etag: String,
}

impl BucketEvent {
    pub fn new(name: EventName, info: &ObjectInfo) -> Self {
        Self {
            name,
            bucket: info.bucket.clone(),
            key: info.name.clone(),
            size: info.size,
            etag: info.etag.clone(),
        }
    }
}

/// Delivers bucket events to their targets
#[async_trait]
pub trait NotificationSys: Send + Sync {
    /// Register the existing buckets
    async fn init(&self, buckets: &[BucketInfo], layer: Arc<dyn ObjectLayer>) -> anyhow::Result<()>;

    fn add_bucket(&self, bucket: &str);

    fn remove_bucket(&self, bucket: &str);

    fn send(&self, event: BucketEvent);
}

/// Publishes events for registered buckets on the `ming::event` log target
#[derive(Default)]
pub struct EventNotifier {
    buckets: RwLock<BTreeSet<String>>,
    sent: AtomicU64,
}

impl EventNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_registered(&self, bucket: &str) -> bool {
        self.buckets.read().contains(bucket)
    }

    /// Number of events published so far
    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl NotificationSys for EventNotifier {
    async fn init(&self, buckets: &[BucketInfo], _layer: Arc<dyn ObjectLayer>) -> anyhow::Result<()> {
        let mut registered = self.buckets.write();
        registered.extend(buckets.iter().map(|b| b.name.clone()));
        info!(buckets = registered.len(), "bucket notification initialized");
        Ok(())
    }

    fn add_bucket(&self, bucket: &str) {
        self.buckets.write().insert(bucket.to_string());
    }

    fn remove_bucket(&self, bucket: &str) {
        self.buckets.write().remove(bucket);
    }

    fn send(&self, event: BucketEvent) {
        if !self.is_registered(&event.bucket) {
            debug!(bucket = %event.bucket, "event for unregistered bucket dropped");
            return;
        }
        self.sent.fetch_add(1, Ordering::Relaxed);
        info!(
            target: "ming::event",
            event = event.name.as_str(),
            bucket = %event.bucket,
            key = %event.key,
            size = event.size,
            etag = %event.etag,
            "bucket event"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ming_backend::MemoryLayer;

    #[tokio::test]
    async fn test_events_only_for_registered_buckets() {
        let notifier = EventNotifier::new();
        notifier
            .init(&[BucketInfo::new("photos", Utc::now())], Arc::new(MemoryLayer::new()))
            .await
            .unwrap();

        let info = ObjectInfo::new("photos", "a.jpg", 3, "etag");
        notifier.send(BucketEvent::new(EventName::ObjectCreatedPut, &info));
        let other = ObjectInfo::new("docs", "a.txt", 3, "etag");
        notifier.send(BucketEvent::new(EventName::ObjectCreatedPut, &other));
        assert_eq!(notifier.sent(), 1);

        notifier.add_bucket("docs");
        notifier.send(BucketEvent::new(EventName::ObjectRemovedDelete, &other));
        assert_eq!(notifier.sent(), 2);

        notifier.remove_bucket("photos");
        assert!(!notifier.is_registered("photos"));
    }

    #[test]
    fn test_event_names() {
        assert_eq!(EventName::ObjectCreatedPut.as_str(), "s3:ObjectCreated:Put");
        let json = serde_json::to_string(&EventName::ObjectRemovedDelete).unwrap();
        assert_eq!(json, "\"s3:ObjectRemoved:Delete\"");
    }
}
