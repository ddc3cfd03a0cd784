//! Identity and access management

use anyhow::{bail, Context};
use async_trait::async_trait;
use dashmap::DashMap;
use ming_core::{ObjectLayer, ObjectLayerError, ObjectOptions, WalkStatus, SYSTEM_META_BUCKET, WALK_SINK_CAPACITY};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Prefix of identity documents inside the system bucket
pub const IAM_USERS_PREFIX: &str = "config/iam/users/";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UserStatus {
    #[default]
    Enabled,
    Disabled,
}

/// A stored identity document
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserIdentity {
    pub access_key: String,
    pub secret_key: String,
    #[serde(default)]
    pub status: UserStatus,
}

impl fmt::Debug for UserIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UserIdentity")
            .field("access_key", &self.access_key)
            .field("secret_key", &"[REDACTED]")
            .field("status", &self.status)
            .finish()
    }
}

/// Identity subsystem
#[async_trait]
pub trait IamSys: Send + Sync {
    /// Prepare backing storage; runs before the listener reports IAM as initializing
    async fn init_store(&self, layer: Arc<dyn ObjectLayer>) -> anyhow::Result<()>;

    /// Load identities; runs in the background
    async fn init(&self, layer: Arc<dyn ObjectLayer>) -> anyhow::Result<()>;

    /// Number of identities loaded so far
    fn user_count(&self) -> usize;
}

/// Identities stored as JSON documents in the system bucket
#[derive(Default)]
pub struct ObjectIamSys {
    users: DashMap<String, UserIdentity>,
}

impl ObjectIamSys {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn user(&self, access_key: &str) -> Option<UserIdentity> {
        self.users.get(access_key).map(|u| u.value().clone())
    }
}

#[async_trait]
impl IamSys for ObjectIamSys {
    async fn init_store(&self, layer: Arc<dyn ObjectLayer>) -> anyhow::Result<()> {
        match layer.make_bucket(SYSTEM_META_BUCKET).await {
            Ok(()) => {
                debug!(bucket = SYSTEM_META_BUCKET, "created system bucket");
                Ok(())
            }
            Err(ObjectLayerError::BucketExists(_)) => Ok(()),
            Err(e) => Err(e).context("unable to prepare the IAM store"),
        }
    }

    async fn init(&self, layer: Arc<dyn ObjectLayer>) -> anyhow::Result<()> {
        let opts = ObjectOptions::default();
        let (tx, mut rx) = mpsc::channel(WALK_SINK_CAPACITY);
        let status = layer
            .walk(CancellationToken::new(), SYSTEM_META_BUCKET, IAM_USERS_PREFIX, tx, &opts)
            .await
            .context("unable to list identities")?;
        if let WalkStatus::Unsupported(_) = status {
            bail!("object layer cannot walk {SYSTEM_META_BUCKET}/{IAM_USERS_PREFIX}");
        }

        while let Some(obj) = rx.recv().await {
            if !obj.name.ends_with(".json") {
                continue;
            }
            let (_, data) = layer
                .get_object(SYSTEM_META_BUCKET, &obj.name, &opts)
                .await
                .with_context(|| format!("unable to read identity {}", obj.name))?;
            let user: UserIdentity = serde_json::from_slice(&data)
                .with_context(|| format!("invalid identity document {}", obj.name))?;
            self.users.insert(user.access_key.clone(), user);
        }

        info!(users = self.users.len(), "IAM initialized");
        Ok(())
    }

    fn user_count(&self) -> usize {
        self.users.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use ming_backend::{MemoryLayer, NasLayer};
    use ming_core::GatewayLayer;
    use tempfile::TempDir;

    async fn put_user(layer: &dyn ObjectLayer, name: &str, body: &str) {
        layer
            .put_object(
                SYSTEM_META_BUCKET,
                &format!("{IAM_USERS_PREFIX}{name}"),
                Bytes::from(body.to_string()),
                &ObjectOptions::default(),
            )
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_loads_identities_from_memory_layer() {
        let layer: Arc<dyn ObjectLayer> = Arc::new(MemoryLayer::new());
        let iam = ObjectIamSys::new();
        iam.init_store(Arc::clone(&layer)).await.unwrap();
        // A second call finds the bucket in place
        iam.init_store(Arc::clone(&layer)).await.unwrap();

        put_user(layer.as_ref(), "alice.json", r#"{"accessKey":"alice","secretKey":"alicesecret"}"#).await;
        put_user(
            layer.as_ref(),
            "bob.json",
            r#"{"accessKey":"bob","secretKey":"bobsecret1","status":"disabled"}"#,
        )
        .await;
        put_user(layer.as_ref(), "README", "ignored").await;

        iam.init(layer).await.unwrap();
        assert_eq!(iam.user_count(), 2);
        assert_eq!(iam.user("bob").unwrap().status, UserStatus::Disabled);
        assert!(!format!("{:?}", iam.user("alice").unwrap()).contains("alicesecret"));
    }

    #[tokio::test]
    async fn test_loads_through_fallback_walk() {
        let dir = TempDir::new().unwrap();
        let layer = GatewayLayer::wrap(Arc::new(NasLayer::open(dir.path()).await.unwrap()));
        let iam = ObjectIamSys::new();
        iam.init_store(Arc::clone(&layer)).await.unwrap();
        put_user(layer.as_ref(), "carol.json", r#"{"accessKey":"carol","secretKey":"carolsecret"}"#).await;

        iam.init(layer).await.unwrap();
        assert!(iam.user("carol").is_some());
    }

    #[tokio::test]
    async fn test_bad_document_fails_init() {
        let layer: Arc<dyn ObjectLayer> = Arc::new(MemoryLayer::new());
        let iam = ObjectIamSys::new();
        iam.init_store(Arc::clone(&layer)).await.unwrap();
        put_user(layer.as_ref(), "broken.json", "{not json").await;

        let err = iam.init(layer).await.unwrap_err();
        assert!(err.to_string().contains("invalid identity document"));
    }

    #[tokio::test]
    async fn test_unsupported_walk_fails_init() {
        let dir = TempDir::new().unwrap();
        let layer: Arc<dyn ObjectLayer> = Arc::new(NasLayer::open(dir.path()).await.unwrap());
        let iam = ObjectIamSys::new();
        iam.init_store(Arc::clone(&layer)).await.unwrap();
        assert!(iam.init(layer).await.is_err());
    }
}
