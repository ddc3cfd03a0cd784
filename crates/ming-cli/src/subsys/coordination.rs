//! Shared coordination store

use async_trait::async_trait;
use ming_core::{Credentials, ObjectLayer};
use std::sync::Arc;

/// A configuration store shared between gateway instances.
///
/// When one is configured, identities kept in the backend are migrated to
/// their encrypted form before IAM reads them.
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    fn name(&self) -> &str;

    /// Re-encrypt stored identities with `creds`
    async fn migrate_encrypted_iam(&self, layer: Arc<dyn ObjectLayer>, creds: &Credentials) -> anyhow::Result<()>;
}
