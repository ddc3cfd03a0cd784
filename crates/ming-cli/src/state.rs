//! Application state

use crate::config::HelpEntry;
use crate::error::ApiError;
use crate::metrics::Metrics;
use crate::server::ServerHandle;
use crate::subsys::cache::DiskCache;
use crate::subsys::notification::{BucketEvent, NotificationSys};
use chrono::{DateTime, Utc};
use ming_core::{BackendDescriptor, ObjectLayer};
use parking_lot::Mutex;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;

/// Progress of identity loading
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IamState {
    /// IAM is not configured
    #[default]
    Disabled,
    /// Background load in progress
    Initializing,
    Ready,
    /// Background load failed; the gateway keeps serving
    Failed,
}

impl IamState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Initializing => "initializing",
            Self::Ready => "ready",
            Self::Failed => "failed",
        }
    }
}

#[derive(Default)]
struct Globals {
    object_layer: Option<Arc<dyn ObjectLayer>>,
    http_server: Option<ServerHandle>,
    cache_layer: Option<Arc<DiskCache>>,
    notification: Option<Arc<dyn NotificationSys>>,
    iam_state: IamState,
}

/// Handles shared by the bootstrap sequence and every request handler.
///
/// Values are only ever replaced whole, under one mutex.
#[derive(Clone, Default)]
pub struct ServerGlobals {
    inner: Arc<Mutex<Globals>>,
}

impl ServerGlobals {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn object_layer(&self) -> Option<Arc<dyn ObjectLayer>> {
        self.inner.lock().object_layer.clone()
    }

    pub fn set_object_layer(&self, layer: Arc<dyn ObjectLayer>) {
        self.inner.lock().object_layer = Some(layer);
    }

    pub fn http_server(&self) -> Option<ServerHandle> {
        self.inner.lock().http_server.clone()
    }

    pub fn set_http_server(&self, server: ServerHandle) {
        self.inner.lock().http_server = Some(server);
    }

    pub fn cache_layer(&self) -> Option<Arc<DiskCache>> {
        self.inner.lock().cache_layer.clone()
    }

    pub fn set_cache_layer(&self, cache: Arc<DiskCache>) {
        self.inner.lock().cache_layer = Some(cache);
    }

    pub fn notification(&self) -> Option<Arc<dyn NotificationSys>> {
        self.inner.lock().notification.clone()
    }

    pub fn set_notification(&self, notification: Arc<dyn NotificationSys>) {
        self.inner.lock().notification = Some(notification);
    }

    pub fn iam_state(&self) -> IamState {
        self.inner.lock().iam_state
    }

    pub fn set_iam_state(&self, state: IamState) {
        self.inner.lock().iam_state = state;
    }
}

impl fmt::Debug for ServerGlobals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let globals = self.inner.lock();
        f.debug_struct("ServerGlobals")
            .field("object_layer", &globals.object_layer.is_some())
            .field("http_server", &globals.http_server)
            .field("cache_layer", &globals.cache_layer.is_some())
            .field("notification", &globals.notification.is_some())
            .field("iam_state", &globals.iam_state)
            .finish()
    }
}

/// Static facts about this gateway process
#[derive(Clone, Debug, Serialize)]
pub struct ServerInfo {
    pub deployment_id: String,
    pub backend: String,
    pub production: bool,
    pub region: String,
    pub started_at: DateTime<Utc>,
}

impl ServerInfo {
    pub fn new(deployment_id: impl Into<String>, backend: &BackendDescriptor, region: impl Into<String>) -> Self {
        Self {
            deployment_id: deployment_id.into(),
            backend: backend.name.clone(),
            production: backend.production,
            region: region.into(),
            started_at: Utc::now(),
        }
    }
}

/// Application state shared across handlers
pub struct AppState {
    pub globals: ServerGlobals,
    pub info: ServerInfo,
    /// Configuration keys registered at startup
    pub help: Vec<HelpEntry>,
    pub metrics: Metrics,
}

impl AppState {
    pub fn new(globals: ServerGlobals, info: ServerInfo, help: Vec<HelpEntry>) -> prometheus::Result<Self> {
        Ok(Self {
            globals,
            info,
            help,
            metrics: Metrics::new()?,
        })
    }

    /// The installed object layer, or `ServerNotInitialized`
    pub fn object_layer(&self) -> Result<Arc<dyn ObjectLayer>, ApiError> {
        self.globals.object_layer().ok_or_else(ApiError::not_initialized)
    }

    /// Emit a bucket event when notification is running
    pub fn notify(&self, event: BucketEvent) {
        if let Some(notification) = self.globals.notification() {
            notification.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ming_backend::MemoryLayer;

    #[test]
    fn test_globals_start_empty() {
        let globals = ServerGlobals::new();
        assert!(globals.object_layer().is_none());
        assert!(globals.http_server().is_none());
        assert!(globals.cache_layer().is_none());
        assert_eq!(globals.iam_state(), IamState::Disabled);
    }

    #[test]
    fn test_installed_layer_visible_through_clones() {
        let globals = ServerGlobals::new();
        let other = globals.clone();
        globals.set_object_layer(Arc::new(MemoryLayer::new()));
        assert!(other.object_layer().is_some());
        assert!(format!("{other:?}").contains("object_layer: true"));
    }

    #[test]
    fn test_state_reports_not_initialized() {
        let info = ServerInfo::new(
            "dep",
            &BackendDescriptor {
                name: "memory".into(),
                production: false,
            },
            "us-east-1",
        );
        let state = AppState::new(ServerGlobals::new(), info, Vec::new()).unwrap();
        let err = state.object_layer().err().unwrap();
        assert_eq!(err.error_code(), crate::S3ErrorCode::ServerNotInitialized);
    }
}
