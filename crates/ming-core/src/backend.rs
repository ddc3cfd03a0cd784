//! Pluggable backend contract

use crate::credentials::Credentials;
use crate::object_layer::ObjectLayer;
use crate::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Name and production readiness of a backend
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BackendDescriptor {
    pub name: String,
    pub production: bool,
}

/// A storage provider the gateway can front
#[async_trait]
pub trait Gateway: Send + Sync {
    /// Backend name, also the CLI sub-command
    fn name(&self) -> &str;

    /// Whether the backend is ready for production use
    fn production(&self) -> bool;

    /// Remote endpoint the backend talks to, if any
    fn endpoint(&self) -> Option<String> {
        None
    }

    /// Construct the backend object layer
    async fn new_gateway_layer(&self, creds: Credentials) -> Result<Arc<dyn ObjectLayer>>;

    fn descriptor(&self) -> BackendDescriptor {
        BackendDescriptor {
            name: self.name().to_string(),
            production: self.production(),
        }
    }
}
