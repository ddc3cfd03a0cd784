//! # Ming Gateway
//!
//! S3-compatible gateway server in front of pluggable storage backends.
//!
//! This crate provides:
//! - **Bootstrap**: the ordered startup sequence from argument checks to the startup banner
//! - **S3 API**: bucket and object handlers served through the installed object layer
//! - **Subsystems**: bucket notification, IAM, disk cache and DNS federation
//! - **Operations**: health checks, Prometheus metrics and admin info
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                   HTTP Clients                      │
//! │           (mc, boto3, AWS SDK, curl, etc.)          │
//! └─────────────────────────┬───────────────────────────┘
//!                           │
//! ┌─────────────────────────▼───────────────────────────┐
//! │                    Ming Gateway                     │
//! ├─────────────────────────────────────────────────────┤
//! │  Request ID │ Access Log │ Metrics │ CORS           │
//! ├─────────────────────────────────────────────────────┤
//! │       S3 API Handlers │ Health │ Metrics │ Admin    │
//! ├─────────────────────────────────────────────────────┤
//! │  Notification │ IAM │ Disk Cache │ DNS Federation   │
//! ├─────────────────────────────────────────────────────┤
//! │          ming-core GatewayLayer (locks, walk)       │
//! ├─────────────────────────────────────────────────────┤
//! │           ming-backend (memory, nas, s3)            │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod banner;
pub mod bootstrap;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod limits;
pub mod metrics;
pub mod middleware;
pub mod net;
pub mod routes;
pub mod server;
pub mod signals;
pub mod sse;
pub mod state;
pub mod subsys;
pub mod tls;
pub mod xml;

pub use crate::bootstrap::{Bootstrap, RunningGateway, Stage};
pub use crate::config::{GatewayConfig, GatewayEnv, ServerConfig};
pub use crate::error::{ApiError, BootstrapError, S3ErrorCode};
pub use crate::state::{AppState, ServerGlobals};

use ming_core::Gateway;
use std::sync::Arc;

/// Start the gateway and serve until a shutdown signal arrives
pub async fn run(config: GatewayConfig, gateway: Arc<dyn Gateway>, env: GatewayEnv) -> Result<(), BootstrapError> {
    let running = Bootstrap::new(config, gateway).with_env(env).start().await?;
    running.run(signals::shutdown_signal()).await
}
