//! # Ming Core
//!
//! Core object-layer contract for the ming S3 gateway.
//!
//! This crate provides:
//! - **Object Layer**: the storage capability trait every backend implements
//! - **Namespace Locking**: per-(bucket, object) shared/exclusive locks
//! - **Paginated Walk**: recursive enumeration for backends without a native walk
//! - **Gateway Layer**: the decorator adding locking and walk to any backend
//! - **Endpoint Resolution**: parsing of backend target strings
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────┐
//! │        Bootstrap / HTTP handlers        │
//! ├─────────────────────────────────────────┤
//! │             GatewayLayer                │
//! │   NsLockMap   │   Paginated Walk        │
//! ├─────────────────────────────────────────┤
//! │          ObjectLayer (backend)          │
//! └─────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod credentials;
pub mod endpoint;
pub mod error;
pub mod gateway;
pub mod nslock;
pub mod object_layer;
pub mod types;
pub mod walk;

pub use backend::{BackendDescriptor, Gateway};
pub use credentials::Credentials;
pub use endpoint::{parse_gateway_endpoint, EndpointError};
pub use error::{ObjectLayerError, Result};
pub use gateway::GatewayLayer;
pub use nslock::{LockMode, NsLock, NsLockGuard, NsLockMap};
pub use object_layer::{ObjectLayer, WalkSink, WalkStatus};
pub use types::{BackendInfo, BucketInfo, ListObjectsInfo, ObjectInfo, ObjectOptions};
pub use walk::spawn_paginated_walk;

/// Name of the bucket holding gateway-internal configuration objects.
pub const SYSTEM_META_BUCKET: &str = ".ming.sys";

/// Capacity of the bounded channel callers should use for walk sinks.
pub const WALK_SINK_CAPACITY: usize = 1000;
