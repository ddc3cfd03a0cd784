//! Operator admin endpoints

use crate::config::HelpEntry;
use crate::state::IamState;
use crate::subsys::cache::format_bytes;
use crate::AppState;
use axum::{extract::State, Json};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

/// Body of `GET /ming/admin/v3/info`
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdminInfo {
    pub deployment_id: String,
    pub backend: String,
    pub production: bool,
    pub region: String,
    pub started_at: DateTime<Utc>,
    pub object_layer_installed: bool,
    pub iam: IamState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheInfo>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheInfo {
    pub drives: usize,
    pub quota: u8,
    pub capacity: String,
    pub used: String,
    pub hits: u64,
    pub misses: u64,
}

/// GET /ming/admin/v3/info
pub async fn admin_info(State(state): State<Arc<AppState>>) -> Json<AdminInfo> {
    let info = &state.info;
    let cache = state.globals.cache_layer().map(|cache| CacheInfo {
        drives: cache.drives().len(),
        quota: cache.quota(),
        capacity: format_bytes(cache.capacity()),
        used: format_bytes(cache.used()),
        hits: cache.hits(),
        misses: cache.misses(),
    });

    Json(AdminInfo {
        deployment_id: info.deployment_id.clone(),
        backend: info.backend.clone(),
        production: info.production,
        region: info.region.clone(),
        started_at: info.started_at,
        object_layer_installed: state.globals.object_layer().is_some(),
        iam: state.globals.iam_state(),
        cache,
    })
}

/// GET /ming/admin/v3/config-help
pub async fn config_help(State(state): State<Arc<AppState>>) -> Json<Vec<HelpEntry>> {
    Json(state.help.clone())
}
