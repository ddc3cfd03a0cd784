//! HTTP route definitions

use crate::{handlers, middleware, AppState};
use axum::{
    extract::DefaultBodyLimit,
    middleware as axum_middleware,
    routing::{delete, get, head, put},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};

/// Largest request body accepted by the API
pub const MAX_BODY_SIZE: usize = 1024 * 1024 * 1024;

/// Create the main router
pub fn create_router(state: Arc<AppState>) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any)
        .expose_headers(Any);

    Router::new()
        // Operator endpoints
        .route("/ming/health/live", get(handlers::health_live))
        .route("/ming/health/ready", get(handlers::health_ready))
        .route("/ming/v2/metrics", get(handlers::prometheus_metrics))
        .route("/ming/admin/v3/info", get(handlers::admin_info))
        .route("/ming/admin/v3/config-help", get(handlers::config_help))
        // Service endpoints
        .route("/", get(handlers::list_buckets))
        // Bucket endpoints
        .route("/{bucket}", put(handlers::create_bucket))
        .route("/{bucket}", delete(handlers::delete_bucket))
        .route("/{bucket}", head(handlers::head_bucket))
        .route("/{bucket}", get(handlers::list_objects))
        // Object endpoints
        .route("/{bucket}/{*key}", put(handlers::put_object))
        .route("/{bucket}/{*key}", get(handlers::get_object))
        .route("/{bucket}/{*key}", head(handlers::head_object))
        .route("/{bucket}/{*key}", delete(handlers::delete_object))
        // Apply middleware
        .layer(axum_middleware::from_fn(middleware::request_id_middleware))
        .layer(axum_middleware::from_fn(middleware::logging_middleware))
        .layer(axum_middleware::from_fn_with_state(
            Arc::clone(&state),
            middleware::metrics_middleware,
        ))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .with_state(state)
}
