use axum::{
    http::HeaderValue,
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

use crate::api::{endpoint_handlers, execute_handlers, instance_handlers};
use crate::remote::pool::ClientPool;
use crate::store::traits::Store;
use crate::vault::CredentialVault;

/// Shared application state: the persistence seam, the session pool, and
/// the credential vault.
pub struct AppState<S> {
    pub store: Arc<S>,
    pub pool: Arc<ClientPool<S>>,
    pub vault: Arc<CredentialVault>,
}

// Manual impl: `S` itself is behind an Arc and need not be Clone.
impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            pool: self.pool.clone(),
            vault: self.vault.clone(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
}

pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

pub fn create_router<S: Store + 'static>() -> Router<AppState<S>> {
    Router::new()
        // Health check
        .route("/health", get(health_check))
        .route("/pool/status", get(instance_handlers::pool_status::<S>))
        // Instance management
        .route(
            "/instances",
            get(instance_handlers::list_instances::<S>)
                .post(instance_handlers::create_instance::<S>),
        )
        .route(
            "/instances/:instance_id",
            get(instance_handlers::get_instance::<S>)
                .put(instance_handlers::update_instance::<S>)
                .delete(instance_handlers::delete_instance::<S>),
        )
        .route(
            "/instances/:instance_id/activate",
            post(instance_handlers::activate_instance::<S>),
        )
        .route(
            "/instances/:instance_id/deactivate",
            post(instance_handlers::deactivate_instance::<S>),
        )
        .route(
            "/instances/:instance_id/api-key",
            get(instance_handlers::get_api_key::<S>),
        )
        .route(
            "/instances/:instance_id/api-key/regenerate",
            post(instance_handlers::regenerate_api_key::<S>),
        )
        // Connection lifecycle
        .route(
            "/instances/:instance_id/connect",
            post(instance_handlers::connect_instance::<S>),
        )
        .route(
            "/instances/:instance_id/disconnect",
            post(instance_handlers::disconnect_instance::<S>),
        )
        .route(
            "/instances/:instance_id/rebuild",
            post(instance_handlers::rebuild_instance::<S>),
        )
        .route(
            "/instances/:instance_id/test",
            post(instance_handlers::test_instance::<S>),
        )
        .route(
            "/instances/:instance_id/events",
            get(instance_handlers::list_connection_events::<S>),
        )
        // Capability introspection
        .route(
            "/instances/:instance_id/services",
            get(instance_handlers::list_services::<S>),
        )
        .route(
            "/instances/:instance_id/services/:service_name",
            get(instance_handlers::get_service::<S>),
        )
        .route(
            "/instances/:instance_id/services/:service_name/methods/:method_name/schema",
            get(instance_handlers::preview_method_schema::<S>),
        )
        // Endpoint registry
        .route(
            "/instances/:instance_id/endpoints",
            get(endpoint_handlers::list_endpoints::<S>)
                .post(endpoint_handlers::create_endpoint::<S>),
        )
        .route(
            "/instances/:instance_id/endpoints/deploy",
            post(endpoint_handlers::deploy_endpoints::<S>),
        )
        .route(
            "/endpoints/:endpoint_id",
            get(endpoint_handlers::get_endpoint::<S>)
                .put(endpoint_handlers::update_endpoint::<S>)
                .delete(endpoint_handlers::delete_endpoint::<S>),
        )
        .route(
            "/endpoints/:endpoint_id/activate",
            post(endpoint_handlers::activate_endpoint::<S>),
        )
        .route(
            "/endpoints/:endpoint_id/deactivate",
            post(endpoint_handlers::deactivate_endpoint::<S>),
        )
        .route(
            "/endpoints/:endpoint_id/test",
            post(endpoint_handlers::test_endpoint::<S>),
        )
        .route(
            "/endpoints/:endpoint_id/logs",
            get(endpoint_handlers::list_logs::<S>),
        )
        .route(
            "/endpoints/:endpoint_id/stats",
            get(endpoint_handlers::endpoint_stats::<S>),
        )
        // Public invocation path
        .route(
            "/endpoints/:instance_id/:service_name/:method_name",
            post(execute_handlers::execute_endpoint::<S>),
        )
}

pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let layer = CorsLayer::new().allow_methods(Any).allow_headers(Any);
    if allowed_origins.iter().any(|o| o == "*") {
        layer.allow_origin(Any)
    } else {
        let origins: Vec<HeaderValue> = allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        layer.allow_origin(origins)
    }
}
