use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::auth::caller_meta;
use crate::api::instance_handlers::ListResponse;
use crate::api::routes::AppState;
use crate::error::GatewayError;
use crate::logic::{dispatch, registry, BatchDeployRequest, CallerAuth, DeployReport};
use crate::model::{
    Endpoint, EndpointFilter, EndpointUpdate, ExecutionLog, ExecutionStats, LogFilter, NewEndpoint,
    UserContext,
};
use crate::store::traits::Store;

pub async fn create_endpoint<S: Store>(
    State(state): State<AppState<S>>,
    Path(instance_id): Path<Uuid>,
    Json(new): Json<NewEndpoint>,
) -> Result<(StatusCode, Json<Endpoint>), GatewayError> {
    let handle = state.pool.acquire(instance_id).await?;
    let endpoint =
        registry::create_endpoint(state.store.as_ref(), &handle, instance_id, new).await?;
    Ok((StatusCode::CREATED, Json(endpoint)))
}

pub async fn deploy_endpoints<S: Store>(
    State(state): State<AppState<S>>,
    Path(instance_id): Path<Uuid>,
    Json(req): Json<BatchDeployRequest>,
) -> Result<Json<DeployReport>, GatewayError> {
    let handle = state.pool.acquire(instance_id).await?;
    let report = registry::deploy_batch(state.store.as_ref(), &handle, instance_id, req).await?;
    Ok(Json(report))
}

pub async fn list_endpoints<S: Store>(
    State(state): State<AppState<S>>,
    Path(instance_id): Path<Uuid>,
    Query(filter): Query<EndpointFilter>,
) -> Result<Json<ListResponse<Endpoint>>, GatewayError> {
    let items = state
        .store
        .list_endpoints_for_instance(&instance_id, Some(filter))
        .await
        .map_err(GatewayError::internal)?;
    let total = items.len();
    Ok(Json(ListResponse { items, total }))
}

pub async fn get_endpoint<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Endpoint>, GatewayError> {
    let endpoint = load_endpoint(&state, id).await?;
    Ok(Json(endpoint))
}

pub async fn update_endpoint<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
    Json(update): Json<EndpointUpdate>,
) -> Result<Json<Endpoint>, GatewayError> {
    // Schema regeneration is the only update that needs a live session.
    let handle = if update.regenerate_schema {
        let endpoint = load_endpoint(&state, id).await?;
        Some(state.pool.acquire(endpoint.instance_id).await?)
    } else {
        None
    };
    let endpoint =
        registry::update_endpoint(state.store.as_ref(), handle.as_ref(), id, update).await?;
    Ok(Json(endpoint))
}

pub async fn delete_endpoint<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, GatewayError> {
    load_endpoint(&state, id).await?;
    // Log rows go with the endpoint.
    let deleted = state
        .store
        .delete_endpoint(&id)
        .await
        .map_err(GatewayError::internal)?;
    Ok(Json(json!({"deleted": deleted})))
}

pub async fn activate_endpoint<S: Store>(
    state: State<AppState<S>>,
    path: Path<Uuid>,
) -> Result<Json<Endpoint>, GatewayError> {
    set_active(state, path, true).await
}

pub async fn deactivate_endpoint<S: Store>(
    state: State<AppState<S>>,
    path: Path<Uuid>,
) -> Result<Json<Endpoint>, GatewayError> {
    set_active(state, path, false).await
}

async fn set_active<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
    active: bool,
) -> Result<Json<Endpoint>, GatewayError> {
    registry::update_endpoint(
        state.store.as_ref(),
        None,
        id,
        EndpointUpdate {
            active: Some(active),
            ..Default::default()
        },
    )
    .await
    .map(Json)
}

/// Operator test run: same pipeline as the public path, authorized by the
/// admin session instead of the instance API key.
pub async fn test_endpoint<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
    user: UserContext,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> Result<dispatch::DispatchOutcome, GatewayError> {
    let body = body.map(|Json(v)| v).unwrap_or(Value::Null);
    dispatch::execute_by_id(
        state.store.as_ref(),
        &state.pool,
        id,
        CallerAuth::Session(user),
        caller_meta(&headers),
        body,
    )
    .await
}

pub async fn list_logs<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
    Query(filter): Query<LogFilter>,
) -> Result<Json<ListResponse<ExecutionLog>>, GatewayError> {
    load_endpoint(&state, id).await?;
    let items = state
        .store
        .list_logs_for_endpoint(&id, filter)
        .await
        .map_err(GatewayError::internal)?;
    let total = items.len();
    Ok(Json(ListResponse { items, total }))
}

pub async fn endpoint_stats<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> Result<Json<ExecutionStats>, GatewayError> {
    load_endpoint(&state, id).await?;
    let stats = state
        .store
        .execution_stats(&id)
        .await
        .map_err(GatewayError::internal)?;
    Ok(Json(stats))
}

async fn load_endpoint<S: Store>(
    state: &AppState<S>,
    id: Uuid,
) -> Result<Endpoint, GatewayError> {
    state
        .store
        .get_endpoint(&id)
        .await
        .map_err(GatewayError::internal)?
        .ok_or_else(|| GatewayError::EndpointNotFound(id.to_string()))
}
