use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::Json,
};
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::api::auth::caller_meta;
use crate::api::routes::AppState;
use crate::error::GatewayError;
use crate::logic::{introspect, synthesize};
use crate::model::{
    generate_api_key, now, ConnectionEvent, ConnectionEventType, Instance, InstanceFilter,
    InstancePublic, InstanceUpdate, NewInstance,
};
use crate::store::traits::Store;

#[derive(Debug, Serialize)]
pub struct ListResponse<T> {
    pub items: Vec<T>,
    pub total: usize,
}

pub async fn list_instances<S: Store>(
    State(state): State<AppState<S>>,
    Query(filter): Query<InstanceFilter>,
) -> Result<Json<ListResponse<InstancePublic>>, GatewayError> {
    let instances = state
        .store
        .list_instances(Some(filter))
        .await
        .map_err(GatewayError::internal)?;
    let items: Vec<InstancePublic> = instances.iter().map(|i| i.to_public(false)).collect();
    let total = items.len();
    Ok(Json(ListResponse { items, total }))
}

pub async fn create_instance<S: Store>(
    State(state): State<AppState<S>>,
    Json(new): Json<NewInstance>,
) -> Result<(StatusCode, Json<Value>), GatewayError> {
    if state
        .store
        .find_instance_by_name(&new.name)
        .await
        .map_err(GatewayError::internal)?
        .is_some()
    {
        return Err(GatewayError::Conflict(format!(
            "instance already exists: {}",
            new.name
        )));
    }

    let instance = new.into_instance(&state.vault)?;
    state
        .store
        .upsert_instance(instance.clone())
        .await
        .map_err(GatewayError::internal)?;

    // The only time the full key appears without an explicit key operation.
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "instance": instance.to_public(true),
            "message": "Store the API key now; subsequent reads return it masked.",
        })),
    ))
}

pub async fn get_instance<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> Result<Json<InstancePublic>, GatewayError> {
    let instance = load_instance(&state, id).await?;
    Ok(Json(instance.to_public(false)))
}

pub async fn update_instance<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
    Json(update): Json<InstanceUpdate>,
) -> Result<Json<InstancePublic>, GatewayError> {
    let mut instance = load_instance(&state, id).await?;
    update.apply(&mut instance, &state.vault)?;
    state
        .store
        .upsert_instance(instance.clone())
        .await
        .map_err(GatewayError::internal)?;
    // Connection settings may have changed; drop any cached session.
    state.pool.invalidate(id).await;
    Ok(Json(instance.to_public(false)))
}

pub async fn delete_instance<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, GatewayError> {
    load_instance(&state, id).await?;
    state.pool.invalidate(id).await;
    let deleted = state
        .store
        .delete_instance(&id)
        .await
        .map_err(GatewayError::internal)?;
    Ok(Json(json!({"deleted": deleted})))
}

pub async fn activate_instance<S: Store>(
    state: State<AppState<S>>,
    path: Path<Uuid>,
) -> Result<Json<InstancePublic>, GatewayError> {
    set_active(state, path, true).await
}

pub async fn deactivate_instance<S: Store>(
    state: State<AppState<S>>,
    path: Path<Uuid>,
) -> Result<Json<InstancePublic>, GatewayError> {
    set_active(state, path, false).await
}

async fn set_active<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
    active: bool,
) -> Result<Json<InstancePublic>, GatewayError> {
    let mut instance = load_instance(&state, id).await?;
    instance.active = active;
    instance.updated_at = now();
    state
        .store
        .upsert_instance(instance.clone())
        .await
        .map_err(GatewayError::internal)?;
    if !active {
        state.pool.invalidate(id).await;
    }
    Ok(Json(instance.to_public(false)))
}

pub async fn get_api_key<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, GatewayError> {
    let instance = load_instance(&state, id).await?;
    Ok(Json(json!({"api_key": instance.api_key})))
}

/// Issues a fresh key; the previous one stops working immediately.
pub async fn regenerate_api_key<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Value>, GatewayError> {
    let mut instance = load_instance(&state, id).await?;
    instance.api_key = generate_api_key();
    instance.updated_at = now();
    state
        .store
        .upsert_instance(instance.clone())
        .await
        .map_err(GatewayError::internal)?;
    Ok(Json(json!({"api_key": instance.api_key})))
}

pub async fn connect_instance<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Value>, GatewayError> {
    let instance = load_instance(&state, id).await?;
    let result = state.pool.acquire(id).await;
    record_event(&state, id, ConnectionEventType::Connect, &result, &headers).await;
    let handle = result?;
    Ok(Json(json!({
        "connected": true,
        "generation": handle.generation(),
        "connection_info": {
            "url": instance.base_url,
            "tenant": instance.tenant,
            "branch": instance.branch,
        },
    })))
}

pub async fn disconnect_instance<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Value>, GatewayError> {
    load_instance(&state, id).await?;
    let was_connected = state.pool.invalidate(id).await;
    record_event(&state, id, ConnectionEventType::Disconnect, &Ok(()), &headers).await;
    Ok(Json(json!({"disconnected": true, "was_connected": was_connected})))
}

pub async fn rebuild_instance<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Value>, GatewayError> {
    load_instance(&state, id).await?;
    let result = state.pool.rebuild(id).await;
    record_event(&state, id, ConnectionEventType::Rebuild, &result, &headers).await;
    let report = result?;
    Ok(Json(serde_json::to_value(report).map_err(GatewayError::internal)?))
}

/// Round-trip health probe: log in (or reuse the cached session) and list
/// services.
pub async fn test_instance<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
    headers: HeaderMap,
) -> Result<Json<Value>, GatewayError> {
    load_instance(&state, id).await?;
    let result = probe(&state, id).await;
    record_event(&state, id, ConnectionEventType::Test, &result, &headers).await;
    let service_count = result?;
    Ok(Json(json!({"success": true, "service_count": service_count})))
}

async fn probe<S: Store>(state: &AppState<S>, id: Uuid) -> Result<usize, GatewayError> {
    let handle = state.pool.acquire(id).await?;
    let services = handle.list_services().await?;
    Ok(services.len())
}

pub async fn list_connection_events<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
    Query(query): Query<EventQuery>,
) -> Result<Json<ListResponse<ConnectionEvent>>, GatewayError> {
    load_instance(&state, id).await?;
    let items = state
        .store
        .list_connection_events(&id, query.limit.unwrap_or(50))
        .await
        .map_err(GatewayError::internal)?;
    let total = items.len();
    Ok(Json(ListResponse { items, total }))
}

#[derive(Debug, serde::Deserialize)]
pub struct EventQuery {
    pub limit: Option<i64>,
}

pub async fn pool_status<S: Store>(
    State(state): State<AppState<S>>,
) -> Result<Json<Value>, GatewayError> {
    let status = state.pool.status().await;
    Ok(Json(serde_json::to_value(status).map_err(GatewayError::internal)?))
}

#[derive(Debug, serde::Deserialize)]
pub struct ServiceQuery {
    pub search: Option<String>,
}

pub async fn list_services<S: Store>(
    State(state): State<AppState<S>>,
    Path(id): Path<Uuid>,
    Query(query): Query<ServiceQuery>,
) -> Result<Json<Value>, GatewayError> {
    let handle = state.pool.acquire(id).await?;
    let services = introspect::list_services(&handle, query.search.as_deref()).await?;
    Ok(Json(json!({"services": services})))
}

pub async fn get_service<S: Store>(
    State(state): State<AppState<S>>,
    Path((id, service)): Path<(Uuid, String)>,
) -> Result<Json<Value>, GatewayError> {
    let handle = state.pool.acquire(id).await?;
    let detail = introspect::describe_service(&handle, &service).await?;
    Ok(Json(serde_json::to_value(detail).map_err(GatewayError::internal)?))
}

/// Preview of the contract a deployment would materialize, without
/// deploying anything.
pub async fn preview_method_schema<S: Store>(
    State(state): State<AppState<S>>,
    Path((id, service, method)): Path<(Uuid, String, String)>,
) -> Result<Json<Value>, GatewayError> {
    let handle = state.pool.acquire(id).await?;
    let signature = introspect::describe_method(&handle, &service, &method).await?;
    let contract = synthesize::synthesize(&signature);
    Ok(Json(serde_json::to_value(contract).map_err(GatewayError::internal)?))
}

async fn load_instance<S: Store>(
    state: &AppState<S>,
    id: Uuid,
) -> Result<Instance, GatewayError> {
    state
        .store
        .get_instance(&id)
        .await
        .map_err(GatewayError::internal)?
        .ok_or(GatewayError::InstanceNotFound(id))
}

async fn record_event<S: Store, T>(
    state: &AppState<S>,
    instance_id: Uuid,
    event_type: ConnectionEventType,
    result: &Result<T, GatewayError>,
    headers: &HeaderMap,
) {
    let meta = caller_meta(headers);
    let mut event = ConnectionEvent::new(
        instance_id,
        event_type,
        result.is_ok(),
        result.as_ref().err().map(|e| e.to_string()),
    );
    event.source_addr = meta.source_addr;
    event.user_agent = meta.user_agent;
    if let Err(err) = state.store.record_connection_event(event).await {
        log::warn!("failed to record {} event for {instance_id}: {err:#}", event_type.as_str());
    }
}
