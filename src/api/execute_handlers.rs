use axum::{
    extract::{Path, State},
    http::HeaderMap,
    response::Json,
};
use serde_json::Value;
use uuid::Uuid;

use crate::api::auth::{caller_meta, ApiKey};
use crate::api::routes::AppState;
use crate::error::GatewayError;
use crate::logic::{dispatch, CallerAuth};
use crate::store::traits::Store;

/// The public invocation surface: `POST /endpoints/{instance_id}/{service}/{method}`.
/// Everything past resolution, including failures, lands in the execution log.
pub async fn execute_endpoint<S: Store>(
    State(state): State<AppState<S>>,
    Path((instance_id, service_name, method_name)): Path<(Uuid, String, String)>,
    ApiKey(api_key): ApiKey,
    headers: HeaderMap,
    body: Option<Json<Value>>,
) -> Result<dispatch::DispatchOutcome, GatewayError> {
    let body = body.map(|Json(v)| v).unwrap_or(Value::Null);
    dispatch::execute(
        state.store.as_ref(),
        &state.pool,
        instance_id,
        &service_name,
        &method_name,
        CallerAuth::ApiKey(api_key),
        caller_meta(&headers),
        body,
    )
    .await
}
