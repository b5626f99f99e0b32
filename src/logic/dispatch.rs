use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};
use subtle::ConstantTimeEq;
use tokio::time::Instant;
use uuid::Uuid;

use crate::error::{ErrorResponse, GatewayError};
use crate::logic::validate::validate_request;
use crate::model::common::now;
use crate::model::{Endpoint, ExecutionLog, Instance, UserContext};
use crate::remote::pool::ClientPool;
use crate::store::traits::Store;

/// Payload snapshots above this size are replaced with a marker so a single
/// large response cannot bloat the log table.
const MAX_PAYLOAD_BYTES: usize = 32 * 1024;

/// How the caller authenticated. External invocations carry the instance
/// API key; operator test runs ride on the admin session identity.
#[derive(Debug, Clone)]
pub enum CallerAuth {
    ApiKey(Option<String>),
    Session(UserContext),
}

/// Request provenance recorded alongside every execution.
#[derive(Debug, Clone, Default)]
pub struct CallerMeta {
    pub source_addr: Option<String>,
    pub user_agent: Option<String>,
}

/// Final result of a dispatch. Always carries a serialized body, success or
/// not, so the handler layer is a passthrough.
#[derive(Debug, Clone)]
pub struct DispatchOutcome {
    pub status: StatusCode,
    pub body: Value,
}

impl DispatchOutcome {
    fn success(data: Value, duration_ms: i64, endpoint_id: Uuid) -> Self {
        Self {
            status: StatusCode::OK,
            body: json!({
                "success": true,
                "data": data,
                "meta": {
                    "duration_ms": duration_ms,
                    "endpoint_id": endpoint_id,
                    "executed_at": now(),
                },
            }),
        }
    }

    fn failure(err: &GatewayError) -> Self {
        let status = err.status_code();
        Self {
            status,
            body: serde_json::to_value(ErrorResponse::from(err))
                .unwrap_or_else(|_| json!({"error": err.to_string()})),
        }
    }
}

impl IntoResponse for DispatchOutcome {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// Entry point for the public invocation path
/// `POST /endpoints/{instance_id}/{service}/{method}`.
///
/// Resolution failures surface as plain errors; once the endpoint row is
/// known, every attempt lands a log row regardless of outcome.
pub async fn execute<S: Store>(
    store: &S,
    pool: &ClientPool<S>,
    instance_id: Uuid,
    service: &str,
    method: &str,
    auth: CallerAuth,
    meta: CallerMeta,
    body: Value,
) -> Result<DispatchOutcome, GatewayError> {
    let endpoint = store
        .find_endpoint(&instance_id, service, method)
        .await
        .map_err(GatewayError::internal)?
        .ok_or_else(|| GatewayError::EndpointNotFound(format!("{service}.{method}")))?;

    Ok(dispatch(store, pool, endpoint, auth, meta, body).await)
}

/// Entry point for the operator test path, addressed by endpoint id.
pub async fn execute_by_id<S: Store>(
    store: &S,
    pool: &ClientPool<S>,
    endpoint_id: Uuid,
    auth: CallerAuth,
    meta: CallerMeta,
    body: Value,
) -> Result<DispatchOutcome, GatewayError> {
    let endpoint = store
        .get_endpoint(&endpoint_id)
        .await
        .map_err(GatewayError::internal)?
        .ok_or_else(|| GatewayError::EndpointNotFound(endpoint_id.to_string()))?;

    Ok(dispatch(store, pool, endpoint, auth, meta, body).await)
}

async fn dispatch<S: Store>(
    store: &S,
    pool: &ClientPool<S>,
    endpoint: Endpoint,
    auth: CallerAuth,
    meta: CallerMeta,
    body: Value,
) -> DispatchOutcome {
    let started = Instant::now();
    let result = run(store, pool, &endpoint, &auth, &body).await;
    let duration_ms = started.elapsed().as_millis() as i64;

    let (status, error_message, response_body) = match &result {
        Ok(data) => (StatusCode::OK, None, Some(data.clone())),
        Err(err) => (err.status_code(), Some(err.to_string()), None),
    };

    let log = ExecutionLog {
        id: crate::model::common::generate_id(),
        endpoint_id: endpoint.id,
        executed_at: now(),
        duration_ms,
        status_code: status.as_u16() as i32,
        error_message,
        request_body: Some(bounded_payload(&body)),
        response_body: response_body.as_ref().map(bounded_payload),
        source_addr: meta.source_addr,
        user_agent: meta.user_agent,
    };
    // Log writes never fail the call.
    if let Err(err) = store.record_execution(log).await {
        log::warn!("failed to record execution for endpoint {}: {err:#}", endpoint.id);
    }

    match result {
        Ok(data) => DispatchOutcome::success(data, duration_ms, endpoint.id),
        Err(err) => DispatchOutcome::failure(&err),
    }
}

async fn run<S: Store>(
    store: &S,
    pool: &ClientPool<S>,
    endpoint: &Endpoint,
    auth: &CallerAuth,
    body: &Value,
) -> Result<Value, GatewayError> {
    let instance = store
        .get_instance(&endpoint.instance_id)
        .await
        .map_err(GatewayError::internal)?
        .ok_or(GatewayError::InstanceNotFound(endpoint.instance_id))?;

    authorize(auth, &instance)?;

    if !instance.active {
        return Err(GatewayError::InstanceInactive(instance.id));
    }
    if !endpoint.active {
        return Err(GatewayError::EndpointInactive);
    }

    let args = validate_request(&endpoint.request_schema, body)?;

    let handle = pool.acquire(instance.id).await?;
    handle
        .invoke(&endpoint.service_name, &endpoint.method_name, &args)
        .await
}

fn authorize(auth: &CallerAuth, instance: &Instance) -> Result<(), GatewayError> {
    match auth {
        CallerAuth::Session(_) => Ok(()),
        CallerAuth::ApiKey(None) => {
            Err(GatewayError::Unauthorized("missing API key".to_string()))
        }
        CallerAuth::ApiKey(Some(key)) => {
            // Constant-time compare; length mismatch compares unequal.
            if bool::from(key.as_bytes().ct_eq(instance.api_key.as_bytes())) {
                Ok(())
            } else {
                Err(GatewayError::Unauthorized("invalid API key".to_string()))
            }
        }
    }
}

/// Snapshot a payload for the log row, replacing oversized bodies with a
/// size marker.
fn bounded_payload(value: &Value) -> Value {
    match serde_json::to_string(value) {
        Ok(s) if s.len() > MAX_PAYLOAD_BYTES => json!({
            "truncated": true,
            "bytes": s.len(),
        }),
        Ok(_) => value.clone(),
        Err(_) => json!({"truncated": true}),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logic::registry::{self, BatchDeployRequest};
    use crate::model::NewInstance;
    use crate::remote::stub::StubConnector;
    use crate::store::memory::MemoryStore;
    use crate::store::traits::{EndpointStore, ExecutionStore, InstanceStore};
    use crate::vault::CredentialVault;
    use crate::model::LogFilter;
    use std::sync::Arc;

    struct Fixture {
        store: Arc<MemoryStore>,
        pool: ClientPool<MemoryStore>,
        instance: Instance,
    }

    async fn fixture() -> Fixture {
        let store = Arc::new(MemoryStore::new());
        let vault =
            Arc::new(CredentialVault::from_encoded_key(&CredentialVault::generate_key()).unwrap());
        let new: NewInstance = serde_json::from_value(json!({
            "name": "acme",
            "base_url": "https://erp.example.com",
            "tenant": "Acme",
            "username": "svc",
            "password": "secret",
        }))
        .unwrap();
        let instance = new.into_instance(&vault).unwrap();
        store.upsert_instance(instance.clone()).await.unwrap();

        let pool = ClientPool::new(store.clone(), vault, Arc::new(StubConnector::new()));
        let handle = pool.acquire(instance.id).await.unwrap();
        registry::deploy_batch(
            store.as_ref(),
            &handle,
            instance.id,
            BatchDeployRequest {
                service_name: "SalesOrder".to_string(),
                methods: vec!["get".to_string()],
                log_retention_hours: 168,
            },
        )
        .await
        .unwrap();

        Fixture { store, pool, instance }
    }

    fn api_key(fix: &Fixture) -> CallerAuth {
        CallerAuth::ApiKey(Some(fix.instance.api_key.clone()))
    }

    async fn logs(fix: &Fixture) -> Vec<ExecutionLog> {
        let endpoint = fix
            .store
            .find_endpoint(&fix.instance.id, "SalesOrder", "get")
            .await
            .unwrap()
            .unwrap();
        fix.store
            .list_logs_for_endpoint(&endpoint.id, LogFilter::default())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn successful_call_wraps_data_and_logs_once() {
        let fix = fixture().await;
        let outcome = execute(
            fix.store.as_ref(),
            &fix.pool,
            fix.instance.id,
            "SalesOrder",
            "get",
            api_key(&fix),
            CallerMeta::default(),
            json!({"id": "SO-1"}),
        )
        .await
        .unwrap();

        assert_eq!(outcome.status, StatusCode::OK);
        assert_eq!(outcome.body["success"], true);
        assert_eq!(outcome.body["data"]["args"]["id"], "SO-1");
        assert!(outcome.body["meta"]["duration_ms"].is_i64());

        let logs = logs(&fix).await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status_code, 200);
    }

    #[tokio::test]
    async fn missing_required_field_is_400_and_logged() {
        let fix = fixture().await;
        let outcome = execute(
            fix.store.as_ref(),
            &fix.pool,
            fix.instance.id,
            "SalesOrder",
            "get",
            api_key(&fix),
            CallerMeta::default(),
            json!({}),
        )
        .await
        .unwrap();

        assert_eq!(outcome.status, StatusCode::BAD_REQUEST);
        assert_eq!(outcome.body["fields"], json!(["id"]));

        let logs = logs(&fix).await;
        assert_eq!(logs.len(), 1);
        assert_eq!(logs[0].status_code, 400);
    }

    #[tokio::test]
    async fn wrong_api_key_is_401() {
        let fix = fixture().await;
        let outcome = execute(
            fix.store.as_ref(),
            &fix.pool,
            fix.instance.id,
            "SalesOrder",
            "get",
            CallerAuth::ApiKey(Some("not-the-key".to_string())),
            CallerMeta::default(),
            json!({"id": "SO-1"}),
        )
        .await
        .unwrap();
        assert_eq!(outcome.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn missing_api_key_is_401() {
        let fix = fixture().await;
        let outcome = execute(
            fix.store.as_ref(),
            &fix.pool,
            fix.instance.id,
            "SalesOrder",
            "get",
            CallerAuth::ApiKey(None),
            CallerMeta::default(),
            json!({"id": "SO-1"}),
        )
        .await
        .unwrap();
        assert_eq!(outcome.status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn inactive_endpoint_is_403() {
        let fix = fixture().await;
        let mut endpoint = fix
            .store
            .find_endpoint(&fix.instance.id, "SalesOrder", "get")
            .await
            .unwrap()
            .unwrap();
        endpoint.active = false;
        fix.store.upsert_endpoint(endpoint).await.unwrap();

        let outcome = execute(
            fix.store.as_ref(),
            &fix.pool,
            fix.instance.id,
            "SalesOrder",
            "get",
            api_key(&fix),
            CallerMeta::default(),
            json!({"id": "SO-1"}),
        )
        .await
        .unwrap();
        assert_eq!(outcome.status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn unknown_endpoint_is_not_logged() {
        let fix = fixture().await;
        let err = execute(
            fix.store.as_ref(),
            &fix.pool,
            fix.instance.id,
            "SalesOrder",
            "missing",
            api_key(&fix),
            CallerMeta::default(),
            json!({}),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, GatewayError::EndpointNotFound(_)));
    }

    #[tokio::test]
    async fn session_auth_test_path_skips_api_key() {
        let fix = fixture().await;
        let endpoint = fix
            .store
            .find_endpoint(&fix.instance.id, "SalesOrder", "get")
            .await
            .unwrap()
            .unwrap();
        let outcome = execute_by_id(
            fix.store.as_ref(),
            &fix.pool,
            endpoint.id,
            CallerAuth::Session(UserContext::default_user()),
            CallerMeta::default(),
            json!({"id": "SO-9"}),
        )
        .await
        .unwrap();
        assert_eq!(outcome.status, StatusCode::OK);
        assert_eq!(outcome.body["data"]["args"]["id"], "SO-9");
    }

    #[tokio::test]
    async fn oversized_response_logged_as_marker() {
        let value = json!({"blob": "x".repeat(MAX_PAYLOAD_BYTES + 1)});
        let marker = bounded_payload(&value);
        assert_eq!(marker["truncated"], true);
        assert!(marker["bytes"].as_u64().unwrap() as usize > MAX_PAYLOAD_BYTES);
    }
}
