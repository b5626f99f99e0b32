use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::GatewayError;
use crate::logic::{introspect, synthesize};
use crate::model::endpoint::default_log_retention_hours;
use crate::model::{Endpoint, EndpointUpdate, MethodSignature, NewEndpoint};
use crate::remote::pool::Handle;
use crate::store::traits::EndpointStore;

/// The public invocation path for a deployed endpoint. The triple is the
/// deployment identity, so the path is stable across redeploys.
pub fn derive_url_path(instance_id: Uuid, service: &str, method: &str) -> String {
    format!("/endpoints/{instance_id}/{service}/{method}")
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchDeployRequest {
    pub service_name: String,
    /// Empty means every introspected method on the service.
    #[serde(default)]
    pub methods: Vec<String>,
    #[serde(default = "default_log_retention_hours")]
    pub log_retention_hours: i64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SkippedMethod {
    pub method_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedMethod {
    pub method_name: String,
    pub error: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeploySummary {
    pub requested: usize,
    pub created: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeployReport {
    pub created: Vec<String>,
    pub skipped: Vec<SkippedMethod>,
    pub errors: Vec<FailedMethod>,
    pub summary: DeploySummary,
}

/// Deploys a batch of methods from one service. Per-method failures and
/// duplicates are reported, never fatal; the report always accounts for
/// every requested method.
pub async fn deploy_batch<S: EndpointStore>(
    store: &S,
    handle: &Handle,
    instance_id: Uuid,
    req: BatchDeployRequest,
) -> Result<DeployReport, GatewayError> {
    let detail = introspect::describe_service(handle, &req.service_name).await?;

    let signatures: Vec<MethodSignature> = if req.methods.is_empty() {
        detail.methods.clone()
    } else {
        let mut picked = Vec::with_capacity(req.methods.len());
        for name in &req.methods {
            match detail.method(name) {
                Some(sig) => picked.push(sig.clone()),
                None => picked.push(MethodSignature {
                    name: name.clone(),
                    parameters: Vec::new(),
                    return_type: None,
                    doc: None,
                    error: Some(format!(
                        "method not found on service {}",
                        req.service_name
                    )),
                }),
            }
        }
        picked
    };

    let mut created = Vec::new();
    let mut skipped = Vec::new();
    let mut errors = Vec::new();

    for signature in &signatures {
        if let Some(reason) = &signature.error {
            errors.push(FailedMethod {
                method_name: signature.name.clone(),
                error: reason.clone(),
            });
            continue;
        }

        match store
            .find_endpoint(&instance_id, &req.service_name, &signature.name)
            .await
        {
            Ok(Some(_)) => {
                skipped.push(SkippedMethod {
                    method_name: signature.name.clone(),
                    reason: "already deployed".to_string(),
                });
                continue;
            }
            Ok(None) => {}
            Err(err) => {
                errors.push(FailedMethod {
                    method_name: signature.name.clone(),
                    error: err.to_string(),
                });
                continue;
            }
        }

        let contract = synthesize::synthesize(signature);
        let endpoint = Endpoint::new(
            instance_id,
            req.service_name.clone(),
            signature.name.clone(),
            derive_url_path(instance_id, &req.service_name, &signature.name),
            contract.request_schema,
            contract.response_schema,
            req.log_retention_hours,
        );
        match store.upsert_endpoint(endpoint).await {
            Ok(()) => created.push(signature.name.clone()),
            Err(err) => errors.push(FailedMethod {
                method_name: signature.name.clone(),
                error: err.to_string(),
            }),
        }
    }

    let summary = DeploySummary {
        requested: signatures.len(),
        created: created.len(),
        skipped: skipped.len(),
        failed: errors.len(),
    };
    log::info!(
        "deployed {}/{} methods for {}.{} (skipped {}, failed {})",
        summary.created,
        summary.requested,
        instance_id,
        req.service_name,
        summary.skipped,
        summary.failed
    );

    Ok(DeployReport {
        created,
        skipped,
        errors,
        summary,
    })
}

/// Deploys a single method. Unlike the batch path a duplicate here is a
/// hard conflict.
pub async fn create_endpoint<S: EndpointStore>(
    store: &S,
    handle: &Handle,
    instance_id: Uuid,
    req: NewEndpoint,
) -> Result<Endpoint, GatewayError> {
    if store
        .find_endpoint(&instance_id, &req.service_name, &req.method_name)
        .await
        .map_err(GatewayError::internal)?
        .is_some()
    {
        return Err(GatewayError::Conflict(format!(
            "endpoint already deployed: {}.{}",
            req.service_name, req.method_name
        )));
    }

    let signature = introspect::describe_method(handle, &req.service_name, &req.method_name).await?;
    if let Some(reason) = &signature.error {
        return Err(GatewayError::Upstream(format!(
            "cannot deploy {}.{}: {reason}",
            req.service_name, req.method_name
        )));
    }

    let contract = synthesize::synthesize(&signature);
    let mut endpoint = Endpoint::new(
        instance_id,
        req.service_name.clone(),
        req.method_name.clone(),
        derive_url_path(instance_id, &req.service_name, &req.method_name),
        req.request_schema.unwrap_or(contract.request_schema),
        req.response_schema.unwrap_or(contract.response_schema),
        req.log_retention_hours,
    );
    if req.display_name.is_some() {
        endpoint.display_name = req.display_name;
    }
    endpoint.description = req.description;

    store
        .upsert_endpoint(endpoint.clone())
        .await
        .map_err(GatewayError::internal)?;
    Ok(endpoint)
}

/// Applies an update to a deployed endpoint. `regenerate_schema` requires a
/// live handle so the schemas can be re-synthesized from the current
/// upstream signature.
pub async fn update_endpoint<S: EndpointStore>(
    store: &S,
    handle: Option<&Handle>,
    endpoint_id: Uuid,
    update: EndpointUpdate,
) -> Result<Endpoint, GatewayError> {
    let mut endpoint = store
        .get_endpoint(&endpoint_id)
        .await
        .map_err(GatewayError::internal)?
        .ok_or_else(|| GatewayError::EndpointNotFound(endpoint_id.to_string()))?;

    if let Some(display_name) = update.display_name {
        endpoint.display_name = Some(display_name);
    }
    if let Some(description) = update.description {
        endpoint.description = Some(description);
    }
    if let Some(active) = update.active {
        endpoint.active = active;
    }
    if let Some(hours) = update.log_retention_hours {
        endpoint.log_retention_hours = hours;
    }

    if update.regenerate_schema {
        let handle = handle.ok_or_else(|| {
            GatewayError::Connection("no connection available for schema regeneration".to_string())
        })?;
        let signature =
            introspect::describe_method(handle, &endpoint.service_name, &endpoint.method_name)
                .await?;
        let contract = synthesize::synthesize(&signature);
        endpoint.request_schema = contract.request_schema;
        endpoint.response_schema = contract.response_schema;
    }

    endpoint.updated_at = crate::model::common::now();
    store
        .upsert_endpoint(endpoint.clone())
        .await
        .map_err(GatewayError::internal)?;
    Ok(endpoint)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewInstance;
    use crate::remote::pool::ClientPool;
    use crate::remote::stub::StubConnector;
    use crate::store::memory::MemoryStore;
    use crate::store::traits::InstanceStore;
    use crate::vault::CredentialVault;
    use serde_json::json;
    use std::sync::Arc;

    async fn deployed_handle() -> (Arc<MemoryStore>, Handle, Uuid) {
        let store = Arc::new(MemoryStore::new());
        let vault = Arc::new(CredentialVault::from_encoded_key(&CredentialVault::generate_key()).unwrap());
        let new: NewInstance = serde_json::from_value(json!({
            "name": "acme",
            "base_url": "https://erp.example.com",
            "tenant": "Acme",
            "username": "svc",
            "password": "secret",
        }))
        .unwrap();
        let instance = new.into_instance(&vault).unwrap();
        let instance_id = instance.id;
        store.upsert_instance(instance).await.unwrap();

        let pool = ClientPool::new(store.clone(), vault, Arc::new(StubConnector::new()));
        let handle = pool.acquire(instance_id).await.unwrap();
        (store, handle, instance_id)
    }

    #[tokio::test]
    async fn batch_deploy_accounts_for_every_method() {
        let (store, handle, instance_id) = deployed_handle().await;
        let report = deploy_batch(
            store.as_ref(),
            &handle,
            instance_id,
            BatchDeployRequest {
                service_name: "SalesOrder".to_string(),
                methods: Vec::new(),
                log_retention_hours: 168,
            },
        )
        .await
        .unwrap();

        // SalesOrder carries one introspection-failed method.
        assert_eq!(report.summary.requested, 4);
        assert_eq!(report.created.len(), 3);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].method_name, "legacy_export");
        assert_eq!(
            report.created.len() + report.skipped.len() + report.errors.len(),
            report.summary.requested
        );
    }

    #[tokio::test]
    async fn second_deploy_skips_existing() {
        let (store, handle, instance_id) = deployed_handle().await;
        let req = BatchDeployRequest {
            service_name: "SalesOrder".to_string(),
            methods: vec!["get".to_string()],
            log_retention_hours: 168,
        };
        deploy_batch(store.as_ref(), &handle, instance_id, req.clone())
            .await
            .unwrap();
        let report = deploy_batch(store.as_ref(), &handle, instance_id, req)
            .await
            .unwrap();
        assert_eq!(report.created.len(), 0);
        assert_eq!(report.skipped.len(), 1);
        assert_eq!(report.skipped[0].reason, "already deployed");
    }

    #[tokio::test]
    async fn unknown_method_reported_not_fatal() {
        let (store, handle, instance_id) = deployed_handle().await;
        let report = deploy_batch(
            store.as_ref(),
            &handle,
            instance_id,
            BatchDeployRequest {
                service_name: "SalesOrder".to_string(),
                methods: vec!["get".to_string(), "nope".to_string()],
                log_retention_hours: 168,
            },
        )
        .await
        .unwrap();
        assert_eq!(report.created, vec!["get".to_string()]);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].method_name, "nope");
    }

    #[tokio::test]
    async fn single_create_conflicts_on_duplicate() {
        let (store, handle, instance_id) = deployed_handle().await;
        let req: NewEndpoint = serde_json::from_value(json!({
            "service_name": "SalesOrder",
            "method_name": "get",
        }))
        .unwrap();
        let endpoint = create_endpoint(store.as_ref(), &handle, instance_id, req.clone())
            .await
            .unwrap();
        assert_eq!(
            endpoint.url_path,
            format!("/endpoints/{instance_id}/SalesOrder/get")
        );
        assert_eq!(endpoint.request_schema["required"], json!(["id"]));

        let err = create_endpoint(store.as_ref(), &handle, instance_id, req)
            .await
            .unwrap_err();
        assert!(matches!(err, GatewayError::Conflict(_)));
    }

    #[tokio::test]
    async fn update_regenerates_schema_on_request() {
        let (store, handle, instance_id) = deployed_handle().await;
        let req: NewEndpoint = serde_json::from_value(json!({
            "service_name": "SalesOrder",
            "method_name": "get",
            "request_schema": {"type": "object", "properties": {}},
        }))
        .unwrap();
        let endpoint = create_endpoint(store.as_ref(), &handle, instance_id, req)
            .await
            .unwrap();
        assert!(endpoint.request_schema["properties"]
            .as_object()
            .unwrap()
            .is_empty());

        let updated = update_endpoint(
            store.as_ref(),
            Some(&handle),
            endpoint.id,
            EndpointUpdate {
                regenerate_schema: true,
                ..Default::default()
            },
        )
        .await
        .unwrap();
        assert_eq!(updated.request_schema["required"], json!(["id"]));
    }
}
