use itertools::Itertools;

use crate::error::GatewayError;
use crate::model::{MethodSignature, ServiceDetail, ServiceSummary};
use crate::remote::pool::Handle;

/// Capability introspection over a pooled handle. Stateless and pure given
/// the handle; results are memoized in the handle's capability snapshot and
/// die with it (rebuild, disconnect, TTL expiry).

/// The full catalog of services with per-method signatures. Partial results
/// by construction: a service or method that fails to describe is reported
/// with an inline error, never by aborting the listing.
pub async fn service_catalog(handle: &Handle) -> Result<Vec<ServiceDetail>, GatewayError> {
    if let Some(snapshot) = handle.snapshot().await {
        return Ok(snapshot);
    }

    let names = handle.list_services().await?;
    let mut services = Vec::with_capacity(names.len());
    for name in names {
        match handle.describe_service(&name).await {
            Ok(detail) => services.push(detail),
            Err(e) => {
                log::warn!("describing service {name} failed: {e}");
                services.push(ServiceDetail {
                    name,
                    methods: Vec::new(),
                    error: Some(e.to_string()),
                });
            }
        }
    }

    handle.store_snapshot(services.clone()).await;
    Ok(services)
}

/// Service summaries, optionally filtered by a case-insensitive search term.
pub async fn list_services(
    handle: &Handle,
    search: Option<&str>,
) -> Result<Vec<ServiceSummary>, GatewayError> {
    let catalog = service_catalog(handle).await?;
    let needle = search.map(|s| s.to_lowercase());
    Ok(catalog
        .iter()
        .filter(|s| {
            needle
                .as_deref()
                .map_or(true, |n| s.name.to_lowercase().contains(n))
        })
        .map(ServiceDetail::summary)
        .sorted_by(|a, b| a.name.cmp(&b.name))
        .collect())
}

pub async fn describe_service(handle: &Handle, name: &str) -> Result<ServiceDetail, GatewayError> {
    let catalog = service_catalog(handle).await?;
    catalog
        .into_iter()
        .find(|s| s.name == name)
        .ok_or_else(|| GatewayError::EndpointNotFound(format!("service not found: {name}")))
}

/// A single method's signature, for schema preview and deployment.
pub async fn describe_method(
    handle: &Handle,
    service: &str,
    method: &str,
) -> Result<MethodSignature, GatewayError> {
    let detail = describe_service(handle, service).await?;
    detail
        .method(method)
        .cloned()
        .ok_or_else(|| GatewayError::EndpointNotFound(format!("method not found: {service}.{method}")))
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

    async fn stub_handle() -> (StubConnector, Handle) {
        let store = Arc::new(MemoryStore::new());
        let vault =
            Arc::new(CredentialVault::from_encoded_key(&CredentialVault::generate_key()).unwrap());
        let connector = StubConnector::new();
        let new_instance: NewInstance = serde_json::from_value(json!({
            "name": "test",
            "base_url": "https://erp.example.com",
            "tenant": "Company",
            "username": "admin",
            "password": "pw",
        }))
        .unwrap();
        let instance = new_instance.into_instance(&vault).unwrap();
        let id = instance.id;
        store.upsert_instance(instance).await.unwrap();
        let pool = ClientPool::new(store, vault, Arc::new(connector.clone()));
        let handle = pool.acquire(id).await.unwrap();
        (connector, handle)
    }

    #[tokio::test]
    async fn broken_service_reported_inline() {
        let (_, handle) = stub_handle().await;
        let catalog = service_catalog(&handle).await.unwrap();
        assert_eq!(catalog.len(), 3);
        let broken = catalog.iter().find(|s| s.name == "Broken").unwrap();
        assert!(broken.error.is_some());
        assert!(broken.methods.is_empty());
        // The healthy services still listed fully.
        let sales = catalog.iter().find(|s| s.name == "SalesOrder").unwrap();
        assert!(sales.error.is_none());
        assert!(!sales.methods.is_empty());
    }

    #[tokio::test]
    async fn catalog_memoized_in_snapshot() {
        let (connector, handle) = stub_handle().await;
        service_catalog(&handle).await.unwrap();
        let describes_after_first = connector.describe_count();
        service_catalog(&handle).await.unwrap();
        // Second pass served from the snapshot, no further remote traffic.
        assert_eq!(connector.describe_count(), describes_after_first);
        assert!(handle.snapshot().await.is_some());
    }

    #[tokio::test]
    async fn search_filters_summaries() {
        let (_, handle) = stub_handle().await;
        let all = list_services(&handle, None).await.unwrap();
        assert_eq!(all.len(), 3);
        let hits = list_services(&handle, Some("sales")).await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "SalesOrder");
        assert!(hits[0].methods.contains(&"get".to_string()));
    }

    #[tokio::test]
    async fn errored_method_carried_in_detail() {
        let (_, handle) = stub_handle().await;
        let detail = describe_service(&handle, "SalesOrder").await.unwrap();
        let legacy = detail.method("legacy_export").unwrap();
        assert!(legacy.error.is_some());
        // And the healthy siblings are intact.
        assert!(detail.method("get").unwrap().error.is_none());
    }

    #[tokio::test]
    async fn unknown_method_is_not_found() {
        let (_, handle) = stub_handle().await;
        let err = describe_method(&handle, "SalesOrder", "nope").await.unwrap_err();
        assert!(matches!(err, GatewayError::EndpointNotFound(_)));
    }
}
