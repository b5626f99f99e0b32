use std::collections::HashMap;

use anyhow::Result;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::model::{
    ConnectionEvent, Endpoint, EndpointFilter, ExecutionLog, ExecutionStats, Instance,
    InstanceFilter, LogFilter,
};
use crate::store::traits::{EndpointStore, ExecutionStore, InstanceStore, Store};

/// In-memory twin of the Postgres store. Backs unit and integration tests
/// and dev runs without a database; behavior (filters, cascades, stats)
/// mirrors the SQL implementation.
#[derive(Debug, Default)]
pub struct MemoryStore {
    instances: RwLock<HashMap<Uuid, Instance>>,
    endpoints: RwLock<HashMap<Uuid, Endpoint>>,
    logs: RwLock<HashMap<Uuid, Vec<ExecutionLog>>>,
    events: RwLock<HashMap<Uuid, Vec<ConnectionEvent>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl InstanceStore for MemoryStore {
    async fn get_instance(&self, id: &Uuid) -> Result<Option<Instance>> {
        Ok(self.instances.read().await.get(id).cloned())
    }

    async fn find_instance_by_name(&self, name: &str) -> Result<Option<Instance>> {
        Ok(self
            .instances
            .read()
            .await
            .values()
            .find(|i| i.name == name)
            .cloned())
    }

    async fn list_instances(&self, filter: Option<InstanceFilter>) -> Result<Vec<Instance>> {
        let filter = filter.unwrap_or_default();
        let mut instances: Vec<Instance> = self
            .instances
            .read()
            .await
            .values()
            .filter(|i| filter.active.map_or(true, |a| i.active == a))
            .filter(|i| {
                filter.search.as_deref().map_or(true, |s| {
                    let needle = s.to_lowercase();
                    i.name.to_lowercase().contains(&needle)
                        || i.description
                            .as_deref()
                            .map_or(false, |d| d.to_lowercase().contains(&needle))
                })
            })
            .cloned()
            .collect();
        instances.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(instances)
    }

    async fn upsert_instance(&self, instance: Instance) -> Result<()> {
        self.instances.write().await.insert(instance.id, instance);
        Ok(())
    }

    async fn set_last_connected_at(&self, id: &Uuid, at: DateTime<Utc>) -> Result<()> {
        if let Some(instance) = self.instances.write().await.get_mut(id) {
            instance.last_connected_at = Some(at);
        }
        Ok(())
    }

    async fn delete_instance(&self, id: &Uuid) -> Result<bool> {
        let removed = self.instances.write().await.remove(id).is_some();
        if removed {
            let endpoint_ids: Vec<Uuid> = {
                let mut endpoints = self.endpoints.write().await;
                let ids: Vec<Uuid> = endpoints
                    .values()
                    .filter(|e| e.instance_id == *id)
                    .map(|e| e.id)
                    .collect();
                for eid in &ids {
                    endpoints.remove(eid);
                }
                ids
            };
            let mut logs = self.logs.write().await;
            for eid in &endpoint_ids {
                logs.remove(eid);
            }
            self.events.write().await.remove(id);
        }
        Ok(removed)
    }
}

#[async_trait::async_trait]
impl EndpointStore for MemoryStore {
    async fn get_endpoint(&self, id: &Uuid) -> Result<Option<Endpoint>> {
        Ok(self.endpoints.read().await.get(id).cloned())
    }

    async fn find_endpoint(
        &self,
        instance_id: &Uuid,
        service_name: &str,
        method_name: &str,
    ) -> Result<Option<Endpoint>> {
        Ok(self
            .endpoints
            .read()
            .await
            .values()
            .find(|e| {
                e.instance_id == *instance_id
                    && e.service_name == service_name
                    && e.method_name == method_name
            })
            .cloned())
    }

    async fn list_endpoints_for_instance(
        &self,
        instance_id: &Uuid,
        filter: Option<EndpointFilter>,
    ) -> Result<Vec<Endpoint>> {
        let filter = filter.unwrap_or_default();
        let mut endpoints: Vec<Endpoint> = self
            .endpoints
            .read()
            .await
            .values()
            .filter(|e| e.instance_id == *instance_id)
            .filter(|e| filter.active.map_or(true, |a| e.active == a))
            .filter(|e| {
                filter
                    .service_name
                    .as_deref()
                    .map_or(true, |s| e.service_name == s)
            })
            .filter(|e| {
                filter
                    .method_name
                    .as_deref()
                    .map_or(true, |m| e.method_name == m)
            })
            .cloned()
            .collect();
        endpoints.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(endpoints)
    }

    async fn list_all_endpoints(&self) -> Result<Vec<Endpoint>> {
        Ok(self.endpoints.read().await.values().cloned().collect())
    }

    async fn upsert_endpoint(&self, endpoint: Endpoint) -> Result<()> {
        self.endpoints.write().await.insert(endpoint.id, endpoint);
        Ok(())
    }

    async fn delete_endpoint(&self, id: &Uuid) -> Result<bool> {
        let removed = self.endpoints.write().await.remove(id).is_some();
        if removed {
            self.logs.write().await.remove(id);
        }
        Ok(removed)
    }
}

#[async_trait::async_trait]
impl ExecutionStore for MemoryStore {
    async fn record_execution(&self, log: ExecutionLog) -> Result<()> {
        self.logs
            .write()
            .await
            .entry(log.endpoint_id)
            .or_default()
            .push(log);
        Ok(())
    }

    async fn list_logs_for_endpoint(
        &self,
        endpoint_id: &Uuid,
        filter: LogFilter,
    ) -> Result<Vec<ExecutionLog>> {
        let logs = self.logs.read().await;
        let mut rows: Vec<ExecutionLog> = logs
            .get(endpoint_id)
            .map(|l| l.as_slice())
            .unwrap_or_default()
            .iter()
            .filter(|l| filter.status.map_or(true, |s| l.status_code == s))
            .filter(|l| filter.since.map_or(true, |since| l.executed_at >= since))
            .filter(|l| {
                filter.search.as_deref().map_or(true, |s| {
                    let needle = s.to_lowercase();
                    l.error_message
                        .as_deref()
                        .map_or(false, |m| m.to_lowercase().contains(&needle))
                        || l.request_body
                            .as_ref()
                            .map_or(false, |b| b.to_string().to_lowercase().contains(&needle))
                })
            })
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.executed_at.cmp(&a.executed_at));
        let offset = filter.offset.unwrap_or(0).max(0) as usize;
        let limit = filter.limit.unwrap_or(100).clamp(1, 1000) as usize;
        Ok(rows.into_iter().skip(offset).take(limit).collect())
    }

    async fn count_logs_for_endpoint(&self, endpoint_id: &Uuid) -> Result<i64> {
        Ok(self
            .logs
            .read()
            .await
            .get(endpoint_id)
            .map_or(0, |l| l.len() as i64))
    }

    async fn execution_stats(&self, endpoint_id: &Uuid) -> Result<ExecutionStats> {
        let logs = self.logs.read().await;
        let rows = match logs.get(endpoint_id) {
            Some(rows) if !rows.is_empty() => rows,
            _ => return Ok(ExecutionStats::empty()),
        };
        let total = rows.len() as i64;
        let successful = rows.iter().filter(|l| l.status_code == 200).count() as i64;
        let sum: i64 = rows.iter().map(|l| l.duration_ms).sum();
        Ok(ExecutionStats {
            total_executions: total,
            avg_duration_ms: sum / total,
            min_duration_ms: rows.iter().map(|l| l.duration_ms).min().unwrap_or(0),
            max_duration_ms: rows.iter().map(|l| l.duration_ms).max().unwrap_or(0),
            successful,
            failed: total - successful,
            success_rate: successful as f64 / total as f64 * 100.0,
        })
    }

    async fn delete_logs_before(&self, endpoint_id: &Uuid, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut logs = self.logs.write().await;
        let Some(rows) = logs.get_mut(endpoint_id) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|l| l.executed_at >= cutoff);
        Ok((before - rows.len()) as u64)
    }

    async fn record_connection_event(&self, event: ConnectionEvent) -> Result<()> {
        self.events
            .write()
            .await
            .entry(event.instance_id)
            .or_default()
            .push(event);
        Ok(())
    }

    async fn list_connection_events(
        &self,
        instance_id: &Uuid,
        limit: i64,
    ) -> Result<Vec<ConnectionEvent>> {
        let events = self.events.read().await;
        let mut rows: Vec<ConnectionEvent> = events
            .get(instance_id)
            .map(|e| e.as_slice())
            .unwrap_or_default()
            .to_vec();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit.clamp(1, 1000) as usize);
        Ok(rows)
    }
}

impl Store for MemoryStore {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{generate_id, now, Endpoint};
    use serde_json::json;

    fn sample_instance(name: &str) -> Instance {
        Instance {
            id: generate_id(),
            name: name.to_string(),
            description: Some("test instance".to_string()),
            base_url: "https://erp.example.com".to_string(),
            tenant: "Company".to_string(),
            branch: None,
            encrypted_username: "enc:v1:x:y".to_string(),
            encrypted_password: "enc:v1:x:z".to_string(),
            endpoint_name: "Default".to_string(),
            endpoint_version: None,
            locale: "en-US".to_string(),
            verify_tls: true,
            persistent_login: true,
            retry_on_idle_logout: true,
            timeout_secs: 60,
            rate_limit_calls_per_second: 10.0,
            cache_ttl_hours: 24,
            api_key: crate::model::generate_api_key(),
            active: true,
            created_at: now(),
            updated_at: now(),
            last_connected_at: None,
        }
    }

    fn sample_endpoint(instance_id: Uuid, service: &str, method: &str) -> Endpoint {
        Endpoint::new(
            instance_id,
            service.to_string(),
            method.to_string(),
            format!("/endpoints/{}/{}/{}", instance_id, service, method),
            json!({"type": "object"}),
            json!({"type": "object"}),
            168,
        )
    }

    fn sample_log(endpoint_id: Uuid, status: i32) -> ExecutionLog {
        ExecutionLog {
            id: generate_id(),
            endpoint_id,
            executed_at: now(),
            duration_ms: 42,
            status_code: status,
            error_message: None,
            request_body: None,
            response_body: None,
            source_addr: None,
            user_agent: None,
        }
    }

    #[tokio::test]
    async fn instance_search_filter() {
        let store = MemoryStore::new();
        store.upsert_instance(sample_instance("production")).await.unwrap();
        store.upsert_instance(sample_instance("sandbox")).await.unwrap();

        let hits = store
            .list_instances(Some(InstanceFilter {
                search: Some("prod".to_string()),
                ..Default::default()
            }))
            .await
            .unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].name, "production");
    }

    #[tokio::test]
    async fn connect_stamp_leaves_other_fields_alone() {
        let store = MemoryStore::new();
        let mut instance = sample_instance("prod");
        let id = instance.id;
        store.upsert_instance(instance.clone()).await.unwrap();

        // An operator edit lands between the row read and the stamp.
        instance.description = Some("edited".to_string());
        store.upsert_instance(instance).await.unwrap();
        store.set_last_connected_at(&id, now()).await.unwrap();

        let row = store.get_instance(&id).await.unwrap().unwrap();
        assert_eq!(row.description.as_deref(), Some("edited"));
        assert!(row.last_connected_at.is_some());
    }

    #[tokio::test]
    async fn delete_instance_cascades() {
        let store = MemoryStore::new();
        let instance = sample_instance("prod");
        let instance_id = instance.id;
        store.upsert_instance(instance).await.unwrap();

        let endpoint = sample_endpoint(instance_id, "SalesOrder", "get");
        let endpoint_id = endpoint.id;
        store.upsert_endpoint(endpoint).await.unwrap();
        store.record_execution(sample_log(endpoint_id, 200)).await.unwrap();

        assert!(store.delete_instance(&instance_id).await.unwrap());
        assert!(store.get_endpoint(&endpoint_id).await.unwrap().is_none());
        assert_eq!(store.count_logs_for_endpoint(&endpoint_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn delete_endpoint_cascades_logs() {
        let store = MemoryStore::new();
        let endpoint = sample_endpoint(generate_id(), "SalesOrder", "get");
        let endpoint_id = endpoint.id;
        store.upsert_endpoint(endpoint).await.unwrap();
        store.record_execution(sample_log(endpoint_id, 200)).await.unwrap();
        store.record_execution(sample_log(endpoint_id, 502)).await.unwrap();
        assert_eq!(store.count_logs_for_endpoint(&endpoint_id).await.unwrap(), 2);

        assert!(store.delete_endpoint(&endpoint_id).await.unwrap());
        assert_eq!(store.count_logs_for_endpoint(&endpoint_id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn stats_aggregate_success_and_failure() {
        let store = MemoryStore::new();
        let endpoint_id = generate_id();
        store.record_execution(sample_log(endpoint_id, 200)).await.unwrap();
        store.record_execution(sample_log(endpoint_id, 200)).await.unwrap();
        store.record_execution(sample_log(endpoint_id, 502)).await.unwrap();

        let stats = store.execution_stats(&endpoint_id).await.unwrap();
        assert_eq!(stats.total_executions, 3);
        assert_eq!(stats.successful, 2);
        assert_eq!(stats.failed, 1);
        assert!((stats.success_rate - 66.66).abs() < 1.0);
    }
}
