use anyhow::Result;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::model::{
    ConnectionEvent, Endpoint, EndpointFilter, ExecutionLog, ExecutionStats, Instance,
    InstanceFilter, LogFilter,
};

#[async_trait::async_trait]
pub trait InstanceStore: Send + Sync {
    async fn get_instance(&self, id: &Uuid) -> Result<Option<Instance>>;
    async fn find_instance_by_name(&self, name: &str) -> Result<Option<Instance>>;
    async fn list_instances(&self, filter: Option<InstanceFilter>) -> Result<Vec<Instance>>;
    async fn upsert_instance(&self, instance: Instance) -> Result<()>;
    /// Narrow connect-time stamp; a full-row upsert here could revert a
    /// concurrent operator edit.
    async fn set_last_connected_at(&self, id: &Uuid, at: DateTime<Utc>) -> Result<()>;
    /// Cascades to the instance's endpoints, execution logs, and connection
    /// events.
    async fn delete_instance(&self, id: &Uuid) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait EndpointStore: Send + Sync {
    async fn get_endpoint(&self, id: &Uuid) -> Result<Option<Endpoint>>;
    /// Lookup by the deployment identity; this is what makes redeploys
    /// detectable as duplicates.
    async fn find_endpoint(
        &self,
        instance_id: &Uuid,
        service_name: &str,
        method_name: &str,
    ) -> Result<Option<Endpoint>>;
    async fn list_endpoints_for_instance(
        &self,
        instance_id: &Uuid,
        filter: Option<EndpointFilter>,
    ) -> Result<Vec<Endpoint>>;
    /// Every endpoint across all instances; used by the retention sweeper.
    async fn list_all_endpoints(&self) -> Result<Vec<Endpoint>>;
    async fn upsert_endpoint(&self, endpoint: Endpoint) -> Result<()>;
    /// Cascades to the endpoint's execution logs.
    async fn delete_endpoint(&self, id: &Uuid) -> Result<bool>;
}

#[async_trait::async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn record_execution(&self, log: ExecutionLog) -> Result<()>;
    async fn list_logs_for_endpoint(
        &self,
        endpoint_id: &Uuid,
        filter: LogFilter,
    ) -> Result<Vec<ExecutionLog>>;
    async fn count_logs_for_endpoint(&self, endpoint_id: &Uuid) -> Result<i64>;
    async fn execution_stats(&self, endpoint_id: &Uuid) -> Result<ExecutionStats>;
    /// Retention sweep; returns the number of rows deleted.
    async fn delete_logs_before(&self, endpoint_id: &Uuid, cutoff: DateTime<Utc>) -> Result<u64>;

    async fn record_connection_event(&self, event: ConnectionEvent) -> Result<()>;
    async fn list_connection_events(
        &self,
        instance_id: &Uuid,
        limit: i64,
    ) -> Result<Vec<ConnectionEvent>>;
}

pub trait Store: InstanceStore + EndpointStore + ExecutionStore + Send + Sync {}
