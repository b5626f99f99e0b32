use std::sync::Arc;
use std::time::Duration;

use chrono::Duration as ChronoDuration;
use serde::Serialize;

use crate::model::common::now;
use crate::store::traits::Store;

#[derive(Debug, Clone, Serialize)]
pub struct SweepReport {
    /// Total log rows deleted across all endpoints.
    pub deleted: u64,
    /// Endpoints that had at least one row removed.
    pub endpoints: usize,
}

/// One retention pass: every endpoint's logs older than its own
/// `log_retention_hours` are removed. A per-endpoint failure is logged and
/// the sweep moves on.
pub async fn sweep<S: Store>(store: &S) -> anyhow::Result<SweepReport> {
    let endpoints = store.list_all_endpoints().await?;
    let mut deleted = 0u64;
    let mut touched = 0usize;

    for endpoint in endpoints {
        let cutoff = now() - ChronoDuration::hours(endpoint.log_retention_hours.max(0));
        match store.delete_logs_before(&endpoint.id, cutoff).await {
            Ok(0) => {}
            Ok(n) => {
                deleted += n;
                touched += 1;
            }
            Err(err) => {
                log::warn!("retention sweep failed for endpoint {}: {err:#}", endpoint.id);
            }
        }
    }

    if deleted > 0 {
        log::info!("retention sweep removed {deleted} log rows across {touched} endpoints");
    }
    Ok(SweepReport {
        deleted,
        endpoints: touched,
    })
}

/// Background sweeper. Errors are logged and the interval keeps ticking.
pub fn spawn_sweeper<S: Store + 'static>(store: Arc<S>, interval_secs: u64) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs.max(1)));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            if let Err(err) = sweep(store.as_ref()).await {
                log::error!("retention sweep failed: {err:#}");
            }
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::common::generate_id;
    use crate::model::{Endpoint, ExecutionLog, LogFilter};
    use crate::store::memory::MemoryStore;
    use crate::store::traits::{EndpointStore, ExecutionStore};
    use serde_json::json;
    use uuid::Uuid;

    async fn seeded_endpoint(store: &MemoryStore, retention_hours: i64) -> Uuid {
        let instance_id = generate_id();
        let endpoint = Endpoint::new(
            instance_id,
            "SalesOrder".to_string(),
            "get".to_string(),
            format!("/endpoints/{instance_id}/SalesOrder/get"),
            json!({"type": "object", "properties": {}}),
            json!({"type": "object"}),
            retention_hours,
        );
        let id = endpoint.id;
        store.upsert_endpoint(endpoint).await.unwrap();
        id
    }

    async fn seed_log(store: &MemoryStore, endpoint_id: Uuid, age_hours: i64) {
        let log = ExecutionLog {
            id: generate_id(),
            endpoint_id,
            executed_at: now() - ChronoDuration::hours(age_hours),
            duration_ms: 5,
            status_code: 200,
            error_message: None,
            request_body: None,
            response_body: None,
            source_addr: None,
            user_agent: None,
        };
        store.record_execution(log).await.unwrap();
    }

    #[tokio::test]
    async fn sweep_honors_per_endpoint_retention() {
        let store = MemoryStore::new();
        let short = seeded_endpoint(&store, 1).await;
        let long = seeded_endpoint(&store, 100).await;
        seed_log(&store, short, 2).await;
        seed_log(&store, short, 0).await;
        seed_log(&store, long, 2).await;

        let report = sweep(&store).await.unwrap();
        assert_eq!(report.deleted, 1);
        assert_eq!(report.endpoints, 1);

        let remaining = store
            .list_logs_for_endpoint(&short, LogFilter::default())
            .await
            .unwrap();
        assert_eq!(remaining.len(), 1);
        let untouched = store
            .list_logs_for_endpoint(&long, LogFilter::default())
            .await
            .unwrap();
        assert_eq!(untouched.len(), 1);
    }

    #[tokio::test]
    async fn sweep_on_empty_store_is_a_noop() {
        let store = MemoryStore::new();
        let report = sweep(&store).await.unwrap();
        assert_eq!(report.deleted, 0);
        assert_eq!(report.endpoints, 0);
    }
}
