use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, QueryBuilder, Row};
use uuid::Uuid;

use crate::model::{
    ConnectionEvent, ConnectionEventType, Endpoint, EndpointFilter, ExecutionLog, ExecutionStats,
    Instance, InstanceFilter, LogFilter,
};
use crate::store::traits::{EndpointStore, ExecutionStore, InstanceStore, Store};

#[derive(Debug, Clone)]
pub struct PostgresStore {
    pool: PgPool,
}

impl PostgresStore {
    pub async fn new(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(20)
            .connect(database_url)
            .await
            .context("Failed to create PostgreSQL connection pool")?;

        Ok(Self { pool })
    }

    pub async fn migrate(&self) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .context("Failed to run database migrations")?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

const INSTANCE_COLUMNS: &str = "id, name, description, base_url, tenant, branch, \
     encrypted_username, encrypted_password, endpoint_name, endpoint_version, locale, \
     verify_tls, persistent_login, retry_on_idle_logout, timeout_secs, \
     rate_limit_calls_per_second, cache_ttl_hours, api_key, active, \
     created_at, updated_at, last_connected_at";

fn row_to_instance(row: &PgRow) -> Instance {
    Instance {
        id: row.get("id"),
        name: row.get("name"),
        description: row.get("description"),
        base_url: row.get("base_url"),
        tenant: row.get("tenant"),
        branch: row.get("branch"),
        encrypted_username: row.get("encrypted_username"),
        encrypted_password: row.get("encrypted_password"),
        endpoint_name: row.get("endpoint_name"),
        endpoint_version: row.get("endpoint_version"),
        locale: row.get("locale"),
        verify_tls: row.get("verify_tls"),
        persistent_login: row.get("persistent_login"),
        retry_on_idle_logout: row.get("retry_on_idle_logout"),
        timeout_secs: row.get("timeout_secs"),
        rate_limit_calls_per_second: row.get("rate_limit_calls_per_second"),
        cache_ttl_hours: row.get("cache_ttl_hours"),
        api_key: row.get("api_key"),
        active: row.get("active"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
        last_connected_at: row.get("last_connected_at"),
    }
}

const ENDPOINT_COLUMNS: &str = "id, instance_id, service_name, method_name, display_name, \
     description, url_path, request_schema, response_schema, active, log_retention_hours, \
     created_at, updated_at";

fn row_to_endpoint(row: &PgRow) -> Endpoint {
    Endpoint {
        id: row.get("id"),
        instance_id: row.get("instance_id"),
        service_name: row.get("service_name"),
        method_name: row.get("method_name"),
        display_name: row.get("display_name"),
        description: row.get("description"),
        url_path: row.get("url_path"),
        request_schema: row.get("request_schema"),
        response_schema: row.get("response_schema"),
        active: row.get("active"),
        log_retention_hours: row.get("log_retention_hours"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    }
}

const LOG_COLUMNS: &str = "id, endpoint_id, executed_at, duration_ms, status_code, \
     error_message, request_body, response_body, source_addr, user_agent";

fn row_to_log(row: &PgRow) -> ExecutionLog {
    ExecutionLog {
        id: row.get("id"),
        endpoint_id: row.get("endpoint_id"),
        executed_at: row.get("executed_at"),
        duration_ms: row.get("duration_ms"),
        status_code: row.get("status_code"),
        error_message: row.get("error_message"),
        request_body: row.get("request_body"),
        response_body: row.get("response_body"),
        source_addr: row.get("source_addr"),
        user_agent: row.get("user_agent"),
    }
}

fn row_to_event(row: &PgRow) -> Result<ConnectionEvent> {
    let raw: String = row.get("event_type");
    let event_type = ConnectionEventType::parse(&raw)
        .ok_or_else(|| anyhow!("unknown connection event type: {raw}"))?;
    Ok(ConnectionEvent {
        id: row.get("id"),
        instance_id: row.get("instance_id"),
        event_type,
        success: row.get("success"),
        error_message: row.get("error_message"),
        source_addr: row.get("source_addr"),
        user_agent: row.get("user_agent"),
        created_at: row.get("created_at"),
    })
}

#[async_trait::async_trait]
impl InstanceStore for PostgresStore {
    async fn get_instance(&self, id: &Uuid) -> Result<Option<Instance>> {
        let row = sqlx::query(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM instances WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch instance")?;

        Ok(row.as_ref().map(row_to_instance))
    }

    async fn find_instance_by_name(&self, name: &str) -> Result<Option<Instance>> {
        let row = sqlx::query(&format!(
            "SELECT {INSTANCE_COLUMNS} FROM instances WHERE name = $1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch instance by name")?;

        Ok(row.as_ref().map(row_to_instance))
    }

    async fn list_instances(&self, filter: Option<InstanceFilter>) -> Result<Vec<Instance>> {
        let filter = filter.unwrap_or_default();
        let mut qb = QueryBuilder::new(format!(
            "SELECT {INSTANCE_COLUMNS} FROM instances WHERE 1=1"
        ));
        if let Some(active) = filter.active {
            qb.push(" AND active = ").push_bind(active);
        }
        if let Some(search) = &filter.search {
            let pattern = format!("%{search}%");
            qb.push(" AND (name ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR description ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        qb.push(" ORDER BY created_at DESC");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list instances")?;

        Ok(rows.iter().map(row_to_instance).collect())
    }

    async fn upsert_instance(&self, instance: Instance) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO instances (
                id, name, description, base_url, tenant, branch,
                encrypted_username, encrypted_password, endpoint_name, endpoint_version,
                locale, verify_tls, persistent_login, retry_on_idle_logout, timeout_secs,
                rate_limit_calls_per_second, cache_ttl_hours, api_key, active,
                created_at, updated_at, last_connected_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15,
                    $16, $17, $18, $19, $20, $21, $22)
            ON CONFLICT (id) DO UPDATE SET
                name = EXCLUDED.name,
                description = EXCLUDED.description,
                base_url = EXCLUDED.base_url,
                tenant = EXCLUDED.tenant,
                branch = EXCLUDED.branch,
                encrypted_username = EXCLUDED.encrypted_username,
                encrypted_password = EXCLUDED.encrypted_password,
                endpoint_name = EXCLUDED.endpoint_name,
                endpoint_version = EXCLUDED.endpoint_version,
                locale = EXCLUDED.locale,
                verify_tls = EXCLUDED.verify_tls,
                persistent_login = EXCLUDED.persistent_login,
                retry_on_idle_logout = EXCLUDED.retry_on_idle_logout,
                timeout_secs = EXCLUDED.timeout_secs,
                rate_limit_calls_per_second = EXCLUDED.rate_limit_calls_per_second,
                cache_ttl_hours = EXCLUDED.cache_ttl_hours,
                api_key = EXCLUDED.api_key,
                active = EXCLUDED.active,
                updated_at = EXCLUDED.updated_at,
                last_connected_at = EXCLUDED.last_connected_at
            "#,
        )
        .bind(instance.id)
        .bind(&instance.name)
        .bind(&instance.description)
        .bind(&instance.base_url)
        .bind(&instance.tenant)
        .bind(&instance.branch)
        .bind(&instance.encrypted_username)
        .bind(&instance.encrypted_password)
        .bind(&instance.endpoint_name)
        .bind(&instance.endpoint_version)
        .bind(&instance.locale)
        .bind(instance.verify_tls)
        .bind(instance.persistent_login)
        .bind(instance.retry_on_idle_logout)
        .bind(instance.timeout_secs)
        .bind(instance.rate_limit_calls_per_second)
        .bind(instance.cache_ttl_hours)
        .bind(&instance.api_key)
        .bind(instance.active)
        .bind(instance.created_at)
        .bind(instance.updated_at)
        .bind(instance.last_connected_at)
        .execute(&self.pool)
        .await
        .context("Failed to upsert instance")?;

        Ok(())
    }

    async fn set_last_connected_at(&self, id: &Uuid, at: DateTime<Utc>) -> Result<()> {
        sqlx::query("UPDATE instances SET last_connected_at = $2 WHERE id = $1")
            .bind(id)
            .bind(at)
            .execute(&self.pool)
            .await
            .context("Failed to stamp last_connected_at")?;

        Ok(())
    }

    async fn delete_instance(&self, id: &Uuid) -> Result<bool> {
        // Endpoints, logs and events go with it via ON DELETE CASCADE.
        let result = sqlx::query("DELETE FROM instances WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete instance")?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait::async_trait]
impl EndpointStore for PostgresStore {
    async fn get_endpoint(&self, id: &Uuid) -> Result<Option<Endpoint>> {
        let row = sqlx::query(&format!(
            "SELECT {ENDPOINT_COLUMNS} FROM endpoints WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch endpoint")?;

        Ok(row.as_ref().map(row_to_endpoint))
    }

    async fn find_endpoint(
        &self,
        instance_id: &Uuid,
        service_name: &str,
        method_name: &str,
    ) -> Result<Option<Endpoint>> {
        let row = sqlx::query(&format!(
            "SELECT {ENDPOINT_COLUMNS} FROM endpoints \
             WHERE instance_id = $1 AND service_name = $2 AND method_name = $3"
        ))
        .bind(instance_id)
        .bind(service_name)
        .bind(method_name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch endpoint by identity")?;

        Ok(row.as_ref().map(row_to_endpoint))
    }

    async fn list_endpoints_for_instance(
        &self,
        instance_id: &Uuid,
        filter: Option<EndpointFilter>,
    ) -> Result<Vec<Endpoint>> {
        let filter = filter.unwrap_or_default();
        let mut qb = QueryBuilder::new(format!(
            "SELECT {ENDPOINT_COLUMNS} FROM endpoints WHERE instance_id = "
        ));
        qb.push_bind(instance_id);
        if let Some(active) = filter.active {
            qb.push(" AND active = ").push_bind(active);
        }
        if let Some(service_name) = &filter.service_name {
            qb.push(" AND service_name = ").push_bind(service_name.clone());
        }
        if let Some(method_name) = &filter.method_name {
            qb.push(" AND method_name = ").push_bind(method_name.clone());
        }
        qb.push(" ORDER BY created_at DESC");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list endpoints")?;

        Ok(rows.iter().map(row_to_endpoint).collect())
    }

    async fn list_all_endpoints(&self) -> Result<Vec<Endpoint>> {
        let rows = sqlx::query(&format!("SELECT {ENDPOINT_COLUMNS} FROM endpoints"))
            .fetch_all(&self.pool)
            .await
            .context("Failed to list all endpoints")?;

        Ok(rows.iter().map(row_to_endpoint).collect())
    }

    async fn upsert_endpoint(&self, endpoint: Endpoint) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO endpoints (
                id, instance_id, service_name, method_name, display_name, description,
                url_path, request_schema, response_schema, active, log_retention_hours,
                created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            ON CONFLICT (id) DO UPDATE SET
                display_name = EXCLUDED.display_name,
                description = EXCLUDED.description,
                url_path = EXCLUDED.url_path,
                request_schema = EXCLUDED.request_schema,
                response_schema = EXCLUDED.response_schema,
                active = EXCLUDED.active,
                log_retention_hours = EXCLUDED.log_retention_hours,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(endpoint.id)
        .bind(endpoint.instance_id)
        .bind(&endpoint.service_name)
        .bind(&endpoint.method_name)
        .bind(&endpoint.display_name)
        .bind(&endpoint.description)
        .bind(&endpoint.url_path)
        .bind(&endpoint.request_schema)
        .bind(&endpoint.response_schema)
        .bind(endpoint.active)
        .bind(endpoint.log_retention_hours)
        .bind(endpoint.created_at)
        .bind(endpoint.updated_at)
        .execute(&self.pool)
        .await
        .context("Failed to upsert endpoint")?;

        Ok(())
    }

    async fn delete_endpoint(&self, id: &Uuid) -> Result<bool> {
        let result = sqlx::query("DELETE FROM endpoints WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete endpoint")?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait::async_trait]
impl ExecutionStore for PostgresStore {
    async fn record_execution(&self, log: ExecutionLog) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO execution_logs (
                id, endpoint_id, executed_at, duration_ms, status_code,
                error_message, request_body, response_body, source_addr, user_agent
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(log.id)
        .bind(log.endpoint_id)
        .bind(log.executed_at)
        .bind(log.duration_ms)
        .bind(log.status_code)
        .bind(&log.error_message)
        .bind(&log.request_body)
        .bind(&log.response_body)
        .bind(&log.source_addr)
        .bind(&log.user_agent)
        .execute(&self.pool)
        .await
        .context("Failed to record execution")?;

        Ok(())
    }

    async fn list_logs_for_endpoint(
        &self,
        endpoint_id: &Uuid,
        filter: LogFilter,
    ) -> Result<Vec<ExecutionLog>> {
        let mut qb = QueryBuilder::new(format!(
            "SELECT {LOG_COLUMNS} FROM execution_logs WHERE endpoint_id = "
        ));
        qb.push_bind(endpoint_id);
        if let Some(status) = filter.status {
            qb.push(" AND status_code = ").push_bind(status);
        }
        if let Some(since) = filter.since {
            qb.push(" AND executed_at >= ").push_bind(since);
        }
        if let Some(search) = &filter.search {
            let pattern = format!("%{search}%");
            qb.push(" AND (error_message ILIKE ")
                .push_bind(pattern.clone())
                .push(" OR request_body::text ILIKE ")
                .push_bind(pattern)
                .push(")");
        }
        qb.push(" ORDER BY executed_at DESC")
            .push(" LIMIT ")
            .push_bind(filter.limit.unwrap_or(100).clamp(1, 1000))
            .push(" OFFSET ")
            .push_bind(filter.offset.unwrap_or(0).max(0));

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .context("Failed to list execution logs")?;

        Ok(rows.iter().map(row_to_log).collect())
    }

    async fn count_logs_for_endpoint(&self, endpoint_id: &Uuid) -> Result<i64> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM execution_logs WHERE endpoint_id = $1")
            .bind(endpoint_id)
            .fetch_one(&self.pool)
            .await
            .context("Failed to count execution logs")?;

        Ok(row.get("n"))
    }

    async fn execution_stats(&self, endpoint_id: &Uuid) -> Result<ExecutionStats> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*)::BIGINT AS total,
                COALESCE(AVG(duration_ms), 0)::BIGINT AS avg_ms,
                COALESCE(MIN(duration_ms), 0)::BIGINT AS min_ms,
                COALESCE(MAX(duration_ms), 0)::BIGINT AS max_ms,
                COUNT(*) FILTER (WHERE status_code = 200)::BIGINT AS successful
            FROM execution_logs WHERE endpoint_id = $1
            "#,
        )
        .bind(endpoint_id)
        .fetch_one(&self.pool)
        .await
        .context("Failed to compute execution stats")?;

        let total: i64 = row.get("total");
        if total == 0 {
            return Ok(ExecutionStats::empty());
        }
        let successful: i64 = row.get("successful");
        Ok(ExecutionStats {
            total_executions: total,
            avg_duration_ms: row.get("avg_ms"),
            min_duration_ms: row.get("min_ms"),
            max_duration_ms: row.get("max_ms"),
            successful,
            failed: total - successful,
            success_rate: successful as f64 / total as f64 * 100.0,
        })
    }

    async fn delete_logs_before(&self, endpoint_id: &Uuid, cutoff: DateTime<Utc>) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM execution_logs WHERE endpoint_id = $1 AND executed_at < $2")
                .bind(endpoint_id)
                .bind(cutoff)
                .execute(&self.pool)
                .await
                .context("Failed to delete expired execution logs")?;

        Ok(result.rows_affected())
    }

    async fn record_connection_event(&self, event: ConnectionEvent) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO connection_events (
                id, instance_id, event_type, success, error_message,
                source_addr, user_agent, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(event.id)
        .bind(event.instance_id)
        .bind(event.event_type.as_str())
        .bind(event.success)
        .bind(&event.error_message)
        .bind(&event.source_addr)
        .bind(&event.user_agent)
        .bind(event.created_at)
        .execute(&self.pool)
        .await
        .context("Failed to record connection event")?;

        Ok(())
    }

    async fn list_connection_events(
        &self,
        instance_id: &Uuid,
        limit: i64,
    ) -> Result<Vec<ConnectionEvent>> {
        let rows = sqlx::query(
            "SELECT id, instance_id, event_type, success, error_message, source_addr, \
             user_agent, created_at \
             FROM connection_events WHERE instance_id = $1 \
             ORDER BY created_at DESC LIMIT $2",
        )
        .bind(instance_id)
        .bind(limit.clamp(1, 1000))
        .fetch_all(&self.pool)
        .await
        .context("Failed to list connection events")?;

        rows.iter().map(row_to_event).collect()
    }
}

impl Store for PostgresStore {}
