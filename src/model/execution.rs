use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::model::common::{generate_id, now};

/// One row per endpoint invocation, written after every attempt.
/// Payload snapshots are best-effort and replaced with a marker on overflow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionLog {
    pub id: Uuid,
    pub endpoint_id: Uuid,
    pub executed_at: DateTime<Utc>,
    pub duration_ms: i64,
    pub status_code: i32,
    pub error_message: Option<String>,
    pub request_body: Option<Value>,
    pub response_body: Option<Value>,
    pub source_addr: Option<String>,
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogFilter {
    pub status: Option<i32>,
    pub search: Option<String>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionStats {
    pub total_executions: i64,
    pub avg_duration_ms: i64,
    pub min_duration_ms: i64,
    pub max_duration_ms: i64,
    pub successful: i64,
    pub failed: i64,
    pub success_rate: f64,
}

impl ExecutionStats {
    pub fn empty() -> Self {
        Self {
            total_executions: 0,
            avg_duration_ms: 0,
            min_duration_ms: 0,
            max_duration_ms: 0,
            successful: 0,
            failed: 0,
            success_rate: 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionEventType {
    Connect,
    Disconnect,
    Rebuild,
    Test,
}

impl ConnectionEventType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionEventType::Connect => "connect",
            ConnectionEventType::Disconnect => "disconnect",
            ConnectionEventType::Rebuild => "rebuild",
            ConnectionEventType::Test => "test",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "connect" => Some(ConnectionEventType::Connect),
            "disconnect" => Some(ConnectionEventType::Disconnect),
            "rebuild" => Some(ConnectionEventType::Rebuild),
            "test" => Some(ConnectionEventType::Test),
            _ => None,
        }
    }
}

/// Audit trail of operator connect/disconnect/rebuild/test attempts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionEvent {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub event_type: ConnectionEventType,
    pub success: bool,
    pub error_message: Option<String>,
    pub source_addr: Option<String>,
    pub user_agent: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl ConnectionEvent {
    pub fn new(
        instance_id: Uuid,
        event_type: ConnectionEventType,
        success: bool,
        error_message: Option<String>,
    ) -> Self {
        Self {
            id: generate_id(),
            instance_id,
            event_type,
            success,
            error_message,
            source_addr: None,
            user_agent: None,
            created_at: now(),
        }
    }
}
