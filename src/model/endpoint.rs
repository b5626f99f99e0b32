use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::model::common::{generate_id, now};

/// A deployed, addressable HTTP mapping to one (instance, service, method).
/// Schemas are materialized once at deploy time; an upstream signature change
/// requires an explicit redeploy or schema refresh.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Endpoint {
    pub id: Uuid,
    pub instance_id: Uuid,
    pub service_name: String,
    pub method_name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub url_path: String,
    pub request_schema: Value,
    pub response_schema: Value,
    pub active: bool,
    pub log_retention_hours: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Endpoint {
    pub fn new(
        instance_id: Uuid,
        service_name: String,
        method_name: String,
        url_path: String,
        request_schema: Value,
        response_schema: Value,
        log_retention_hours: i64,
    ) -> Self {
        let ts = now();
        let display_name = format!("{}.{}", service_name, method_name);
        Self {
            id: generate_id(),
            instance_id,
            service_name,
            method_name,
            display_name: Some(display_name),
            description: None,
            url_path,
            request_schema,
            response_schema,
            active: true,
            log_retention_hours,
            created_at: ts,
            updated_at: ts,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewEndpoint {
    pub service_name: String,
    pub method_name: String,
    pub display_name: Option<String>,
    pub description: Option<String>,
    /// Explicit override; when absent the schema is synthesized from the
    /// introspected method signature.
    pub request_schema: Option<Value>,
    pub response_schema: Option<Value>,
    #[serde(default = "default_log_retention_hours")]
    pub log_retention_hours: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndpointUpdate {
    pub display_name: Option<String>,
    pub description: Option<String>,
    pub active: Option<bool>,
    pub log_retention_hours: Option<i64>,
    /// Re-synthesize the stored schemas from the current upstream signature.
    #[serde(default)]
    pub regenerate_schema: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct EndpointFilter {
    pub active: Option<bool>,
    pub service_name: Option<String>,
    pub method_name: Option<String>,
}

pub fn default_log_retention_hours() -> i64 {
    168
}
