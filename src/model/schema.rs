use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Request/response contract materialized for a deployed method, plus the
/// operator-facing extras (example payload, cURL snippet) the UI shows
/// before deployment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodContract {
    pub method_name: String,
    pub request_schema: Value,
    pub response_schema: Value,
    pub example_request: Value,
    pub curl_example: String,
}
