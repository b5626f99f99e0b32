use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use uuid::Uuid;

use crate::vault::VaultError;

/// Error taxonomy for the gateway. Every variant maps to exactly one HTTP
/// status; handlers convert through `IntoResponse` so callers always see the
/// same `{error, status_code}` body.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Vault(#[from] VaultError),

    #[error("connection failed: {0}")]
    Connection(String),

    #[error("authentication failed: {0}")]
    Authentication(String),

    /// Remote session reported an idle logout. The pool consumes this for
    /// its single bounded retry; if it escapes, it is an upstream failure.
    #[error("session expired: {0}")]
    AuthExpired(String),

    #[error("rate limit exceeded")]
    RateLimitExceeded,

    #[error("instance not found: {0}")]
    InstanceNotFound(Uuid),

    #[error("instance {0} is inactive")]
    InstanceInactive(Uuid),

    #[error("endpoint not found: {0}")]
    EndpointNotFound(String),

    #[error("endpoint is inactive")]
    EndpointInactive,

    #[error("{message}")]
    Validation { message: String, fields: Vec<String> },

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("upstream call timed out")]
    UpstreamTimeout,

    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl GatewayError {
    pub fn missing_fields(fields: Vec<String>) -> Self {
        let message = format!("missing required fields: {}", fields.join(", "));
        GatewayError::Validation { message, fields }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        GatewayError::Validation {
            message: message.into(),
            fields: Vec::new(),
        }
    }

    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        GatewayError::Internal(err.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Vault(VaultError::EmptyInput) => StatusCode::BAD_REQUEST,
            GatewayError::Vault(_) => StatusCode::INTERNAL_SERVER_ERROR,
            GatewayError::Connection(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Authentication(_) => StatusCode::BAD_GATEWAY,
            GatewayError::AuthExpired(_) => StatusCode::BAD_GATEWAY,
            GatewayError::RateLimitExceeded => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::InstanceNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::InstanceInactive(_) => StatusCode::FORBIDDEN,
            GatewayError::EndpointNotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::EndpointInactive => StatusCode::FORBIDDEN,
            GatewayError::Validation { .. } => StatusCode::BAD_REQUEST,
            GatewayError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            GatewayError::Conflict(_) => StatusCode::CONFLICT,
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            GatewayError::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            GatewayError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub status_code: u16,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub fields: Vec<String>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, status: StatusCode) -> Self {
        Self {
            error: error.into(),
            status_code: status.as_u16(),
            fields: Vec::new(),
        }
    }
}

impl From<&GatewayError> for ErrorResponse {
    fn from(err: &GatewayError) -> Self {
        let fields = match err {
            GatewayError::Validation { fields, .. } => fields.clone(),
            _ => Vec::new(),
        };
        Self {
            error: err.to_string(),
            status_code: err.status_code().as_u16(),
            fields,
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            // Stack traces and internals stay in server-side logs only.
            log::error!("request failed: {:#}", anyhow::anyhow!(self.to_string()));
        }
        (status, Json(ErrorResponse::from(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_error_names_fields() {
        let err = GatewayError::missing_fields(vec!["id".to_string(), "qty".to_string()]);
        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        let body = ErrorResponse::from(&err);
        assert_eq!(body.fields, vec!["id", "qty"]);
        assert!(body.error.contains("id"));
    }

    #[test]
    fn status_mapping_covers_the_taxonomy() {
        assert_eq!(
            GatewayError::RateLimitExceeded.status_code(),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            GatewayError::UpstreamTimeout.status_code(),
            StatusCode::GATEWAY_TIMEOUT
        );
        assert_eq!(
            GatewayError::EndpointInactive.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            GatewayError::Upstream("boom".into()).status_code(),
            StatusCode::BAD_GATEWAY
        );
    }
}
