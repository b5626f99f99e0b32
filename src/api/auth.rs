use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{request::Parts, HeaderMap, StatusCode},
};

use crate::logic::CallerMeta;
use crate::model::UserContext;

/// API key presented by an external caller, either as `X-API-Key` or as an
/// `Authorization: Bearer` token. Absence is not a rejection here; the
/// dispatcher decides what an anonymous caller may do.
#[derive(Debug, Clone)]
pub struct ApiKey(pub Option<String>);

#[async_trait]
impl<S> FromRequestParts<S> for ApiKey
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(ApiKey(extract_api_key(&parts.headers)))
    }
}

fn extract_api_key(headers: &HeaderMap) -> Option<String> {
    if let Some(key) = header_value(headers, "x-api-key") {
        return Some(key);
    }
    header_value(headers, "authorization")
        .and_then(|v| v.strip_prefix("Bearer ").map(str::to_string))
}

/// Session identity forwarded by the management UI:
/// - X-User-Id: user identifier
/// - X-User-Email: optional email
/// - X-User-Name: optional display name
///
/// Falls back to the development identity when no headers are present.
#[async_trait]
impl<S> FromRequestParts<S> for UserContext
where
    S: Send + Sync,
{
    type Rejection = StatusCode;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let headers = &parts.headers;
        if let Some(user_id) = header_value(headers, "x-user-id") {
            let user_email = header_value(headers, "x-user-email");
            let user_name = header_value(headers, "x-user-name");
            Ok(UserContext::with_details(user_id, user_email, user_name))
        } else {
            Ok(UserContext::default_user())
        }
    }
}

/// Request provenance for audit rows. The source address comes from proxy
/// headers; the listener address is the proxy, not the caller.
pub fn caller_meta(headers: &HeaderMap) -> CallerMeta {
    let source_addr = header_value(headers, "x-forwarded-for")
        .map(|v| v.split(',').next().unwrap_or("").trim().to_string())
        .filter(|v| !v.is_empty())
        .or_else(|| header_value(headers, "x-real-ip"));
    CallerMeta {
        source_addr,
        user_agent: header_value(headers, "user-agent"),
    }
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|s| s.to_string())
}
