use std::time::Duration;

use serde_json::{json, Map, Value};

use crate::error::GatewayError;
use crate::model::{
    ConnectionProfile, MethodSignature, ParameterSpec, ServiceDetail, TypeTag,
};
use crate::remote::client::{RemoteConnector, RemoteSession};

/// Connector for the remote ERP's contract-based REST surface. Sessions are
/// cookie-based: login once, carry the cookie on every call, logout on
/// eviction. Capability metadata comes from the endpoint's service document.
#[derive(Debug, Default)]
pub struct HttpConnector;

impl HttpConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait::async_trait]
impl RemoteConnector for HttpConnector {
    async fn connect(&self, profile: &ConnectionProfile) -> Result<Box<dyn RemoteSession>, GatewayError> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .timeout(Duration::from_secs(profile.timeout_secs.max(1) as u64))
            .danger_accept_invalid_certs(!profile.verify_tls)
            .build()
            .map_err(|e| GatewayError::Connection(e.to_string()))?;

        let session = HttpSession {
            client,
            base_url: profile.base_url.trim_end_matches('/').to_string(),
            endpoint_name: profile.endpoint_name.clone(),
            endpoint_version: profile.endpoint_version.clone().unwrap_or_else(|| "latest".to_string()),
            login_body: json!({
                "name": profile.username,
                "password": profile.password,
                "tenant": profile.tenant,
                "branch": profile.branch,
                "locale": profile.locale,
            }),
        };
        session.login().await?;
        Ok(Box::new(session))
    }
}

struct HttpSession {
    client: reqwest::Client,
    base_url: String,
    endpoint_name: String,
    endpoint_version: String,
    login_body: Value,
}

impl HttpSession {
    async fn login(&self) -> Result<(), GatewayError> {
        let url = format!("{}/entity/auth/login", self.base_url);
        let response = self
            .client
            .post(&url)
            .json(&self.login_body)
            .send()
            .await
            .map_err(|e| GatewayError::Connection(format!("login request failed: {e}")))?;
        match response.status() {
            s if s.is_success() => Ok(()),
            reqwest::StatusCode::UNAUTHORIZED | reqwest::StatusCode::FORBIDDEN => Err(
                GatewayError::Authentication(format!("login rejected with {}", response.status())),
            ),
            s => Err(GatewayError::Connection(format!("login returned {s}"))),
        }
    }

    fn entity_url(&self) -> String {
        format!(
            "{}/entity/{}/{}",
            self.base_url, self.endpoint_name, self.endpoint_version
        )
    }

    /// Fetch the capability document (`$metadata?format=json`). Shape:
    /// `{"services": [{"name", "methods": [{"name", "doc", "parameters":
    /// [{"name", "type", "required", "default"}]}]}]}`.
    async fn metadata(&self) -> Result<Value, GatewayError> {
        let url = format!("{}/$metadata?format=json", self.entity_url());
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| GatewayError::Connection(format!("metadata request failed: {e}")))?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            return Err(GatewayError::AuthExpired("metadata returned 401".to_string()));
        }
        if !response.status().is_success() {
            return Err(GatewayError::Upstream(format!(
                "metadata returned {}",
                response.status()
            )));
        }
        response
            .json()
            .await
            .map_err(|e| GatewayError::Upstream(format!("metadata is not valid JSON: {e}")))
    }

    fn parse_service(doc: &Value) -> ServiceDetail {
        let name = doc["name"].as_str().unwrap_or_default().to_string();
        let methods = doc["methods"]
            .as_array()
            .map(|methods| methods.iter().map(Self::parse_method).collect())
            .unwrap_or_default();
        ServiceDetail {
            name,
            methods,
            error: None,
        }
    }

    /// One malformed method entry degrades to an errored signature; it never
    /// takes the rest of the service with it.
    fn parse_method(doc: &Value) -> MethodSignature {
        let name = match doc["name"].as_str() {
            Some(name) => name.to_string(),
            None => {
                return MethodSignature::failed(
                    "<unnamed>".to_string(),
                    "method entry has no name".to_string(),
                )
            }
        };
        let parameters = match doc["parameters"].as_array() {
            Some(params) => {
                let mut specs = Vec::with_capacity(params.len());
                for param in params {
                    let Some(param_name) = param["name"].as_str() else {
                        return MethodSignature::failed(
                            name,
                            "parameter entry has no name".to_string(),
                        );
                    };
                    specs.push(ParameterSpec {
                        name: param_name.to_string(),
                        type_tag: param["type"]
                            .as_str()
                            .map(TypeTag::from_remote)
                            .unwrap_or(TypeTag::Unknown),
                        required: param["required"].as_bool().unwrap_or(false),
                        default: match &param["default"] {
                            Value::Null => None,
                            other => Some(other.clone()),
                        },
                    });
                }
                specs
            }
            None => Vec::new(),
        };
        MethodSignature {
            name,
            parameters,
            return_type: doc["return_type"].as_str().map(TypeTag::from_remote),
            doc: doc["doc"].as_str().map(|s| s.to_string()),
            error: None,
        }
    }
}

#[async_trait::async_trait]
impl RemoteSession for HttpSession {
    async fn list_services(&self) -> Result<Vec<String>, GatewayError> {
        let metadata = self.metadata().await?;
        Ok(metadata["services"]
            .as_array()
            .map(|services| {
                services
                    .iter()
                    .filter_map(|s| s["name"].as_str().map(|n| n.to_string()))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn describe_service(&self, service: &str) -> Result<ServiceDetail, GatewayError> {
        let metadata = self.metadata().await?;
        let doc = metadata["services"]
            .as_array()
            .and_then(|services| services.iter().find(|s| s["name"].as_str() == Some(service)))
            .ok_or_else(|| GatewayError::EndpointNotFound(format!("service not found: {service}")))?;
        Ok(Self::parse_service(doc))
    }

    async fn invoke(
        &self,
        service: &str,
        method: &str,
        args: &Map<String, Value>,
    ) -> Result<Value, GatewayError> {
        let url = format!("{}/{}/{}", self.entity_url(), service, method);
        let response = self
            .client
            .post(&url)
            .json(&Value::Object(args.clone()))
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    GatewayError::UpstreamTimeout
                } else {
                    GatewayError::Connection(format!("invoke request failed: {e}"))
                }
            })?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(GatewayError::AuthExpired("invoke returned 401".to_string()));
        }
        let body = response.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(GatewayError::Upstream(format!(
                "{service}.{method} returned {status}: {}",
                truncate_for_error(&body)
            )));
        }
        if body.is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body)
            .map_err(|e| GatewayError::Upstream(format!("response is not valid JSON: {e}")))
    }

    async fn logout(&self) {
        let url = format!("{}/entity/auth/logout", self.base_url);
        if let Err(e) = self.client.post(&url).send().await {
            log::warn!("logout failed: {e}");
        }
    }
}

// Cap upstream error bodies carried into error messages. The cut must land
// on a char boundary or slicing panics on multi-byte text.
fn truncate_for_error(body: &str) -> &str {
    if body.len() <= 512 {
        return body;
    }
    let mut end = 512;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}
