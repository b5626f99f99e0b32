use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use serde_json::{json, Map, Value};

use crate::error::GatewayError;
use crate::model::{
    ConnectionProfile, MethodSignature, ParameterSpec, ServiceDetail, TypeTag,
};
use crate::remote::client::{RemoteConnector, RemoteSession};

/// Scripted connector used by unit and integration tests: fixture services,
/// failure injection, and counters so tests can assert how many logins and
/// logouts actually happened.
#[derive(Debug, Default)]
pub struct StubState {
    pub login_count: usize,
    pub logout_count: usize,
    pub invoke_count: usize,
    pub describe_count: usize,
    /// The next N connect attempts fail with `Authentication`.
    pub fail_next_logins: usize,
    /// The next N invokes fail with `AuthExpired` (idle-logout signal).
    pub expire_next_invokes: usize,
    /// Every connect sleeps this long before logging in.
    pub login_delay: Option<Duration>,
}

#[derive(Debug, Default, Clone)]
pub struct StubConnector {
    state: Arc<Mutex<StubState>>,
}

impl StubConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn login_count(&self) -> usize {
        self.state.lock().login_count
    }

    pub fn logout_count(&self) -> usize {
        self.state.lock().logout_count
    }

    pub fn invoke_count(&self) -> usize {
        self.state.lock().invoke_count
    }

    pub fn describe_count(&self) -> usize {
        self.state.lock().describe_count
    }

    pub fn fail_next_logins(&self, n: usize) {
        self.state.lock().fail_next_logins = n;
    }

    pub fn expire_next_invokes(&self, n: usize) {
        self.state.lock().expire_next_invokes = n;
    }

    pub fn delay_logins(&self, delay: Duration) {
        self.state.lock().login_delay = Some(delay);
    }
}

#[async_trait::async_trait]
impl RemoteConnector for StubConnector {
    async fn connect(&self, profile: &ConnectionProfile) -> Result<Box<dyn RemoteSession>, GatewayError> {
        let delay = self.state.lock().login_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let mut state = self.state.lock();
        if state.fail_next_logins > 0 {
            state.fail_next_logins -= 1;
            return Err(GatewayError::Authentication(format!(
                "login rejected for {}",
                profile.username
            )));
        }
        state.login_count += 1;
        Ok(Box::new(StubSession {
            state: self.state.clone(),
            tenant: profile.tenant.clone(),
        }))
    }
}

struct StubSession {
    state: Arc<Mutex<StubState>>,
    tenant: String,
}

#[async_trait::async_trait]
impl RemoteSession for StubSession {
    async fn list_services(&self) -> Result<Vec<String>, GatewayError> {
        Ok(vec![
            "SalesOrder".to_string(),
            "Customer".to_string(),
            "Broken".to_string(),
        ])
    }

    async fn describe_service(&self, service: &str) -> Result<ServiceDetail, GatewayError> {
        self.state.lock().describe_count += 1;
        match service {
            "SalesOrder" => Ok(ServiceDetail {
                name: "SalesOrder".to_string(),
                methods: vec![
                    MethodSignature {
                        name: "get".to_string(),
                        parameters: vec![ParameterSpec {
                            name: "id".to_string(),
                            type_tag: TypeTag::String,
                            required: true,
                            default: None,
                        }],
                        return_type: Some(TypeTag::Object),
                        doc: Some("Fetch one sales order by id.".to_string()),
                        error: None,
                    },
                    MethodSignature {
                        name: "get_list".to_string(),
                        parameters: vec![ParameterSpec {
                            name: "filter".to_string(),
                            type_tag: TypeTag::String,
                            required: false,
                            default: None,
                        }],
                        return_type: Some(TypeTag::Array),
                        doc: None,
                        error: None,
                    },
                    MethodSignature {
                        name: "put".to_string(),
                        parameters: vec![
                            ParameterSpec {
                                name: "data".to_string(),
                                type_tag: TypeTag::Object,
                                required: true,
                                default: None,
                            },
                            ParameterSpec {
                                name: "expand".to_string(),
                                type_tag: TypeTag::String,
                                required: false,
                                default: Some(json!("Details")),
                            },
                        ],
                        return_type: Some(TypeTag::Object),
                        doc: None,
                        error: None,
                    },
                    // A method whose description upstream rejects; the
                    // listing must still carry it, with the error inline.
                    MethodSignature::failed(
                        "legacy_export".to_string(),
                        "signature registry has no entry".to_string(),
                    ),
                ],
                error: None,
            }),
            "Customer" => Ok(ServiceDetail {
                name: "Customer".to_string(),
                methods: vec![MethodSignature {
                    name: "get".to_string(),
                    parameters: vec![ParameterSpec {
                        name: "id".to_string(),
                        type_tag: TypeTag::String,
                        required: true,
                        default: None,
                    }],
                    return_type: Some(TypeTag::Object),
                    doc: None,
                    error: None,
                }],
                error: None,
            }),
            "Broken" => Err(GatewayError::Upstream(
                "metadata endpoint returned 500".to_string(),
            )),
            other => Err(GatewayError::EndpointNotFound(format!(
                "service not found: {other}"
            ))),
        }
    }

    async fn invoke(
        &self,
        service: &str,
        method: &str,
        args: &Map<String, Value>,
    ) -> Result<Value, GatewayError> {
        {
            let mut state = self.state.lock();
            state.invoke_count += 1;
            if state.expire_next_invokes > 0 {
                state.expire_next_invokes -= 1;
                return Err(GatewayError::AuthExpired("session token rejected".to_string()));
            }
        }
        match method {
            "fail" => Err(GatewayError::Upstream("remote raised an exception".to_string())),
            _ => Ok(json!({
                "service": service,
                "method": method,
                "tenant": self.tenant,
                "args": Value::Object(args.clone()),
            })),
        }
    }

    async fn logout(&self) {
        self.state.lock().logout_count += 1;
    }
}
