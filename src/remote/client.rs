use serde_json::{Map, Value};

use crate::error::GatewayError;
use crate::model::{ConnectionProfile, ServiceDetail};

/// Capability seam between the gateway and any concrete ERP SDK. The
/// dispatcher and introspector only ever talk to these traits, so swapping
/// the remote protocol means writing one new connector.
#[async_trait::async_trait]
pub trait RemoteConnector: Send + Sync {
    /// Authenticate against the remote instance and return a live session.
    /// Errors: `Connection` (unreachable/TLS), `Authentication` (rejected
    /// credentials).
    async fn connect(&self, profile: &ConnectionProfile) -> Result<Box<dyn RemoteSession>, GatewayError>;
}

/// An authenticated session against one remote instance. Sessions are
/// stateless wrappers over a session token; there is no explicit close
/// beyond best-effort `logout`.
#[async_trait::async_trait]
pub trait RemoteSession: Send + Sync {
    async fn list_services(&self) -> Result<Vec<String>, GatewayError>;

    /// Describe one service. Per-method description failures are reported
    /// inline via `MethodSignature::error`, never by failing the call.
    async fn describe_service(&self, service: &str) -> Result<ServiceDetail, GatewayError>;

    /// Invoke a method. An idle-logout signal surfaces as
    /// `GatewayError::AuthExpired` so the pool can apply its bounded retry.
    async fn invoke(
        &self,
        service: &str,
        method: &str,
        args: &Map<String, Value>,
    ) -> Result<Value, GatewayError>;

    /// Best-effort; errors are logged by the implementation, not returned.
    async fn logout(&self);
}
