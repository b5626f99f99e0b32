use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::common::{generate_api_key, generate_id, mask_api_key, now};
use crate::vault::{CredentialVault, VaultError};

/// A connection profile to one remote ERP deployment. Credentials are stored
/// as vault envelopes; the plaintext only exists inside a `ConnectionProfile`
/// while the pool is constructing a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Instance {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub base_url: String,
    pub tenant: String,
    pub branch: Option<String>,
    pub encrypted_username: String,
    pub encrypted_password: String,
    pub endpoint_name: String,
    pub endpoint_version: Option<String>,
    pub locale: String,
    pub verify_tls: bool,
    pub persistent_login: bool,
    pub retry_on_idle_logout: bool,
    pub timeout_secs: i64,
    pub rate_limit_calls_per_second: f64,
    pub cache_ttl_hours: i64,
    pub api_key: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_connected_at: Option<DateTime<Utc>>,
}

impl Instance {
    /// Decrypt stored credentials into a profile the connector can use.
    pub fn connection_profile(&self, vault: &CredentialVault) -> Result<ConnectionProfile, VaultError> {
        Ok(ConnectionProfile {
            instance_id: self.id,
            base_url: self.base_url.clone(),
            tenant: self.tenant.clone(),
            branch: self.branch.clone(),
            username: vault.decrypt(&self.encrypted_username)?,
            password: vault.decrypt(&self.encrypted_password)?,
            endpoint_name: self.endpoint_name.clone(),
            endpoint_version: self.endpoint_version.clone(),
            locale: self.locale.clone(),
            verify_tls: self.verify_tls,
            persistent_login: self.persistent_login,
            retry_on_idle_logout: self.retry_on_idle_logout,
            timeout_secs: self.timeout_secs,
            rate_limit_calls_per_second: self.rate_limit_calls_per_second,
        })
    }

    /// API responses never carry credential envelopes, and the key is masked
    /// unless the caller went through an explicit key operation.
    pub fn to_public(&self, show_full_api_key: bool) -> InstancePublic {
        InstancePublic {
            id: self.id,
            name: self.name.clone(),
            description: self.description.clone(),
            base_url: self.base_url.clone(),
            tenant: self.tenant.clone(),
            branch: self.branch.clone(),
            endpoint_name: self.endpoint_name.clone(),
            endpoint_version: self.endpoint_version.clone(),
            locale: self.locale.clone(),
            verify_tls: self.verify_tls,
            persistent_login: self.persistent_login,
            retry_on_idle_logout: self.retry_on_idle_logout,
            timeout_secs: self.timeout_secs,
            rate_limit_calls_per_second: self.rate_limit_calls_per_second,
            cache_ttl_hours: self.cache_ttl_hours,
            api_key: if show_full_api_key {
                self.api_key.clone()
            } else {
                mask_api_key(&self.api_key)
            },
            active: self.active,
            created_at: self.created_at,
            updated_at: self.updated_at,
            last_connected_at: self.last_connected_at,
        }
    }
}

/// Decrypted, non-persisted view of an instance handed to the connector.
#[derive(Debug, Clone)]
pub struct ConnectionProfile {
    pub instance_id: Uuid,
    pub base_url: String,
    pub tenant: String,
    pub branch: Option<String>,
    pub username: String,
    pub password: String,
    pub endpoint_name: String,
    pub endpoint_version: Option<String>,
    pub locale: String,
    pub verify_tls: bool,
    pub persistent_login: bool,
    pub retry_on_idle_logout: bool,
    pub timeout_secs: i64,
    pub rate_limit_calls_per_second: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct InstancePublic {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub base_url: String,
    pub tenant: String,
    pub branch: Option<String>,
    pub endpoint_name: String,
    pub endpoint_version: Option<String>,
    pub locale: String,
    pub verify_tls: bool,
    pub persistent_login: bool,
    pub retry_on_idle_logout: bool,
    pub timeout_secs: i64,
    pub rate_limit_calls_per_second: f64,
    pub cache_ttl_hours: i64,
    pub api_key: String,
    pub active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub last_connected_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewInstance {
    pub name: String,
    pub description: Option<String>,
    pub base_url: String,
    pub tenant: String,
    pub branch: Option<String>,
    pub username: String,
    pub password: String,
    #[serde(default = "default_endpoint_name")]
    pub endpoint_name: String,
    pub endpoint_version: Option<String>,
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default = "default_true")]
    pub verify_tls: bool,
    #[serde(default = "default_true")]
    pub persistent_login: bool,
    #[serde(default = "default_true")]
    pub retry_on_idle_logout: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: i64,
    #[serde(default = "default_rate_limit")]
    pub rate_limit_calls_per_second: f64,
    #[serde(default = "default_cache_ttl_hours")]
    pub cache_ttl_hours: i64,
    #[serde(default = "default_true")]
    pub active: bool,
}

impl NewInstance {
    pub fn into_instance(self, vault: &CredentialVault) -> Result<Instance, VaultError> {
        let ts = now();
        Ok(Instance {
            id: generate_id(),
            name: self.name,
            description: self.description,
            base_url: self.base_url,
            tenant: self.tenant,
            branch: self.branch,
            encrypted_username: vault.encrypt(&self.username)?,
            encrypted_password: vault.encrypt(&self.password)?,
            endpoint_name: self.endpoint_name,
            endpoint_version: self.endpoint_version,
            locale: self.locale,
            verify_tls: self.verify_tls,
            persistent_login: self.persistent_login,
            retry_on_idle_logout: self.retry_on_idle_logout,
            timeout_secs: self.timeout_secs,
            rate_limit_calls_per_second: self.rate_limit_calls_per_second,
            cache_ttl_hours: self.cache_ttl_hours,
            api_key: generate_api_key(),
            active: self.active,
            created_at: ts,
            updated_at: ts,
            last_connected_at: None,
        })
    }
}

/// Partial update; absent fields keep their stored value. New credentials
/// are re-encrypted through the vault before they land on the row.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstanceUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub base_url: Option<String>,
    pub tenant: Option<String>,
    pub branch: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub endpoint_name: Option<String>,
    pub endpoint_version: Option<String>,
    pub locale: Option<String>,
    pub verify_tls: Option<bool>,
    pub persistent_login: Option<bool>,
    pub retry_on_idle_logout: Option<bool>,
    pub timeout_secs: Option<i64>,
    pub rate_limit_calls_per_second: Option<f64>,
    pub cache_ttl_hours: Option<i64>,
    pub active: Option<bool>,
}

impl InstanceUpdate {
    pub fn apply(self, instance: &mut Instance, vault: &CredentialVault) -> Result<(), VaultError> {
        if let Some(name) = self.name {
            instance.name = name;
        }
        if let Some(description) = self.description {
            instance.description = Some(description);
        }
        if let Some(base_url) = self.base_url {
            instance.base_url = base_url;
        }
        if let Some(tenant) = self.tenant {
            instance.tenant = tenant;
        }
        if let Some(branch) = self.branch {
            instance.branch = Some(branch);
        }
        if let Some(username) = self.username {
            instance.encrypted_username = vault.encrypt(&username)?;
        }
        if let Some(password) = self.password {
            instance.encrypted_password = vault.encrypt(&password)?;
        }
        if let Some(endpoint_name) = self.endpoint_name {
            instance.endpoint_name = endpoint_name;
        }
        if let Some(endpoint_version) = self.endpoint_version {
            instance.endpoint_version = Some(endpoint_version);
        }
        if let Some(locale) = self.locale {
            instance.locale = locale;
        }
        if let Some(verify_tls) = self.verify_tls {
            instance.verify_tls = verify_tls;
        }
        if let Some(persistent_login) = self.persistent_login {
            instance.persistent_login = persistent_login;
        }
        if let Some(retry) = self.retry_on_idle_logout {
            instance.retry_on_idle_logout = retry;
        }
        if let Some(timeout_secs) = self.timeout_secs {
            instance.timeout_secs = timeout_secs;
        }
        if let Some(rate) = self.rate_limit_calls_per_second {
            instance.rate_limit_calls_per_second = rate;
        }
        if let Some(ttl) = self.cache_ttl_hours {
            instance.cache_ttl_hours = ttl;
        }
        if let Some(active) = self.active {
            instance.active = active;
        }
        instance.updated_at = now();
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InstanceFilter {
    pub active: Option<bool>,
    pub search: Option<String>,
}

fn default_endpoint_name() -> String {
    "Default".to_string()
}

fn default_locale() -> String {
    "en-US".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout_secs() -> i64 {
    60
}

fn default_rate_limit() -> f64 {
    10.0
}

fn default_cache_ttl_hours() -> i64 {
    24
}
