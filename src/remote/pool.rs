use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use tokio::sync::{Mutex, RwLock};
use uuid::Uuid;

use crate::error::GatewayError;
use crate::model::{ConnectionProfile, Instance, ServiceDetail};
use crate::remote::client::{RemoteConnector, RemoteSession};
use crate::remote::limiter::TokenBucket;
use crate::store::traits::InstanceStore;
use crate::vault::CredentialVault;

/// Lazily-constructed, TTL-cached remote sessions keyed by instance id.
/// Owns session lifecycle, per-instance rate limiting, the capability
/// snapshot, and the single bounded idle-logout retry. Injected into the
/// dispatcher; never ambient global state.
pub struct ClientPool<S> {
    store: Arc<S>,
    vault: Arc<CredentialVault>,
    connector: Arc<dyn RemoteConnector>,
    entries: RwLock<HashMap<Uuid, Arc<PoolEntry>>>,
    /// Per-instance connect serialization. The `entries` map lock is never
    /// held across a remote login, so instances stay independent.
    connect_locks: Mutex<HashMap<Uuid, Arc<Mutex<()>>>>,
    generations: AtomicU64,
}

pub struct PoolEntry {
    instance_id: Uuid,
    profile: ConnectionProfile,
    connector: Arc<dyn RemoteConnector>,
    session: RwLock<Arc<dyn RemoteSession>>,
    limiter: TokenBucket,
    /// Serializes re-authentication: one re-auth in flight per instance.
    reauth: Mutex<()>,
    snapshot: RwLock<Option<Vec<ServiceDetail>>>,
    generation: u64,
    connected_at: Instant,
    connected_at_utc: DateTime<Utc>,
}

impl PoolEntry {
    fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.profile.timeout_secs.max(0) as u64)
    }

    async fn current_session(&self) -> Arc<dyn RemoteSession> {
        self.session.read().await.clone()
    }

    /// Reconnect once, swapping the fresh session into place. Concurrent
    /// callers that arrive while a re-auth is in flight wait for it and
    /// reuse the replacement instead of piling on logins.
    async fn reauthenticate(
        &self,
        stale: &Arc<dyn RemoteSession>,
    ) -> Result<Arc<dyn RemoteSession>, GatewayError> {
        let _guard = self.reauth.lock().await;
        {
            let current = self.session.read().await;
            if !Arc::ptr_eq(&*current, stale) {
                return Ok(current.clone());
            }
        }
        log::info!("re-authenticating instance {} after idle logout", self.instance_id);
        let fresh: Arc<dyn RemoteSession> = Arc::from(self.connector.connect(&self.profile).await?);
        let old = {
            let mut slot = self.session.write().await;
            std::mem::replace(&mut *slot, fresh.clone())
        };
        old.logout().await;
        Ok(fresh)
    }
}

/// A cheap, clonable wrapper over a pooled entry. Handles carry no
/// connection state of their own; dropping one releases nothing.
#[derive(Clone)]
pub struct Handle {
    entry: Arc<PoolEntry>,
}

// Manual impl: the entry holds trait objects.
impl std::fmt::Debug for Handle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Handle")
            .field("instance_id", &self.entry.instance_id)
            .field("generation", &self.entry.generation)
            .finish_non_exhaustive()
    }
}

impl Handle {
    pub fn instance_id(&self) -> Uuid {
        self.entry.instance_id
    }

    /// Cache generation of the underlying entry; bumps on every reconnect.
    pub fn generation(&self) -> u64 {
        self.entry.generation
    }

    pub async fn list_services(&self) -> Result<Vec<String>, GatewayError> {
        self.entry.limiter.acquire(self.entry.call_timeout()).await?;
        let session = self.entry.current_session().await;
        match bounded(self.entry.call_timeout(), session.list_services()).await {
            Err(GatewayError::AuthExpired(_)) if self.entry.profile.retry_on_idle_logout => {
                let session = self.entry.reauthenticate(&session).await?;
                bounded(self.entry.call_timeout(), session.list_services()).await
            }
            other => other,
        }
    }

    pub async fn describe_service(&self, service: &str) -> Result<ServiceDetail, GatewayError> {
        self.entry.limiter.acquire(self.entry.call_timeout()).await?;
        let session = self.entry.current_session().await;
        match bounded(self.entry.call_timeout(), session.describe_service(service)).await {
            Err(GatewayError::AuthExpired(_)) if self.entry.profile.retry_on_idle_logout => {
                let session = self.entry.reauthenticate(&session).await?;
                bounded(self.entry.call_timeout(), session.describe_service(service)).await
            }
            other => other,
        }
    }

    /// Invoke a remote method: rate-limit admission, instance timeout, and
    /// at most one transparent re-auth retry. A second failure surfaces.
    pub async fn invoke(
        &self,
        service: &str,
        method: &str,
        args: &Map<String, Value>,
    ) -> Result<Value, GatewayError> {
        self.entry.limiter.acquire(self.entry.call_timeout()).await?;
        let session = self.entry.current_session().await;
        match bounded(self.entry.call_timeout(), session.invoke(service, method, args)).await {
            Err(GatewayError::AuthExpired(_)) if self.entry.profile.retry_on_idle_logout => {
                let session = self.entry.reauthenticate(&session).await?;
                bounded(self.entry.call_timeout(), session.invoke(service, method, args)).await
            }
            other => other,
        }
    }

    pub async fn snapshot(&self) -> Option<Vec<ServiceDetail>> {
        self.entry.snapshot.read().await.clone()
    }

    pub async fn store_snapshot(&self, services: Vec<ServiceDetail>) {
        *self.entry.snapshot.write().await = Some(services);
    }
}

async fn bounded<T>(
    limit: Duration,
    fut: impl Future<Output = Result<T, GatewayError>>,
) -> Result<T, GatewayError> {
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| GatewayError::UpstreamTimeout)?
}

#[derive(Debug, Clone, Serialize)]
pub struct RebuildReport {
    pub was_connected: bool,
    pub reconnected: bool,
    pub generation: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolStatus {
    pub active_connections: usize,
    pub connections: Vec<PoolConnectionStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolConnectionStatus {
    pub instance_id: Uuid,
    pub generation: u64,
    pub connected_at: DateTime<Utc>,
    pub age_secs: u64,
}

impl<S: InstanceStore> ClientPool<S> {
    pub fn new(store: Arc<S>, vault: Arc<CredentialVault>, connector: Arc<dyn RemoteConnector>) -> Self {
        Self {
            store,
            vault,
            connector,
            entries: RwLock::new(HashMap::new()),
            connect_locks: Mutex::new(HashMap::new()),
            generations: AtomicU64::new(0),
        }
    }

    /// Construct-or-return-cached. The first acquire for an instance
    /// decrypts credentials and authenticates; later acquires within the
    /// TTL share the cached session.
    pub async fn acquire(&self, instance_id: Uuid) -> Result<Handle, GatewayError> {
        let instance = self.load_instance(&instance_id).await?;
        if !instance.active {
            return Err(GatewayError::InstanceInactive(instance_id));
        }
        let ttl = Duration::from_secs(instance.cache_ttl_hours.max(0) as u64 * 3600);

        if let Some(entry) = self.fresh_entry(&instance_id, ttl).await {
            return Ok(Handle { entry });
        }

        let connect_lock = {
            let mut locks = self.connect_locks.lock().await;
            locks.entry(instance_id).or_default().clone()
        };
        let _guard = connect_lock.lock().await;

        // Someone else may have connected while we waited for the guard.
        if let Some(entry) = self.fresh_entry(&instance_id, ttl).await {
            return Ok(Handle { entry });
        }

        let entry = self.connect_entry(&instance).await?;
        let replaced = self.entries.write().await.insert(instance_id, entry.clone());
        if let Some(old) = replaced {
            log::info!("replacing expired session for instance {instance_id}");
            let session = old.current_session().await;
            tokio::spawn(async move { session.logout().await });
        }
        Ok(Handle { entry })
    }

    async fn fresh_entry(&self, instance_id: &Uuid, ttl: Duration) -> Option<Arc<PoolEntry>> {
        let entries = self.entries.read().await;
        entries
            .get(instance_id)
            .filter(|entry| entry.connected_at.elapsed() < ttl)
            .cloned()
    }

    async fn connect_entry(&self, instance: &Instance) -> Result<Arc<PoolEntry>, GatewayError> {
        let profile = instance.connection_profile(&self.vault)?;
        let session: Arc<dyn RemoteSession> = Arc::from(self.connector.connect(&profile).await?);
        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
        log::info!(
            "connected instance {} ({}) generation {}",
            instance.id,
            instance.name,
            generation
        );

        self.store
            .set_last_connected_at(&instance.id, Utc::now())
            .await
            .map_err(GatewayError::internal)?;

        Ok(Arc::new(PoolEntry {
            instance_id: instance.id,
            limiter: TokenBucket::new(profile.rate_limit_calls_per_second),
            profile,
            connector: self.connector.clone(),
            session: RwLock::new(session),
            reauth: Mutex::new(()),
            snapshot: RwLock::new(None),
            generation,
            connected_at: Instant::now(),
            connected_at_utc: Utc::now(),
        }))
    }

    /// Evict an instance's entry. In-flight calls hold their own `Arc` and
    /// complete; new acquires reconnect (or fail if the instance is
    /// inactive). Returns whether an entry existed.
    pub async fn invalidate(&self, instance_id: Uuid) -> bool {
        let removed = self.entries.write().await.remove(&instance_id);
        match removed {
            Some(entry) => {
                let session = entry.current_session().await;
                tokio::spawn(async move { session.logout().await });
                true
            }
            None => false,
        }
    }

    pub async fn invalidate_all(&self) {
        let drained: Vec<Arc<PoolEntry>> = self.entries.write().await.drain().map(|(_, e)| e).collect();
        for entry in drained {
            let session = entry.current_session().await;
            session.logout().await;
        }
    }

    /// Operator-forced refresh: evict the cached session and snapshot, then
    /// reconnect if the instance is active so activeness survives the
    /// rebuild. Reports whether a connection existed beforehand.
    pub async fn rebuild(&self, instance_id: Uuid) -> Result<RebuildReport, GatewayError> {
        let was_connected = self.invalidate(instance_id).await;
        let instance = self.load_instance(&instance_id).await?;
        if !instance.active {
            return Ok(RebuildReport {
                was_connected,
                reconnected: false,
                generation: None,
            });
        }
        let handle = self.acquire(instance_id).await?;
        Ok(RebuildReport {
            was_connected,
            reconnected: true,
            generation: Some(handle.generation()),
        })
    }

    pub async fn status(&self) -> PoolStatus {
        let entries = self.entries.read().await;
        let connections = entries
            .values()
            .map(|entry| PoolConnectionStatus {
                instance_id: entry.instance_id,
                generation: entry.generation,
                connected_at: entry.connected_at_utc,
                age_secs: entry.connected_at.elapsed().as_secs(),
            })
            .collect();
        PoolStatus {
            active_connections: entries.len(),
            connections,
        }
    }

    async fn load_instance(&self, instance_id: &Uuid) -> Result<Instance, GatewayError> {
        self.store
            .get_instance(instance_id)
            .await
            .map_err(GatewayError::internal)?
            .ok_or(GatewayError::InstanceNotFound(*instance_id))
    }
}
