//! Connection routing
//!
//! Owns the switch from "which tenant is this?" to "which database does
//! this request talk to?". Every bind hands back a [`BoundConnection`]
//! value that travels inside that request's extensions; there is no
//! process-wide current connection, so two concurrent requests bound to
//! different tenants can never observe each other's binding.
//!
//! Pools are cached per tenant id. A cached pool is pinged on every bind
//! and rebuilt once if the ping fails, so a misconfigured or unreachable
//! tenant database fails fast with `ConnectionUnavailable` instead of
//! surfacing later as an arbitrary query error.

use crate::config::TenantDbConfig;
use crate::crypto::{self, EncryptionKey};
use crate::domain::{StringUuid, Tenant};
use crate::error::{AppError, Result};
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::MySqlPool;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};

const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

/// Which database a request is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionScope {
    /// Shared administrative database (registry, domains, admin API)
    Central,
    /// One tenant's isolated database
    Tenant(StringUuid),
}

impl std::fmt::Display for ConnectionScope {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectionScope::Central => f.write_str("central"),
            ConnectionScope::Tenant(id) => write!(f, "tenant:{}", id),
        }
    }
}

/// A live binding between one request and one database
///
/// Dropped exactly when the owning request finishes (success, error, or
/// cancellation), which releases the binding and logs the release.
#[derive(Debug)]
pub struct BoundConnection {
    scope: ConnectionScope,
    pool: MySqlPool,
}

impl BoundConnection {
    pub fn scope(&self) -> ConnectionScope {
        self.scope
    }

    pub fn tenant_id(&self) -> Option<StringUuid> {
        match self.scope {
            ConnectionScope::Tenant(id) => Some(id),
            ConnectionScope::Central => None,
        }
    }

    pub fn pool(&self) -> &MySqlPool {
        &self.pool
    }
}

impl Drop for BoundConnection {
    fn drop(&mut self) {
        debug!(scope = %self.scope, "Connection binding released");
    }
}

/// Request-scoped tenancy context carried in axum extensions
///
/// Cloning shares the same underlying binding; the release fires when
/// the last clone is dropped at the end of the request.
#[derive(Clone)]
pub struct TenantContext(pub Arc<BoundConnection>);

impl std::ops::Deref for TenantContext {
    type Target = BoundConnection;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

pub struct ConnectionRouter {
    tenant_db: TenantDbConfig,
    key: EncryptionKey,
    central: MySqlPool,
    pools: RwLock<HashMap<StringUuid, MySqlPool>>,
}

impl ConnectionRouter {
    pub fn new(tenant_db: TenantDbConfig, key: EncryptionKey, central: MySqlPool) -> Self {
        Self {
            tenant_db,
            key,
            central,
            pools: RwLock::new(HashMap::new()),
        }
    }

    /// Bind a request to a tenant's database.
    ///
    /// Decrypts the tenant's credentials, acquires (or reuses) the
    /// tenant pool, and verifies reachability with a ping before
    /// declaring success. Every failure maps to
    /// `ConnectionUnavailable` - the 503 class, distinct from 404.
    pub async fn bind(&self, tenant: &Tenant) -> Result<BoundConnection> {
        if let Some(pool) = self.cached_pool(tenant.id).await {
            if ping(&pool).await.is_ok() {
                return Ok(self.bound(tenant.id, pool));
            }
            // Stale pool (server restart, credential rotation): rebuild once
            debug!(tenant_id = %tenant.id, "Cached tenant pool failed ping, rebuilding");
            self.evict(tenant.id).await;
        }

        let pool = self.build_pool(tenant)?;
        ping(&pool).await.map_err(|e| {
            AppError::ConnectionUnavailable(format!(
                "tenant database '{}' unreachable: {}",
                tenant.database_name, e
            ))
        })?;

        let pool = self.store_pool(tenant.id, pool).await;
        Ok(self.bound(tenant.id, pool))
    }

    /// Bind a request to the shared central database
    pub fn bind_central(&self) -> BoundConnection {
        BoundConnection {
            scope: ConnectionScope::Central,
            pool: self.central.clone(),
        }
    }

    /// Drop a tenant's cached pool. Called on suspend, delete, and
    /// credential rotation so no connection outlives the tenant state
    /// it was built from.
    pub async fn evict(&self, tenant_id: StringUuid) {
        let removed = self.pools.write().await.remove(&tenant_id);
        if let Some(pool) = removed {
            info!(tenant_id = %tenant_id, "Evicting tenant connection pool");
            pool.close().await;
        }
    }

    async fn cached_pool(&self, tenant_id: StringUuid) -> Option<MySqlPool> {
        self.pools.read().await.get(&tenant_id).cloned()
    }

    /// Insert a freshly built pool, deferring to a concurrent bind that
    /// won the race
    async fn store_pool(&self, tenant_id: StringUuid, pool: MySqlPool) -> MySqlPool {
        let mut pools = self.pools.write().await;
        if let Some(existing) = pools.get(&tenant_id).cloned() {
            drop(pools);
            pool.close().await;
            existing
        } else {
            pools.insert(tenant_id, pool.clone());
            pool
        }
    }

    fn build_pool(&self, tenant: &Tenant) -> Result<MySqlPool> {
        // The only place tenant credentials are ever decrypted; the
        // plaintext lives inside the connect options and nowhere else
        let password = crypto::decrypt(&self.key, &tenant.database_password).map_err(|_| {
            AppError::ConnectionUnavailable(format!(
                "credential decryption failed for tenant {}",
                tenant.id
            ))
        })?;

        let options = MySqlConnectOptions::new()
            .host(&self.tenant_db.host)
            .port(self.tenant_db.port)
            .database(&tenant.database_name)
            .username(&tenant.database_username)
            .password(&password);

        Ok(MySqlPoolOptions::new()
            .max_connections(self.tenant_db.max_connections)
            .acquire_timeout(ACQUIRE_TIMEOUT)
            .connect_lazy_with(options))
    }

    fn bound(&self, tenant_id: StringUuid, pool: MySqlPool) -> BoundConnection {
        BoundConnection {
            scope: ConnectionScope::Tenant(tenant_id),
            pool,
        }
    }
}

async fn ping(pool: &MySqlPool) -> std::result::Result<(), sqlx::Error> {
    sqlx::query("SELECT 1").execute(pool).await.map(|_| ())
}
