//! Domain resolution cache
//!
//! Caches only the domain -> tenant-id edge, never the tenant row:
//! status and credentials are always read through to the registry so a
//! suspend or credential rotation takes effect for new requests without
//! waiting out a TTL. Entries expire after a bounded TTL so domain
//! remaps propagate within minutes, and every domain write invalidates
//! its entry eagerly.

use crate::domain::StringUuid;
use crate::error::Result;
use async_trait::async_trait;
use redis::{aio::ConnectionManager, AsyncCommands};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

/// Cache key prefix
const DOMAIN_KEY: &str = "campus:domain";

/// Cache operations for the domain -> tenant-id edge
#[async_trait]
pub trait DomainCache: Send + Sync {
    async fn get_tenant_id(&self, domain: &str) -> Result<Option<StringUuid>>;
    async fn set_tenant_id(&self, domain: &str, tenant_id: StringUuid) -> Result<()>;
    async fn invalidate(&self, domain: &str) -> Result<()>;
    async fn ping(&self) -> Result<()>;
}

/// Redis-backed domain cache
#[derive(Clone)]
pub struct RedisDomainCache {
    conn: ConnectionManager,
    ttl: Duration,
}

impl RedisDomainCache {
    pub async fn new(url: &str, ttl: Duration) -> Result<Self> {
        let client = redis::Client::open(url)?;
        let conn = ConnectionManager::new(client).await?;
        Ok(Self { conn, ttl })
    }

    fn key(domain: &str) -> String {
        format!("{}:{}", DOMAIN_KEY, domain)
    }
}

#[async_trait]
impl DomainCache for RedisDomainCache {
    async fn get_tenant_id(&self, domain: &str) -> Result<Option<StringUuid>> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(Self::key(domain)).await?;
        // A corrupt entry is treated as a miss; the resolver repopulates it
        Ok(value.and_then(|v| v.parse().ok()))
    }

    async fn set_tenant_id(&self, domain: &str, tenant_id: StringUuid) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn
            .set_ex(Self::key(domain), tenant_id.to_string(), self.ttl.as_secs())
            .await?;
        Ok(())
    }

    async fn invalidate(&self, domain: &str) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: () = conn.del(Self::key(domain)).await?;
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        let mut conn = self.conn.clone();
        let _: String = redis::cmd("PING").query_async(&mut conn).await?;
        Ok(())
    }
}

/// In-process domain cache with per-entry expiry
///
/// Used when no `REDIS_URL` is configured, and in tests. Expired entries
/// are dropped lazily on read and swept on write.
pub struct MemoryDomainCache {
    entries: RwLock<HashMap<String, (StringUuid, Instant)>>,
    ttl: Duration,
}

impl MemoryDomainCache {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl,
        }
    }
}

#[async_trait]
impl DomainCache for MemoryDomainCache {
    async fn get_tenant_id(&self, domain: &str) -> Result<Option<StringUuid>> {
        let entries = self.entries.read().await;
        match entries.get(domain) {
            Some((tenant_id, expires_at)) if *expires_at > Instant::now() => Ok(Some(*tenant_id)),
            _ => Ok(None),
        }
    }

    async fn set_tenant_id(&self, domain: &str, tenant_id: StringUuid) -> Result<()> {
        let mut entries = self.entries.write().await;
        let now = Instant::now();
        entries.retain(|_, (_, expires_at)| *expires_at > now);
        entries.insert(domain.to_string(), (tenant_id, now + self.ttl));
        Ok(())
    }

    async fn invalidate(&self, domain: &str) -> Result<()> {
        self.entries.write().await.remove(domain);
        Ok(())
    }

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_cache_set_and_get() {
        let cache = MemoryDomainCache::new(Duration::from_secs(60));
        let tenant_id = StringUuid::new_v4();

        cache.set_tenant_id("schoola.test", tenant_id).await.unwrap();
        assert_eq!(
            cache.get_tenant_id("schoola.test").await.unwrap(),
            Some(tenant_id)
        );
        assert_eq!(cache.get_tenant_id("schoolb.test").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_cache_expiry() {
        let cache = MemoryDomainCache::new(Duration::from_millis(20));
        let tenant_id = StringUuid::new_v4();

        cache.set_tenant_id("schoola.test", tenant_id).await.unwrap();
        tokio::time::sleep(Duration::from_millis(40)).await;
        assert_eq!(cache.get_tenant_id("schoola.test").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_memory_cache_invalidate() {
        let cache = MemoryDomainCache::new(Duration::from_secs(60));
        let tenant_id = StringUuid::new_v4();

        cache.set_tenant_id("schoola.test", tenant_id).await.unwrap();
        cache.invalidate("schoola.test").await.unwrap();
        assert_eq!(cache.get_tenant_id("schoola.test").await.unwrap(), None);
    }

    #[test]
    fn test_redis_key_format() {
        assert_eq!(
            RedisDomainCache::key("schoola.test"),
            "campus:domain:schoola.test"
        );
    }
}
