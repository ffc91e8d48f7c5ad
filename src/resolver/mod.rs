//! Domain resolution
//!
//! Maps an inbound `Host` header to the owning tenant. Central
//! (administrative/marketing) hostnames short-circuit without touching
//! the registry. Tenant hostnames go through the domain cache for the
//! domain -> tenant-id edge, then read the tenant row fresh from the
//! registry so status changes are honored immediately.

use crate::cache::DomainCache;
use crate::domain::Tenant;
use crate::error::{AppError, Result};
use crate::repository::TenantRepository;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Outcome of resolving a hostname
#[derive(Debug, Clone)]
pub enum Resolution {
    /// Administrative/marketing hostname; request runs on the central database
    Central,
    /// Hostname owned by a tenant
    Tenant(Tenant),
}

/// Normalize a Host header value: lowercase, port stripped
pub fn normalize_host(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_port = if let Some(rest) = trimmed.strip_prefix('[') {
        // Bracketed IPv6 literal
        rest.split(']').next().unwrap_or(rest)
    } else {
        trimmed.split(':').next().unwrap_or(trimmed)
    };
    without_port.to_lowercase()
}

pub struct DomainResolver<R: TenantRepository> {
    repo: Arc<R>,
    cache: Arc<dyn DomainCache>,
    central_domains: HashSet<String>,
}

impl<R: TenantRepository> DomainResolver<R> {
    pub fn new(repo: Arc<R>, cache: Arc<dyn DomainCache>, central_domains: &[String]) -> Self {
        Self {
            repo,
            cache,
            central_domains: central_domains.iter().map(|d| d.to_lowercase()).collect(),
        }
    }

    /// Resolve a raw Host header value to a tenant or the central scope.
    ///
    /// Errors: `DomainNotFound` when no tenant owns the hostname,
    /// `ConnectionUnavailable` when the registry itself cannot be
    /// reached (translated to 503 at the gate, distinct from 404).
    pub async fn resolve(&self, raw_host: &str) -> Result<Resolution> {
        let host = normalize_host(raw_host);
        if host.is_empty() {
            return Err(AppError::DomainNotFound(raw_host.to_string()));
        }

        if self.central_domains.contains(&host) {
            debug!(host = %host, "Resolved central domain");
            return Ok(Resolution::Central);
        }

        // Cached edge: domain -> tenant id. A cache outage degrades to a
        // registry lookup rather than failing the request.
        let cached_id = match self.cache.get_tenant_id(&host).await {
            Ok(id) => id,
            Err(e) => {
                warn!(host = %host, "Domain cache read failed: {}", e);
                None
            }
        };

        if let Some(tenant_id) = cached_id {
            match self.repo.find_by_id(tenant_id).await {
                Ok(Some(tenant)) => return Ok(Resolution::Tenant(tenant)),
                // Tenant vanished since the entry was cached; drop the
                // entry and fall back to a domain lookup
                Ok(None) => {
                    let _ = self.cache.invalidate(&host).await;
                }
                Err(e) => return Err(registry_unavailable(e)),
            }
        }

        match self.repo.find_by_domain(&host).await {
            Ok(Some(tenant)) => {
                if let Err(e) = self.cache.set_tenant_id(&host, tenant.id).await {
                    debug!(host = %host, "Domain cache write failed: {}", e);
                }
                Ok(Resolution::Tenant(tenant))
            }
            Ok(None) => Err(AppError::DomainNotFound(host)),
            Err(e) => Err(registry_unavailable(e)),
        }
    }
}

/// A registry outage is infrastructure trouble, not a bad request
fn registry_unavailable(err: AppError) -> AppError {
    match err {
        AppError::Database(e) => {
            AppError::ConnectionUnavailable(format!("tenant registry unreachable: {}", e))
        }
        other => other,
    }
}
