//! Tenant lifecycle orchestration
//!
//! Owns the ordering guarantees around tenant creation and deletion:
//! a tenant is either fully provisioned (registry row, domain, database,
//! user, schema, seeded admin) or absent - never half-built. Deletion
//! destroys infrastructure before the registry row because the
//! credentials needed to manage that infrastructure live on the row.

use crate::cache::DomainCache;
use crate::crypto::{self, EncryptionKey};
use crate::domain::{
    AddDomainInput, CreateTenantInput, NewTenantRecord, StringUuid, Tenant, TenantDomain,
    TenantStatus,
};
use crate::error::{AppError, Result};
use crate::provisioner::{self, ProvisionRequest, Provisioner};
use crate::repository::{DomainRepository, TenantRepository};
use crate::router::ConnectionRouter;
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use validator::Validate;

/// Result of a successful tenant creation
///
/// Carries the placeholder admin credentials exactly once; they are not
/// retrievable afterwards and must be changed on first login.
#[derive(Debug, Serialize)]
pub struct ProvisionedTenant {
    pub tenant: Tenant,
    pub admin_email: String,
    pub admin_initial_password: String,
}

pub struct TenantService<R: TenantRepository, D: DomainRepository> {
    repo: Arc<R>,
    domain_repo: Arc<D>,
    provisioner: Arc<dyn Provisioner>,
    router: Arc<ConnectionRouter>,
    cache: Arc<dyn DomainCache>,
    key: EncryptionKey,
}

impl<R: TenantRepository, D: DomainRepository> TenantService<R, D> {
    pub fn new(
        repo: Arc<R>,
        domain_repo: Arc<D>,
        provisioner: Arc<dyn Provisioner>,
        router: Arc<ConnectionRouter>,
        cache: Arc<dyn DomainCache>,
        key: EncryptionKey,
    ) -> Self {
        Self {
            repo,
            domain_repo,
            provisioner,
            router,
            cache,
            key,
        }
    }

    /// Create and provision a tenant.
    ///
    /// Registry row and domain are written first (provisioning reads
    /// nothing back from them, but the rollback path needs them gone on
    /// failure); any provisioning error unwinds both so the caller
    /// never observes a partial tenant.
    pub async fn create(&self, input: CreateTenantInput) -> Result<ProvisionedTenant> {
        input.validate()?;
        let domain = input.domain.to_lowercase();

        if self.domain_repo.find_by_domain(&domain).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "Domain '{}' is already registered",
                domain
            )));
        }

        let identifiers = provisioner::generate_identifiers(&input.name);
        let database_password = provisioner::generate_password();
        let encrypted_password = crypto::encrypt(&self.key, &database_password)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to encrypt credential: {}", e)))?;

        let record = NewTenantRecord {
            id: StringUuid::new_v4(),
            name: input.name.clone(),
            database_name: identifiers.database_name.clone(),
            database_username: identifiers.database_username.clone(),
            database_password: encrypted_password,
        };

        let tenant = self.repo.create(&record).await?;

        if let Err(e) = self.domain_repo.create(tenant.id, &domain, true).await {
            self.rollback_registry(tenant.id, &domain).await;
            return Err(e);
        }

        let admin_email = format!("admin@{}", domain);
        let admin_initial_password = provisioner::generate_password();
        let request = ProvisionRequest {
            database_name: identifiers.database_name,
            database_username: identifiers.database_username,
            database_password,
            admin_name: "Administrator".to_string(),
            admin_email: admin_email.clone(),
            admin_password: admin_initial_password.clone(),
        };

        if let Err(e) = self.provisioner.provision(&request).await {
            // The provisioner already dropped its own footprint; unwind
            // the registry so no partial tenant is observable
            self.rollback_registry(tenant.id, &domain).await;
            return Err(e);
        }

        info!(tenant_id = %tenant.id, domain = %domain, "Tenant created");
        Ok(ProvisionedTenant {
            tenant,
            admin_email,
            admin_initial_password,
        })
    }

    pub async fn get(&self, id: StringUuid) -> Result<Tenant> {
        self.repo
            .find_by_id(id)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Tenant {} not found", id)))
    }

    pub async fn list(&self, page: i64, per_page: i64) -> Result<(Vec<Tenant>, i64)> {
        let offset = (page - 1) * per_page;
        let tenants = self.repo.list(offset, per_page).await?;
        let total = self.repo.count().await?;
        Ok((tenants, total))
    }

    /// Block all traffic on the tenant's domains. Takes effect for new
    /// requests immediately: status is read through on every request,
    /// and the cached connection pool is evicted.
    pub async fn suspend(&self, id: StringUuid) -> Result<Tenant> {
        self.repo.update_status(id, TenantStatus::Suspended).await?;
        self.router.evict(id).await;
        info!(tenant_id = %id, "Tenant suspended");
        self.get(id).await
    }

    pub async fn activate(&self, id: StringUuid) -> Result<Tenant> {
        self.repo.update_status(id, TenantStatus::Active).await?;
        info!(tenant_id = %id, "Tenant activated");
        self.get(id).await
    }

    /// Delete a tenant and its entire footprint.
    ///
    /// Infrastructure goes first: the registry row holds the only copy
    /// of the credentials needed to manage it, so the row must outlive
    /// the database and user. A teardown failure therefore aborts the
    /// deletion with the registry intact for a retry.
    pub async fn delete(&self, id: StringUuid) -> Result<()> {
        let tenant = self.get(id).await?;
        let domains = self.domain_repo.list_for_tenant(id).await?;

        self.router.evict(id).await;
        self.provisioner
            .teardown(&tenant.database_name, &tenant.database_username)
            .await?;

        self.domain_repo.delete_for_tenant(id).await?;
        self.repo.delete(id).await?;

        for mapping in &domains {
            if let Err(e) = self.cache.invalidate(&mapping.domain).await {
                warn!(domain = %mapping.domain, "Failed to invalidate domain cache: {}", e);
            }
        }

        info!(tenant_id = %id, database = %tenant.database_name, "Tenant deleted");
        Ok(())
    }

    /// Reset the tenant's seeded admin password, either to a supplied
    /// value or to a fresh placeholder, and return it (shown once; the
    /// must-change-on-first-login flag is re-armed either way)
    pub async fn reset_admin_password(
        &self,
        id: StringUuid,
        password: Option<String>,
    ) -> Result<String> {
        if let Some(p) = &password {
            if p.len() < 12 {
                return Err(AppError::Validation(
                    "Admin password must be at least 12 characters".to_string(),
                ));
            }
        }

        let tenant = self.get(id).await?;
        let new_password = password.unwrap_or_else(provisioner::generate_password);
        self.provisioner
            .reset_admin_password(&tenant.database_name, &new_password)
            .await?;
        Ok(new_password)
    }

    pub async fn list_domains(&self, tenant_id: StringUuid) -> Result<Vec<TenantDomain>> {
        self.get(tenant_id).await?;
        self.domain_repo.list_for_tenant(tenant_id).await
    }

    pub async fn add_domain(
        &self,
        tenant_id: StringUuid,
        input: AddDomainInput,
    ) -> Result<TenantDomain> {
        input.validate()?;
        let domain = input.domain.to_lowercase();

        self.get(tenant_id).await?;
        if self.domain_repo.find_by_domain(&domain).await?.is_some() {
            return Err(AppError::Conflict(format!(
                "Domain '{}' is already registered",
                domain
            )));
        }

        if input.is_primary {
            self.domain_repo.clear_primary(tenant_id).await?;
        }

        let mapping = self
            .domain_repo
            .create(tenant_id, &domain, input.is_primary)
            .await?;

        // A remapped hostname may still sit in the cache from a
        // previous owner; clear it eagerly rather than waiting out TTL
        if let Err(e) = self.cache.invalidate(&domain).await {
            warn!(domain = %domain, "Failed to invalidate domain cache: {}", e);
        }

        info!(tenant_id = %tenant_id, domain = %domain, "Domain attached");
        Ok(mapping)
    }

    pub async fn remove_domain(&self, tenant_id: StringUuid, domain_id: StringUuid) -> Result<()> {
        let domains = self.domain_repo.list_for_tenant(tenant_id).await?;
        let mapping = domains
            .into_iter()
            .find(|d| d.id == domain_id)
            .ok_or_else(|| AppError::NotFound(format!("Domain {} not found", domain_id)))?;

        self.domain_repo.delete(domain_id).await?;
        if let Err(e) = self.cache.invalidate(&mapping.domain).await {
            warn!(domain = %mapping.domain, "Failed to invalidate domain cache: {}", e);
        }

        info!(tenant_id = %tenant_id, domain = %mapping.domain, "Domain detached");
        Ok(())
    }

    /// Best-effort unwind of the registry row and domain after a failed
    /// creation; failures are logged, not returned, so the original
    /// provisioning error stays visible
    async fn rollback_registry(&self, tenant_id: StringUuid, domain: &str) {
        if let Err(e) = self.domain_repo.delete_for_tenant(tenant_id).await {
            warn!(tenant_id = %tenant_id, "Rollback: failed to remove domain rows: {}", e);
        }
        if let Err(e) = self.repo.delete(tenant_id).await {
            warn!(tenant_id = %tenant_id, "Rollback: failed to remove tenant row: {}", e);
        }
        if let Err(e) = self.cache.invalidate(domain).await {
            warn!(domain = %domain, "Rollback: failed to invalidate domain cache: {}", e);
        }
    }
}
