//! Domain-mapping repository

use crate::domain::{StringUuid, TenantDomain};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use sqlx::MySqlPool;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DomainRepository: Send + Sync {
    async fn create(
        &self,
        tenant_id: StringUuid,
        domain: &str,
        is_primary: bool,
    ) -> Result<TenantDomain>;
    async fn find_by_domain(&self, domain: &str) -> Result<Option<TenantDomain>>;
    async fn list_for_tenant(&self, tenant_id: StringUuid) -> Result<Vec<TenantDomain>>;
    /// Demote an existing primary before promoting another domain
    async fn clear_primary(&self, tenant_id: StringUuid) -> Result<()>;
    async fn delete(&self, id: StringUuid) -> Result<()>;
    async fn delete_for_tenant(&self, tenant_id: StringUuid) -> Result<()>;
}

pub struct DomainRepositoryImpl {
    pool: MySqlPool,
}

impl DomainRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }

    async fn find_by_id(&self, id: StringUuid) -> Result<Option<TenantDomain>> {
        let domain = sqlx::query_as::<_, TenantDomain>(
            r#"
            SELECT id, tenant_id, domain, is_primary, created_at, updated_at
            FROM domains
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(domain)
    }
}

#[async_trait]
impl DomainRepository for DomainRepositoryImpl {
    async fn create(
        &self,
        tenant_id: StringUuid,
        domain: &str,
        is_primary: bool,
    ) -> Result<TenantDomain> {
        let id = StringUuid::new_v4();

        sqlx::query(
            r#"
            INSERT INTO domains (id, tenant_id, domain, is_primary, created_at, updated_at)
            VALUES (?, ?, ?, ?, NOW(), NOW())
            "#,
        )
        .bind(id)
        .bind(tenant_id)
        .bind(domain)
        .bind(is_primary)
        .execute(&self.pool)
        .await?;

        self.find_by_id(id)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to create domain")))
    }

    async fn find_by_domain(&self, domain: &str) -> Result<Option<TenantDomain>> {
        let mapping = sqlx::query_as::<_, TenantDomain>(
            r#"
            SELECT id, tenant_id, domain, is_primary, created_at, updated_at
            FROM domains
            WHERE domain = ?
            "#,
        )
        .bind(domain)
        .fetch_optional(&self.pool)
        .await?;

        Ok(mapping)
    }

    async fn list_for_tenant(&self, tenant_id: StringUuid) -> Result<Vec<TenantDomain>> {
        let domains = sqlx::query_as::<_, TenantDomain>(
            r#"
            SELECT id, tenant_id, domain, is_primary, created_at, updated_at
            FROM domains
            WHERE tenant_id = ?
            ORDER BY is_primary DESC, domain ASC
            "#,
        )
        .bind(tenant_id)
        .fetch_all(&self.pool)
        .await?;

        Ok(domains)
    }

    async fn clear_primary(&self, tenant_id: StringUuid) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE domains
            SET is_primary = FALSE, updated_at = NOW()
            WHERE tenant_id = ? AND is_primary = TRUE
            "#,
        )
        .bind(tenant_id)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn delete(&self, id: StringUuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM domains WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Domain {} not found", id)));
        }

        Ok(())
    }

    async fn delete_for_tenant(&self, tenant_id: StringUuid) -> Result<()> {
        sqlx::query("DELETE FROM domains WHERE tenant_id = ?")
            .bind(tenant_id)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockall::predicate::*;

    #[tokio::test]
    async fn test_mock_domain_repository() {
        let mut mock = MockDomainRepository::new();
        let tenant_id = StringUuid::new_v4();

        mock.expect_list_for_tenant()
            .with(eq(tenant_id))
            .returning(|_| Ok(vec![]));

        let domains = mock.list_for_tenant(tenant_id).await.unwrap();
        assert!(domains.is_empty());
    }
}
