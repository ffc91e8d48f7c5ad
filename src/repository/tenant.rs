//! Tenant repository

use crate::domain::{NewTenantRecord, StringUuid, Tenant, TenantStatus};
use crate::error::{AppError, Result};
use async_trait::async_trait;
use sqlx::MySqlPool;

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait TenantRepository: Send + Sync {
    async fn create(&self, record: &NewTenantRecord) -> Result<Tenant>;
    async fn find_by_id(&self, id: StringUuid) -> Result<Option<Tenant>>;
    /// Resolve a tenant through its domain mapping (single join; backed
    /// by the unique index on `domains.domain`)
    async fn find_by_domain(&self, domain: &str) -> Result<Option<Tenant>>;
    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<Tenant>>;
    async fn count(&self) -> Result<i64>;
    async fn update_status(&self, id: StringUuid, status: TenantStatus) -> Result<()>;
    async fn delete(&self, id: StringUuid) -> Result<()>;
}

pub struct TenantRepositoryImpl {
    pool: MySqlPool,
}

impl TenantRepositoryImpl {
    pub fn new(pool: MySqlPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl TenantRepository for TenantRepositoryImpl {
    async fn create(&self, record: &NewTenantRecord) -> Result<Tenant> {
        sqlx::query(
            r#"
            INSERT INTO tenants (id, name, database_name, database_username, database_password, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, 'active', NOW(), NOW())
            "#,
        )
        .bind(record.id)
        .bind(&record.name)
        .bind(&record.database_name)
        .bind(&record.database_username)
        .bind(&record.database_password)
        .execute(&self.pool)
        .await?;

        self.find_by_id(record.id)
            .await?
            .ok_or_else(|| AppError::Internal(anyhow::anyhow!("Failed to create tenant")))
    }

    async fn find_by_id(&self, id: StringUuid) -> Result<Option<Tenant>> {
        let tenant = sqlx::query_as::<_, Tenant>(
            r#"
            SELECT id, name, database_name, database_username, database_password, status, created_at, updated_at
            FROM tenants
            WHERE id = ?
            "#,
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(tenant)
    }

    async fn find_by_domain(&self, domain: &str) -> Result<Option<Tenant>> {
        let tenant = sqlx::query_as::<_, Tenant>(
            r#"
            SELECT t.id, t.name, t.database_name, t.database_username, t.database_password, t.status, t.created_at, t.updated_at
            FROM tenants t
            INNER JOIN domains d ON d.tenant_id = t.id
            WHERE d.domain = ?
            "#,
        )
        .bind(domain)
        .fetch_optional(&self.pool)
        .await?;

        Ok(tenant)
    }

    async fn list(&self, offset: i64, limit: i64) -> Result<Vec<Tenant>> {
        let tenants = sqlx::query_as::<_, Tenant>(
            r#"
            SELECT id, name, database_name, database_username, database_password, status, created_at, updated_at
            FROM tenants
            ORDER BY created_at DESC
            LIMIT ? OFFSET ?
            "#,
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await?;

        Ok(tenants)
    }

    async fn count(&self) -> Result<i64> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tenants")
            .fetch_one(&self.pool)
            .await?;
        Ok(row.0)
    }

    async fn update_status(&self, id: StringUuid, status: TenantStatus) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE tenants
            SET status = ?, updated_at = NOW()
            WHERE id = ?
            "#,
        )
        .bind(status)
        .bind(id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Tenant {} not found", id)));
        }

        Ok(())
    }

    async fn delete(&self, id: StringUuid) -> Result<()> {
        let result = sqlx::query("DELETE FROM tenants WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("Tenant {} not found", id)));
        }

        Ok(())
    }
}
