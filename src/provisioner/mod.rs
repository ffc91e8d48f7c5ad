//! Tenant provisioning
//!
//! Creates and destroys the physical footprint of a tenant: the
//! database, its dedicated user, the schema, and the seeded
//! administrative account. All statements here run on the privileged
//! provisioner credential (`PROVISIONER_DATABASE_URL`); the per-tenant
//! user it creates receives data and schema privileges on its own
//! database only - no GRANT OPTION, no cross-database access, no
//! server-level DDL.
//!
//! MySQL cannot bind identifiers or CREATE USER passwords as
//! placeholders, so database names, usernames, and generated passwords
//! are restricted to safe alphabets and re-validated immediately before
//! interpolation.

pub mod schema;

use crate::domain::StringUuid;
use crate::error::{AppError, Result};
use anyhow::Context;
use argon2::{
    password_hash::{rand_core::OsRng, PasswordHasher, SaltString},
    Argon2,
};
use rand::distributions::Alphanumeric;
use rand::Rng;
use sqlx::mysql::{MySqlConnectOptions, MySqlPoolOptions};
use sqlx::{ConnectOptions, MySqlPool};
use std::str::FromStr;
use std::time::Duration;
use tracing::{error, info};

/// Total length budget keeps the username under MySQL's 32-char limit
const NAME_STEM_MAX: usize = 18;
const SUFFIX_LEN: usize = 6;
const PASSWORD_LEN: usize = 32;

/// Database name and user generated for a new tenant
///
/// Database and username are identical by construction: one
/// database/user pair per tenant.
#[derive(Debug, Clone)]
pub struct TenantIdentifiers {
    pub database_name: String,
    pub database_username: String,
}

/// Everything the provisioner needs to build a tenant's footprint
#[derive(Clone)]
pub struct ProvisionRequest {
    pub database_name: String,
    pub database_username: String,
    /// Plaintext database password; encrypted separately for the registry
    pub database_password: String,
    pub admin_name: String,
    pub admin_email: String,
    /// Placeholder login password, Argon2-hashed before insertion
    pub admin_password: String,
}

// Manual Debug: the request is the one place plaintext credentials
// exist, and they must not leak through error or mock output
impl std::fmt::Debug for ProvisionRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProvisionRequest")
            .field("database_name", &self.database_name)
            .field("database_username", &self.database_username)
            .field("database_password", &"[REDACTED]")
            .field("admin_name", &self.admin_name)
            .field("admin_email", &self.admin_email)
            .field("admin_password", &"[REDACTED]")
            .finish()
    }
}

/// Reduce a school name to a safe identifier stem: lowercase,
/// `[a-z0-9_]` only, runs of other characters collapsed to one `_`
pub fn sanitize_identifier(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut last_was_sep = true;
    for c in raw.to_lowercase().chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            out.push(c);
            last_was_sep = false;
        } else if !last_was_sep {
            out.push('_');
            last_was_sep = true;
        }
    }
    let trimmed = out.trim_matches('_');
    let mut stem: String = trimmed.chars().take(NAME_STEM_MAX).collect();
    while stem.ends_with('_') {
        stem.pop();
    }
    stem
}

/// Generate the database/user pair for a school name, e.g.
/// "Test Academy" -> `tenant_test_academy_ab12cd`
pub fn generate_identifiers(school_name: &str) -> TenantIdentifiers {
    let stem = sanitize_identifier(school_name);
    let stem = if stem.is_empty() { "school".to_string() } else { stem };

    let mut raw = [0u8; SUFFIX_LEN / 2];
    rand::thread_rng().fill(&mut raw);
    let suffix = hex::encode(raw);

    let name = format!("tenant_{}_{}", stem, suffix);
    TenantIdentifiers {
        database_name: name.clone(),
        database_username: name,
    }
}

/// Generate a database password from an interpolation-safe alphabet
pub fn generate_password() -> String {
    rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(PASSWORD_LEN)
        .map(char::from)
        .collect()
}

/// Re-check an identifier right before it is spliced into DDL
fn assert_safe_identifier(identifier: &str) -> Result<()> {
    let ok = !identifier.is_empty()
        && identifier.len() <= 64
        && identifier
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_');
    if ok {
        Ok(())
    } else {
        Err(AppError::BadRequest(format!(
            "Unsafe identifier '{}'",
            identifier
        )))
    }
}

/// Passwords are interpolated into CREATE USER, so only the generated
/// alphanumeric alphabet is accepted
fn assert_safe_password(password: &str) -> Result<()> {
    let ok = !password.is_empty() && password.chars().all(|c| c.is_ascii_alphanumeric());
    if ok {
        Ok(())
    } else {
        Err(AppError::BadRequest(
            "Database password contains characters outside the generated alphabet".to_string(),
        ))
    }
}

fn hash_admin_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| AppError::Internal(anyhow::anyhow!("Failed to hash admin password: {}", e)))?;
    Ok(hash.to_string())
}

/// Provisioning operations, abstracted so the tenant service's
/// orchestration can be tested without a live MySQL server
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Provisioner: Send + Sync {
    /// Create the tenant's database, user, schema, and seeded admin
    async fn provision(&self, request: &ProvisionRequest) -> Result<()>;
    /// Drop the tenant's database and dedicated user
    async fn teardown(&self, database_name: &str, username: &str) -> Result<()>;
    /// Reset the seeded administrative user's password
    async fn reset_admin_password(&self, database_name: &str, new_password: &str) -> Result<()>;
}

pub struct TenantProvisioner {
    admin_url: String,
    admin_pool: MySqlPool,
}

impl TenantProvisioner {
    /// Connect the privileged provisioning pool. Statement logging is
    /// disabled on tenant-scoped connections so seeded credentials
    /// never reach the logs.
    pub async fn new(admin_url: &str) -> Result<Self> {
        let pool = MySqlPoolOptions::new()
            .max_connections(2)
            .acquire_timeout(Duration::from_secs(10))
            .connect(admin_url)
            .await
            .map_err(|e| {
                AppError::ConnectionUnavailable(format!("provisioner database unreachable: {}", e))
            })?;

        Ok(Self {
            admin_url: admin_url.to_string(),
            admin_pool: pool,
        })
    }

    async fn database_exists(&self, database_name: &str) -> Result<bool> {
        let row: (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM information_schema.SCHEMATA WHERE SCHEMA_NAME = ?",
        )
        .bind(database_name)
        .fetch_one(&self.admin_pool)
        .await?;
        Ok(row.0 > 0)
    }

    async fn user_exists(&self, username: &str) -> Result<bool> {
        let row: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM mysql.user WHERE User = ?")
            .bind(username)
            .fetch_one(&self.admin_pool)
            .await?;
        Ok(row.0 > 0)
    }

    async fn provision_inner(&self, request: &ProvisionRequest) -> anyhow::Result<()> {
        let db = &request.database_name;
        let user = &request.database_username;

        sqlx::query(&format!(
            "CREATE DATABASE `{}` CHARACTER SET utf8mb4 COLLATE utf8mb4_unicode_ci",
            db
        ))
        .execute(&self.admin_pool)
        .await
        .context("create database")?;

        sqlx::query(&format!(
            "CREATE USER '{}'@'%' IDENTIFIED BY '{}'",
            user, request.database_password
        ))
        .execute(&self.admin_pool)
        .await
        .context("create database user")?;

        // Data and schema-migration privileges on the one database;
        // deliberately no GRANT OPTION and nothing server-wide
        sqlx::query(&format!(
            "GRANT SELECT, INSERT, UPDATE, DELETE, CREATE, DROP, INDEX, ALTER, REFERENCES, \
             CREATE TEMPORARY TABLES, LOCK TABLES ON `{}`.* TO '{}'@'%'",
            db, user
        ))
        .execute(&self.admin_pool)
        .await
        .context("grant tenant privileges")?;

        sqlx::query("FLUSH PRIVILEGES")
            .execute(&self.admin_pool)
            .await
            .context("flush privileges")?;

        let tenant_pool = self.database_pool(db)?;
        let result = self.migrate_and_seed(&tenant_pool, request).await;
        tenant_pool.close().await;
        result
    }

    async fn migrate_and_seed(
        &self,
        pool: &MySqlPool,
        request: &ProvisionRequest,
    ) -> anyhow::Result<()> {
        for (name, statement) in schema::TENANT_MIGRATIONS {
            sqlx::query(statement)
                .execute(pool)
                .await
                .with_context(|| format!("tenant migration {}", name))?;
        }

        let password_hash =
            hash_admin_password(&request.admin_password).map_err(|e| anyhow::anyhow!("{}", e))?;

        sqlx::query(
            r#"
            INSERT INTO users (id, name, email, password, role, must_change_password, created_at, updated_at)
            VALUES (?, ?, ?, ?, 'admin', TRUE, NOW(), NOW())
            "#,
        )
        .bind(StringUuid::new_v4())
        .bind(&request.admin_name)
        .bind(&request.admin_email)
        .bind(&password_hash)
        .execute(pool)
        .await
        .context("seed tenant admin user")?;

        Ok(())
    }

    async fn drop_footprint(&self, database_name: &str, username: &str) -> anyhow::Result<()> {
        sqlx::query(&format!("DROP DATABASE IF EXISTS `{}`", database_name))
            .execute(&self.admin_pool)
            .await
            .context("drop database")?;

        sqlx::query(&format!("DROP USER IF EXISTS '{}'@'%'", username))
            .execute(&self.admin_pool)
            .await
            .context("drop database user")?;

        Ok(())
    }

    /// Short-lived privileged pool scoped to one tenant database
    fn database_pool(&self, database_name: &str) -> Result<MySqlPool> {
        let options = MySqlConnectOptions::from_str(&self.admin_url)
            .map_err(|e| AppError::Internal(anyhow::anyhow!("Invalid provisioner URL: {}", e)))?
            .database(database_name)
            .disable_statement_logging();

        Ok(MySqlPoolOptions::new()
            .max_connections(1)
            .acquire_timeout(Duration::from_secs(10))
            .connect_lazy_with(options))
    }
}

#[async_trait::async_trait]
impl Provisioner for TenantProvisioner {
    /// Atomic from the caller's perspective: on any failure the
    /// partially created database and user are dropped before the error
    /// propagates. If that cleanup itself fails, the returned error is
    /// marked `manual_cleanup_required` and both failures are logged -
    /// a half-provisioned tenant is never silently left behind.
    async fn provision(&self, request: &ProvisionRequest) -> Result<()> {
        assert_safe_identifier(&request.database_name)?;
        assert_safe_identifier(&request.database_username)?;
        assert_safe_password(&request.database_password)?;

        // Refuse to proceed over existing artifacts: the cleanup path
        // below drops the database and user, and must only ever remove
        // what this provisioning run created
        if self.database_exists(&request.database_name).await? {
            return Err(AppError::Conflict(format!(
                "Database '{}' already exists",
                request.database_name
            )));
        }
        if self.user_exists(&request.database_username).await? {
            return Err(AppError::Conflict(format!(
                "Database user '{}' already exists",
                request.database_username
            )));
        }

        info!(database = %request.database_name, "Provisioning tenant database");

        match self.provision_inner(request).await {
            Ok(()) => {
                info!(database = %request.database_name, "Tenant database provisioned");
                Ok(())
            }
            Err(e) => {
                error!(database = %request.database_name, "Provisioning failed: {:#}", e);
                let manual_cleanup_required = match self
                    .drop_footprint(&request.database_name, &request.database_username)
                    .await
                {
                    Ok(()) => false,
                    Err(cleanup_err) => {
                        error!(
                            database = %request.database_name,
                            "Cleanup after failed provisioning also failed: {:#}",
                            cleanup_err
                        );
                        true
                    }
                };
                Err(AppError::Provisioning {
                    database: request.database_name.clone(),
                    message: format!("{:#}", e),
                    manual_cleanup_required,
                })
            }
        }
    }

    /// Used both for cleanup after failed provisioning and for tenant
    /// deletion. Errors propagate: residual infrastructure must be
    /// visible to operators, never swallowed.
    async fn teardown(&self, database_name: &str, username: &str) -> Result<()> {
        assert_safe_identifier(database_name)?;
        assert_safe_identifier(username)?;

        info!(database = %database_name, "Tearing down tenant database");
        self.drop_footprint(database_name, username)
            .await
            .map_err(|e| AppError::Deletion(format!("{:#}", e)))
    }

    /// Re-arms the must-change-on-first-login flag alongside the new hash
    async fn reset_admin_password(&self, database_name: &str, new_password: &str) -> Result<()> {
        assert_safe_identifier(database_name)?;
        let password_hash = hash_admin_password(new_password)?;

        let pool = self.database_pool(database_name)?;
        let result = sqlx::query(
            r#"
            UPDATE users
            SET password = ?, must_change_password = TRUE, updated_at = NOW()
            WHERE role = 'admin'
            ORDER BY created_at ASC
            LIMIT 1
            "#,
        )
        .bind(&password_hash)
        .execute(&pool)
        .await;
        pool.close().await;

        if result?.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "No administrative user in database '{}'",
                database_name
            )));
        }

        info!(database = %database_name, "Tenant admin password reset");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Test Academy", "test_academy")]
    #[case("Valley  Institute!", "valley_institute")]
    #[case("École; DROP TABLE--", "cole_drop_table")]
    #[case("___", "")]
    fn test_sanitize_identifier(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(sanitize_identifier(raw), expected);
    }

    #[test]
    fn test_generate_identifiers_shape() {
        let ids = generate_identifiers("Test Academy");
        assert!(ids.database_name.starts_with("tenant_test_academy_"));
        assert_eq!(ids.database_name, ids.database_username);
        // Username must fit MySQL's 32-character limit
        assert!(ids.database_username.len() <= 32);
        assert_safe_identifier(&ids.database_name).unwrap();
    }

    #[test]
    fn test_generate_identifiers_empty_name() {
        let ids = generate_identifiers("!!!");
        assert!(ids.database_name.starts_with("tenant_school_"));
    }

    #[test]
    fn test_generated_suffixes_differ() {
        let a = generate_identifiers("Test Academy");
        let b = generate_identifiers("Test Academy");
        assert_ne!(a.database_name, b.database_name);
    }

    #[test]
    fn test_generated_password_is_interpolation_safe() {
        let password = generate_password();
        assert_eq!(password.len(), PASSWORD_LEN);
        assert_safe_password(&password).unwrap();
    }

    #[test]
    fn test_assert_safe_identifier_rejects_injection() {
        for bad in ["a`; DROP DATABASE x", "name with space", "UPPER", "", "a-b"] {
            assert!(assert_safe_identifier(bad).is_err(), "accepted {:?}", bad);
        }
        assert!(assert_safe_identifier("tenant_test_academy_ab12cd").is_ok());
    }

    #[test]
    fn test_assert_safe_password_rejects_quotes() {
        assert!(assert_safe_password("abc'def").is_err());
        assert!(assert_safe_password("").is_err());
        assert!(assert_safe_password("Abc123XYZ").is_ok());
    }

    #[test]
    fn test_hash_admin_password_is_argon2() {
        let hash = hash_admin_password("placeholder").unwrap();
        assert!(hash.starts_with("$argon2"));
    }

    #[test]
    fn test_provision_request_debug_redacts_credentials() {
        let request = ProvisionRequest {
            database_name: "tenant_test_academy_ab12cd".to_string(),
            database_username: "tenant_test_academy_ab12cd".to_string(),
            database_password: "SuperSecretDbPassword1".to_string(),
            admin_name: "Administrator".to_string(),
            admin_email: "admin@schoola.test".to_string(),
            admin_password: "SuperSecretAdminPw1".to_string(),
        };

        let rendered = format!("{:?}", request);
        assert!(!rendered.contains("SuperSecret"));
        assert!(rendered.contains("[REDACTED]"));
        assert!(rendered.contains("tenant_test_academy_ab12cd"));
    }
}
