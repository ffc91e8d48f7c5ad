//! Common test utilities
//!
//! Integration tests run against environment-provided databases:
//! `DATABASE_URL` for the central registry and
//! `PROVISIONER_DATABASE_URL` for tests that create real tenant
//! databases. Tests skip themselves when the environment is absent.

#![allow(dead_code)]

use campus_core::cache::{DomainCache, MemoryDomainCache};
use campus_core::config::TenantDbConfig;
use campus_core::crypto::EncryptionKey;
use campus_core::provisioner::TenantProvisioner;
use campus_core::repository::tenant::TenantRepositoryImpl;
use campus_core::repository::tenant_domain::DomainRepositoryImpl;
use campus_core::resolver::DomainResolver;
use campus_core::router::ConnectionRouter;
use campus_core::service::TenantService;
use sqlx::mysql::MySqlPoolOptions;
use sqlx::MySqlPool;
use std::sync::{Arc, Once};
use std::time::Duration;

static ENV_INIT: Once = Once::new();

/// Tests in one binary share the database; serialize them so cleanup
/// in one test cannot race another's assertions
static DB_LOCK: tokio::sync::Mutex<()> = tokio::sync::Mutex::const_new(());

pub async fn db_lock() -> tokio::sync::MutexGuard<'static, ()> {
    DB_LOCK.lock().await
}

fn init_env() {
    ENV_INIT.call_once(|| {
        let _ = dotenvy::dotenv();
    });
}

/// Central registry pool from `DATABASE_URL`, or an error describing
/// why the test should be skipped
pub async fn get_test_pool() -> Result<MySqlPool, String> {
    init_env();
    let url = std::env::var("DATABASE_URL").map_err(|_| "DATABASE_URL not set".to_string())?;

    MySqlPoolOptions::new()
        .max_connections(5)
        .acquire_timeout(Duration::from_secs(5))
        .connect(&url)
        .await
        .map_err(|e| e.to_string())
}

/// Apply the central registry schema (idempotent)
pub async fn setup_database(pool: &MySqlPool) -> Result<(), sqlx::Error> {
    sqlx::query(include_str!("../../migrations/0001_create_tenants.sql"))
        .execute(pool)
        .await?;
    sqlx::query(include_str!("../../migrations/0002_create_domains.sql"))
        .execute(pool)
        .await?;
    Ok(())
}

/// Remove all registry rows between tests
pub async fn cleanup_database(pool: &MySqlPool) -> Result<(), sqlx::Error> {
    sqlx::query("DELETE FROM domains").execute(pool).await?;
    sqlx::query("DELETE FROM tenants").execute(pool).await?;
    Ok(())
}

pub fn provisioner_url() -> Result<String, String> {
    init_env();
    std::env::var("PROVISIONER_DATABASE_URL")
        .map_err(|_| "PROVISIONER_DATABASE_URL not set".to_string())
}

pub fn test_key() -> EncryptionKey {
    EncryptionKey::new([0x42u8; 32])
}

pub fn tenant_db_config() -> TenantDbConfig {
    init_env();
    TenantDbConfig {
        host: std::env::var("TENANT_DB_HOST").unwrap_or_else(|_| "localhost".to_string()),
        port: std::env::var("TENANT_DB_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(3306),
        max_connections: 2,
    }
}

/// The full tenancy stack wired against real databases
pub struct TestStack {
    pub service: Arc<TenantService<TenantRepositoryImpl, DomainRepositoryImpl>>,
    pub router: Arc<ConnectionRouter>,
    pub resolver: Arc<DomainResolver<TenantRepositoryImpl>>,
    pub cache: Arc<dyn DomainCache>,
}

/// Build the stack, or explain why the test should be skipped
pub async fn build_stack(pool: &MySqlPool, central_domains: &[String]) -> Result<TestStack, String> {
    let admin_url = provisioner_url()?;
    let provisioner = TenantProvisioner::new(&admin_url)
        .await
        .map_err(|e| format!("provisioner unavailable: {}", e))?;

    let key = test_key();
    let cache: Arc<dyn DomainCache> = Arc::new(MemoryDomainCache::new(Duration::from_secs(60)));

    let tenant_repo = Arc::new(TenantRepositoryImpl::new(pool.clone()));
    let domain_repo = Arc::new(DomainRepositoryImpl::new(pool.clone()));

    let router = Arc::new(ConnectionRouter::new(
        tenant_db_config(),
        key.clone(),
        pool.clone(),
    ));

    let resolver = Arc::new(DomainResolver::new(
        Arc::clone(&tenant_repo),
        Arc::clone(&cache),
        central_domains,
    ));

    let service = Arc::new(TenantService::new(
        tenant_repo,
        domain_repo,
        Arc::new(provisioner),
        Arc::clone(&router),
        Arc::clone(&cache),
        key,
    ));

    Ok(TestStack {
        service,
        router,
        resolver,
        cache,
    })
}
