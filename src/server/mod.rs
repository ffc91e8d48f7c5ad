//! Server initialization and routing

use crate::api;
use crate::cache::{DomainCache, MemoryDomainCache, RedisDomainCache};
use crate::config::Config;
use crate::crypto::EncryptionKey;
use crate::middleware::{inject_client_ip, require_central, tenancy_gate, GateState};
use crate::provisioner::TenantProvisioner;
use crate::repository::tenant::TenantRepositoryImpl;
use crate::repository::tenant_domain::DomainRepositoryImpl;
use crate::resolver::DomainResolver;
use crate::router::ConnectionRouter;
use crate::service::TenantService;
use anyhow::{Context, Result};
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use sqlx::{mysql::MySqlPoolOptions, MySqlPool};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub db_pool: MySqlPool,
    pub cache: Arc<dyn DomainCache>,
    pub tenant_service: Arc<TenantService<TenantRepositoryImpl, DomainRepositoryImpl>>,
    pub gate: GateState<TenantRepositoryImpl>,
}

/// Wire repositories, cache, router, provisioner, and services
pub async fn build_state(config: Config) -> Result<AppState> {
    let db_pool = MySqlPoolOptions::new()
        .max_connections(config.database.max_connections)
        .min_connections(config.database.min_connections)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to central database")?;

    let key = EncryptionKey::from_env().context("TENANT_ENCRYPTION_KEY is required")?;

    let cache_ttl = Duration::from_secs(config.tenancy.domain_cache_ttl_secs);
    let cache: Arc<dyn DomainCache> = match &config.redis {
        Some(redis) => {
            info!("Using Redis domain cache");
            Arc::new(
                RedisDomainCache::new(&redis.url, cache_ttl)
                    .await
                    .map_err(|e| anyhow::anyhow!("Failed to connect to Redis: {}", e))?,
            )
        }
        None => {
            info!("REDIS_URL not set, using in-process domain cache");
            Arc::new(MemoryDomainCache::new(cache_ttl))
        }
    };

    let tenant_repo = Arc::new(TenantRepositoryImpl::new(db_pool.clone()));
    let domain_repo = Arc::new(DomainRepositoryImpl::new(db_pool.clone()));

    let connection_router = Arc::new(ConnectionRouter::new(
        config.tenant_db.clone(),
        key.clone(),
        db_pool.clone(),
    ));

    let provisioner = Arc::new(
        TenantProvisioner::new(&config.provisioner.url)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to initialize provisioner: {}", e))?,
    );

    let resolver = Arc::new(DomainResolver::new(
        Arc::clone(&tenant_repo),
        Arc::clone(&cache),
        &config.tenancy.central_domains,
    ));

    let tenant_service = Arc::new(TenantService::new(
        Arc::clone(&tenant_repo),
        Arc::clone(&domain_repo),
        provisioner,
        Arc::clone(&connection_router),
        Arc::clone(&cache),
        key,
    ));

    Ok(AppState {
        config: Arc::new(config),
        db_pool,
        cache,
        tenant_service,
        gate: GateState {
            resolver,
            router: connection_router,
        },
    })
}

/// Build the HTTP router.
///
/// Health endpoints sit outside the tenancy gate (probes carry no
/// meaningful Host header); everything else resolves and binds before
/// any handler runs. The admin API additionally requires the central
/// binding.
pub fn build_router(state: AppState) -> Router {
    let admin_api = Router::new()
        .route("/api/v1/tenants", get(api::tenant::list).post(api::tenant::create))
        .route(
            "/api/v1/tenants/{id}",
            get(api::tenant::get).delete(api::tenant::delete),
        )
        .route("/api/v1/tenants/{id}/suspend", post(api::tenant::suspend))
        .route("/api/v1/tenants/{id}/activate", post(api::tenant::activate))
        .route(
            "/api/v1/tenants/{id}/admin-password",
            post(api::tenant::reset_admin_password),
        )
        .route(
            "/api/v1/tenants/{id}/domains",
            get(api::tenant::list_domains).post(api::tenant::add_domain),
        )
        .route(
            "/api/v1/tenants/{id}/domains/{domain_id}",
            delete(api::tenant::remove_domain),
        )
        .layer(middleware::from_fn(require_central));

    // Unmatched paths still pass through the gate: every request is
    // resolved, status-checked, bound, and logged, whether or not a
    // route exists for it. Downstream school-facing routers merge in
    // here and read the binding from their request extensions.
    let gated = admin_api
        .fallback(unmatched)
        .layer(middleware::from_fn_with_state(
            state.gate.clone(),
            tenancy_gate::<TenantRepositoryImpl>,
        ));

    Router::new()
        .route("/health", get(api::health::health))
        .route("/ready", get(api::health::ready))
        .merge(gated)
        .layer(middleware::from_fn(inject_client_ip))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn unmatched() -> crate::error::AppError {
    crate::error::AppError::NotFound("Not found".to_string())
}

/// Run migrations, build state, and serve until shutdown
pub async fn run(config: Config) -> Result<()> {
    crate::migration::run_migrations(&config).await?;

    let addr = config.http_addr();
    let state = build_state(config).await?;
    let app = build_router(state);

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;

    info!("Listening on {}", addr);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}
