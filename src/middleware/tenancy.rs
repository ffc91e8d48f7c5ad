//! Tenancy gate
//!
//! The per-request state machine: Unresolved -> CentralBound |
//! TenantBound | Rejected. Runs before any business handler, resolves
//! the Host header, enforces tenant status, binds the connection, and
//! stores the binding in the request's extensions. Rejections never
//! bind anything: an unknown host is a 404, a suspended school a 403,
//! and an unreachable tenant database (or registry outage, or a
//! credential that fails to decrypt) a 503.
//!
//! The binding is a per-request value - no global is mutated - so
//! concurrent requests to different schools cannot observe each other's
//! connection. It is released when the request's extensions drop, on
//! success, error, and cancellation alike.

use crate::middleware::client_ip::extract_ip;
use crate::repository::TenantRepository;
use crate::resolver::{DomainResolver, Resolution};
use crate::router::{ConnectionRouter, TenantContext};
use axum::http::header;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{info, warn};

/// State required by the tenancy gate
pub struct GateState<R: TenantRepository> {
    pub resolver: Arc<DomainResolver<R>>,
    pub router: Arc<ConnectionRouter>,
}

impl<R: TenantRepository> Clone for GateState<R> {
    fn clone(&self) -> Self {
        Self {
            resolver: Arc::clone(&self.resolver),
            router: Arc::clone(&self.router),
        }
    }
}

pub async fn tenancy_gate<R: TenantRepository + 'static>(
    State(state): State<GateState<R>>,
    mut request: Request,
    next: Next,
) -> Response {
    let host = request
        .headers()
        .get(header::HOST)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();
    let ip = extract_ip(request.headers()).unwrap_or_else(|| "unknown".to_string());
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    let resolution = match state.resolver.resolve(&host).await {
        Ok(resolution) => resolution,
        Err(e) => {
            warn!(host = %host, ip = %ip, method = %method, path = %path, "Request rejected: {}", e);
            return e.into_response();
        }
    };

    let bound = match resolution {
        Resolution::Central => state.router.bind_central(),
        Resolution::Tenant(tenant) => {
            if tenant.is_suspended() {
                warn!(
                    host = %host,
                    ip = %ip,
                    tenant_id = %tenant.id,
                    "Request rejected: tenant suspended"
                );
                return crate::error::AppError::TenantSuspended(tenant.id.to_string())
                    .into_response();
            }
            match state.router.bind(&tenant).await {
                Ok(bound) => bound,
                Err(e) => {
                    warn!(
                        host = %host,
                        ip = %ip,
                        tenant_id = %tenant.id,
                        "Request rejected: {}",
                        e
                    );
                    return e.into_response();
                }
            }
        }
    };

    let scope = bound.scope();
    info!(
        host = %host,
        ip = %ip,
        method = %method,
        path = %path,
        scope = %scope,
        "Request bound"
    );

    request.extensions_mut().insert(TenantContext(Arc::new(bound)));
    next.run(request).await
}

/// Restrict a route tree to central-bound requests.
///
/// Administrative routes live on central domains only; from a tenant
/// domain they do not exist, so the rejection is a plain 404 rather
/// than a hint that the path is valid elsewhere.
pub async fn require_central(request: Request, next: Next) -> Response {
    let is_central = request
        .extensions()
        .get::<TenantContext>()
        .map(|ctx| ctx.tenant_id().is_none())
        .unwrap_or(false);

    if !is_central {
        return crate::error::AppError::NotFound("Not found".to_string()).into_response();
    }

    next.run(request).await
}
