//! Tenant administration handlers
//!
//! Tenant serialization excludes database credentials by construction
//! (see the domain model); these handlers never see plaintext passwords
//! other than the one-shot placeholder returned on create/reset.

use crate::api::{MessageResponse, PaginatedResponse, PaginationQuery, SuccessResponse};
use crate::domain::{AddDomainInput, CreateTenantInput, StringUuid};
use crate::error::Result;
use crate::server::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

/// List tenants
pub async fn list(
    State(state): State<AppState>,
    Query(pagination): Query<PaginationQuery>,
) -> Result<impl IntoResponse> {
    let (page, per_page) = pagination.clamped();
    let (tenants, total) = state.tenant_service.list(page, per_page).await?;

    Ok(Json(PaginatedResponse::new(tenants, page, per_page, total)))
}

/// Get tenant by ID
pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<StringUuid>,
) -> Result<impl IntoResponse> {
    let tenant = state.tenant_service.get(id).await?;
    Ok(Json(SuccessResponse::new(tenant)))
}

/// Create and provision a tenant
pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<CreateTenantInput>,
) -> Result<impl IntoResponse> {
    let provisioned = state.tenant_service.create(input).await?;
    Ok((StatusCode::CREATED, Json(SuccessResponse::new(provisioned))))
}

/// Delete a tenant and its database footprint
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<StringUuid>,
) -> Result<impl IntoResponse> {
    state.tenant_service.delete(id).await?;
    Ok(Json(MessageResponse::new("Tenant deleted")))
}

/// Suspend a tenant (blocks all its domain traffic)
pub async fn suspend(
    State(state): State<AppState>,
    Path(id): Path<StringUuid>,
) -> Result<impl IntoResponse> {
    let tenant = state.tenant_service.suspend(id).await?;
    Ok(Json(SuccessResponse::new(tenant)))
}

/// Reactivate a suspended tenant
pub async fn activate(
    State(state): State<AppState>,
    Path(id): Path<StringUuid>,
) -> Result<impl IntoResponse> {
    let tenant = state.tenant_service.activate(id).await?;
    Ok(Json(SuccessResponse::new(tenant)))
}

#[derive(Debug, Deserialize)]
pub struct ResetAdminPasswordInput {
    /// Supplied password; generated when absent
    pub password: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct AdminPasswordReset {
    pub admin_password: String,
}

/// Reset the tenant's seeded admin password
pub async fn reset_admin_password(
    State(state): State<AppState>,
    Path(id): Path<StringUuid>,
    Json(input): Json<ResetAdminPasswordInput>,
) -> Result<impl IntoResponse> {
    let admin_password = state
        .tenant_service
        .reset_admin_password(id, input.password)
        .await?;
    Ok(Json(SuccessResponse::new(AdminPasswordReset {
        admin_password,
    })))
}

/// List a tenant's domains
pub async fn list_domains(
    State(state): State<AppState>,
    Path(id): Path<StringUuid>,
) -> Result<impl IntoResponse> {
    let domains = state.tenant_service.list_domains(id).await?;
    Ok(Json(SuccessResponse::new(domains)))
}

/// Attach a domain to a tenant
pub async fn add_domain(
    State(state): State<AppState>,
    Path(id): Path<StringUuid>,
    Json(input): Json<AddDomainInput>,
) -> Result<impl IntoResponse> {
    let mapping = state.tenant_service.add_domain(id, input).await?;
    Ok((StatusCode::CREATED, Json(SuccessResponse::new(mapping))))
}

/// Detach a domain from a tenant
pub async fn remove_domain(
    State(state): State<AppState>,
    Path((id, domain_id)): Path<(StringUuid, StringUuid)>,
) -> Result<impl IntoResponse> {
    state.tenant_service.remove_domain(id, domain_id).await?;
    Ok(Json(MessageResponse::new("Domain removed")))
}
