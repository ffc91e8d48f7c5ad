//! Domain-mapping entity
//!
//! One row per hostname a tenant answers on. A tenant may have several
//! domains but at most one marked primary; the `domain` column is
//! globally unique so a hostname resolves to at most one tenant.

use super::common::StringUuid;
use super::tenant::validate_domain;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Hostname -> tenant mapping
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct TenantDomain {
    pub id: StringUuid,
    pub tenant_id: StringUuid,
    pub domain: String,
    pub is_primary: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Input for attaching a domain to an existing tenant
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct AddDomainInput {
    #[validate(custom(function = "validate_domain"))]
    pub domain: String,
    #[serde(default)]
    pub is_primary: bool,
}
