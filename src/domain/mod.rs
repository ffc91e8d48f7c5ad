//! Domain models

pub mod common;
pub mod tenant;
pub mod tenant_domain;

pub use common::StringUuid;
pub use tenant::{CreateTenantInput, NewTenantRecord, Tenant, TenantStatus};
pub use tenant_domain::{AddDomainInput, TenantDomain};
