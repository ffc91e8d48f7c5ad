//! Data access layer (Repository pattern)

pub mod tenant;
pub mod tenant_domain;

pub use tenant::TenantRepository;
pub use tenant_domain::DomainRepository;
