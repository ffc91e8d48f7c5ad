//! HTTP middleware for Campus Core
//!
//! - Client IP injection for direct (proxyless) connections
//! - The tenancy gate: per-request domain resolution, status
//!   enforcement, and connection binding

pub mod client_ip;
pub mod tenancy;

pub use client_ip::{extract_ip, inject_client_ip};
pub use tenancy::{require_central, tenancy_gate, GateState};
