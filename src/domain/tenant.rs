//! Tenant domain model
//!
//! A tenant is one school with its own isolated MySQL database. The
//! registry row carries the connection credentials for that database;
//! the password column holds AES-256-GCM ciphertext and is excluded
//! from every serialized representation.

use super::common::StringUuid;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

/// Tenant status
///
/// Closed set: the request gate matches exhaustively on this enum, so a
/// new status cannot be introduced without revisiting every call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TenantStatus {
    #[default]
    Active,
    Suspended,
}

impl TenantStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TenantStatus::Active => "active",
            TenantStatus::Suspended => "suspended",
        }
    }
}

impl std::str::FromStr for TenantStatus {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "active" => Ok(TenantStatus::Active),
            "suspended" => Ok(TenantStatus::Suspended),
            _ => Err(format!("Unknown tenant status: {}", s)),
        }
    }
}

impl std::fmt::Display for TenantStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl sqlx::Type<sqlx::MySql> for TenantStatus {
    fn type_info() -> sqlx::mysql::MySqlTypeInfo {
        <String as sqlx::Type<sqlx::MySql>>::type_info()
    }

    fn compatible(ty: &sqlx::mysql::MySqlTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::MySql>>::compatible(ty)
    }
}

impl<'r> sqlx::Decode<'r, sqlx::MySql> for TenantStatus {
    fn decode(
        value: sqlx::mysql::MySqlValueRef<'r>,
    ) -> std::result::Result<Self, sqlx::error::BoxDynError> {
        let s: String = sqlx::Decode::<'r, sqlx::MySql>::decode(value)?;
        s.parse().map_err(|e: String| e.into())
    }
}

impl<'q> sqlx::Encode<'q, sqlx::MySql> for TenantStatus {
    fn encode_by_ref(
        &self,
        buf: &mut Vec<u8>,
    ) -> std::result::Result<sqlx::encode::IsNull, Box<dyn std::error::Error + Send + Sync>> {
        <&str as sqlx::Encode<sqlx::MySql>>::encode_by_ref(&self.as_str(), buf)
    }
}

/// Tenant entity
///
/// `database_password` is ciphertext and is never serialized; decryption
/// happens only inside the connection router immediately before use.
#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Tenant {
    pub id: StringUuid,
    pub name: String,
    pub database_name: String,
    pub database_username: String,
    #[serde(skip_serializing, default)]
    pub database_password: String,
    pub status: TenantStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tenant {
    pub fn is_suspended(&self) -> bool {
        self.status == TenantStatus::Suspended
    }
}

/// Fully prepared registry record, ready for insertion
///
/// Built by the tenant service after credential generation and
/// encryption; `database_password` is already ciphertext here.
#[derive(Debug, Clone)]
pub struct NewTenantRecord {
    pub id: StringUuid,
    pub name: String,
    pub database_name: String,
    pub database_username: String,
    pub database_password: String,
}

/// Input for creating a new tenant
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct CreateTenantInput {
    #[validate(length(min = 1, max = 255))]
    pub name: String,
    /// Primary domain registered alongside the tenant
    #[validate(custom(function = "validate_domain"))]
    pub domain: String,
}

/// Validate hostname format (lowercase labels separated by dots)
pub fn validate_domain(domain: &str) -> Result<(), validator::ValidationError> {
    if DOMAIN_REGEX.is_match(domain) {
        Ok(())
    } else {
        Err(validator::ValidationError::new("invalid_domain"))
    }
}

// Regex for hostname validation
lazy_static::lazy_static! {
    pub static ref DOMAIN_REGEX: regex::Regex = regex::Regex::new(
        r"^[a-z0-9]([a-z0-9-]*[a-z0-9])?(\.[a-z0-9]([a-z0-9-]*[a-z0-9])?)+$"
    )
    .unwrap();
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_status_parse() {
        assert_eq!("active".parse::<TenantStatus>().unwrap(), TenantStatus::Active);
        assert_eq!(
            "Suspended".parse::<TenantStatus>().unwrap(),
            TenantStatus::Suspended
        );
        assert!("deleted".parse::<TenantStatus>().is_err());
    }

    #[test]
    fn test_status_display_roundtrip() {
        for status in [TenantStatus::Active, TenantStatus::Suspended] {
            assert_eq!(status.to_string().parse::<TenantStatus>().unwrap(), status);
        }
    }

    #[test]
    fn test_password_never_serialized() {
        let tenant = Tenant {
            id: StringUuid::new_v4(),
            name: "Test Academy".to_string(),
            database_name: "tenant_test_academy_ab12cd".to_string(),
            database_username: "tenant_test_academy_ab12cd".to_string(),
            database_password: "ciphertext-goes-here".to_string(),
            status: TenantStatus::Active,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let json = serde_json::to_string(&tenant).unwrap();
        assert!(!json.contains("database_password"));
        assert!(!json.contains("ciphertext-goes-here"));
        assert!(json.contains("tenant_test_academy_ab12cd"));
    }

    #[test]
    fn test_domain_regex() {
        assert!(DOMAIN_REGEX.is_match("schoola.test"));
        assert!(DOMAIN_REGEX.is_match("my-school.example.com"));
        assert!(!DOMAIN_REGEX.is_match("UPPER.test"));
        assert!(!DOMAIN_REGEX.is_match("no_dots"));
        assert!(!DOMAIN_REGEX.is_match("-leading.test"));
    }
}
