//! # Tenant Model
//!
//! Core types for tenant bookkeeping.

use serde::{Deserialize, Serialize};

use super::errors::{ControlPlaneError, ControlPlaneResult};

/// Longest identifier the tenant database server keeps without truncation
pub const MAX_DATABASE_ID_LEN: usize = 63;

/// A catalog tenant, one per physical database
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    /// Identifier assigned by the catalog
    pub id: i32,
    /// Name of the provisioned database
    pub database_id: String,
}

impl Tenant {
    pub fn new(id: i32, database_id: impl Into<String>) -> Self {
        Self {
            id,
            database_id: database_id.into(),
        }
    }
}

/// Association between a user and a tenant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TenantMember {
    pub tenant_id: i32,
    pub user_id: String,
}

/// Body of `POST /`; the camelCase spellings are accepted too
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateTenantRequest {
    #[serde(rename = "TenantId", alias = "tenantId")]
    pub tenant_id: String,
    #[serde(rename = "UserId", alias = "userId")]
    pub user_id: String,
}

/// Validate a tenant name before it is used as a database identifier
pub fn validate_tenant_name(name: &str) -> ControlPlaneResult<()> {
    let reason = if name.is_empty() {
        Some("Name must not be empty".to_string())
    } else if name.len() > MAX_DATABASE_ID_LEN {
        Some(format!(
            "Name must be at most {} bytes, got {}",
            MAX_DATABASE_ID_LEN,
            name.len()
        ))
    } else if name.contains('\0') {
        Some("Name must not contain NUL bytes".to_string())
    } else {
        None
    };

    match reason {
        Some(reason) => Err(ControlPlaneError::InvalidTenantName {
            name: name.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Quote a name as a SQL identifier, doubling embedded quotes
pub fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tenant_json_shape() {
        let tenant = Tenant::new(1, "acme");
        let json = serde_json::to_string(&tenant).unwrap();
        assert_eq!(json, r#"{"id":1,"databaseId":"acme"}"#);
    }

    #[test]
    fn test_create_request_field_names() {
        let parsed: CreateTenantRequest =
            serde_json::from_str(r#"{"TenantId":"acme","UserId":"u1"}"#).unwrap();
        assert_eq!(parsed.tenant_id, "acme");
        assert_eq!(parsed.user_id, "u1");

        assert!(serde_json::from_str::<CreateTenantRequest>(r#"{"TenantId":"acme"}"#).is_err());
    }

    #[test]
    fn test_create_request_camel_case_aliases() {
        let parsed: CreateTenantRequest =
            serde_json::from_str(r#"{"tenantId":"acme","userId":"u1"}"#).unwrap();
        assert_eq!(parsed.tenant_id, "acme");
        assert_eq!(parsed.user_id, "u1");

        // Serialized form keeps the canonical names
        let body = serde_json::to_value(&parsed).unwrap();
        assert_eq!(body["TenantId"], "acme");
        assert_eq!(body["UserId"], "u1");
    }

    #[test]
    fn test_name_validation() {
        assert!(validate_tenant_name("acme").is_ok());
        assert!(validate_tenant_name("Acme Corp").is_ok());
        assert!(validate_tenant_name(&"a".repeat(MAX_DATABASE_ID_LEN)).is_ok());

        assert!(validate_tenant_name("").is_err());
        assert!(validate_tenant_name(&"a".repeat(MAX_DATABASE_ID_LEN + 1)).is_err());
        assert!(validate_tenant_name("ac\0me").is_err());
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("acme"), "\"acme\"");
        assert_eq!(quote_identifier("a\"b"), "\"a\"\"b\"");
    }
}
