//! # Control Plane Errors
//!
//! Error types for catalog lookups and tenant provisioning.
//!
//! Every provisioning failure keeps its own variant so that logging and
//! alerting can tell them apart, even where the HTTP layer collapses them
//! into a single 500.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

/// Which of the two independent endpoints a connection failure refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Endpoint {
    /// Control-plane catalog (tenant / tenant_member tables)
    Catalog,
    /// Administrative server hosting the tenant databases
    Server,
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Catalog => write!(f, "catalog"),
            Self::Server => write!(f, "tenant database server"),
        }
    }
}

/// Why the physical database-creation statement failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Error)]
#[serde(tag = "cause", content = "message", rename_all = "snake_case")]
pub enum ProvisioningCause {
    /// A database with that name already exists on the server
    #[error("database already exists: {0}")]
    AlreadyExists(String),

    /// The template database does not exist
    #[error("template database missing: {0}")]
    TemplateMissing(String),

    /// The template database has open sessions and cannot be cloned
    #[error("template database in use: {0}")]
    TemplateInUse(String),

    /// The administrative role may not create databases
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Any other server-side failure
    #[error("{0}")]
    Other(String),
}

impl ProvisioningCause {
    /// True when a retry with the same name can never succeed
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::AlreadyExists(_))
    }
}

/// Coarse classification used by alerting and tests
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connection,
    CatalogQuery,
    CatalogInsert,
    ConstraintViolation,
    ProvisioningFailed,
    PostCommitInconsistency,
    InvalidTenantName,
    TenantNameExists,
}

/// Control plane error types
#[derive(Debug, Clone, Serialize, Error)]
#[serde(tag = "type", content = "details")]
pub enum ControlPlaneError {
    /// Catalog or administrative server unreachable; nothing was mutated
    #[error("Cannot connect to {endpoint}: {message}")]
    Connection { endpoint: Endpoint, message: String },

    /// Listing tenants from the catalog failed
    #[error("Catalog query failed: {message}")]
    CatalogQuery { message: String },

    /// Inserting the tenant or membership row failed; the transaction was abandoned
    #[error("Catalog insert failed for '{database_id}': {message}")]
    CatalogInsert { database_id: String, message: String },

    /// A catalog row-level rule rejected the insert
    #[error("Catalog constraint violated for '{database_id}': {message}")]
    ConstraintViolation { database_id: String, message: String },

    /// Physical creation failed; the catalog registration was rolled back
    #[error("Provisioning failed for '{database_id}': {cause}")]
    ProvisioningFailed {
        database_id: String,
        cause: ProvisioningCause,
    },

    /// The database exists but the catalog commit failed; needs manual reconciliation
    #[error(
        "Catalog commit failed after database '{database_id}' was created (tenant id {tenant_id}): {message}"
    )]
    PostCommitInconsistency {
        database_id: String,
        tenant_id: i32,
        message: String,
        detected_at: DateTime<Utc>,
    },

    /// Tenant name cannot be used as a database identifier
    #[error("Invalid tenant name '{name}': {reason}")]
    InvalidTenantName { name: String, reason: String },

    /// User already owns a tenant with that name
    #[error("User '{user_id}' already owns tenant '{database_id}'")]
    TenantNameExists {
        user_id: String,
        database_id: String,
    },
}

/// Result type for control plane operations
pub type ControlPlaneResult<T> = Result<T, ControlPlaneError>;

impl ControlPlaneError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Connection { .. } => ErrorKind::Connection,
            Self::CatalogQuery { .. } => ErrorKind::CatalogQuery,
            Self::CatalogInsert { .. } => ErrorKind::CatalogInsert,
            Self::ConstraintViolation { .. } => ErrorKind::ConstraintViolation,
            Self::ProvisioningFailed { .. } => ErrorKind::ProvisioningFailed,
            Self::PostCommitInconsistency { .. } => ErrorKind::PostCommitInconsistency,
            Self::InvalidTenantName { .. } => ErrorKind::InvalidTenantName,
            Self::TenantNameExists { .. } => ErrorKind::TenantNameExists,
        }
    }

    /// Get HTTP status code for this error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::InvalidTenantName { .. } => 400,
            Self::TenantNameExists { .. } => 403,
            Self::Connection { .. }
            | Self::CatalogQuery { .. }
            | Self::CatalogInsert { .. }
            | Self::ConstraintViolation { .. }
            | Self::ProvisioningFailed { .. }
            | Self::PostCommitInconsistency { .. } => 500,
        }
    }

    /// Get error code for API responses
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Connection { .. } => "CONNECTION_ERROR",
            Self::CatalogQuery { .. } => "CATALOG_QUERY_ERROR",
            Self::CatalogInsert { .. } => "CATALOG_INSERT_ERROR",
            Self::ConstraintViolation { .. } => "CONSTRAINT_VIOLATION",
            Self::ProvisioningFailed { .. } => "PROVISIONING_FAILED",
            Self::PostCommitInconsistency { .. } => "POST_COMMIT_INCONSISTENCY",
            Self::InvalidTenantName { .. } => "INVALID_TENANT_NAME",
            Self::TenantNameExists { .. } => "TENANT_NAME_EXISTS",
        }
    }

    /// The physical creation cause, if this is a provisioning failure
    pub fn provisioning_cause(&self) -> Option<&ProvisioningCause> {
        match self {
            Self::ProvisioningFailed { cause, .. } => Some(cause),
            _ => None,
        }
    }
}

/// API error response
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: &'static str,
    pub status: u16,
}

impl From<&ControlPlaneError> for ErrorResponse {
    fn from(err: &ControlPlaneError) -> Self {
        Self {
            error: err.to_string(),
            code: err.error_code(),
            status: err.status_code(),
        }
    }
}
