//! # Tenant Store
//!
//! The capability the request layer depends on. Production wires in a
//! [`TenantProvisioner`](super::provisioning::TenantProvisioner) over the
//! relational catalog; tests can use [`MemoryTenantStore`].

use async_trait::async_trait;

use super::catalog::{Catalog, MemoryCatalog};
use super::errors::ControlPlaneResult;
use super::tenant::{validate_tenant_name, Tenant};

#[async_trait]
pub trait TenantStore: Send + Sync {
    /// Tenants the user is a member of; empty when there are none
    async fn tenants_for_user(&self, user_id: &str) -> ControlPlaneResult<Vec<Tenant>>;

    /// Register and provision a tenant named `database_id` owned by `user_id`
    async fn create_tenant(&self, database_id: &str, user_id: &str) -> ControlPlaneResult<Tenant>;
}

/// Deterministic catalog-only store: ids start at 1 and increase by one,
/// and no physical database is created.
#[derive(Debug, Clone, Default)]
pub struct MemoryTenantStore {
    catalog: MemoryCatalog,
}

impl MemoryTenantStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Underlying catalog, for inspection in tests
    pub fn catalog(&self) -> &MemoryCatalog {
        &self.catalog
    }
}

#[async_trait]
impl TenantStore for MemoryTenantStore {
    async fn tenants_for_user(&self, user_id: &str) -> ControlPlaneResult<Vec<Tenant>> {
        self.catalog.list_tenants_for_user(user_id).await
    }

    async fn create_tenant(&self, database_id: &str, user_id: &str) -> ControlPlaneResult<Tenant> {
        validate_tenant_name(database_id)?;

        let mut txn = self.catalog.begin().await?;
        let tenant = txn.insert_tenant_and_membership(database_id, user_id).await?;
        txn.commit().await?;

        Ok(tenant)
    }
}
