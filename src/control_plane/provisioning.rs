//! # Provisioning Orchestration
//!
//! Creates a tenant across two endpoints that cannot share a transaction:
//!
//! 1. **Register** (reversible): insert the tenant and membership rows inside
//!    a catalog transaction.
//! 2. **Create** (irreversible): clone the template into a new database on
//!    the administrative server.
//! 3. **Settle**: commit the catalog transaction if creation succeeded,
//!    otherwise roll it back as the compensating action.
//!
//! A commit that fails after step 2 leaves a database without a catalog row.
//! That case is returned as [`ControlPlaneError::PostCommitInconsistency`] and
//! logged at error level under the `tenants::alert` target; it is never
//! retried.
//!
//! Steps 1 to 3 run in their own task. A caller that stops waiting (deadline,
//! disconnected client) does not interrupt them between creation and settle.

use async_trait::async_trait;
use chrono::Utc;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::catalog::Catalog;
use super::database_server::DatabaseServer;
use super::errors::{ControlPlaneError, ControlPlaneResult, Endpoint, ProvisioningCause};
use super::store::TenantStore;
use super::tenant::{validate_tenant_name, Tenant};
use crate::observability::ALERT_TARGET;

/// Provisioning orchestrator
#[derive(Debug, Clone)]
pub struct TenantProvisioner<C, S> {
    catalog: C,
    server: S,
    /// Database every tenant database is cloned from
    template: String,
}

impl<C, S> TenantProvisioner<C, S>
where
    C: Catalog + Clone + 'static,
    S: DatabaseServer + Clone + 'static,
{
    /// Create a new provisioner
    pub fn new(catalog: C, server: S, template: impl Into<String>) -> Self {
        Self {
            catalog,
            server,
            template: template.into(),
        }
    }

    pub fn catalog(&self) -> &C {
        &self.catalog
    }

    pub fn server(&self) -> &S {
        &self.server
    }

    /// Register `tenant_name` for `user_id` and create its database
    pub async fn provision(&self, tenant_name: &str, user_id: &str) -> ControlPlaneResult<Tenant> {
        validate_tenant_name(tenant_name)?;

        let span = info_span!(
            "provision",
            attempt = %Uuid::new_v4(),
            tenant = %tenant_name,
            user = %user_id,
        );

        let this = self.clone();
        let (name, user) = (tenant_name.to_string(), user_id.to_string());
        let handle = tokio::spawn(async move { this.run(&name, &user).await }.instrument(span));

        match handle.await {
            Ok(result) => result,
            Err(e) if e.is_panic() => std::panic::resume_unwind(e.into_panic()),
            Err(e) => {
                error!(
                    target: ALERT_TARGET,
                    database_id = %tenant_name,
                    error = %e,
                    "provisioning task aborted before settling, reconcile manually"
                );
                Err(ControlPlaneError::ProvisioningFailed {
                    database_id: tenant_name.to_string(),
                    cause: ProvisioningCause::Other(e.to_string()),
                })
            }
        }
    }

    async fn run(&self, tenant_name: &str, user_id: &str) -> ControlPlaneResult<Tenant> {
        // Both connections before any write. The administrative one is opened
        // first so that no catalog transaction is pending if it is unreachable.
        let mut admin = self
            .server
            .connect()
            .await
            .map_err(|e| connection_failure(Endpoint::Server, e))?;
        let mut txn = self
            .catalog
            .begin()
            .await
            .map_err(|e| connection_failure(Endpoint::Catalog, e))?;
        debug!("connections open, catalog transaction started");

        let tenant = match txn.insert_tenant_and_membership(tenant_name, user_id).await {
            Ok(tenant) => tenant,
            Err(err) => {
                warn!(error = %err, "catalog insert failed, abandoning transaction");
                drop(txn);
                return Err(insert_failure(tenant_name, err));
            }
        };
        debug!(tenant_id = tenant.id, "catalog rows staged");

        if let Err(cause) = admin.create_database(tenant_name, &self.template).await {
            warn!(
                tenant_id = tenant.id,
                cause = %cause,
                "database creation failed, rolling back catalog registration"
            );
            if let Err(rollback_err) = txn.rollback().await {
                // The transaction never committed; the catalog discards it with the connection.
                warn!(error = %rollback_err, "explicit rollback failed");
            }
            return Err(ControlPlaneError::ProvisioningFailed {
                database_id: tenant_name.to_string(),
                cause,
            });
        }
        debug!(tenant_id = tenant.id, template = %self.template, "database created");

        if let Err(err) = txn.commit().await {
            let detected_at = Utc::now();
            error!(
                target: ALERT_TARGET,
                tenant_id = tenant.id,
                database_id = %tenant.database_id,
                user_id = %user_id,
                detected_at = %detected_at,
                error = %err,
                "orphaned tenant database: catalog commit failed after creation, reconcile manually"
            );
            return Err(ControlPlaneError::PostCommitInconsistency {
                database_id: tenant.database_id,
                tenant_id: tenant.id,
                message: err.to_string(),
                detected_at,
            });
        }

        info!(tenant_id = tenant.id, "tenant provisioned");
        Ok(tenant)
    }
}

#[async_trait]
impl<C, S> TenantStore for TenantProvisioner<C, S>
where
    C: Catalog + Clone + 'static,
    S: DatabaseServer + Clone + 'static,
{
    async fn tenants_for_user(&self, user_id: &str) -> ControlPlaneResult<Vec<Tenant>> {
        self.catalog.list_tenants_for_user(user_id).await
    }

    async fn create_tenant(&self, database_id: &str, user_id: &str) -> ControlPlaneResult<Tenant> {
        self.provision(database_id, user_id).await
    }
}

fn connection_failure(endpoint: Endpoint, err: ControlPlaneError) -> ControlPlaneError {
    match err {
        err @ ControlPlaneError::Connection { .. } => err,
        other => ControlPlaneError::Connection {
            endpoint,
            message: other.to_string(),
        },
    }
}

/// Constraint violations keep their own kind; anything else is an insert failure
fn insert_failure(database_id: &str, err: ControlPlaneError) -> ControlPlaneError {
    match err {
        err @ (ControlPlaneError::ConstraintViolation { .. }
        | ControlPlaneError::CatalogInsert { .. }) => err,
        other => ControlPlaneError::CatalogInsert {
            database_id: database_id.to_string(),
            message: other.to_string(),
        },
    }
}
