//! # PostgreSQL Backends
//!
//! Relational catalog and administrative server over `sqlx` pools.
//!
//! Pools are created lazily, so the process starts even when neither
//! endpoint is reachable; reachability failures surface per call as
//! [`ControlPlaneError::Connection`].

use std::time::Duration;

use async_trait::async_trait;
use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres, Transaction};
use tracing::{debug, error, warn};

use super::catalog::{Catalog, CatalogTransaction};
use super::database_server::{AdminConnection, DatabaseServer};
use super::errors::{ControlPlaneError, ControlPlaneResult, Endpoint, ProvisioningCause};
use super::provisioning::TenantProvisioner;
use super::tenant::{quote_identifier, Tenant};
use crate::config::TenantsConfig;

/// Catalog table definitions
pub const CATALOG_SCHEMA: &str = include_str!("../../sql/catalog.sql");

const LIST_TENANTS_FOR_USER: &str = "SELECT t.id, t.database_id FROM tenant t \
     INNER JOIN tenant_member tm ON t.id = tm.tenant_id \
     WHERE tm.user_id = $1 \
     ORDER BY t.id";

const INSERT_TENANT: &str = "INSERT INTO tenant (database_id) VALUES ($1) RETURNING id, database_id";

const INSERT_TENANT_MEMBER: &str = "INSERT INTO tenant_member (tenant_id, user_id) VALUES ($1, $2)";

/// Pool sizing for one endpoint
#[derive(Debug, Clone, Copy)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub acquire_timeout: Duration,
}

fn lazy_pool(endpoint: Endpoint, url: &str, config: PoolConfig) -> ControlPlaneResult<PgPool> {
    PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(config.acquire_timeout)
        .connect_lazy(url)
        .map_err(|e| connection_error(endpoint, e))
}

/// Provisioner wired to the two endpoints named in `config`
pub fn postgres_provisioner(
    config: &TenantsConfig,
) -> ControlPlaneResult<TenantProvisioner<PostgresCatalog, PostgresServer>> {
    let timeout = Duration::from_secs(config.connect_timeout_secs);
    let catalog = PostgresCatalog::connect_lazy(
        &config.catalog_url,
        PoolConfig {
            max_connections: config.catalog_max_connections,
            acquire_timeout: timeout,
        },
    )?;
    let server = PostgresServer::connect_lazy(
        &config.server_url,
        PoolConfig {
            max_connections: config.server_max_connections,
            acquire_timeout: timeout,
        },
    )?;

    Ok(TenantProvisioner::new(catalog, server, config.template.clone()))
}

/// Catalog stored in the `tenant` / `tenant_member` tables
#[derive(Debug, Clone)]
pub struct PostgresCatalog {
    pool: PgPool,
}

impl PostgresCatalog {
    pub fn connect_lazy(url: &str, config: PoolConfig) -> ControlPlaneResult<Self> {
        Ok(Self::from_pool(lazy_pool(Endpoint::Catalog, url, config)?))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create the catalog tables if they do not exist yet
    pub async fn ensure_schema(&self) -> ControlPlaneResult<()> {
        sqlx::raw_sql(CATALOG_SCHEMA)
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if is_connection_failure(&e) {
                    connection_error(Endpoint::Catalog, e)
                } else {
                    ControlPlaneError::CatalogQuery {
                        message: e.to_string(),
                    }
                }
            })?;
        debug!("catalog schema ensured");
        Ok(())
    }
}

#[async_trait]
impl Catalog for PostgresCatalog {
    async fn list_tenants_for_user(&self, user_id: &str) -> ControlPlaneResult<Vec<Tenant>> {
        sqlx::query_as::<_, Tenant>(LIST_TENANTS_FOR_USER)
            .bind(user_id)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                if is_connection_failure(&e) {
                    connection_error(Endpoint::Catalog, e)
                } else {
                    error!(error = %e, user_id, "tenant lookup failed");
                    ControlPlaneError::CatalogQuery {
                        message: e.to_string(),
                    }
                }
            })
    }

    async fn begin(&self) -> ControlPlaneResult<Box<dyn CatalogTransaction>> {
        let tx = self
            .pool
            .begin()
            .await
            .map_err(|e| connection_error(Endpoint::Catalog, e))?;
        Ok(Box::new(PgCatalogTransaction { tx }))
    }
}

/// Catalog transaction owning its pooled connection.
///
/// sqlx rolls the transaction back if it is dropped unfinished.
pub struct PgCatalogTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl CatalogTransaction for PgCatalogTransaction {
    async fn insert_tenant_and_membership(
        &mut self,
        database_id: &str,
        user_id: &str,
    ) -> ControlPlaneResult<Tenant> {
        let tenant = sqlx::query_as::<_, Tenant>(INSERT_TENANT)
            .bind(database_id)
            .fetch_one(&mut *self.tx)
            .await
            .map_err(|e| insert_error(database_id, e))?;

        sqlx::query(INSERT_TENANT_MEMBER)
            .bind(tenant.id)
            .bind(user_id)
            .execute(&mut *self.tx)
            .await
            .map_err(|e| insert_error(database_id, e))?;

        Ok(tenant)
    }

    async fn commit(self: Box<Self>) -> ControlPlaneResult<()> {
        let this = *self;
        this.tx
            .commit()
            .await
            .map_err(|e| connection_error(Endpoint::Catalog, e))
    }

    async fn rollback(self: Box<Self>) -> ControlPlaneResult<()> {
        let this = *self;
        this.tx
            .rollback()
            .await
            .map_err(|e| connection_error(Endpoint::Catalog, e))
    }
}

/// Administrative server the tenant databases are created on
#[derive(Debug, Clone)]
pub struct PostgresServer {
    pool: PgPool,
}

impl PostgresServer {
    pub fn connect_lazy(url: &str, config: PoolConfig) -> ControlPlaneResult<Self> {
        Ok(Self::from_pool(lazy_pool(Endpoint::Server, url, config)?))
    }

    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DatabaseServer for PostgresServer {
    async fn connect(&self) -> ControlPlaneResult<Box<dyn AdminConnection>> {
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|e| connection_error(Endpoint::Server, e))?;
        Ok(Box::new(PgAdminConnection { conn }))
    }
}

/// Pooled administrative connection, returned to the pool on drop
pub struct PgAdminConnection {
    conn: PoolConnection<Postgres>,
}

#[async_trait]
impl AdminConnection for PgAdminConnection {
    async fn create_database(&mut self, name: &str, template: &str) -> Result<(), ProvisioningCause> {
        let statement = create_database_statement(name, template);

        // Simple-query protocol: CREATE DATABASE refuses to run inside any
        // transaction block, implicit ones included.
        sqlx::Executor::execute(&mut *self.conn, sqlx::raw_sql(&statement))
            .await
            .map(|_| ())
            .map_err(provisioning_cause)
    }
}

pub fn create_database_statement(name: &str, template: &str) -> String {
    format!(
        "CREATE DATABASE {} WITH TEMPLATE {}",
        quote_identifier(name),
        quote_identifier(template)
    )
}

fn sqlstate(err: &sqlx::Error) -> Option<String> {
    match err {
        sqlx::Error::Database(db_err) => db_err.code().map(|c| c.into_owned()),
        _ => None,
    }
}

fn is_connection_failure(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::Configuration(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => true,
        // class 08: connection exception, 57P01..57P03: server shutting down
        _ => sqlstate(err).is_some_and(|code| code.starts_with("08") || code.starts_with("57P")),
    }
}

fn connection_error(endpoint: Endpoint, err: sqlx::Error) -> ControlPlaneError {
    warn!(%endpoint, error = %err, "database connection failure");
    ControlPlaneError::Connection {
        endpoint,
        message: err.to_string(),
    }
}

fn insert_error(database_id: &str, err: sqlx::Error) -> ControlPlaneError {
    match sqlstate(&err) {
        // class 23: integrity constraint violation
        Some(code) if code.starts_with("23") => ControlPlaneError::ConstraintViolation {
            database_id: database_id.to_string(),
            message: err.to_string(),
        },
        // 22001: string_data_right_truncation (VARCHAR(63))
        Some(code) if code == "22001" => ControlPlaneError::ConstraintViolation {
            database_id: database_id.to_string(),
            message: err.to_string(),
        },
        _ if is_connection_failure(&err) => connection_error(Endpoint::Catalog, err),
        _ => ControlPlaneError::CatalogInsert {
            database_id: database_id.to_string(),
            message: err.to_string(),
        },
    }
}

fn provisioning_cause(err: sqlx::Error) -> ProvisioningCause {
    let message = err.to_string();
    match sqlstate(&err).as_deref() {
        Some("42P04") => ProvisioningCause::AlreadyExists(message),
        Some("3D000") => ProvisioningCause::TemplateMissing(message),
        Some("55006") => ProvisioningCause::TemplateInUse(message),
        Some("42501") => ProvisioningCause::PermissionDenied(message),
        _ => ProvisioningCause::Other(message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_database_statement() {
        assert_eq!(
            create_database_statement("acme", "template_tenantdb"),
            r#"CREATE DATABASE "acme" WITH TEMPLATE "template_tenantdb""#
        );
        assert_eq!(
            create_database_statement(r#"x"; DROP DATABASE y; --"#, "t"),
            r#"CREATE DATABASE "x""; DROP DATABASE y; --" WITH TEMPLATE "t""#
        );
    }

    #[test]
    fn test_connection_failures_classified() {
        assert!(is_connection_failure(&sqlx::Error::PoolTimedOut));
        assert!(is_connection_failure(&sqlx::Error::PoolClosed));
        assert!(!is_connection_failure(&sqlx::Error::RowNotFound));
    }

    #[test]
    fn test_non_database_error_is_other_cause() {
        let cause = provisioning_cause(sqlx::Error::RowNotFound);
        assert!(matches!(cause, ProvisioningCause::Other(_)));
    }

    #[test]
    fn test_insert_error_without_sqlstate() {
        let err = insert_error("acme", sqlx::Error::RowNotFound);
        assert!(matches!(err, ControlPlaneError::CatalogInsert { .. }));

        let err = insert_error("acme", sqlx::Error::PoolTimedOut);
        assert!(matches!(err, ControlPlaneError::Connection { .. }));
    }

    #[tokio::test]
    async fn test_lazy_pool_rejects_bad_url() {
        let config = PoolConfig {
            max_connections: 1,
            acquire_timeout: Duration::from_secs(1),
        };
        assert!(PostgresCatalog::connect_lazy("not a url", config).is_err());
    }
}
