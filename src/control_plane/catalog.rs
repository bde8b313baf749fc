//! # Tenant Catalog
//!
//! Bookkeeping of tenant and membership rows, independent of the physical
//! databases. The catalog is the reversible half of provisioning: rows are
//! written inside a transaction that the provisioner commits or rolls back.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};

use super::errors::{ControlPlaneError, ControlPlaneResult, Endpoint};
use super::tenant::{Tenant, TenantMember, MAX_DATABASE_ID_LEN};

/// Control-plane catalog of tenants and their members
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Committed tenants with a membership row for `user_id`, ordered by id
    async fn list_tenants_for_user(&self, user_id: &str) -> ControlPlaneResult<Vec<Tenant>>;

    /// Open a catalog connection and begin a transaction on it
    async fn begin(&self) -> ControlPlaneResult<Box<dyn CatalogTransaction>>;
}

/// An open catalog transaction.
///
/// Dropping it without calling `commit` discards everything it inserted.
#[async_trait]
pub trait CatalogTransaction: Send {
    /// Insert one tenant row and one membership row
    async fn insert_tenant_and_membership(
        &mut self,
        database_id: &str,
        user_id: &str,
    ) -> ControlPlaneResult<Tenant>;

    async fn commit(self: Box<Self>) -> ControlPlaneResult<()>;

    async fn rollback(self: Box<Self>) -> ControlPlaneResult<()>;
}

/// Row-level rules shared with the `tenant` table definition
fn check_row(database_id: &str) -> ControlPlaneResult<()> {
    let violation = if database_id.is_empty() {
        Some("tenant_database_id_check: database_id must not be empty")
    } else if database_id.len() > MAX_DATABASE_ID_LEN {
        Some("value too long for type character varying(63)")
    } else {
        None
    };

    match violation {
        Some(message) => Err(ControlPlaneError::ConstraintViolation {
            database_id: database_id.to_string(),
            message: message.to_string(),
        }),
        None => Ok(()),
    }
}

#[derive(Debug)]
struct CatalogTables {
    tenants: BTreeMap<i32, Tenant>,
    members: Vec<TenantMember>,
    /// Mirrors a SERIAL sequence: values are never handed out twice,
    /// even when the inserting transaction rolls back
    next_id: i32,
}

impl Default for CatalogTables {
    fn default() -> Self {
        Self {
            tenants: BTreeMap::new(),
            members: Vec::new(),
            next_id: 1,
        }
    }
}

#[derive(Debug, Default)]
struct CatalogFaults {
    refuse_connections: bool,
    fail_next_insert: Option<String>,
    fail_next_commit: Option<String>,
}

/// In-memory catalog with the same row rules and transaction visibility as
/// the relational one
#[derive(Debug, Clone, Default)]
pub struct MemoryCatalog {
    tables: Arc<RwLock<CatalogTables>>,
    faults: Arc<Mutex<CatalogFaults>>,
}

impl MemoryCatalog {
    /// Create an empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent connection attempt fail
    pub fn refuse_connections(&self, refuse: bool) {
        self.faults.lock().refuse_connections = refuse;
    }

    /// Fail the next insert with a non-constraint error
    pub fn fail_next_insert(&self, message: impl Into<String>) {
        self.faults.lock().fail_next_insert = Some(message.into());
    }

    /// Fail the next commit, as if the connection dropped mid-commit
    pub fn fail_next_commit(&self, message: impl Into<String>) {
        self.faults.lock().fail_next_commit = Some(message.into());
    }

    /// Number of committed tenant rows named `database_id`
    pub fn count_named(&self, database_id: &str) -> usize {
        self.tables
            .read()
            .tenants
            .values()
            .filter(|t| t.database_id == database_id)
            .count()
    }

    /// Count committed tenants
    pub fn count(&self) -> usize {
        self.tables.read().tenants.len()
    }

    fn check_connection(&self) -> ControlPlaneResult<()> {
        if self.faults.lock().refuse_connections {
            return Err(ControlPlaneError::Connection {
                endpoint: Endpoint::Catalog,
                message: "connection refused".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl Catalog for MemoryCatalog {
    async fn list_tenants_for_user(&self, user_id: &str) -> ControlPlaneResult<Vec<Tenant>> {
        self.check_connection()?;

        let tables = self.tables.read();
        let mut tenants: Vec<Tenant> = tables
            .members
            .iter()
            .filter(|m| m.user_id == user_id)
            .filter_map(|m| tables.tenants.get(&m.tenant_id).cloned())
            .collect();
        tenants.sort_by_key(|t| t.id);

        Ok(tenants)
    }

    async fn begin(&self) -> ControlPlaneResult<Box<dyn CatalogTransaction>> {
        self.check_connection()?;

        Ok(Box::new(MemoryCatalogTransaction {
            catalog: self.clone(),
            tenants: Vec::new(),
            members: Vec::new(),
        }))
    }
}

/// Staged writes of one in-memory transaction, published on commit
#[derive(Debug)]
pub struct MemoryCatalogTransaction {
    catalog: MemoryCatalog,
    tenants: Vec<Tenant>,
    members: Vec<TenantMember>,
}

#[async_trait]
impl CatalogTransaction for MemoryCatalogTransaction {
    async fn insert_tenant_and_membership(
        &mut self,
        database_id: &str,
        user_id: &str,
    ) -> ControlPlaneResult<Tenant> {
        if let Some(message) = self.catalog.faults.lock().fail_next_insert.take() {
            return Err(ControlPlaneError::CatalogInsert {
                database_id: database_id.to_string(),
                message,
            });
        }

        check_row(database_id)?;

        let id = {
            let mut tables = self.catalog.tables.write();
            let id = tables.next_id;
            tables.next_id += 1;
            id
        };

        let tenant = Tenant::new(id, database_id);
        self.tenants.push(tenant.clone());
        self.members.push(TenantMember {
            tenant_id: id,
            user_id: user_id.to_string(),
        });

        Ok(tenant)
    }

    async fn commit(self: Box<Self>) -> ControlPlaneResult<()> {
        if let Some(message) = self.catalog.faults.lock().fail_next_commit.take() {
            return Err(ControlPlaneError::Connection {
                endpoint: Endpoint::Catalog,
                message,
            });
        }

        let this = *self;
        let mut tables = this.catalog.tables.write();
        for tenant in this.tenants {
            tables.tenants.insert(tenant.id, tenant);
        }
        tables.members.extend(this.members);

        Ok(())
    }

    async fn rollback(self: Box<Self>) -> ControlPlaneResult<()> {
        Ok(())
    }
}
