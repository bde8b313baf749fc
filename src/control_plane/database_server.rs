//! # Tenant Database Server
//!
//! Administrative connection to the server hosting one database per tenant.
//!
//! Database creation is not transactional: once the statement has run, the
//! database exists regardless of what happens to the catalog afterwards.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;

use super::errors::{ControlPlaneError, ControlPlaneResult, Endpoint, ProvisioningCause};

/// Server that physical tenant databases are created on
#[async_trait]
pub trait DatabaseServer: Send + Sync {
    /// Open an administrative connection
    async fn connect(&self) -> ControlPlaneResult<Box<dyn AdminConnection>>;
}

/// A live administrative connection
#[async_trait]
pub trait AdminConnection: Send {
    /// Create database `name` as a clone of `template`
    async fn create_database(&mut self, name: &str, template: &str) -> Result<(), ProvisioningCause>;
}

#[derive(Debug, Default)]
struct ServerState {
    databases: BTreeSet<String>,
    refuse_connections: bool,
    fail_next_create: Option<ProvisioningCause>,
}

/// In-memory database server.
///
/// Creation is serialized under one lock, so of several concurrent creations
/// with the same name exactly one succeeds.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabaseServer {
    state: Arc<Mutex<ServerState>>,
}

impl MemoryDatabaseServer {
    /// Create a server that already hosts `template`
    pub fn with_template(template: impl Into<String>) -> Self {
        let server = Self::default();
        server.state.lock().databases.insert(template.into());
        server
    }

    /// Pre-create a database, e.g. one left behind by an earlier run
    pub fn add_database(&self, name: impl Into<String>) {
        self.state.lock().databases.insert(name.into());
    }

    pub fn has_database(&self, name: &str) -> bool {
        self.state.lock().databases.contains(name)
    }

    /// All database names, templates included
    pub fn databases(&self) -> Vec<String> {
        self.state.lock().databases.iter().cloned().collect()
    }

    /// Make every subsequent connection attempt fail
    pub fn refuse_connections(&self, refuse: bool) {
        self.state.lock().refuse_connections = refuse;
    }

    /// Fail the next creation with `cause`
    pub fn fail_next_create(&self, cause: ProvisioningCause) {
        self.state.lock().fail_next_create = Some(cause);
    }
}

#[async_trait]
impl DatabaseServer for MemoryDatabaseServer {
    async fn connect(&self) -> ControlPlaneResult<Box<dyn AdminConnection>> {
        if self.state.lock().refuse_connections {
            return Err(ControlPlaneError::Connection {
                endpoint: Endpoint::Server,
                message: "connection refused".to_string(),
            });
        }

        Ok(Box::new(MemoryAdminConnection {
            server: self.clone(),
        }))
    }
}

/// Connection handed out by [`MemoryDatabaseServer`]
#[derive(Debug)]
pub struct MemoryAdminConnection {
    server: MemoryDatabaseServer,
}

#[async_trait]
impl AdminConnection for MemoryAdminConnection {
    async fn create_database(&mut self, name: &str, template: &str) -> Result<(), ProvisioningCause> {
        let mut state = self.server.state.lock();

        if let Some(cause) = state.fail_next_create.take() {
            return Err(cause);
        }
        if !state.databases.contains(template) {
            return Err(ProvisioningCause::TemplateMissing(format!(
                "template database \"{}\" does not exist",
                template
            )));
        }
        if state.databases.contains(name) {
            return Err(ProvisioningCause::AlreadyExists(format!(
                "database \"{}\" already exists",
                name
            )));
        }

        state.databases.insert(name.to_string());
        Ok(())
    }
}
