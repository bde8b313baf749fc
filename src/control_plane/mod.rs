//! # Control Plane Module
//!
//! Tenant registration and database-per-tenant provisioning.
//!
//! ## Components
//!
//! - `tenant`: Tenant model, request body and name rules
//! - `catalog`: Catalog seam plus the in-memory catalog
//! - `database_server`: Administrative server seam plus the in-memory server
//! - `provisioning`: Two-phase provisioning orchestration
//! - `store`: `TenantStore`, the seam the HTTP layer talks to
//! - `postgres`: PostgreSQL catalog and server over `sqlx`
//! - `errors`: Control plane errors

pub mod catalog;
pub mod database_server;
pub mod errors;
pub mod postgres;
pub mod provisioning;
pub mod store;
pub mod tenant;

pub use catalog::{Catalog, CatalogTransaction, MemoryCatalog};
pub use database_server::{AdminConnection, DatabaseServer, MemoryDatabaseServer};
pub use errors::*;
pub use postgres::{postgres_provisioner, PostgresCatalog, PostgresServer};
pub use provisioning::TenantProvisioner;
pub use store::{MemoryTenantStore, TenantStore};
pub use tenant::*;
