//! tenants - per-user tenant provisioning
//!
//! Registers tenants in a relational catalog and creates one physical
//! database per tenant by cloning a template, exposed over HTTP and a CLI.

pub mod cli;
pub mod config;
pub mod config_validator;
pub mod control_plane;
pub mod http_server;
pub mod observability;
