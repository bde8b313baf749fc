//! CLI argument definitions using clap
//!
//! Commands:
//! - tenants serve --config <path> [--port <port>]
//! - tenants init --config <path>
//! - tenants list --config <path> --user <id>
//! - tenants create --config <path> --tenant <name> --user <id>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Per-user tenant provisioning service
#[derive(Parser, Debug)]
#[command(name = "tenants")]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the tenant HTTP API
    Serve {
        /// Path to configuration file
        #[arg(long, default_value = "./tenants.toml")]
        config: PathBuf,

        /// Overrides the configured port
        #[arg(long)]
        port: Option<u16>,
    },

    /// Create the catalog tables
    Init {
        /// Path to configuration file
        #[arg(long, default_value = "./tenants.toml")]
        config: PathBuf,
    },

    /// Print a user's tenants as JSON
    List {
        /// Path to configuration file
        #[arg(long, default_value = "./tenants.toml")]
        config: PathBuf,

        #[arg(long)]
        user: String,
    },

    /// Provision a tenant for a user
    Create {
        /// Path to configuration file
        #[arg(long, default_value = "./tenants.toml")]
        config: PathBuf,

        /// Tenant (and database) name
        #[arg(long)]
        tenant: String,

        #[arg(long)]
        user: String,
    },
}

impl Cli {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
