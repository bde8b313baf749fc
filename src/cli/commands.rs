//! CLI command implementations
//!
//! Every command loads the configuration first. `list` and `create` print
//! JSON on stdout using the same shapes as the HTTP API.

use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use super::args::Command;
use super::errors::CliResult;
use crate::config::TenantsConfig;
use crate::control_plane::postgres::postgres_provisioner;
use crate::control_plane::store::TenantStore;
use crate::http_server::HttpServer;

/// Main CLI entry point
pub async fn run() -> CliResult<()> {
    let cli = super::args::Cli::parse_args();
    run_command(cli.command).await
}

/// Run the appropriate command based on CLI args
pub async fn run_command(cmd: Command) -> CliResult<()> {
    match cmd {
        Command::Serve { config, port } => serve(&config, port).await,
        Command::Init { config } => init(&config).await,
        Command::List { config, user } => {
            let store = open_store(&config)?;
            let mut out = Vec::new();
            list(store.as_ref(), &user, &mut out).await?;
            std::io::stdout().write_all(&out)?;
            Ok(())
        }
        Command::Create {
            config,
            tenant,
            user,
        } => {
            let store = open_store(&config)?;
            let mut out = Vec::new();
            create(store.as_ref(), &tenant, &user, &mut out).await?;
            std::io::stdout().write_all(&out)?;
            Ok(())
        }
    }
}

fn open_store(config_path: &Path) -> CliResult<Arc<dyn TenantStore>> {
    let config = TenantsConfig::load(config_path)?;
    Ok(Arc::new(postgres_provisioner(&config)?))
}

/// Serve the HTTP API until Ctrl-C
pub async fn serve(config_path: &Path, port: Option<u16>) -> CliResult<()> {
    let config = TenantsConfig::load(config_path)?;
    let port = port.unwrap_or(config.port);
    let store = Arc::new(postgres_provisioner(&config)?);

    HttpServer::new(store, port, config.allowed_origins.clone())
        .start()
        .await?;
    Ok(())
}

/// Create the catalog tables if missing
pub async fn init(config_path: &Path) -> CliResult<()> {
    let config = TenantsConfig::load(config_path)?;
    let provisioner = postgres_provisioner(&config)?;
    provisioner.catalog().ensure_schema().await?;
    info!("catalog initialized");
    Ok(())
}

pub async fn list(store: &dyn TenantStore, user_id: &str, out: &mut impl Write) -> CliResult<()> {
    let tenants = store.tenants_for_user(user_id).await?;
    serde_json::to_writer(&mut *out, &tenants)?;
    writeln!(out)?;
    Ok(())
}

pub async fn create(
    store: &dyn TenantStore,
    tenant_name: &str,
    user_id: &str,
    out: &mut impl Write,
) -> CliResult<()> {
    let tenant = store.create_tenant(tenant_name, user_id).await?;
    serde_json::to_writer(&mut *out, &tenant)?;
    writeln!(out)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::errors::CliError;
    use crate::control_plane::errors::ErrorKind;
    use crate::control_plane::store::MemoryTenantStore;

    #[tokio::test]
    async fn test_create_then_list() {
        let store = MemoryTenantStore::new();

        let mut out = Vec::new();
        create(&store, "acme", "u1", &mut out).await.unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "{\"id\":1,\"databaseId\":\"acme\"}\n");

        let mut out = Vec::new();
        list(&store, "u1", &mut out).await.unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "[{\"id\":1,\"databaseId\":\"acme\"}]\n");
    }

    #[tokio::test]
    async fn test_create_invalid_name() {
        let store = MemoryTenantStore::new();
        let mut out = Vec::new();

        let err = create(&store, "", "u1", &mut out).await.unwrap_err();
        match err {
            CliError::ControlPlane(e) => assert_eq!(e.kind(), ErrorKind::InvalidTenantName),
            other => panic!("unexpected error: {other}"),
        }
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_invalid_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tenants.toml");
        std::fs::write(&path, "port = 0\ncatalog_url = \"mysql://x\"").unwrap();

        let err = init(&path).await.unwrap_err();
        assert!(matches!(err, CliError::Config(_)));
    }
}
