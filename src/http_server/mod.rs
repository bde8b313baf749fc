//! # HTTP Server
//!
//! Serves the tenant routes on `0.0.0.0:<port>` until Ctrl-C.

pub mod tenant_routes;

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::TcpListener;
use tracing::info;

use crate::control_plane::store::TenantStore;

pub use tenant_routes::tenant_routes;

/// HTTP front end over a [`TenantStore`]
pub struct HttpServer {
    store: Arc<dyn TenantStore>,
    port: u16,
    allowed_origins: Vec<String>,
}

impl HttpServer {
    pub fn new(store: Arc<dyn TenantStore>, port: u16, allowed_origins: Vec<String>) -> Self {
        Self {
            store,
            port,
            allowed_origins,
        }
    }

    pub fn router(&self) -> axum::Router {
        tenant_routes(self.store.clone(), &self.allowed_origins)
    }

    /// Bind and serve until shutdown is requested
    pub async fn start(&self) -> std::io::Result<()> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.port));
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "tenant service listening");

        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown_signal())
            .await?;

        info!("tenant service stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    info!("shutdown requested");
}
