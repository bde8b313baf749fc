//! Service configuration
//!
//! Loaded once at startup from a TOML file, then overridden by the
//! `TENANTS_URL` / `TENANTS_SERVER_URL` environment variables, then
//! validated. The resulting struct is passed explicitly to the
//! constructors that need it.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::config_validator::{format_validation_errors, ConfigValidationError, ConfigValidator};

/// Template every tenant database is cloned from unless configured otherwise
pub const DEFAULT_TEMPLATE: &str = "template_tenantdb";

/// Environment variable overriding `catalog_url`
pub const CATALOG_URL_ENV: &str = "TENANTS_URL";

/// Environment variable overriding `server_url`
pub const SERVER_URL_ENV: &str = "TENANTS_SERVER_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration:\n{}", format_validation_errors(.0))]
    Invalid(Vec<ConfigValidationError>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TenantsConfig {
    /// Catalog holding the `tenant` and `tenant_member` tables
    pub catalog_url: String,
    /// Administrative server the tenant databases are created on
    pub server_url: String,
    /// Template database cloned for each tenant
    pub template: String,
    /// HTTP listen port
    pub port: u16,
    /// Origins allowed by CORS
    pub allowed_origins: Vec<String>,
    pub catalog_max_connections: u32,
    pub server_max_connections: u32,
    /// Upper bound on waiting for a pooled connection
    pub connect_timeout_secs: u64,
}

impl Default for TenantsConfig {
    fn default() -> Self {
        Self {
            catalog_url: String::new(),
            server_url: String::new(),
            template: DEFAULT_TEMPLATE.to_string(),
            port: 5000,
            allowed_origins: vec!["http://localhost:3000".to_string()],
            catalog_max_connections: 5,
            server_max_connections: 2,
            connect_timeout_secs: 30,
        }
    }
}

impl TenantsConfig {
    /// Parse a TOML document; missing keys keep their defaults
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Load `path` (defaults when it does not exist), apply environment
    /// overrides and validate
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            Self::from_toml_str(&content)?
        } else {
            Self::default()
        };

        config.apply_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Apply overrides from `lookup` (the process environment in production)
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(url) = lookup(CATALOG_URL_ENV).filter(|v| !v.is_empty()) {
            self.catalog_url = url;
        }
        if let Some(url) = lookup(SERVER_URL_ENV).filter(|v| !v.is_empty()) {
            self.server_url = url;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut v = ConfigValidator::new();
        v.validate_postgres_url("catalog_url", &self.catalog_url)
            .validate_postgres_url("server_url", &self.server_url)
            .validate_database_name("template", &self.template)
            .validate_port("port", self.port)
            .validate_positive("catalog_max_connections", self.catalog_max_connections.into())
            .validate_positive("server_max_connections", self.server_max_connections.into())
            .validate_positive(
                "connect_timeout_secs",
                i64::try_from(self.connect_timeout_secs).unwrap_or(i64::MAX),
            );
        for origin in &self.allowed_origins {
            v.validate_origin("allowed_origins", origin);
        }

        v.finish().map_err(ConfigError::Invalid)
    }
}
