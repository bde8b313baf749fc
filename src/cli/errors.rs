//! CLI errors

use thiserror::Error;

use crate::config::ConfigError;
use crate::control_plane::errors::ControlPlaneError;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("{0}")]
    ControlPlane(#[from] ControlPlaneError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to encode output: {0}")]
    Json(#[from] serde_json::Error),
}

pub type CliResult<T> = Result<T, CliError>;
