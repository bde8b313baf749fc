//! Command line entry points

pub mod args;
pub mod commands;
pub mod errors;

pub use args::{Cli, Command};
pub use commands::{run, run_command};
pub use errors::{CliError, CliResult};
