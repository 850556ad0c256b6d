//! CLI error types.

use crate::config::ConfigError;
use std::path::PathBuf;
use thiserror::Error;

/// CLI errors.
///
/// This enum is marked `#[non_exhaustive]` to allow adding new variants
/// in future versions without breaking downstream code.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// The state file does not exist.
    #[error("state file not found at {path}")]
    StateNotFound { path: PathBuf },

    /// The state file is not valid TOML or does not describe a state.
    #[error("invalid state file: {0}")]
    State(String),

    /// A `package:name` reference could not be parsed.
    #[error("invalid reference '{0}', expected <package>:<name>")]
    InvalidRef(String),

    /// Configuration is invalid or missing required fields.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// An error occurred in the interface engine.
    #[error(transparent)]
    Interfaces(#[from] interfaces::Error),

    /// Failed to render JSON output.
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
