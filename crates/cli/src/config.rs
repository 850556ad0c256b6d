//! Configuration loading from ifacectl.toml.

use interfaces::{BaseDeclaration, HostMode, Registry};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "kebab-case", deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub host: HostConfig,

    /// Base declaration to use instead of the builtin one.
    pub base_declaration: Option<PathBuf>,
}

/// How this host runs its platform package.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    #[serde(default)]
    pub mode: HostMode,

    /// Name of the platform package, created if a state file lacks one.
    #[serde(default = "default_platform")]
    pub platform: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            mode: HostMode::default(),
            platform: default_platform(),
        }
    }
}

fn default_platform() -> String {
    "core".to_string()
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path.as_ref())?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML string.
    pub fn parse(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// The configured base declaration, or the one composed from the
    /// registry's definitions.
    pub fn base_declaration(&self, registry: &Registry) -> interfaces::Result<BaseDeclaration> {
        match &self.base_declaration {
            Some(path) => BaseDeclaration::load(path),
            None => BaseDeclaration::from_registry(registry),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to parse config: {0}")]
    Parse(String),
}
