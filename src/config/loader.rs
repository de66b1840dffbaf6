//! Configuration loading from disk.

use std::fs;
use std::io;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::PluginConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Name of the plugin's configuration file inside the config directory.
pub const CONFIG_FILE_NAME: &str = "tls.toml";

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<PluginConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_config(&content)
}

/// Parse and validate configuration text.
pub fn parse_config(content: &str) -> Result<PluginConfig, ConfigError> {
    let config: PluginConfig = toml::from_str(content)?;
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load `tls.toml` from the plugin's config directory.
///
/// A missing file is not an error: every key has a default and the
/// credential paths fall back to conventional names under `config_dir`.
pub fn load_from_dir(config_dir: &Path) -> Result<PluginConfig, ConfigError> {
    let path = config_dir.join(CONFIG_FILE_NAME);
    match load_config(&path) {
        Err(ConfigError::Io(e)) if e.kind() == io::ErrorKind::NotFound => {
            tracing::debug!(path = %path.display(), "No config file, using defaults");
            Ok(PluginConfig::default())
        }
        other => other,
    }
}
