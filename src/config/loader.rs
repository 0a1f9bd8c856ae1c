//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use crate::config::schema::Options;

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Load options from a TOML file. Missing keys stay at their zero value.
pub fn load_options(path: &Path) -> Result<Options, ConfigError> {
    let content = fs::read_to_string(path)?;
    parse_options(&content)
}

/// Parse options from TOML text.
pub fn parse_options(content: &str) -> Result<Options, ConfigError> {
    Ok(toml::from_str(content)?)
}
