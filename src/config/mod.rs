//! Configuration loading
//!
//! The config file is JSON5 with camelCase keys. Every field has a default,
//! so a missing file is equivalent to `{}`.

pub mod schema;
pub mod types;

use std::env;
use std::path::{Path, PathBuf};

use thiserror::Error;

pub use types::{Config, LoggingConfig, MediaConfig, ValidationError, WhitelistConfig};

/// Environment variable naming the config file.
pub const CONFIG_PATH_ENV: &str = "PASTECLEAN_CONFIG";

/// Configuration errors. Fatal at construction time only.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {message}")]
    ReadError { path: String, message: String },

    #[error("Failed to parse JSON5 at {path}: {message}")]
    ParseError { path: String, message: String },

    #[error("Invalid configuration: {}", join_issues(.0))]
    Validation(Vec<ValidationError>),

    #[error("Invalid value for {option}: {message}")]
    InvalidOption { option: String, message: String },

    #[error("Failed to build HTTP client: {0}")]
    HttpClient(String),
}

fn join_issues(issues: &[ValidationError]) -> String {
    issues
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Get the config file path.
/// Priority: PASTECLEAN_CONFIG > <config dir>/pasteclean/config.json5
pub fn get_config_path() -> PathBuf {
    if let Ok(path) = env::var(CONFIG_PATH_ENV) {
        if !path.is_empty() {
            return PathBuf::from(path);
        }
    }

    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("pasteclean")
        .join("config.json5")
}

/// An explicit path (e.g. `--config`) wins over the environment and default.
pub fn resolve_config_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(get_config_path)
}

/// Load, parse and validate the configuration.
pub fn load_config(explicit: Option<&Path>) -> Result<Config, ConfigError> {
    load_config_from(&resolve_config_path(explicit))
}

/// Load from a specific path. A missing file yields the defaults.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    if !path.exists() {
        tracing::debug!(path = %path.display(), "no config file, using defaults");
        return Ok(Config::default());
    }

    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let config = parse_config(&content, path)?;
    config.validate().map_err(ConfigError::Validation)?;

    tracing::debug!(path = %path.display(), "loaded config");
    Ok(config)
}

/// Parse JSON5 text. `path` is only used in error messages.
pub fn parse_config(content: &str, path: &Path) -> Result<Config, ConfigError> {
    json5::from_str(content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        message: e.to_string(),
    })
}
