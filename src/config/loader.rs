//! Configuration loading and discovery for `resgraph.toml`
//!
//! Provides functions to find, load, and merge configuration.

use super::schema::{LogLevel, ResgraphConfig};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// File name searched for during discovery
pub const CONFIG_FILE_NAME: &str = "resgraph.toml";

/// Configuration loading error
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ConfigError {
    /// File I/O error
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error
    #[error("Failed to parse resgraph.toml: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error
    #[error("Config validation failed:\n{}", .0.iter().map(|e| format!("  - {}", e)).collect::<Vec<_>>().join("\n"))]
    Validation(Vec<String>),
}

/// CLI arguments that can override config values
#[derive(Debug, Default, Clone)]
pub struct CliOverrides {
    /// Force run-mode persistence
    pub run_mode: Option<bool>,
    /// Force loader overwrite mode
    pub overwrite: Option<bool>,
    /// Extra properties from `--define KEY=VALUE`
    pub defines: Vec<(String, String)>,
    /// Log level from `-v`/`-q`
    pub log_level: Option<LogLevel>,
}

/// Find resgraph.toml by walking up from the current working directory.
///
/// Search order:
/// 1. Walk up from current directory looking for resgraph.toml
/// 2. Check XDG_CONFIG_HOME/resgraph/resgraph.toml (or ~/.config/resgraph/resgraph.toml)
pub fn find_config() -> Option<PathBuf> {
    if let Ok(cwd) = env::current_dir() {
        if let Some(path) = find_config_from(cwd) {
            return Some(path);
        }
    }

    find_xdg_config()
}

/// Find resgraph.toml in the XDG config directory.
pub fn find_xdg_config() -> Option<PathBuf> {
    let xdg_config = env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|_| env::var("HOME").map(|h| PathBuf::from(h).join(".config")))
        .ok()?;

    let config_path = xdg_config.join("resgraph").join(CONFIG_FILE_NAME);
    if config_path.exists() {
        Some(config_path)
    } else {
        None
    }
}

/// Find resgraph.toml by walking up from a specific directory.
pub fn find_config_from(start: PathBuf) -> Option<PathBuf> {
    let mut current = start;

    loop {
        let config_path = current.join(CONFIG_FILE_NAME);
        if config_path.exists() {
            return Some(config_path);
        }

        if !current.pop() {
            return None;
        }
    }
}

/// Load configuration from a resgraph.toml file.
///
/// If a path is provided, loads from that file. Otherwise, uses
/// [`find_config`] to locate one. If no config file is found, returns the
/// default configuration.
///
/// # Example
/// ```ignore
/// let config = load_config(None)?;
/// let config = load_config(Some(Path::new("game/resgraph.toml")))?;
/// ```
pub fn load_config(path: Option<&Path>) -> Result<ResgraphConfig, ConfigError> {
    let config_path = match path {
        Some(p) => Some(p.to_path_buf()),
        None => find_config(),
    };

    match config_path {
        Some(p) => load_config_file(&p),
        None => Ok(default_config()),
    }
}

/// Load configuration from a specific file path.
pub fn load_config_file(path: &Path) -> Result<ResgraphConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    let config: ResgraphConfig = toml::from_str(&contents)?;

    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ConfigError::Validation(errors.into_iter().map(|e| e.to_string()).collect()));
    }

    log::debug!("loaded configuration from {}", path.display());
    Ok(config)
}

/// Configuration used when no resgraph.toml is found.
pub fn default_config() -> ResgraphConfig {
    ResgraphConfig::default()
}

/// Merge CLI overrides into a configuration.
///
/// CLI arguments take precedence over config file values.
pub fn merge_cli_overrides(config: &mut ResgraphConfig, overrides: &CliOverrides) {
    if let Some(run_mode) = overrides.run_mode {
        config.registry.run_mode = run_mode;
    }

    if let Some(overwrite) = overrides.overwrite {
        config.loader.overwrite = overwrite;
    }

    for (key, value) in &overrides.defines {
        config.properties.insert(key.clone(), value.clone());
    }

    if let Some(level) = overrides.log_level {
        config.log.level = level;
    }
}

/// Split a `KEY=VALUE` definition. A bare `KEY` defines an empty value.
pub fn parse_define(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw.split_once('=').unwrap_or((raw, ""));
    let key = key.trim();
    if key.is_empty() {
        return Err(format!("invalid definition '{}': missing key", raw));
    }
    Ok((key.to_string(), value.to_string()))
}
