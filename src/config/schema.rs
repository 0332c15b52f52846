//! Configuration schema types for `resgraph.toml`
//!
//! Defines the structure and validation rules for the registry, loader and
//! logging settings.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::registry::RegistryOptions;

/// Log verbosity for the `rgx` binary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Off,
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn to_filter(self) -> log::LevelFilter {
        match self {
            LogLevel::Off => log::LevelFilter::Off,
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// `[registry]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Persist named dependencies by reference
    #[serde(default)]
    pub run_mode: bool,
    /// Fail creation cascades that loop back into themselves
    #[serde(default = "default_true")]
    pub detect_cycles: bool,
    /// Destroy dependencies created by a cascade that failed
    #[serde(default = "default_true")]
    pub rollback_failed_cascades: bool,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self { run_mode: false, detect_cycles: true, rollback_failed_cascades: true }
    }
}

fn default_true() -> bool {
    true
}

/// `[loader]` section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoaderConfig {
    /// Replace existing entries instead of rejecting duplicates
    #[serde(default)]
    pub overwrite: bool,
    /// Extensions tried for include paths written without one
    #[serde(default = "default_extensions")]
    pub extensions: Vec<String>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self { overwrite: false, extensions: default_extensions() }
    }
}

fn default_extensions() -> Vec<String> {
    crate::include::DEFAULT_EXTENSIONS.iter().map(|ext| ext.to_string()).collect()
}

/// `[log]` section
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct LogConfig {
    #[serde(default)]
    pub level: LogLevel,
}

/// Complete resgraph.toml configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct ResgraphConfig {
    #[serde(default)]
    pub registry: RegistryConfig,
    #[serde(default)]
    pub loader: LoaderConfig,
    #[serde(default)]
    pub log: LogConfig,
    /// Properties seeded into every loader, tested by `ifdef`/`ifndef`
    #[serde(default)]
    pub properties: HashMap<String, String>,
}

/// Configuration validation error
#[derive(Debug, Clone)]
pub struct ConfigValidationError {
    /// Path to the invalid field (e.g., "loader.extensions")
    pub field: String,
    /// Error message
    pub message: String,
}

impl std::fmt::Display for ConfigValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "resgraph.toml: '{}' {}", self.field, self.message)
    }
}

impl ResgraphConfig {
    /// Validate the configuration and return any errors
    pub fn validate(&self) -> Vec<ConfigValidationError> {
        let mut errors = Vec::new();

        for (i, ext) in self.loader.extensions.iter().enumerate() {
            if ext.is_empty() {
                errors.push(ConfigValidationError {
                    field: format!("loader.extensions[{}]", i),
                    message: "must be a non-empty string".to_string(),
                });
            } else if ext.starts_with('.') {
                errors.push(ConfigValidationError {
                    field: format!("loader.extensions[{}]", i),
                    message: format!("must not start with a dot (use \"{}\")", &ext[1..]),
                });
            }
        }

        let mut keys: Vec<_> = self.properties.keys().collect();
        keys.sort();
        for key in keys {
            if key.trim().is_empty() {
                errors.push(ConfigValidationError {
                    field: "properties".to_string(),
                    message: "keys must be non-empty".to_string(),
                });
            }
        }

        errors
    }

    /// Check if validation passed
    pub fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }

    /// Registry behavior switches described by `[registry]`.
    pub fn registry_options(&self) -> RegistryOptions {
        RegistryOptions {
            run_mode: self.registry.run_mode,
            detect_cycles: self.registry.detect_cycles,
            rollback_failed_cascades: self.registry.rollback_failed_cascades,
        }
    }
}
