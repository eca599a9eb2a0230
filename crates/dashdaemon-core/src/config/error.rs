//! Configuration errors

use crate::bus::BusError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors of the vehicle-parameter config store
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    /// `[Config] Type` names a backend that does not exist
    #[error("Configuration type '{0}' is unknown or not implemented")]
    UnknownBackend(String),

    /// File-backed store selected without a path
    #[error("Configuration type Ini requires [Config] Path")]
    LocationUnspecified,

    /// The store could not be reached or opened
    #[error("Config store unreachable: {0}")]
    Unreachable(String),

    /// Bus-backed store failed
    #[error("Config store bus error: {0}")]
    Bus(#[from] BusError),

    /// INI store file could not be parsed
    #[error("Failed to parse config store: {0}")]
    Parse(String),

    /// A stored value has the wrong type
    #[error("Invalid value for '{key}': '{value}'")]
    InvalidValue { key: String, value: String },

    /// A required setting is not present and has no default
    #[error("Required setting '{0}' is not set")]
    Missing(String),

    /// The store did not answer in time
    #[error("Config store read timed out")]
    Timeout,
}

/// Errors loading the daemon's own settings file
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The settings file named on the command line or in the environment does not exist
    #[error("Settings file {} not found", .0.display())]
    NotFound(PathBuf),

    /// Failed to read or parse the settings file
    #[error("Failed to read settings file: {0}")]
    ReadError(#[from] ini::Error),

    /// Invalid configuration value
    #[error("Invalid setting: {section}.{key} = '{value}' - {reason}")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
        reason: String,
    },
}
