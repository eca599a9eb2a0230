//! Fatal daemon errors and their process exit codes

use super::DaemonState;
use crate::bus::BusError;
use crate::config::{ConfigError, SettingsError};
use thiserror::Error;

/// Base of every daemon exit code; the reason is added on top
pub const DEFAULT_EXIT_CODE: i32 = 0xFD00;

/// Config store unknown, unreachable or malformed
pub const REASON_CONFIG_CONNECTION_INVALID: i32 = 0xC0;
/// File-backed config store without a location
pub const REASON_CONFIG_WHEREISIT: i32 = 0xC1;
/// Daemon settings file unreadable or invalid
pub const REASON_SETTINGS_INVALID: i32 = 0xC2;
/// Source or destination bus unreachable
pub const REASON_BUS_UNREACHABLE: i32 = 0xB0;

/// Errors that abort the daemon
#[derive(Debug, Error)]
pub enum DaemonError {
    #[error("Config store: {0}")]
    Config(#[from] ConfigError),

    #[error("Settings: {0}")]
    Settings(#[from] SettingsError),

    #[error("Data bus: {0}")]
    Bus(#[from] BusError),

    #[error("Daemon cannot start from state {0:?}")]
    InvalidState(DaemonState),
}

impl DaemonError {
    /// Failure class added to [`DEFAULT_EXIT_CODE`]
    pub fn reason(&self) -> i32 {
        match self {
            DaemonError::Config(ConfigError::LocationUnspecified) => REASON_CONFIG_WHEREISIT,
            DaemonError::Config(_) => REASON_CONFIG_CONNECTION_INVALID,
            DaemonError::Settings(_) => REASON_SETTINGS_INVALID,
            DaemonError::Bus(_) => REASON_BUS_UNREACHABLE,
            DaemonError::InvalidState(_) => 0,
        }
    }

    /// Process exit code for this failure
    pub fn exit_code(&self) -> i32 {
        DEFAULT_EXIT_CODE + self.reason()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        assert_eq!(
            DaemonError::Config(ConfigError::UnknownBackend("Etcd".into())).exit_code(),
            0xFDC0
        );
        assert_eq!(
            DaemonError::Config(ConfigError::LocationUnspecified).exit_code(),
            0xFDC1
        );
        assert_eq!(
            DaemonError::Config(ConfigError::Unreachable("refused".into())).exit_code(),
            0xFDC0
        );
        assert_eq!(DaemonError::Bus(BusError::NotConnected).exit_code(), 0xFDB0);
    }

    #[test]
    fn test_exit_codes_are_distinct() {
        let codes = [
            REASON_CONFIG_CONNECTION_INVALID,
            REASON_CONFIG_WHEREISIT,
            REASON_SETTINGS_INVALID,
            REASON_BUS_UNREACHABLE,
        ];
        for (i, a) in codes.iter().enumerate() {
            for b in &codes[i + 1..] {
                assert_ne!(a, b);
            }
        }
    }
}
