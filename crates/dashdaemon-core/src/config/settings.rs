//! Daemon settings file
//!
//! The INI file that tells the daemon where its config store and its source
//! and destination buses live:
//!
//! ```ini
//! [Config]
//! Type = Redis
//! Host = 127.0.0.1
//! Port = 6379
//!
//! [Source]
//! Host = 127.0.0.1
//!
//! [Destination]
//! Host = 127.0.0.1
//! ```

use super::SettingsError;
use crate::bus::transport::{DEFAULT_DB, DEFAULT_HOST, DEFAULT_PORT};
use crate::bus::BusEndpoint;
use ini::{Ini, Properties};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable naming the settings file
pub const SETTINGS_ENV_VAR: &str = "DASH_DAEMON_CFG";

/// Settings file locations tried when neither the CLI nor the environment name one
pub const DEFAULT_SETTINGS_PATHS: [&str; 2] = ["dash.ini", "/etc/carpi/dash.ini"];

/// Default tick period (5 Hz)
pub const DEFAULT_TICK_INTERVAL_MS: u64 = 200;
/// Default bound on one config store read
pub const DEFAULT_CONFIG_TIMEOUT_MS: u64 = 100;
/// Default bound on one publish
pub const DEFAULT_PUBLISH_TIMEOUT_MS: u64 = 100;

/// `[Config]` section: where vehicle parameters are read from
#[derive(Debug, Clone, PartialEq)]
pub struct ConfigSection {
    /// Backend kind as written (`Redis`, `Ini`, ...)
    pub kind: String,
    /// File location for file-backed stores
    pub path: Option<PathBuf>,
    /// Connection URL; wins over the individual fields
    pub url: Option<String>,
    /// Connection fields for bus-backed stores
    pub endpoint: BusEndpoint,
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            kind: "Redis".to_string(),
            path: None,
            url: None,
            endpoint: BusEndpoint::default(),
        }
    }
}

/// `[Daemon]` section: loop tuning
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LoopSettings {
    /// Period between derivation ticks
    pub tick_interval: Duration,
    /// Upper bound on reading vehicle parameters in one tick
    pub config_timeout: Duration,
    /// Upper bound on a single publish
    pub publish_timeout: Duration,
}

impl Default for LoopSettings {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(DEFAULT_TICK_INTERVAL_MS),
            config_timeout: Duration::from_millis(DEFAULT_CONFIG_TIMEOUT_MS),
            publish_timeout: Duration::from_millis(DEFAULT_PUBLISH_TIMEOUT_MS),
        }
    }
}

/// Everything the daemon reads from its settings file
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DaemonSettings {
    /// Where vehicle parameters come from
    pub config: ConfigSection,
    /// Inbound telemetry bus
    pub source: BusEndpoint,
    /// Outbound dashboard bus
    pub destination: BusEndpoint,
    /// Loop timing
    pub daemon: LoopSettings,
}

impl DaemonSettings {
    /// Load settings from `path`, which must exist
    pub fn load_from(path: &Path) -> Result<Self, SettingsError> {
        if !path.exists() {
            return Err(SettingsError::NotFound(path.to_path_buf()));
        }
        let ini = Ini::load_from_file(path)?;
        Self::from_ini(&ini)
    }

    /// Parse settings from INI text
    pub fn parse(content: &str) -> Result<Self, SettingsError> {
        let ini = Ini::load_from_str(content).map_err(|e| SettingsError::ReadError(ini::Error::Parse(e)))?;
        Self::from_ini(&ini)
    }

    /// Build settings from a parsed INI document, starting from defaults
    pub fn from_ini(ini: &Ini) -> Result<Self, SettingsError> {
        let mut settings = Self::default();

        if let Some(section) = ini.section(Some("Config")) {
            let config = &mut settings.config;
            if let Some(v) = non_empty(section, "Type") {
                config.kind = v.to_string();
            }
            config.path = non_empty(section, "Path").map(PathBuf::from);
            config.url = non_empty(section, "URL").map(str::to_string);
            config.endpoint = parse_endpoint("Config", section)?;
        }

        if let Some(section) = ini.section(Some("Source")) {
            settings.source = parse_endpoint("Source", section)?;
        }

        if let Some(section) = ini.section(Some("Destination")) {
            settings.destination = parse_endpoint("Destination", section)?;
        }

        if let Some(section) = ini.section(Some("Daemon")) {
            let daemon = &mut settings.daemon;
            if let Some(ms) = parse_number::<u64>("Daemon", section, "TickIntervalMs")? {
                if ms == 0 {
                    return Err(SettingsError::InvalidValue {
                        section: "Daemon".to_string(),
                        key: "TickIntervalMs".to_string(),
                        value: ms.to_string(),
                        reason: "must be greater than zero".to_string(),
                    });
                }
                daemon.tick_interval = Duration::from_millis(ms);
            }
            if let Some(ms) = parse_number::<u64>("Daemon", section, "ConfigTimeoutMs")? {
                daemon.config_timeout = Duration::from_millis(ms);
            }
            if let Some(ms) = parse_number::<u64>("Daemon", section, "PublishTimeoutMs")? {
                daemon.publish_timeout = Duration::from_millis(ms);
            }
        }

        Ok(settings)
    }
}

/// Pick the settings file: explicit path, then `DASH_DAEMON_CFG`, then the
/// first existing default location.
pub fn locate_settings(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os(SETTINGS_ENV_VAR).filter(|p| !p.is_empty()) {
        return Some(PathBuf::from(path));
    }
    DEFAULT_SETTINGS_PATHS
        .iter()
        .map(PathBuf::from)
        .find(|p| p.exists())
}

fn non_empty<'a>(section: &'a Properties, key: &str) -> Option<&'a str> {
    section.get(key).map(str::trim).filter(|v| !v.is_empty())
}

fn parse_number<T: std::str::FromStr>(
    section_name: &str,
    section: &Properties,
    key: &str,
) -> Result<Option<T>, SettingsError> {
    match non_empty(section, key) {
        None => Ok(None),
        Some(v) => v.parse().map(Some).map_err(|_| SettingsError::InvalidValue {
            section: section_name.to_string(),
            key: key.to_string(),
            value: v.to_string(),
            reason: "must be a non-negative integer".to_string(),
        }),
    }
}

fn parse_endpoint(section_name: &str, section: &Properties) -> Result<BusEndpoint, SettingsError> {
    let host = non_empty(section, "Host").unwrap_or(DEFAULT_HOST);
    let port = parse_number::<u16>(section_name, section, "Port")?.unwrap_or(DEFAULT_PORT);
    let db = parse_number::<u32>(section_name, section, "DB")?.unwrap_or(DEFAULT_DB);
    let password = non_empty(section, "Password").map(str::to_string);
    Ok(BusEndpoint::new(host, port).with_db(db).with_password(password))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_file_uses_defaults() {
        let settings = DaemonSettings::parse("").unwrap();
        assert_eq!(settings, DaemonSettings::default());
        assert_eq!(settings.config.kind, "Redis");
        assert_eq!(settings.source.address(), "127.0.0.1:6379/0");
        assert_eq!(settings.daemon.tick_interval, Duration::from_millis(200));
    }

    #[test]
    fn test_full_file() {
        let settings = DaemonSettings::parse(
            "[Config]\n\
             Type = Ini\n\
             Path = /etc/carpi/settings.ini\n\
             \n\
             [Source]\n\
             Host = 10.0.0.2\n\
             Port = 6380\n\
             DB = 1\n\
             Password = s3cret\n\
             \n\
             [Destination]\n\
             DB = 3\n\
             \n\
             [Daemon]\n\
             TickIntervalMs = 100\n\
             PublishTimeoutMs = 20\n",
        )
        .unwrap();

        assert_eq!(settings.config.kind, "Ini");
        assert_eq!(
            settings.config.path,
            Some(PathBuf::from("/etc/carpi/settings.ini"))
        );
        assert_eq!(
            settings.source,
            BusEndpoint::new("10.0.0.2", 6380)
                .with_db(1)
                .with_password(Some("s3cret".into()))
        );
        assert_eq!(settings.destination, BusEndpoint::default().with_db(3));
        assert_eq!(settings.daemon.tick_interval, Duration::from_millis(100));
        assert_eq!(settings.daemon.publish_timeout, Duration::from_millis(20));
        assert_eq!(settings.daemon.config_timeout, Duration::from_millis(100));
    }

    #[test]
    fn test_invalid_port() {
        let err = DaemonSettings::parse("[Source]\nPort = redis\n").unwrap_err();
        match err {
            SettingsError::InvalidValue { section, key, .. } => {
                assert_eq!(section, "Source");
                assert_eq!(key, "Port");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_zero_tick_rejected() {
        assert!(DaemonSettings::parse("[Daemon]\nTickIntervalMs = 0\n").is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dash.ini");
        match DaemonSettings::load_from(&path).unwrap_err() {
            SettingsError::NotFound(missing) => assert_eq!(missing, path),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_keys_ignore_case() {
        let settings = DaemonSettings::parse(
            "[config]\n\
             type = Ini\n\
             PATH = /etc/carpi/settings.ini\n\
             \n\
             [SOURCE]\n\
             host = 10.0.0.2\n\
             \n\
             [daemon]\n\
             tickintervalms = 50\n",
        )
        .unwrap();

        assert_eq!(settings.config.kind, "Ini");
        assert_eq!(
            settings.config.path,
            Some(PathBuf::from("/etc/carpi/settings.ini"))
        );
        assert_eq!(settings.source.host, "10.0.0.2");
        assert_eq!(settings.daemon.tick_interval, Duration::from_millis(50));
    }

    #[test]
    fn test_locate_prefers_explicit_path() {
        let explicit = Path::new("/tmp/custom-dash.ini");
        assert_eq!(locate_settings(Some(explicit)), Some(explicit.to_path_buf()));
    }
}
