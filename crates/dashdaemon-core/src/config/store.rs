//! Vehicle-parameter config stores
//!
//! Read-only key/value lookup of operator settings. Keys are the tagged
//! settings identifiers from [`crate::channel::keys::ConfigKey`].

use super::ConfigError;
use crate::bus::BusConnection;
use crate::channel::ChannelId;
use async_trait::async_trait;
use ini::Ini;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Source of operator settings
#[async_trait]
pub trait ConfigStore: Send + Sync {
    /// Raw value of `key`, `None` if unset
    async fn read_value(&self, key: &ChannelId) -> Result<Option<String>, ConfigError>;

    /// Integer value of `key`, falling back to `default` when unset
    async fn read_int_value(&self, key: &ChannelId, default: Option<i64>) -> Result<Option<i64>, ConfigError> {
        match self.read_value(key).await? {
            None => Ok(default),
            Some(raw) => {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    return Ok(default);
                }
                trimmed
                    .parse::<i64>()
                    .map(Some)
                    .map_err(|_| ConfigError::InvalidValue {
                        key: key.to_string(),
                        value: raw.clone(),
                    })
            }
        }
    }

    /// Human-readable location, for logs
    fn describe(&self) -> String;
}

/// INI-file backed store.
///
/// `#carpi.settings.car.enginevolume` is looked up as key `enginevolume` in
/// section `[carpi.settings.car]`. The file is re-read whenever its
/// modification time changes, so edits take effect on the next read.
pub struct IniStore {
    path: PathBuf,
    cache: Mutex<CachedIni>,
}

struct CachedIni {
    ini: Ini,
    modified: Option<SystemTime>,
}

impl IniStore {
    /// Open the store. The file must exist and parse.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, ConfigError> {
        let path = path.into();
        info!(path = %path.display(), "Loading INI configuration");
        let cached = load_ini(&path).await?;
        Ok(Self {
            path,
            cache: Mutex::new(cached),
        })
    }

    /// Location of the backing file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

async fn load_ini(path: &Path) -> Result<CachedIni, ConfigError> {
    let content = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Unreachable(format!("{}: {}", path.display(), e)))?;
    let modified = tokio::fs::metadata(path).await.ok().and_then(|m| m.modified().ok());
    let ini = Ini::load_from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
    Ok(CachedIni { ini, modified })
}

fn split_key(key: &ChannelId) -> (&str, &str) {
    let name = key.name();
    match name.rsplit_once('.') {
        Some((section, key)) => (section, key),
        None => ("", name),
    }
}

#[async_trait]
impl ConfigStore for IniStore {
    async fn read_value(&self, key: &ChannelId) -> Result<Option<String>, ConfigError> {
        let mut cache = self.cache.lock().await;

        // A vanished file must not keep serving cached values
        let metadata = tokio::fs::metadata(&self.path)
            .await
            .map_err(|e| ConfigError::Unreachable(format!("{}: {}", self.path.display(), e)))?;
        let modified = metadata.modified().ok();
        if modified.is_some() && modified != cache.modified {
            debug!(path = %self.path.display(), "Settings file changed, reloading");
            *cache = load_ini(&self.path).await?;
        }

        let (section, name) = split_key(key);
        let section = if section.is_empty() { None } else { Some(section) };
        Ok(cache
            .ini
            .section(section)
            .and_then(|props| props.get(name))
            .map(str::to_string))
    }

    fn describe(&self) -> String {
        format!("ini:{}", self.path.display())
    }
}

/// Store reading retained values from a bus connection
pub struct BusStore {
    connection: Arc<dyn BusConnection>,
    location: String,
}

impl BusStore {
    /// Store over `connection`; `location` only shows up in logs
    pub fn new(connection: Arc<dyn BusConnection>, location: impl Into<String>) -> Self {
        Self {
            connection,
            location: location.into(),
        }
    }
}

#[async_trait]
impl ConfigStore for BusStore {
    async fn read_value(&self, key: &ChannelId) -> Result<Option<String>, ConfigError> {
        Ok(self.connection.get(key).await?)
    }

    fn describe(&self) -> String {
        format!("bus:{}", self.location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{BusEndpoint, InMemoryTransport, Transport};
    use crate::channel::keys::ConfigKey;
    use std::io::Write;

    fn write_settings(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        file.flush().unwrap();
        file
    }

    #[tokio::test]
    async fn test_ini_store_lookup() {
        let file = write_settings("[carpi.settings.car]\nenginevolume = 1998\nfueldensity = 750\n");
        let store = IniStore::open(file.path()).await.unwrap();

        assert_eq!(
            store
                .read_int_value(&ConfigKey::EngineVolume.key(), None)
                .await
                .unwrap(),
            Some(1998)
        );
        // Unset key falls back to its default
        assert_eq!(
            store
                .read_int_value(&ConfigKey::VolumetricEfficiency.key(), Some(85))
                .await
                .unwrap(),
            Some(85)
        );
        assert!(store.describe().starts_with("ini:"));
    }

    #[tokio::test]
    async fn test_ini_store_invalid_int() {
        let file = write_settings("[carpi.settings.car]\nenginevolume = big\n");
        let store = IniStore::open(file.path()).await.unwrap();

        let err = store
            .read_int_value(&ConfigKey::EngineVolume.key(), None)
            .await
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { .. }));
    }

    #[tokio::test]
    async fn test_ini_store_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = IniStore::open(dir.path().join("nope.ini")).await.err().unwrap();
        assert!(matches!(err, ConfigError::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_ini_store_deleted_file_is_unreachable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("vehicle.ini");
        std::fs::write(&path, "[carpi.settings.car]\nenginevolume = 1998\n").unwrap();
        let store = IniStore::open(&path).await.unwrap();
        let key = ConfigKey::EngineVolume.key();
        assert_eq!(store.read_value(&key).await.unwrap().as_deref(), Some("1998"));

        std::fs::remove_file(&path).unwrap();
        let err = store.read_value(&key).await.unwrap_err();
        assert!(matches!(err, ConfigError::Unreachable(_)));
    }

    #[tokio::test]
    async fn test_bus_store_reads_retained_values() {
        let transport = InMemoryTransport::new();
        let conn = transport.connect(&BusEndpoint::default()).await.unwrap();
        conn.set(&ConfigKey::FuelDensity.key(), "720".into()).await.unwrap();

        let store = BusStore::new(conn, "127.0.0.1:6379/0");
        assert_eq!(
            store
                .read_int_value(&ConfigKey::FuelDensity.key(), Some(745))
                .await
                .unwrap(),
            Some(720)
        );
        assert_eq!(
            store
                .read_int_value(&ConfigKey::EngineVolume.key(), None)
                .await
                .unwrap(),
            None
        );
    }
}
