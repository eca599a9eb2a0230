//! Config store selection

use super::settings::ConfigSection;
use super::store::{BusStore, ConfigStore, IniStore};
use super::ConfigError;
use crate::bus::{BusEndpoint, Transport};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

/// Where vehicle parameters come from
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigBackend {
    /// INI file on disk (`Type = Ini`)
    Ini { path: PathBuf },
    /// Retained keys on a bus instance (`Type = Redis`)
    Bus { endpoint: BusEndpoint },
}

impl ConfigBackend {
    /// Resolve the `[Config]` section. Unknown kinds and a file backend
    /// without a path are configuration errors.
    pub fn from_section(section: &ConfigSection) -> Result<Self, ConfigError> {
        match section.kind.to_ascii_lowercase().as_str() {
            "ini" => match &section.path {
                Some(path) => Ok(ConfigBackend::Ini { path: path.clone() }),
                None => {
                    error!("Failed to load configuration because no location was specified");
                    Err(ConfigError::LocationUnspecified)
                }
            },
            "redis" => {
                let endpoint = match &section.url {
                    Some(url) => BusEndpoint::from_url(url)?,
                    None => section.endpoint.clone(),
                };
                Ok(ConfigBackend::Bus { endpoint })
            }
            _ => {
                error!(kind = %section.kind, "Configuration type is unknown or not implemented");
                Err(ConfigError::UnknownBackend(section.kind.clone()))
            }
        }
    }

    /// Open the store
    pub async fn connect(&self, transport: &dyn Transport) -> Result<Arc<dyn ConfigStore>, ConfigError> {
        match self {
            ConfigBackend::Ini { path } => Ok(Arc::new(IniStore::open(path.clone()).await?)),
            ConfigBackend::Bus { endpoint } => {
                info!(endpoint = %endpoint, "Loading bus-backed configuration");
                let connection = transport
                    .connect(endpoint)
                    .await
                    .map_err(|e| ConfigError::Unreachable(e.to_string()))?;
                Ok(Arc::new(BusStore::new(connection, endpoint.address())))
            }
        }
    }
}
