//! Configuration
//!
//! Two distinct layers:
//! - [`DaemonSettings`]: the daemon's own INI file (config store location,
//!   source and destination buses, loop tuning)
//! - [`ConfigStore`]: the operator-owned vehicle parameters, read every tick

mod backend;
mod error;
pub mod settings;
pub mod store;

pub use backend::ConfigBackend;
pub use error::{ConfigError, SettingsError};
pub use settings::{locate_settings, ConfigSection, DaemonSettings, LoopSettings};
pub use store::{BusStore, ConfigStore, IniStore};
