//! # CarPi Dash Daemon Core Library
//!
//! Core functionality for the CarPi dashboard daemon.

#![cfg_attr(docsrs, feature(doc_cfg))]
#![warn(missing_docs)]

//!
//! This library provides:
//! - Type-tagged channel identifiers and the channel registry
//! - A pub/sub transport abstraction with Redis and in-process brokers
//! - A thread-safe latest-value store fed by a bus listener
//! - Vehicle-parameter config stores (INI file or bus-retained keys)
//! - The speed-density fuel consumption model
//! - The daemon loop deriving dashboard values every tick
//!
//! ## Example
//!
//! ```rust,ignore
//! use dashdaemon_core::prelude::*;
//! use std::sync::Arc;
//!
//! let settings = DaemonSettings::load_from("dash.ini".as_ref())?;
//! let daemon = DashDaemon::new(settings, Arc::new(InMemoryTransport::new()));
//! let shutdown = daemon.shutdown_handle();
//!
//! tokio::spawn(async move {
//!     tokio::signal::ctrl_c().await.ok();
//!     shutdown.shutdown();
//! });
//! daemon.run().await?;
//! ```

pub mod bus;
pub mod channel;
pub mod config;
pub mod daemon;
pub mod demo;
pub mod fuel;
pub mod store;
pub mod value;

/// Re-export commonly used types
pub mod prelude {
    pub use crate::bus::{
        BusEndpoint, BusError, BusListener, BusWriter, InMemoryBus, InMemoryTransport, RedisTransport,
        Transport,
    };
    pub use crate::channel::keys::{ConfigKey, LiveInput, LiveOutput};
    pub use crate::channel::{ChannelId, PayloadType};
    pub use crate::config::{ConfigBackend, ConfigError, ConfigStore, DaemonSettings, SettingsError};
    pub use crate::daemon::{DaemonError, DaemonState, DashDaemon, FuelOutcome, ShutdownHandle, TickReport};
    pub use crate::fuel::VehicleParameters;
    pub use crate::store::{Snapshot, ValueStore};
    pub use crate::value::TelemetryValue;
}

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
