//! One tick of the derivation loop
//!
//! Reads a snapshot, passes speed through, and derives fuel values when every
//! engine input is available. Failures never leave this module: they are
//! reported in the [`TickReport`] and surface on the bus as the fuel-fail flag.

use crate::bus::BusWriter;
use crate::channel::keys::{ConfigKey, LiveInput, LiveOutput};
use crate::channel::ChannelId;
use crate::config::{ConfigError, ConfigStore};
use crate::fuel::{self, VehicleParameters};
use crate::store::{Availability, Snapshot};
use crate::value::TelemetryValue;
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Outcome of the fuel part of a tick
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum FuelOutcome {
    /// Fuel usage (l/h) and efficiency (l/100km) were computed and published
    Published { usage: f64, efficiency: f64 },
    /// These engine inputs were never observed
    MissingInputs(Vec<ChannelId>),
    /// Vehicle parameters could not be read
    ParametersUnavailable(String),
}

impl FuelOutcome {
    /// Whether the fuel-fail flag is raised for this outcome
    pub fn failed(&self) -> bool {
        !matches!(self, FuelOutcome::Published { .. })
    }
}

/// What a tick produced
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TickReport {
    /// Speed passed through to the dashboard (km/h)
    pub speed: i64,
    /// Result of the fuel computation
    pub fuel: FuelOutcome,
    /// Publishes rejected by the transport during this tick
    pub publish_failures: usize,
}

/// Dependencies of a tick
pub struct TickContext<'a> {
    /// Vehicle parameter source
    pub config: &'a dyn ConfigStore,
    /// Destination bus
    pub writer: &'a BusWriter,
    /// Upper bound on reading all vehicle parameters
    pub config_timeout: Duration,
}

impl TickContext<'_> {
    /// Run one tick against `snapshot`
    pub async fn run(&self, snapshot: &Snapshot) -> TickReport {
        let mut failures = 0;

        // Never observed counts as standing still
        let speed_kmh = snapshot.number(&LiveInput::CarSpd.channel()).unwrap_or(0.0);
        let speed = speed_kmh.round() as i64;
        failures += self.publish(LiveOutput::Speed, TelemetryValue::Int(speed)).await;

        let rpm = LiveInput::CarRpm.channel();
        let map = LiveInput::CarMap.channel();
        let tmp = LiveInput::CarTmp.channel();

        let fuel = match snapshot.require([&rpm, &map, &tmp]) {
            Availability::Incomplete(missing) => {
                debug!(missing = ?missing, "Fuel inputs incomplete, skipping fuel computation");
                FuelOutcome::MissingInputs(missing)
            }
            Availability::Complete([rpm, map, tmp]) => match self.read_parameters().await {
                Err(e) => {
                    warn!(error = %e, "Vehicle parameters unavailable, skipping fuel computation");
                    FuelOutcome::ParametersUnavailable(e.to_string())
                }
                Ok(params) => {
                    let usage = fuel::fuel_usage_rate_for(rpm, map, tmp, &params);
                    let efficiency = fuel::fuel_efficiency(speed_kmh, usage);
                    failures += self.publish(LiveOutput::FuelUsage, usage.into()).await;
                    failures += self.publish(LiveOutput::FuelEfficiency, efficiency.into()).await;
                    FuelOutcome::Published { usage, efficiency }
                }
            },
        };

        failures += self.publish(LiveOutput::FuelFailFlag, fuel.failed().into()).await;

        TickReport {
            speed,
            fuel,
            publish_failures: failures,
        }
    }

    /// Current vehicle parameters, read fresh from the store
    pub async fn read_parameters(&self) -> Result<VehicleParameters, ConfigError> {
        let read = async {
            let efficiency = self.read_setting(ConfigKey::VolumetricEfficiency).await?;
            let volume = self.read_setting(ConfigKey::EngineVolume).await?;
            let density = self.read_setting(ConfigKey::FuelDensity).await?;
            Ok(VehicleParameters::from_settings(efficiency, volume, density))
        };
        tokio::time::timeout(self.config_timeout, read)
            .await
            .map_err(|_| ConfigError::Timeout)?
    }

    async fn read_setting(&self, key: ConfigKey) -> Result<i64, ConfigError> {
        self.config
            .read_int_value(&key.key(), key.default_value())
            .await?
            .ok_or_else(|| ConfigError::Missing(key.key().to_string()))
    }

    /// Publish one output; returns 1 on failure so callers can count
    async fn publish(&self, output: LiveOutput, value: TelemetryValue) -> usize {
        match self.writer.publish(&output.channel(), value).await {
            Ok(()) => 0,
            Err(e) => {
                warn!(output = output.logical_name(), error = %e, "Publish failed");
                1
            }
        }
    }
}
