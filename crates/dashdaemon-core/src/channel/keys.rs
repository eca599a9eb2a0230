//! Channel registry
//!
//! Static names of every bus channel and settings key the daemon touches.
//! Inputs live in the namespaces of the upstream OBD and GPS producers,
//! outputs in the dashboard namespace.

use super::{ChannelId, PayloadType};

/// Namespace of operator-adjustable settings
pub const SETTINGS_KEY_BASE: &str = "carpi.settings.";
/// Namespace of values published for the display layer
pub const DASH_KEY_BASE: &str = "carpi.dashboard.";
/// Namespace of the OBD producer
pub const OBD_KEY_BASE: &str = "carpi.obd.";
/// Namespace of the GPS producer
pub const GPS_KEY_BASE: &str = "carpi.gps.";

/// Live telemetry produced by other subsystems
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiveInput {
    /// Engine speed (rev/min)
    CarRpm,
    /// Manifold absolute pressure (kPa)
    CarMap,
    /// Intake air temperature (absolute scale)
    CarTmp,
    /// Vehicle speed reported by the ECU (km/h)
    CarSpd,
    /// Ground speed from GPS
    GpsSpd,
    /// GPS longitude error estimate
    GpsAccLng,
    /// GPS latitude error estimate
    GpsAccLat,
    /// GPS speed error estimate
    GpsAccSpd,
}

impl LiveInput {
    /// Every known input
    pub const ALL: [LiveInput; 8] = [
        LiveInput::CarRpm,
        LiveInput::CarMap,
        LiveInput::CarTmp,
        LiveInput::CarSpd,
        LiveInput::GpsSpd,
        LiveInput::GpsAccLng,
        LiveInput::GpsAccLat,
        LiveInput::GpsAccSpd,
    ];

    /// Logical name used in configuration and diagnostics
    pub const fn logical_name(self) -> &'static str {
        match self {
            LiveInput::CarRpm => "car_rpm",
            LiveInput::CarMap => "car_map",
            LiveInput::CarTmp => "car_tmp",
            LiveInput::CarSpd => "car_spd",
            LiveInput::GpsSpd => "gps_spd",
            LiveInput::GpsAccLng => "gps_acc_lng",
            LiveInput::GpsAccLat => "gps_acc_lat",
            LiveInput::GpsAccSpd => "gps_acc_spd",
        }
    }

    /// Declared payload type
    pub const fn payload_type(self) -> PayloadType {
        match self {
            LiveInput::CarRpm | LiveInput::CarMap | LiveInput::CarTmp | LiveInput::CarSpd => {
                PayloadType::Int
            }
            _ => PayloadType::Float,
        }
    }

    /// Bus channel carrying this input
    pub fn channel(self) -> ChannelId {
        let (base, name) = match self {
            LiveInput::CarRpm => (OBD_KEY_BASE, "rpm"),
            LiveInput::CarMap => (OBD_KEY_BASE, "intakepressure"),
            LiveInput::CarTmp => (OBD_KEY_BASE, "intaketemp"),
            LiveInput::CarSpd => (OBD_KEY_BASE, "speed"),
            LiveInput::GpsSpd => (GPS_KEY_BASE, "speed"),
            LiveInput::GpsAccLng => (GPS_KEY_BASE, "epx"),
            LiveInput::GpsAccLat => (GPS_KEY_BASE, "epy"),
            LiveInput::GpsAccSpd => (GPS_KEY_BASE, "eps"),
        };
        ChannelId::build(self.payload_type(), base, name)
    }

    /// Look up an input by logical name
    pub fn by_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|i| i.logical_name() == name)
    }
}

/// Values published for the dashboard display
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiveOutput {
    /// Vehicle speed pass-through
    Speed,
    /// Instantaneous fuel consumption (l/h)
    FuelUsage,
    /// Distance-based consumption (l/100km)
    FuelEfficiency,
    /// Set when fuel values could not be computed this tick
    FuelFailFlag,
}

impl LiveOutput {
    /// Every output
    pub const ALL: [LiveOutput; 4] = [
        LiveOutput::Speed,
        LiveOutput::FuelUsage,
        LiveOutput::FuelEfficiency,
        LiveOutput::FuelFailFlag,
    ];

    /// Logical name used in diagnostics
    pub const fn logical_name(self) -> &'static str {
        match self {
            LiveOutput::Speed => "speed",
            LiveOutput::FuelUsage => "fuel_usage",
            LiveOutput::FuelEfficiency => "fuel_efficiency",
            LiveOutput::FuelFailFlag => "fuel_fail_flag",
        }
    }

    /// Declared payload type
    pub const fn payload_type(self) -> PayloadType {
        match self {
            LiveOutput::Speed => PayloadType::Int,
            LiveOutput::FuelUsage | LiveOutput::FuelEfficiency => PayloadType::Float,
            LiveOutput::FuelFailFlag => PayloadType::Bool,
        }
    }

    /// Bus channel carrying this output
    pub fn channel(self) -> ChannelId {
        let name = match self {
            LiveOutput::Speed => "speed",
            LiveOutput::FuelUsage => "fuelusage",
            LiveOutput::FuelEfficiency => "fuelefficiency",
            LiveOutput::FuelFailFlag => "fuelfailflag",
        };
        ChannelId::build(self.payload_type(), DASH_KEY_BASE, name)
    }

    /// Look up an output by logical name
    pub fn by_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|o| o.logical_name() == name)
    }
}

/// Vehicle parameters held in the config store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConfigKey {
    /// Engine displacement in milliliters
    EngineVolume,
    /// Volumetric efficiency in percent
    VolumetricEfficiency,
    /// Fuel density in g/L
    FuelDensity,
}

impl ConfigKey {
    /// Every settings key
    pub const ALL: [ConfigKey; 3] = [
        ConfigKey::EngineVolume,
        ConfigKey::VolumetricEfficiency,
        ConfigKey::FuelDensity,
    ];

    /// Logical name used in diagnostics
    pub const fn logical_name(self) -> &'static str {
        match self {
            ConfigKey::EngineVolume => "engine_vol",
            ConfigKey::VolumetricEfficiency => "vol_efficency",
            ConfigKey::FuelDensity => "fuel_density",
        }
    }

    /// Value used when the setting is unset. Engine volume has none.
    pub const fn default_value(self) -> Option<i64> {
        match self {
            ConfigKey::EngineVolume => None,
            ConfigKey::VolumetricEfficiency => Some(85),
            ConfigKey::FuelDensity => Some(745),
        }
    }

    /// Settings key in the config store
    pub fn key(self) -> ChannelId {
        let name = match self {
            ConfigKey::EngineVolume => "car.enginevolume",
            ConfigKey::VolumetricEfficiency => "car.efficency",
            ConfigKey::FuelDensity => "car.fueldensity",
        };
        ChannelId::build(PayloadType::Int, SETTINGS_KEY_BASE, name)
    }

    /// Look up a settings key by logical name
    pub fn by_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.logical_name() == name)
    }
}

/// Inputs the daemon subscribes to
pub const SUBSCRIBED_INPUTS: [LiveInput; 4] = [
    LiveInput::CarRpm,
    LiveInput::CarSpd,
    LiveInput::CarMap,
    LiveInput::CarTmp,
];

/// Channels of [`SUBSCRIBED_INPUTS`]
pub fn subscribed_channels() -> Vec<ChannelId> {
    SUBSCRIBED_INPUTS.iter().map(|i| i.channel()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_tags_match_declared_types() {
        for input in LiveInput::ALL {
            assert_eq!(input.channel().payload_type(), input.payload_type(), "{:?}", input);
        }
        for output in LiveOutput::ALL {
            assert_eq!(output.channel().payload_type(), output.payload_type(), "{:?}", output);
        }
        for key in ConfigKey::ALL {
            assert_eq!(key.key().payload_type(), PayloadType::Int);
        }
    }

    #[test]
    fn test_identifiers_are_unique() {
        let mut seen = HashSet::new();
        let all = LiveInput::ALL
            .iter()
            .map(|i| i.channel())
            .chain(LiveOutput::ALL.iter().map(|o| o.channel()))
            .chain(ConfigKey::ALL.iter().map(|k| k.key()));
        for id in all {
            assert!(seen.insert(id.name().to_string()), "duplicate key {}", id);
        }
    }

    #[test]
    fn test_lookup_by_logical_name() {
        assert_eq!(LiveInput::by_name("car_map"), Some(LiveInput::CarMap));
        assert_eq!(LiveOutput::by_name("fuel_fail_flag"), Some(LiveOutput::FuelFailFlag));
        assert_eq!(ConfigKey::by_name("engine_vol"), Some(ConfigKey::EngineVolume));
        assert_eq!(LiveInput::by_name("oil_temp"), None);
    }

    #[test]
    fn test_known_keys() {
        assert_eq!(LiveOutput::Speed.channel().as_str(), "#carpi.dashboard.speed");
        assert_eq!(
            ConfigKey::FuelDensity.key().as_str(),
            "#carpi.settings.car.fueldensity"
        );
        assert_eq!(subscribed_channels().len(), 4);
    }
}
