//! Fuel consumption model
//!
//! Speed-density estimate of instantaneous fuel flow from engine sensors,
//! for engines without a mass airflow sensor or injector duty readout.
//!
//! Units are fixed and not converted:
//! - engine speed in rev/min
//! - manifold absolute pressure in kPa
//! - intake air temperature on an absolute scale (K)
//! - displacement in liters
//! - fuel density in g/L
//! - vehicle speed in km/h

use serde::{Deserialize, Serialize};

/// Molar mass of dry air (g/mol)
pub const AIR_MOLAR_MASS: f64 = 28.97;

/// Universal gas constant (J/(mol·K)), equivalently kPa·L/(mol·K)
pub const GAS_CONSTANT: f64 = 8.314;

/// Stoichiometric air-fuel ratio of gasoline
pub const STOICH_AFR_GASOLINE: f64 = 14.7;

/// Efficiency reported while the vehicle is stationary
pub const STATIONARY_EFFICIENCY: f64 = 0.0;

/// Vehicle parameters feeding the model
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct VehicleParameters {
    /// Volumetric efficiency as a fraction (0.85 = 85%)
    pub volumetric_efficiency: f64,
    /// Engine displacement in liters
    pub engine_volume: f64,
    /// Fuel density in g/L
    pub fuel_density: f64,
}

impl VehicleParameters {
    /// Build from the integer settings as stored: percent, milliliters, g/L
    pub fn from_settings(efficiency_percent: i64, engine_volume_ml: i64, fuel_density: i64) -> Self {
        Self {
            volumetric_efficiency: efficiency_percent as f64 / 100.0,
            engine_volume: engine_volume_ml as f64 / 1000.0,
            fuel_density: fuel_density as f64,
        }
    }
}

/// Air mass flow into the engine in g/s.
///
/// A four-stroke engine draws its displacement once every two revolutions;
/// the ideal gas law turns that volume at MAP/IAT into moles of air.
pub fn air_mass_flow(rpm: f64, map_kpa: f64, intake_temp_k: f64, volumetric_efficiency: f64, engine_volume: f64) -> f64 {
    let imap = rpm * map_kpa / intake_temp_k / 2.0;
    (imap / 60.0) * volumetric_efficiency * engine_volume * AIR_MOLAR_MASS / GAS_CONSTANT
}

/// Instantaneous fuel consumption in liters per hour
pub fn fuel_usage_rate(
    rpm: f64,
    map_kpa: f64,
    intake_temp_k: f64,
    volumetric_efficiency: f64,
    engine_volume: f64,
    fuel_density: f64,
) -> f64 {
    let maf = air_mass_flow(rpm, map_kpa, intake_temp_k, volumetric_efficiency, engine_volume);
    let fuel_grams_per_second = maf / STOICH_AFR_GASOLINE;
    fuel_grams_per_second * 3600.0 / fuel_density
}

/// [`fuel_usage_rate`] with parameters taken from [`VehicleParameters`]
pub fn fuel_usage_rate_for(rpm: f64, map_kpa: f64, intake_temp_k: f64, params: &VehicleParameters) -> f64 {
    fuel_usage_rate(
        rpm,
        map_kpa,
        intake_temp_k,
        params.volumetric_efficiency,
        params.engine_volume,
        params.fuel_density,
    )
}

/// Distance-based consumption in liters per 100 km.
///
/// Returns [`STATIONARY_EFFICIENCY`] when the vehicle is not moving (zero,
/// negative or non-finite speed).
pub fn fuel_efficiency(speed_kmh: f64, liters_per_hour: f64) -> f64 {
    if !speed_kmh.is_finite() || speed_kmh <= 0.0 {
        return STATIONARY_EFFICIENCY;
    }
    liters_per_hour / speed_kmh * 100.0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_rate(rpm: f64, map: f64) -> f64 {
        fuel_usage_rate(rpm, map, 300.0, 0.85, 2.0, 745.0)
    }

    #[test]
    fn test_reference_point() {
        // 2.0 l engine at 2000 rpm, 60 kPa, 300 K
        let lph = reference_rate(2000.0, 60.0);
        assert!((lph - 6.49).abs() < 0.01, "got {lph}");
    }

    #[test]
    fn test_monotonic_in_rpm_and_map() {
        let mut last = 0.0;
        for rpm in (0..=7000).step_by(250) {
            let rate = reference_rate(rpm as f64, 60.0);
            assert!(rate >= last, "rate fell at {rpm} rpm");
            last = rate;
        }

        let mut last = 0.0;
        for map in (10..=250).step_by(5) {
            let rate = reference_rate(2500.0, map as f64);
            assert!(rate >= last, "rate fell at {map} kPa");
            last = rate;
        }
    }

    #[test]
    fn test_engine_off_uses_no_fuel() {
        assert_eq!(reference_rate(0.0, 100.0), 0.0);
    }

    #[test]
    fn test_efficiency_while_moving() {
        assert!((fuel_efficiency(60.0, 6.0) - 10.0).abs() < 1e-9);
        assert!((fuel_efficiency(120.0, 6.0) - 5.0).abs() < 1e-9);
    }

    #[test]
    fn test_efficiency_stationary_sentinel() {
        for lph in [0.0, 1.2, 250.0, f64::INFINITY, f64::NAN] {
            assert_eq!(fuel_efficiency(0.0, lph), STATIONARY_EFFICIENCY);
        }
        assert_eq!(fuel_efficiency(-5.0, 3.0), STATIONARY_EFFICIENCY);
        assert_eq!(fuel_efficiency(f64::NAN, 3.0), STATIONARY_EFFICIENCY);
    }

    #[test]
    fn test_parameters_from_settings() {
        let params = VehicleParameters::from_settings(85, 1998, 745);
        assert_eq!(params.volumetric_efficiency, 0.85);
        assert_eq!(params.engine_volume, 1.998);
        assert_eq!(params.fuel_density, 745.0);
        assert_eq!(
            fuel_usage_rate_for(2000.0, 60.0, 300.0, &params),
            fuel_usage_rate(2000.0, 60.0, 300.0, 0.85, 1.998, 745.0)
        );
    }
}
