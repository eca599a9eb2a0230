//! Demo Mode - Simulated OBD producer
//!
//! Generates plausible engine and GPS readings so the daemon can be exercised
//! without a car attached. The engine idles at ~850 RPM with the car standing
//! still, and every 8-15 seconds accelerates briefly before coasting back.

use crate::bus::InMemoryBus;
use crate::channel::keys::{ConfigKey, LiveInput};
use crate::value::TelemetryValue;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info};

const IDLE_RPM: f64 = 850.0;
const RAMP_UP_MS: u64 = 1500;
const HOLD_MS: u64 = 3000;
const RAMP_DOWN_MS: u64 = 4000;

/// Engine displacement seeded in demo mode (mL)
pub const DEMO_ENGINE_VOLUME_ML: i64 = 1998;

/// One set of simulated readings, in publish order
pub type DemoFrame = Vec<(LiveInput, TelemetryValue)>;

/// Simulated engine generating correlated sensor data
pub struct DemoSimulator {
    /// Time when simulation started (ms)
    start_time_ms: Option<u64>,
    /// Last update time (ms)
    last_update_ms: u64,
    /// Time of next acceleration (ms from start)
    next_pull_at_ms: u64,
    state: PullState,
    /// Current RPM (smoothed)
    current_rpm: f64,
    /// Peak RPM of the current acceleration
    target_rpm: f64,
    rng: StdRng,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum PullState {
    /// Standing still, engine idling
    Idle,
    /// Accelerating
    RampUp { start_ms: u64 },
    /// Cruising at peak
    Hold { start_ms: u64 },
    /// Coasting back to a stop
    RampDown { start_ms: u64 },
}

impl Default for DemoSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl DemoSimulator {
    /// Simulator seeded from OS entropy
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Reproducible simulator
    pub fn with_seed(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(mut rng: StdRng) -> Self {
        let first_pull = rng.gen_range(8000..15000);
        Self {
            start_time_ms: None,
            last_update_ms: 0,
            next_pull_at_ms: first_pull,
            state: PullState::Idle,
            current_rpm: IDLE_RPM,
            target_rpm: IDLE_RPM,
            rng,
        }
    }

    /// Advance the simulation to `elapsed_ms` and return the readings
    pub fn update(&mut self, elapsed_ms: u64) -> DemoFrame {
        let start = *self.start_time_ms.get_or_insert(elapsed_ms);
        let sim_time = elapsed_ms.saturating_sub(start);
        let delta_ms = elapsed_ms.saturating_sub(self.last_update_ms.max(start));
        self.last_update_ms = elapsed_ms;

        self.update_state(sim_time);

        // Smooth RPM changes (RPM/sec)
        let target = self.target_for(sim_time);
        let rate = if target > self.current_rpm { 2000.0 } else { 1200.0 };
        let max_change = rate * (delta_ms as f64 / 1000.0);
        self.current_rpm += (target - self.current_rpm).clamp(-max_change, max_change);

        let t = sim_time as f64 / 1000.0;
        let idling = matches!(self.state, PullState::Idle);
        let wobble = if idling {
            20.0 * (t * 2.5).sin() + 10.0 * (t * 7.3).sin()
        } else {
            0.0
        };
        let rpm = (self.current_rpm + wobble).max(0.0);

        // Fixed gear: road speed follows RPM above idle
        let speed_kmh = ((self.current_rpm - IDLE_RPM) / 30.0).max(0.0);

        // MAP rises with load
        let map_kpa = if rpm < 1000.0 {
            35.0 + 10.0 * (1.0 - rpm / 1000.0)
        } else {
            25.0 + rpm / 100.0
        }
        .clamp(20.0, 105.0);

        // Intake air in Kelvin, warming slightly with heat soak at idle
        let intake_k = 293.0 + 5.0 * (t * 0.1).sin() + if idling { 3.0 } else { 0.0 };

        let gps_error = 2.0 + 0.5 * (t * 0.2).sin().abs();

        vec![
            (LiveInput::CarRpm, TelemetryValue::Int(rpm.round() as i64)),
            (LiveInput::CarMap, TelemetryValue::Int(map_kpa.round() as i64)),
            (LiveInput::CarTmp, TelemetryValue::Int(intake_k.round() as i64)),
            (LiveInput::CarSpd, TelemetryValue::Int(speed_kmh.round() as i64)),
            (LiveInput::GpsSpd, TelemetryValue::Float(speed_kmh / 3.6)),
            (LiveInput::GpsAccLng, TelemetryValue::Float(gps_error)),
            (LiveInput::GpsAccLat, TelemetryValue::Float(gps_error * 1.2)),
            (LiveInput::GpsAccSpd, TelemetryValue::Float(0.3)),
        ]
    }

    fn update_state(&mut self, sim_time: u64) {
        match self.state {
            PullState::Idle => {
                if sim_time >= self.next_pull_at_ms {
                    self.target_rpm = self.rng.gen_range(2000.0..4000.0);
                    self.state = PullState::RampUp { start_ms: sim_time };
                }
            }
            PullState::RampUp { start_ms } => {
                if sim_time >= start_ms + RAMP_UP_MS {
                    self.state = PullState::Hold { start_ms: sim_time };
                }
            }
            PullState::Hold { start_ms } => {
                if sim_time >= start_ms + HOLD_MS {
                    self.state = PullState::RampDown { start_ms: sim_time };
                }
            }
            PullState::RampDown { start_ms } => {
                if sim_time >= start_ms + RAMP_DOWN_MS {
                    self.state = PullState::Idle;
                    self.next_pull_at_ms = sim_time + self.rng.gen_range(8000..15000);
                }
            }
        }
    }

    fn target_for(&self, sim_time: u64) -> f64 {
        match self.state {
            PullState::Idle => IDLE_RPM,
            PullState::RampUp { start_ms } => {
                let progress = ((sim_time - start_ms) as f64 / RAMP_UP_MS as f64).min(1.0);
                IDLE_RPM + (self.target_rpm - IDLE_RPM) * progress
            }
            PullState::Hold { .. } => self.target_rpm,
            PullState::RampDown { start_ms } => {
                let progress = ((sim_time - start_ms) as f64 / RAMP_DOWN_MS as f64).min(1.0);
                self.target_rpm + (IDLE_RPM - self.target_rpm) * progress
            }
        }
    }
}

/// Store the vehicle parameters the demo engine needs as retained values
pub fn seed_vehicle_parameters(bus: &InMemoryBus) {
    for key in ConfigKey::ALL {
        let value = match key {
            ConfigKey::EngineVolume => Some(DEMO_ENGINE_VOLUME_ML),
            other => other.default_value(),
        };
        if let Some(value) = value {
            bus.set(&key.key(), value.to_string());
        }
    }
    debug!(engine_volume_ml = DEMO_ENGINE_VOLUME_ML, "Seeded demo vehicle parameters");
}

/// Background task publishing simulated readings onto a bus
pub struct DemoProducer {
    task: JoinHandle<()>,
}

impl DemoProducer {
    /// Start publishing a frame every `period`
    pub fn spawn(bus: Arc<InMemoryBus>, period: Duration, mut simulator: DemoSimulator) -> Self {
        info!(period_ms = period.as_millis() as u64, "Starting demo producer");
        let task = tokio::spawn(async move {
            let started = Instant::now();
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                let elapsed_ms = started.elapsed().as_millis() as u64;
                for (input, value) in simulator.update(elapsed_ms) {
                    bus.publish(&input.channel(), value.encode());
                }
            }
        });
        Self { task }
    }

    /// Stop publishing
    pub fn stop(&self) {
        self.task.abort();
    }
}

impl Drop for DemoProducer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading(frame: &DemoFrame, input: LiveInput) -> f64 {
        frame
            .iter()
            .find(|(i, _)| *i == input)
            .and_then(|(_, v)| v.as_f64())
            .unwrap()
    }

    #[test]
    fn test_frame_matches_channel_types() {
        let mut sim = DemoSimulator::with_seed(7);
        let frame = sim.update(0);
        assert_eq!(frame.len(), LiveInput::ALL.len());
        for (input, value) in &frame {
            assert_eq!(value.payload_type(), input.payload_type(), "{input:?}");
        }
    }

    #[test]
    fn test_idle_rpm_range_and_stationary() {
        let mut sim = DemoSimulator::with_seed(7);

        // First pull is at least 8 seconds away
        for ms in (0..7000).step_by(100) {
            let frame = sim.update(ms);
            let rpm = reading(&frame, LiveInput::CarRpm);
            assert!(rpm > 700.0 && rpm < 1000.0, "RPM {rpm} out of idle range");
            assert_eq!(reading(&frame, LiveInput::CarSpd), 0.0);
        }
    }

    #[test]
    fn test_acceleration_moves_the_car() {
        let mut sim = DemoSimulator::with_seed(42);
        let mut top_speed: f64 = 0.0;
        for ms in (0..25_000).step_by(100) {
            let frame = sim.update(ms);
            top_speed = top_speed.max(reading(&frame, LiveInput::CarSpd));
        }
        assert!(top_speed > 20.0, "car never moved: {top_speed}");
    }

    #[test]
    fn test_intake_temperature_is_absolute() {
        let mut sim = DemoSimulator::with_seed(1);
        let frame = sim.update(0);
        let iat = reading(&frame, LiveInput::CarTmp);
        assert!((280.0..320.0).contains(&iat));
    }

    #[test]
    fn test_seed_vehicle_parameters() {
        let bus = InMemoryBus::new();
        seed_vehicle_parameters(&bus);
        assert_eq!(bus.get(&ConfigKey::EngineVolume.key()).as_deref(), Some("1998"));
        assert_eq!(bus.get(&ConfigKey::VolumetricEfficiency.key()).as_deref(), Some("85"));
        assert_eq!(bus.get(&ConfigKey::FuelDensity.key()).as_deref(), Some("745"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_producer_publishes_frames() {
        let bus = Arc::new(InMemoryBus::new());
        let mut rx = bus.subscribe(&[LiveInput::CarRpm.channel()]);
        let producer = DemoProducer::spawn(Arc::clone(&bus), Duration::from_millis(50), DemoSimulator::with_seed(3));

        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.channel, LiveInput::CarRpm.channel());
        producer.stop();
    }
}
