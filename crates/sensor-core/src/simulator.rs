//! Simulated building sensors
//!
//! Readings drift a little on every sample, and named events can be
//! injected to drive the automation rules by hand.

use crate::error::SensorError;
use crate::sensor::{SensorSnapshot, SensorSource};
use chrono::NaiveTime;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::sync::{Mutex, PoisonError};

const AQI_JITTER: f64 = 5.0;
const TEMP_JITTER: f64 = 1.0;
const TEMP_MIN: f64 = 15.0;
const TEMP_MAX: f64 = 40.0;

/// Events that can be injected into the simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimEvent {
    /// Pollution spike (AQI 250)
    HighAqi,
    /// Smoke detected with a temperature of 65 °C
    Fire,
    /// Gas leak detected
    Gas,
    /// Everything back to baseline
    Normal,
}

impl FromStr for SimEvent {
    type Err = SensorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "high_aqi" => Ok(SimEvent::HighAqi),
            "fire" => Ok(SimEvent::Fire),
            "gas" => Ok(SimEvent::Gas),
            "normal" => Ok(SimEvent::Normal),
            other => Err(SensorError::UnknownEvent(other.to_string())),
        }
    }
}

struct SimState {
    snapshot: SensorSnapshot,
    rng: StdRng,
}

/// Jittering sensor source
pub struct SensorSimulator {
    state: Mutex<SimState>,
}

impl Default for SensorSimulator {
    fn default() -> Self {
        Self::new()
    }
}

impl SensorSimulator {
    /// Create a simulator seeded from OS entropy
    #[must_use]
    pub fn new() -> Self {
        Self::with_rng(StdRng::from_entropy())
    }

    /// Create a deterministic simulator
    #[must_use]
    pub fn seeded(seed: u64) -> Self {
        Self::with_rng(StdRng::seed_from_u64(seed))
    }

    fn with_rng(rng: StdRng) -> Self {
        Self {
            state: Mutex::new(SimState {
                snapshot: SensorSnapshot::default(),
                rng,
            }),
        }
    }

    /// Current readings, without drifting them
    pub fn current(&self) -> SensorSnapshot {
        self.lock().snapshot.clone()
    }

    /// Apply a simulated event to the live readings
    pub fn inject(&self, event: SimEvent) -> SensorSnapshot {
        let mut state = self.lock();
        let snapshot = &mut state.snapshot;
        match event {
            SimEvent::HighAqi => {
                snapshot.aqi = 250.0;
                tracing::info!("SIM: injected high AQI spike (250)");
            }
            SimEvent::Fire => {
                snapshot.smoke = true;
                snapshot.temp = 65.0;
                tracing::warn!("SIM: fire event injected");
            }
            SimEvent::Gas => {
                snapshot.gas = true;
                tracing::warn!("SIM: gas leak injected");
            }
            SimEvent::Normal => {
                let time = snapshot.time;
                *snapshot = SensorSnapshot {
                    time,
                    ..SensorSnapshot::default()
                };
                tracing::info!("SIM: sensors normalized");
            }
        }
        snapshot.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SensorSource for SensorSimulator {
    fn sample(&self, now: NaiveTime) -> SensorSnapshot {
        let mut guard = self.lock();
        let SimState { snapshot, rng } = &mut *guard;

        // Smoke latches the readings until the sensors are normalized
        if !snapshot.smoke {
            snapshot.aqi = (snapshot.aqi + rng.gen_range(-AQI_JITTER..AQI_JITTER)).max(0.0);
            snapshot.temp = (snapshot.temp + rng.gen_range(-TEMP_JITTER..TEMP_JITTER))
                .clamp(TEMP_MIN, TEMP_MAX);
        }
        snapshot.time = now;

        tracing::trace!(
            "Sensor sample: aqi={:.1} temp={:.1} smoke={} gas={}",
            snapshot.aqi,
            snapshot.temp,
            snapshot.smoke,
            snapshot.gas
        );
        snapshot.clone()
    }
}
