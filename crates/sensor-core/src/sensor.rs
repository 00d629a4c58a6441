//! Sensor kinds and live readings

use crate::error::SensorError;
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sensors a rule can be conditioned on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Sensor {
    /// Air quality index
    #[serde(rename = "aqi")]
    Aqi,
    /// Ambient temperature in degrees Celsius
    #[serde(rename = "temp")]
    Temperature,
    /// Smoke detector
    #[serde(rename = "smoke")]
    Smoke,
    /// Gas leak detector
    #[serde(rename = "gas")]
    Gas,
    /// Local time of day
    #[serde(rename = "time")]
    TimeOfDay,
}

impl Sensor {
    pub const ALL: [Sensor; 5] = [
        Sensor::Aqi,
        Sensor::Temperature,
        Sensor::Smoke,
        Sensor::Gas,
        Sensor::TimeOfDay,
    ];

    /// Detectors report a flag rather than a measurement
    #[must_use]
    pub fn is_boolean(self) -> bool {
        matches!(self, Sensor::Smoke | Sensor::Gas)
    }

    /// Wire name of the sensor
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Sensor::Aqi => "aqi",
            Sensor::Temperature => "temp",
            Sensor::Smoke => "smoke",
            Sensor::Gas => "gas",
            Sensor::TimeOfDay => "time",
        }
    }

    /// Human-readable label
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Sensor::Aqi => "AQI",
            Sensor::Temperature => "Temp",
            Sensor::Smoke => "Smoke",
            Sensor::Gas => "Gas",
            Sensor::TimeOfDay => "Time",
        }
    }
}

impl fmt::Display for Sensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Sensor {
    type Err = SensorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Sensor::ALL
            .into_iter()
            .find(|sensor| sensor.as_str() == s)
            .ok_or_else(|| SensorError::UnknownSensor(s.to_string()))
    }
}

/// A single typed reading
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Reading {
    Numeric(f64),
    Flag(bool),
    TimeOfDay(NaiveTime),
}

/// Current readings of every sensor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    pub aqi: f64,
    pub temp: f64,
    pub smoke: bool,
    pub gas: bool,
    #[serde(with = "crate::time::hhmm")]
    pub time: NaiveTime,
}

impl Default for SensorSnapshot {
    fn default() -> Self {
        Self {
            aqi: 45.0,
            temp: 24.0,
            smoke: false,
            gas: false,
            time: NaiveTime::from_hms_opt(12, 0, 0).unwrap_or_default(),
        }
    }
}

impl SensorSnapshot {
    /// Read the value of one sensor
    #[must_use]
    pub fn reading(&self, sensor: Sensor) -> Reading {
        match sensor {
            Sensor::Aqi => Reading::Numeric(self.aqi),
            Sensor::Temperature => Reading::Numeric(self.temp),
            Sensor::Smoke => Reading::Flag(self.smoke),
            Sensor::Gas => Reading::Flag(self.gas),
            Sensor::TimeOfDay => Reading::TimeOfDay(self.time),
        }
    }
}

/// Anything that can produce a fresh snapshot before each rule tick
pub trait SensorSource: Send + Sync {
    /// Refresh the live readings and return them, stamped with `now`
    fn sample(&self, now: NaiveTime) -> SensorSnapshot;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_boolean_sensors() {
        assert!(Sensor::Smoke.is_boolean());
        assert!(Sensor::Gas.is_boolean());
        assert!(!Sensor::Aqi.is_boolean());
        assert!(!Sensor::TimeOfDay.is_boolean());
    }

    #[test]
    fn test_reading_accessor() {
        let snapshot = SensorSnapshot {
            smoke: true,
            ..SensorSnapshot::default()
        };
        assert_eq!(snapshot.reading(Sensor::Aqi), Reading::Numeric(45.0));
        assert_eq!(snapshot.reading(Sensor::Temperature), Reading::Numeric(24.0));
        assert_eq!(snapshot.reading(Sensor::Smoke), Reading::Flag(true));
        assert_eq!(snapshot.reading(Sensor::Gas), Reading::Flag(false));
    }

    #[test]
    fn test_sensor_wire_names() {
        assert_eq!(serde_json::to_string(&Sensor::Temperature).unwrap(), "\"temp\"");
        assert_eq!("time".parse::<Sensor>().unwrap(), Sensor::TimeOfDay);
        assert!("humidity".parse::<Sensor>().is_err());
    }

    #[test]
    fn test_snapshot_time_serialized_as_hhmm() {
        let json = serde_json::to_value(SensorSnapshot::default()).unwrap();
        assert_eq!(json["time"], "12:00");
    }
}
