//! Error types for the sensor layer

use thiserror::Error;

/// Sensor errors
#[derive(Error, Debug)]
pub enum SensorError {
    #[error("Unknown simulation event: {0}")]
    UnknownEvent(String),

    #[error("Unknown sensor: {0}")]
    UnknownSensor(String),
}
