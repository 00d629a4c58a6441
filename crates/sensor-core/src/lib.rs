//! Sensor abstraction layer
//!
//! This crate provides the typed sensor readings consumed by the
//! automation engine, plus a simulated building sensor source.

pub mod error;
pub mod sensor;
pub mod simulator;
pub mod time;

pub use error::SensorError;
pub use sensor::{Reading, Sensor, SensorSnapshot, SensorSource};
pub use simulator::{SensorSimulator, SimEvent};
