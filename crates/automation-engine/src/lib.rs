//! Automation engine for the AirGuard building monitor
//!
//! Provides a level-triggered rule engine over live sensor readings and
//! a time-of-day task scheduler, both driven by fixed-period timers.

pub mod clock;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod executor;
pub mod model;
pub mod persistence;
pub mod presets;
pub mod scheduler;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{AutomationEngine, AutomationEvent, TickConfig};
pub use error::AutomationError;
pub use evaluator::{RuleEngine, RuleEvaluation};
pub use executor::{ActionFired, ActionHandler};
pub use model::*;
pub use presets::Preset;
pub use scheduler::{DeleteOutcome, TaskScheduler};
