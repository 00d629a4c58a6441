//! Built-in rule sets

use crate::error::AutomationError;
use crate::model::{Operator, Rule, RuleAction, Threshold};
use chrono::NaiveTime;
use sensor_core::Sensor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Named rule presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Preset {
    SmartAir,
    FireSafety,
    NightMode,
    EnergySave,
}

impl Preset {
    pub const ALL: [Preset; 4] = [
        Preset::SmartAir,
        Preset::FireSafety,
        Preset::NightMode,
        Preset::EnergySave,
    ];

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Preset::SmartAir => "smart-air",
            Preset::FireSafety => "fire-safety",
            Preset::NightMode => "night-mode",
            Preset::EnergySave => "energy-save",
        }
    }

    /// The fixed rules of this preset
    #[must_use]
    pub fn rules(self) -> Vec<Rule> {
        match self {
            Preset::SmartAir => vec![
                rule("mode-1", Sensor::Aqi, Operator::GreaterThan, Threshold::Value(100.0), RuleAction::PurifierOn),
                rule("mode-2", Sensor::Aqi, Operator::GreaterThan, Threshold::Value(200.0), RuleAction::PurifierMax),
            ],
            Preset::FireSafety => vec![
                rule("mode-3", Sensor::Smoke, Operator::Equals, Threshold::Detected, RuleAction::AlarmOn),
                rule("mode-4", Sensor::Temperature, Operator::GreaterThan, Threshold::Value(50.0), RuleAction::AlarmOn),
            ],
            Preset::NightMode => vec![rule(
                "mode-5",
                Sensor::TimeOfDay,
                Operator::GreaterThan,
                Threshold::TimeOfDay(NaiveTime::from_hms_opt(22, 0, 0).unwrap_or_default()),
                RuleAction::PurifierSilent,
            )],
            Preset::EnergySave => vec![
                rule("mode-6", Sensor::Aqi, Operator::LessThan, Threshold::Value(50.0), RuleAction::PurifierOff),
            ],
        }
    }
}

/// Rules used when nothing has been saved yet
#[must_use]
pub fn default_rules() -> Vec<Rule> {
    Preset::SmartAir.rules()
}

impl fmt::Display for Preset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Preset {
    type Err = AutomationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Preset::ALL
            .into_iter()
            .find(|preset| preset.name() == s)
            .ok_or_else(|| AutomationError::PresetNotFound(s.to_string()))
    }
}

fn rule(id: &str, condition: Sensor, operator: Operator, threshold: Threshold, action: RuleAction) -> Rule {
    Rule {
        id: id.to_string(),
        condition,
        operator,
        threshold,
        action,
    }
}
