//! Data models for the automation engine

use chrono::{NaiveDateTime, NaiveTime};
use sensor_core::time::{format_hhmm, parse_hhmm};
use sensor_core::Sensor;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Sentinel threshold used by detector conditions
pub const DETECTED: &str = "detected";

/// A single automation directive: IF condition operator threshold THEN action
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    /// Unique identifier
    pub id: String,
    /// Sensor the rule watches
    pub condition: Sensor,
    /// Comparison applied to the reading
    pub operator: Operator,
    /// Value the reading is compared against
    pub threshold: Threshold,
    /// Effect invoked while the rule holds
    pub action: RuleAction,
}

impl fmt::Display for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "IF {} {} {} THEN {}",
            self.condition.label(),
            self.operator,
            self.threshold,
            self.action.label()
        )
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "=")]
    Equals,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Operator::GreaterThan => ">",
            Operator::LessThan => "<",
            Operator::Equals => "=",
        })
    }
}

/// Rule threshold
///
/// Stored as a JSON number, the string `"detected"`, or an `HH:MM`
/// string. Numeric strings are accepted for rules saved from form input.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawThreshold", into = "RawThreshold")]
pub enum Threshold {
    Value(f64),
    Detected,
    TimeOfDay(NaiveTime),
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Threshold::Value(v) => write!(f, "{v}"),
            Threshold::Detected => f.write_str(DETECTED),
            Threshold::TimeOfDay(t) => f.write_str(&format_hhmm(t)),
        }
    }
}

impl FromStr for Threshold {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case(DETECTED) {
            return Ok(Threshold::Detected);
        }
        if let Ok(v) = s.parse::<f64>() {
            if v.is_finite() {
                return Ok(Threshold::Value(v));
            }
        }
        parse_hhmm(s)
            .map(Threshold::TimeOfDay)
            .ok_or_else(|| format!("invalid threshold: {s:?}"))
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum RawThreshold {
    Number(f64),
    Text(String),
}

impl TryFrom<RawThreshold> for Threshold {
    type Error = String;

    fn try_from(raw: RawThreshold) -> Result<Self, Self::Error> {
        match raw {
            RawThreshold::Number(v) => Ok(Threshold::Value(v)),
            RawThreshold::Text(s) => s.parse(),
        }
    }
}

impl From<Threshold> for RawThreshold {
    fn from(threshold: Threshold) -> Self {
        match threshold {
            Threshold::Value(v) => RawThreshold::Number(v),
            other => RawThreshold::Text(other.to_string()),
        }
    }
}

/// Effects a rule can invoke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    PurifierOn,
    PurifierMax,
    PurifierOff,
    PurifierSilent,
    AlarmOn,
}

impl RuleAction {
    /// Wire identifier of the action
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            RuleAction::PurifierOn => "purifier_on",
            RuleAction::PurifierMax => "purifier_max",
            RuleAction::PurifierOff => "purifier_off",
            RuleAction::PurifierSilent => "purifier_silent",
            RuleAction::AlarmOn => "alarm_on",
        }
    }

    /// Human-readable label
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            RuleAction::PurifierOn => "Purifier ON",
            RuleAction::PurifierMax => "Purifier MAX",
            RuleAction::PurifierOff => "Purifier OFF",
            RuleAction::PurifierSilent => "Silent Mode",
            RuleAction::AlarmOn => "ALARM ACTIVE",
        }
    }
}

impl fmt::Display for RuleAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Request to create a new rule
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRuleRequest {
    pub condition: Sensor,
    /// Ignored for detector conditions
    #[serde(default)]
    pub operator: Option<Operator>,
    /// Ignored for detector conditions, required otherwise
    #[serde(default)]
    pub threshold: Option<Threshold>,
    pub action: RuleAction,
}

/// Devices a task can drive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Device {
    Fan,
    Purifier,
    Alarm,
}

impl Device {
    /// Whether the device understands the action
    #[must_use]
    pub fn supports(self, action: TaskAction) -> bool {
        use TaskAction::*;
        match self {
            Device::Fan => matches!(action, On | Off | Max),
            Device::Purifier => matches!(action, On | Off | Silent | Max),
            Device::Alarm => matches!(action, On | Off | Test),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Device::Fan => "fan",
            Device::Purifier => "purifier",
            Device::Alarm => "alarm",
        })
    }
}

/// Device commands a task can issue
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskAction {
    On,
    Off,
    Silent,
    Max,
    Test,
}

impl fmt::Display for TaskAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            TaskAction::On => "on",
            TaskAction::Off => "off",
            TaskAction::Silent => "silent",
            TaskAction::Max => "max",
            TaskAction::Test => "test",
        })
    }
}

/// Task repeat cadence
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Repeat {
    #[default]
    Once,
    Daily,
}

/// Task priority
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    Low,
    High,
}

/// A time-triggered device directive
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: String,
    /// Display label
    pub name: String,
    pub device: Device,
    pub action: TaskAction,
    /// Trigger time of day (24-hour `HH:MM`)
    #[serde(with = "sensor_core::time::hhmm")]
    pub time: NaiveTime,
    pub repeat: Repeat,
    pub priority: Priority,
    /// Minute in which the task last fired
    #[serde(rename = "lastRun", default)]
    pub last_run: Option<NaiveDateTime>,
}

impl ScheduledTask {
    /// Safety-critical tasks need confirmation before deletion
    #[must_use]
    pub fn is_critical(&self) -> bool {
        self.device == Device::Alarm || self.priority == Priority::High
    }
}

/// Request to schedule a new task
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTaskRequest {
    pub name: String,
    pub device: Device,
    pub action: TaskAction,
    /// `HH:MM`, 24-hour
    pub time: String,
    #[serde(default)]
    pub repeat: Repeat,
    #[serde(default)]
    pub priority: Priority,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_from_json() {
        let t: Threshold = serde_json::from_str("100").unwrap();
        assert_eq!(t, Threshold::Value(100.0));
        let t: Threshold = serde_json::from_str("\"75\"").unwrap();
        assert_eq!(t, Threshold::Value(75.0));
        let t: Threshold = serde_json::from_str("\"detected\"").unwrap();
        assert_eq!(t, Threshold::Detected);
        let t: Threshold = serde_json::from_str("\"22:00\"").unwrap();
        assert_eq!(t, Threshold::TimeOfDay(NaiveTime::from_hms_opt(22, 0, 0).unwrap()));
        assert!(serde_json::from_str::<Threshold>("\"lots\"").is_err());
        assert!(serde_json::from_str::<Threshold>("true").is_err());
    }

    #[test]
    fn test_rule_wire_format() {
        let rule = Rule {
            id: "mode-3".to_string(),
            condition: Sensor::Smoke,
            operator: Operator::Equals,
            threshold: Threshold::Detected,
            action: RuleAction::AlarmOn,
        };
        let json = serde_json::to_value(&rule).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": "mode-3",
                "condition": "smoke",
                "operator": "=",
                "threshold": "detected",
                "action": "alarm_on"
            })
        );
    }

    #[test]
    fn test_rule_display() {
        let rule = Rule {
            id: "mode-1".to_string(),
            condition: Sensor::Aqi,
            operator: Operator::GreaterThan,
            threshold: Threshold::Value(100.0),
            action: RuleAction::PurifierOn,
        };
        assert_eq!(rule.to_string(), "IF AQI > 100 THEN Purifier ON");
    }

    #[test]
    fn test_task_last_run_field_name() {
        let json = r#"{"id":"t1","name":"Morning Purge","device":"fan","action":"on",
            "time":"08:00","repeat":"daily","priority":"low"}"#;
        let task: ScheduledTask = serde_json::from_str(json).unwrap();
        assert_eq!(task.last_run, None);
        assert!(!task.is_critical());

        let value = serde_json::to_value(&task).unwrap();
        assert!(value.get("lastRun").is_some());
        assert_eq!(value["time"], "08:00");
    }

    #[test]
    fn test_device_support_matrix() {
        assert!(Device::Purifier.supports(TaskAction::Silent));
        assert!(!Device::Fan.supports(TaskAction::Silent));
        assert!(Device::Alarm.supports(TaskAction::Test));
        assert!(!Device::Alarm.supports(TaskAction::Max));
    }
}
