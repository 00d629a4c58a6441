//! Rule storage and evaluation

use crate::error::AutomationError;
use crate::model::{CreateRuleRequest, Operator, Rule, Threshold};
use crate::presets::{self, Preset};
use sensor_core::{Reading, Sensor, SensorSnapshot};
use std::cmp::Ordering;

/// Outcome of evaluating one rule against a snapshot
#[derive(Debug, Clone, PartialEq)]
pub struct RuleEvaluation<'a> {
    pub rule: &'a Rule,
    pub triggered: bool,
}

/// Ordered rule collection evaluated against live sensor readings
///
/// Evaluation is level-triggered: a rule whose condition keeps holding
/// is reported as triggered on every tick.
#[derive(Debug, Clone)]
pub struct RuleEngine {
    rules: Vec<Rule>,
    enabled: bool,
}

impl Default for RuleEngine {
    fn default() -> Self {
        Self::new(presets::default_rules())
    }
}

impl RuleEngine {
    /// Create an enabled engine holding the given rules
    #[must_use]
    pub fn new(rules: Vec<Rule>) -> Self {
        Self {
            rules,
            enabled: true,
        }
    }

    /// All rules, in evaluation order
    #[must_use]
    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Pause or resume [`RuleEngine::tick`]
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Validate and append a new rule
    ///
    /// Detector conditions are normalized to `= detected` whatever the
    /// request carries.
    pub fn add_rule(&mut self, request: CreateRuleRequest) -> Result<Rule, AutomationError> {
        let CreateRuleRequest {
            condition,
            operator,
            threshold,
            action,
        } = request;

        let (operator, threshold) = if condition.is_boolean() {
            (Operator::Equals, Threshold::Detected)
        } else {
            let threshold = threshold.ok_or_else(|| {
                AutomationError::Validation(format!("a threshold is required for {condition}"))
            })?;
            let operator = operator.ok_or_else(|| {
                AutomationError::Validation(format!("an operator is required for {condition}"))
            })?;
            if !threshold_fits(condition, &threshold) {
                return Err(AutomationError::Validation(format!(
                    "threshold {threshold} does not apply to {condition}"
                )));
            }
            (operator, threshold)
        };

        let rule = Rule {
            id: format!("custom-{}", uuid::Uuid::new_v4()),
            condition,
            operator,
            threshold,
            action,
        };
        self.rules.push(rule.clone());
        tracing::info!("New rule added: {}", rule);
        Ok(rule)
    }

    /// Remove the rule at `index`
    pub fn delete_rule(&mut self, index: usize) -> Result<Rule, AutomationError> {
        if index >= self.rules.len() {
            return Err(AutomationError::RuleIndexOutOfRange {
                index,
                len: self.rules.len(),
            });
        }
        let rule = self.rules.remove(index);
        tracing::info!("Deleted rule {} ({})", rule.id, rule);
        Ok(rule)
    }

    /// Replace every rule with a named preset
    pub fn load_preset(&mut self, name: &str) -> Result<Preset, AutomationError> {
        let preset: Preset = name.parse()?;
        self.rules = preset.rules();
        tracing::info!("Mode switched: {}", preset);
        Ok(preset)
    }

    /// Restore the factory default rules
    pub fn reset(&mut self) {
        self.rules = presets::default_rules();
        tracing::info!("Rules reset to factory defaults");
    }

    /// Evaluate every rule against the snapshot
    #[must_use]
    pub fn evaluate(&self, snapshot: &SensorSnapshot) -> Vec<RuleEvaluation<'_>> {
        self.rules
            .iter()
            .map(|rule| RuleEvaluation {
                rule,
                triggered: rule_holds(rule, snapshot),
            })
            .collect()
    }

    /// Rules satisfied by the snapshot, or nothing while disabled
    #[must_use]
    pub fn tick(&self, snapshot: &SensorSnapshot) -> Vec<&Rule> {
        if !self.enabled {
            return Vec::new();
        }
        self.evaluate(snapshot)
            .into_iter()
            .filter(|evaluation| evaluation.triggered)
            .map(|evaluation| evaluation.rule)
            .collect()
    }
}

/// Whether a rule's predicate holds for the snapshot
///
/// Rules whose threshold does not match the kind of their condition
/// never hold.
#[must_use]
pub fn rule_holds(rule: &Rule, snapshot: &SensorSnapshot) -> bool {
    match (snapshot.reading(rule.condition), &rule.threshold) {
        (Reading::Flag(current), Threshold::Detected) => {
            rule.operator == Operator::Equals && current
        }
        (Reading::Numeric(current), Threshold::Value(threshold)) => {
            compare(rule.operator, current.partial_cmp(threshold))
        }
        (Reading::TimeOfDay(current), Threshold::TimeOfDay(threshold)) => {
            compare(rule.operator, current.partial_cmp(threshold))
        }
        _ => false,
    }
}

fn compare(operator: Operator, ordering: Option<Ordering>) -> bool {
    match operator {
        Operator::GreaterThan => ordering == Some(Ordering::Greater),
        Operator::LessThan => ordering == Some(Ordering::Less),
        Operator::Equals => ordering == Some(Ordering::Equal),
    }
}

fn threshold_fits(condition: Sensor, threshold: &Threshold) -> bool {
    match condition {
        Sensor::Aqi | Sensor::Temperature => matches!(threshold, Threshold::Value(_)),
        Sensor::TimeOfDay => matches!(threshold, Threshold::TimeOfDay(_)),
        Sensor::Smoke | Sensor::Gas => matches!(threshold, Threshold::Detected),
    }
}
