//! Action dispatch for fired rules and tasks

use crate::model::{Device, RuleAction, ScheduledTask, TaskAction};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use tokio::sync::broadcast;

/// An action invoked by a satisfied rule or a due task
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum ActionFired {
    Rule {
        rule_id: String,
        action: RuleAction,
    },
    Task {
        task_id: String,
        name: String,
        device: Device,
        action: TaskAction,
    },
}

impl ActionFired {
    /// Build the event for a fired task
    #[must_use]
    pub fn from_task(task: &ScheduledTask) -> Self {
        ActionFired::Task {
            task_id: task.id.clone(),
            name: task.name.clone(),
            device: task.device,
            action: task.action,
        }
    }

    /// Id of the rule or task that fired
    #[must_use]
    pub fn source_id(&self) -> &str {
        match self {
            ActionFired::Rule { rule_id, .. } => rule_id,
            ActionFired::Task { task_id, .. } => task_id,
        }
    }

    /// Identifier of the effect, e.g. `purifier_on` or `fan:on`
    #[must_use]
    pub fn action_id(&self) -> String {
        match self {
            ActionFired::Rule { action, .. } => action.to_string(),
            ActionFired::Task { device, action, .. } => format!("{device}:{action}"),
        }
    }
}

/// Consumer of fired actions
pub trait ActionHandler: Send + Sync {
    fn handle(&self, fired: &ActionFired);

    /// Called once after every rule tick, including ticks that fired nothing
    fn rule_tick_finished(&self) {}
}

/// Logs every firing
#[derive(Debug, Default)]
pub struct TracingHandler;

impl ActionHandler for TracingHandler {
    fn handle(&self, fired: &ActionFired) {
        match fired {
            ActionFired::Rule { rule_id, action } => {
                tracing::info!(target: "automation", "Triggered: {} (rule {})", action.label(), rule_id);
            }
            ActionFired::Task {
                name,
                device,
                action,
                ..
            } => {
                tracing::info!(target: "automation", "Task executed: {} ({} -> {})", name, device, action);
            }
        }
    }
}

/// Suppresses an action that was already passed on during the previous rule tick
///
/// The rule engine re-fires on every tick while a condition holds, and
/// several rules may hold with the same effect. Firings are keyed on
/// [`ActionFired::action_id`], so a handler sees each effect once per run of
/// ticks in which it stays triggered. An action seen again after a tick
/// without it is passed on again.
pub struct Debounced<H> {
    inner: H,
    seen: Mutex<SeenActions>,
}

#[derive(Debug, Default)]
struct SeenActions {
    previous: HashSet<String>,
    current: HashSet<String>,
}

impl<H> Debounced<H> {
    pub fn new(inner: H) -> Self {
        Self {
            inner,
            seen: Mutex::new(SeenActions::default()),
        }
    }
}

impl<H: ActionHandler> ActionHandler for Debounced<H> {
    fn handle(&self, fired: &ActionFired) {
        let key = fired.action_id();
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        let repeated = seen.previous.contains(&key);
        if !seen.current.insert(key) || repeated {
            return;
        }
        drop(seen);
        self.inner.handle(fired);
    }

    fn rule_tick_finished(&self) {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        seen.previous = std::mem::take(&mut seen.current);
        self.inner.rule_tick_finished();
    }
}

/// Forwards firings to a broadcast channel
pub struct BroadcastHandler {
    tx: broadcast::Sender<ActionFired>,
}

impl BroadcastHandler {
    pub fn new(tx: broadcast::Sender<ActionFired>) -> Self {
        Self { tx }
    }
}

impl ActionHandler for BroadcastHandler {
    fn handle(&self, fired: &ActionFired) {
        // No subscribers is fine
        let _ = self.tx.send(fired.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Default, Clone)]
    struct Recorder(Arc<Mutex<Vec<ActionFired>>>);

    impl ActionHandler for Recorder {
        fn handle(&self, fired: &ActionFired) {
            self.0.lock().unwrap().push(fired.clone());
        }
    }

    fn rule_fired(id: &str, action: RuleAction) -> ActionFired {
        ActionFired::Rule {
            rule_id: id.to_string(),
            action,
        }
    }

    fn forwarded(recorder: &Recorder) -> Vec<String> {
        recorder.0.lock().unwrap().iter().map(ActionFired::action_id).collect()
    }

    #[test]
    fn test_debounce_drops_repeats_while_held() {
        let recorder = Recorder::default();
        let handler = Debounced::new(recorder.clone());
        handler.handle(&rule_fired("mode-1", RuleAction::PurifierOn));
        handler.rule_tick_finished();
        handler.handle(&rule_fired("mode-1", RuleAction::PurifierOn));
        handler.handle(&rule_fired("mode-2", RuleAction::PurifierMax));
        handler.rule_tick_finished();
        handler.handle(&rule_fired("mode-1", RuleAction::PurifierOn));
        handler.handle(&rule_fired("mode-2", RuleAction::PurifierMax));
        handler.rule_tick_finished();
        assert_eq!(forwarded(&recorder), vec!["purifier_on", "purifier_max"]);
    }

    #[test]
    fn test_debounce_collapses_interleaved_rules() {
        let recorder = Recorder::default();
        let handler = Debounced::new(recorder.clone());
        for _ in 0..5 {
            handler.handle(&rule_fired("mode-3", RuleAction::AlarmOn));
            handler.handle(&rule_fired("mode-4", RuleAction::AlarmOn));
            handler.rule_tick_finished();
        }
        assert_eq!(forwarded(&recorder), vec!["alarm_on"]);
    }

    #[test]
    fn test_debounce_passes_action_again_after_a_quiet_tick() {
        let recorder = Recorder::default();
        let handler = Debounced::new(recorder.clone());
        handler.handle(&rule_fired("mode-3", RuleAction::AlarmOn));
        handler.rule_tick_finished();
        handler.rule_tick_finished();
        handler.handle(&rule_fired("mode-4", RuleAction::AlarmOn));
        handler.rule_tick_finished();
        assert_eq!(forwarded(&recorder), vec!["alarm_on", "alarm_on"]);
    }

    #[test]
    fn test_action_ids() {
        let task = crate::scheduler::default_tasks().remove(1);
        let fired = ActionFired::from_task(&task);
        assert_eq!(fired.source_id(), "t2");
        assert_eq!(fired.action_id(), "purifier:silent");
        assert_eq!(rule_fired("mode-3", RuleAction::AlarmOn).action_id(), "alarm_on");
    }

    #[test]
    fn test_broadcast_without_subscribers() {
        let (tx, _) = broadcast::channel(4);
        let handler = BroadcastHandler::new(tx.clone());
        handler.handle(&rule_fired("mode-1", RuleAction::PurifierOn));

        let mut rx = tx.subscribe();
        handler.handle(&rule_fired("mode-2", RuleAction::PurifierMax));
        assert_eq!(rx.try_recv().unwrap().source_id(), "mode-2");
    }
}
