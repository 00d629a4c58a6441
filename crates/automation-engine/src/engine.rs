//! Core automation runtime
//!
//! Owns one [`RuleEngine`] and one [`TaskScheduler`], drives them from
//! fixed-period timers, persists every change and publishes events.

use crate::clock::Clock;
use crate::error::AutomationError;
use crate::evaluator::RuleEngine;
use crate::executor::{ActionFired, ActionHandler, BroadcastHandler, Debounced, TracingHandler};
use crate::model::{CreateRuleRequest, CreateTaskRequest, Rule, ScheduledTask};
use crate::persistence;
use crate::presets::Preset;
use crate::scheduler::{DeleteOutcome, TaskScheduler};
use chrono::{NaiveDateTime, NaiveTime, Timelike};
use sensor_core::{SensorSnapshot, SensorSource};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Events emitted by the automation engine
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AutomationEvent {
    RuleAdded { rule_id: String },
    RuleDeleted { rule_id: String },
    PresetLoaded { preset: Preset },
    RulesReset,
    AutomationToggled { enabled: bool },
    TaskScheduled { task_id: String },
    TaskDeleted { task_id: String },
    /// A task was refused for safety reasons
    TaskBlocked { reason: String },
    DeleteConfirmationRequired { task_id: String },
    SchedulerToggled { active: bool },
    ClockAdvanced { offset_ms: i64 },
}

/// Tick periods of the two timer loops
#[derive(Debug, Clone, Copy)]
pub struct TickConfig {
    pub rule_interval: Duration,
    pub schedule_interval: Duration,
}

impl Default for TickConfig {
    fn default() -> Self {
        Self {
            rule_interval: Duration::from_millis(2000),
            schedule_interval: Duration::from_millis(1000),
        }
    }
}

/// The main automation engine
pub struct AutomationEngine {
    rules: Mutex<RuleEngine>,
    scheduler: Mutex<TaskScheduler>,
    sensors: Arc<dyn SensorSource>,
    clock: Arc<dyn Clock>,
    handlers: Vec<Box<dyn ActionHandler>>,
    action_tx: broadcast::Sender<ActionFired>,
    event_tx: broadcast::Sender<AutomationEvent>,
    data_dir: PathBuf,
    timers: std::sync::Mutex<Vec<JoinHandle<()>>>,
}

impl AutomationEngine {
    /// Create a new engine, loading saved rules and tasks from `data_dir`
    pub async fn new(
        sensors: Arc<dyn SensorSource>,
        clock: Arc<dyn Clock>,
        data_dir: &Path,
    ) -> Result<Self, AutomationError> {
        let rules = match persistence::load_rules(data_dir).await? {
            Some(rules) => RuleEngine::new(rules),
            None => RuleEngine::default(),
        };
        let scheduler = match persistence::load_tasks(data_dir).await? {
            Some(tasks) => TaskScheduler::new(tasks),
            None => TaskScheduler::default(),
        };

        let (action_tx, _) = broadcast::channel(64);
        let (event_tx, _) = broadcast::channel(64);
        let handlers: Vec<Box<dyn ActionHandler>> = vec![
            Box::new(Debounced::new(TracingHandler)),
            Box::new(BroadcastHandler::new(action_tx.clone())),
        ];

        tracing::info!(
            "Automation engine ready: {} rules, {} tasks",
            rules.rules().len(),
            scheduler.tasks().len()
        );

        Ok(Self {
            rules: Mutex::new(rules),
            scheduler: Mutex::new(scheduler),
            sensors,
            clock,
            handlers,
            action_tx,
            event_tx,
            data_dir: data_dir.to_path_buf(),
            timers: std::sync::Mutex::new(Vec::new()),
        })
    }

    /// Register an extra consumer of fired actions
    pub fn add_handler(&mut self, handler: Box<dyn ActionHandler>) {
        self.handlers.push(handler);
    }

    /// Start the rule and schedule timer loops
    pub fn start(self: &Arc<Self>, config: TickConfig) {
        let rule_loop = spawn_ticker(Arc::downgrade(self), config.rule_interval, TickKind::Rules);
        let schedule_loop =
            spawn_ticker(Arc::downgrade(self), config.schedule_interval, TickKind::Schedule);

        self.timers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend([rule_loop, schedule_loop]);

        tracing::info!(
            "Simulation engine started (rules every {:?}, schedule every {:?})",
            config.rule_interval,
            config.schedule_interval
        );
    }

    /// Subscribe to engine events
    pub fn subscribe(&self) -> broadcast::Receiver<AutomationEvent> {
        self.event_tx.subscribe()
    }

    /// Subscribe to fired actions
    pub fn subscribe_actions(&self) -> broadcast::Receiver<ActionFired> {
        self.action_tx.subscribe()
    }

    fn emit(&self, event: AutomationEvent) {
        let _ = self.event_tx.send(event);
    }

    fn dispatch(&self, fired: &[ActionFired]) {
        for action in fired {
            for handler in &self.handlers {
                handler.handle(action);
            }
        }
    }

    fn finish_rule_tick(&self) {
        for handler in &self.handlers {
            handler.rule_tick_finished();
        }
    }

    // --- Rules ---

    /// Get all rules
    pub async fn rules(&self) -> Vec<Rule> {
        self.rules.lock().await.rules().to_vec()
    }

    pub async fn is_automation_enabled(&self) -> bool {
        self.rules.lock().await.is_enabled()
    }

    /// Pause or resume rule evaluation
    pub async fn set_automation_enabled(&self, enabled: bool) {
        self.rules.lock().await.set_enabled(enabled);
        tracing::info!("Automation {}", if enabled { "enabled" } else { "disabled" });
        self.emit(AutomationEvent::AutomationToggled { enabled });
    }

    /// Create a new rule
    pub async fn add_rule(&self, request: CreateRuleRequest) -> Result<Rule, AutomationError> {
        let mut rules = self.rules.lock().await;
        let mut next = rules.clone();
        let rule = next.add_rule(request)?;
        persistence::save_rules(&self.data_dir, next.rules()).await?;
        *rules = next;
        drop(rules);

        self.emit(AutomationEvent::RuleAdded {
            rule_id: rule.id.clone(),
        });
        Ok(rule)
    }

    /// Delete the rule at `index`
    pub async fn delete_rule(&self, index: usize) -> Result<Rule, AutomationError> {
        let mut rules = self.rules.lock().await;
        let mut next = rules.clone();
        let rule = next.delete_rule(index)?;
        persistence::save_rules(&self.data_dir, next.rules()).await?;
        *rules = next;
        drop(rules);

        self.emit(AutomationEvent::RuleDeleted {
            rule_id: rule.id.clone(),
        });
        Ok(rule)
    }

    /// Switch to a preset rule set
    pub async fn load_preset(&self, name: &str) -> Result<Preset, AutomationError> {
        let mut rules = self.rules.lock().await;
        let mut next = rules.clone();
        let preset = next.load_preset(name)?;
        persistence::save_rules(&self.data_dir, next.rules()).await?;
        *rules = next;
        drop(rules);

        self.emit(AutomationEvent::PresetLoaded { preset });
        Ok(preset)
    }

    /// Factory reset: forget saved rules and restore the defaults
    pub async fn reset_rules(&self) -> Result<Vec<Rule>, AutomationError> {
        let mut rules = self.rules.lock().await;
        persistence::clear_rules(&self.data_dir).await?;
        rules.reset();
        let restored = rules.rules().to_vec();
        drop(rules);

        self.emit(AutomationEvent::RulesReset);
        Ok(restored)
    }

    /// Sample the sensors and fire every satisfied rule
    pub async fn run_rule_tick(&self) -> Vec<ActionFired> {
        let now = self.simulated_now().await;
        let rules = self.rules.lock().await;
        if !rules.is_enabled() {
            drop(rules);
            self.finish_rule_tick();
            return Vec::new();
        }

        let snapshot = self.sensors.sample(minute_of(now));
        let fired: Vec<ActionFired> = rules
            .tick(&snapshot)
            .into_iter()
            .map(|rule| ActionFired::Rule {
                rule_id: rule.id.clone(),
                action: rule.action,
            })
            .collect();
        drop(rules);

        tracing::debug!("Rule tick: {} rules triggered", fired.len());
        self.dispatch(&fired);
        self.finish_rule_tick();
        fired
    }

    /// Evaluate every rule against a given snapshot
    pub async fn evaluate(&self, snapshot: &SensorSnapshot) -> Vec<(Rule, bool)> {
        self.rules
            .lock()
            .await
            .evaluate(snapshot)
            .into_iter()
            .map(|evaluation| (evaluation.rule.clone(), evaluation.triggered))
            .collect()
    }

    // --- Tasks ---

    /// Get all tasks ordered by time of day
    pub async fn tasks(&self) -> Vec<ScheduledTask> {
        self.scheduler
            .lock()
            .await
            .timeline()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Schedule a new task
    pub async fn add_task(&self, request: CreateTaskRequest) -> Result<ScheduledTask, AutomationError> {
        let mut scheduler = self.scheduler.lock().await;
        let mut next = scheduler.clone();
        let task = match next.add_task(request) {
            Ok(task) => task,
            Err(e) => {
                if let AutomationError::PolicyViolation(reason) = &e {
                    self.emit(AutomationEvent::TaskBlocked {
                        reason: reason.clone(),
                    });
                }
                return Err(e);
            }
        };
        persistence::save_tasks(&self.data_dir, next.tasks()).await?;
        *scheduler = next;
        drop(scheduler);

        self.emit(AutomationEvent::TaskScheduled {
            task_id: task.id.clone(),
        });
        Ok(task)
    }

    /// Delete a task, or obtain a confirmation token for a critical one
    pub async fn request_delete_task(&self, id: &str) -> Result<DeleteOutcome, AutomationError> {
        let mut scheduler = self.scheduler.lock().await;
        let mut next = scheduler.clone();
        let outcome = next.request_delete(id)?;
        if let DeleteOutcome::Deleted(_) = &outcome {
            persistence::save_tasks(&self.data_dir, next.tasks()).await?;
        }
        *scheduler = next;
        drop(scheduler);

        match &outcome {
            DeleteOutcome::Deleted(task) => {
                self.emit(AutomationEvent::TaskDeleted {
                    task_id: task.id.clone(),
                });
            }
            DeleteOutcome::ConfirmationRequired { task_id, .. } => {
                self.emit(AutomationEvent::DeleteConfirmationRequired {
                    task_id: task_id.clone(),
                });
            }
        }
        Ok(outcome)
    }

    /// Confirm a pending critical deletion
    pub async fn confirm_delete_task(&self, token: &str) -> Result<ScheduledTask, AutomationError> {
        let mut scheduler = self.scheduler.lock().await;
        let mut next = scheduler.clone();
        let task = next.confirm_delete(token)?;
        persistence::save_tasks(&self.data_dir, next.tasks()).await?;
        *scheduler = next;
        drop(scheduler);

        self.emit(AutomationEvent::TaskDeleted {
            task_id: task.id.clone(),
        });
        Ok(task)
    }

    /// Abandon a pending critical deletion
    pub async fn cancel_delete_task(&self, token: &str) -> Result<(), AutomationError> {
        self.scheduler.lock().await.cancel_delete(token)
    }

    pub async fn is_scheduler_active(&self) -> bool {
        self.scheduler.lock().await.is_active()
    }

    /// Pause or resume the scheduler
    pub async fn set_scheduler_active(&self, active: bool) {
        self.scheduler.lock().await.set_active(active);
        self.emit(AutomationEvent::SchedulerToggled { active });
    }

    /// Fast-forward the simulated clock, returning the new simulated time
    pub async fn advance_clock(&self, delta_millis: u64) -> NaiveDateTime {
        let mut scheduler = self.scheduler.lock().await;
        scheduler.advance_simulated_clock(delta_millis);
        let offset_ms = scheduler.offset().num_milliseconds();
        let now = scheduler.effective_time(self.clock.now());
        drop(scheduler);

        self.emit(AutomationEvent::ClockAdvanced { offset_ms });
        now
    }

    /// Wall-clock time plus the simulated offset
    pub async fn simulated_now(&self) -> NaiveDateTime {
        self.scheduler.lock().await.effective_time(self.clock.now())
    }

    /// Fire every task due in the current minute
    pub async fn run_schedule_tick(&self) -> Vec<ScheduledTask> {
        let mut scheduler = self.scheduler.lock().await;
        let due = scheduler.tick(self.clock.now());
        if due.is_empty() {
            return due;
        }

        // last run changed
        if let Err(e) = persistence::save_tasks(&self.data_dir, scheduler.tasks()).await {
            tracing::warn!("Failed to persist task run state: {}", e);
        }
        drop(scheduler);

        let fired: Vec<ActionFired> = due.iter().map(ActionFired::from_task).collect();
        self.dispatch(&fired);
        due
    }
}

impl Drop for AutomationEngine {
    fn drop(&mut self) {
        for handle in self
            .timers
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            handle.abort();
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum TickKind {
    Rules,
    Schedule,
}

/// Tick one component every `period` until the engine is dropped
fn spawn_ticker(engine: Weak<AutomationEngine>, period: Duration, kind: TickKind) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            let Some(engine) = engine.upgrade() else {
                break;
            };
            match kind {
                TickKind::Rules => {
                    engine.run_rule_tick().await;
                }
                TickKind::Schedule => {
                    engine.run_schedule_tick().await;
                }
            }
        }
    })
}

/// Time of day truncated to the minute
fn minute_of(now: NaiveDateTime) -> NaiveTime {
    NaiveTime::from_hms_opt(now.hour(), now.minute(), 0).unwrap_or_default()
}
