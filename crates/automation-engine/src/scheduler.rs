//! Scheduler for time-of-day device tasks

use crate::error::AutomationError;
use crate::model::{CreateTaskRequest, Device, Priority, Repeat, ScheduledTask, TaskAction};
use chrono::{Duration, NaiveDateTime, NaiveTime, Timelike};
use sensor_core::time::parse_hhmm;
use std::collections::HashMap;

/// Result of asking to delete a task
#[derive(Debug, Clone, PartialEq)]
pub enum DeleteOutcome {
    /// The task was removed
    Deleted(ScheduledTask),
    /// The task is safety-critical; call `confirm_delete` with the token
    ConfirmationRequired { token: String, task_id: String },
}

/// Scheduler for time-triggered tasks
///
/// Each tick compares the current minute (plus the simulated offset)
/// with every task's trigger time. A task fires at most once per
/// minute; `once` tasks never fire again after their first run.
#[derive(Debug, Clone)]
pub struct TaskScheduler {
    tasks: Vec<ScheduledTask>,
    active: bool,
    /// Accumulated simulation offset in milliseconds, never decreases
    offset_millis: u64,
    /// Confirmation tokens for critical deletions, keyed by token
    pending_deletes: HashMap<String, String>,
}

impl Default for TaskScheduler {
    fn default() -> Self {
        Self::new(default_tasks())
    }
}

impl TaskScheduler {
    /// Create an active scheduler holding the given tasks
    #[must_use]
    pub fn new(tasks: Vec<ScheduledTask>) -> Self {
        Self {
            tasks,
            active: true,
            offset_millis: 0,
            pending_deletes: HashMap::new(),
        }
    }

    /// All tasks, in insertion order
    #[must_use]
    pub fn tasks(&self) -> &[ScheduledTask] {
        &self.tasks
    }

    /// Tasks ordered by time of day
    #[must_use]
    pub fn timeline(&self) -> Vec<&ScheduledTask> {
        let mut tasks: Vec<&ScheduledTask> = self.tasks.iter().collect();
        tasks.sort_by_key(|task| task.time);
        tasks
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ScheduledTask> {
        self.tasks.iter().find(|task| task.id == id)
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Pause or resume ticking
    pub fn set_active(&mut self, active: bool) {
        self.active = active;
        if active {
            tracing::info!("Scheduler resumed");
        } else {
            tracing::info!("Scheduler paused");
        }
    }

    /// Validate and append a new task
    pub fn add_task(&mut self, request: CreateTaskRequest) -> Result<ScheduledTask, AutomationError> {
        let name = request.name.trim();
        if name.is_empty() || request.time.trim().is_empty() {
            return Err(AutomationError::Validation(
                "a task name and time are required".to_string(),
            ));
        }

        if request.device == Device::Alarm && request.action == TaskAction::Off {
            tracing::warn!("Blocked unsafe task creation: alarm off");
            return Err(AutomationError::PolicyViolation(
                "scheduling 'fire alarm off' is prohibited".to_string(),
            ));
        }

        if !request.device.supports(request.action) {
            return Err(AutomationError::Validation(format!(
                "{} does not support '{}'",
                request.device, request.action
            )));
        }

        let time = parse_hhmm(&request.time).ok_or_else(|| {
            AutomationError::Validation(format!("invalid time (expected HH:MM): {}", request.time))
        })?;

        let task = ScheduledTask {
            id: format!("tsk-{}", uuid::Uuid::new_v4()),
            name: name.to_string(),
            device: request.device,
            action: request.action,
            time,
            repeat: request.repeat,
            priority: request.priority,
            last_run: None,
        };
        self.tasks.push(task.clone());
        tracing::info!("Scheduled: {} at {}", task.name, time.format("%H:%M"));
        Ok(task)
    }

    /// First step of a deletion
    ///
    /// Non-critical tasks are removed immediately. Critical tasks stay
    /// until the returned token is confirmed.
    pub fn request_delete(&mut self, id: &str) -> Result<DeleteOutcome, AutomationError> {
        let task = self
            .get(id)
            .ok_or_else(|| AutomationError::TaskNotFound(id.to_string()))?;

        if task.is_critical() {
            let token = uuid::Uuid::new_v4().to_string();
            self.pending_deletes.insert(token.clone(), id.to_string());
            tracing::warn!("Deletion of critical task {} awaits confirmation", id);
            return Ok(DeleteOutcome::ConfirmationRequired {
                token,
                task_id: id.to_string(),
            });
        }

        self.remove(id).map(DeleteOutcome::Deleted)
    }

    /// Complete a deletion started by [`TaskScheduler::request_delete`]
    pub fn confirm_delete(&mut self, token: &str) -> Result<ScheduledTask, AutomationError> {
        let id = self
            .pending_deletes
            .remove(token)
            .ok_or_else(|| AutomationError::ConfirmationNotFound(token.to_string()))?;
        self.remove(&id)
    }

    /// Drop a pending confirmation, keeping the task
    pub fn cancel_delete(&mut self, token: &str) -> Result<(), AutomationError> {
        self.pending_deletes
            .remove(token)
            .map(|_| ())
            .ok_or_else(|| AutomationError::ConfirmationNotFound(token.to_string()))
    }

    fn remove(&mut self, id: &str) -> Result<ScheduledTask, AutomationError> {
        let index = self
            .tasks
            .iter()
            .position(|task| task.id == id)
            .ok_or_else(|| AutomationError::TaskNotFound(id.to_string()))?;
        self.pending_deletes.retain(|_, pending| pending.as_str() != id);
        let task = self.tasks.remove(index);
        tracing::info!("Deleted task: {} ({})", task.name, task.id);
        Ok(task)
    }

    /// Fast-forward the simulated clock
    pub fn advance_simulated_clock(&mut self, delta_millis: u64) {
        self.offset_millis = self.offset_millis.saturating_add(delta_millis);
        tracing::info!("SIM: clock offset is now {}s", self.offset_millis / 1000);
    }

    /// Current simulation offset
    #[must_use]
    pub fn offset(&self) -> Duration {
        Duration::milliseconds(i64::try_from(self.offset_millis).unwrap_or(i64::MAX))
    }

    /// Apply the simulation offset to a wall-clock time
    #[must_use]
    pub fn effective_time(&self, now: NaiveDateTime) -> NaiveDateTime {
        now.checked_add_signed(self.offset()).unwrap_or(NaiveDateTime::MAX)
    }

    /// Fire every task due in the current minute
    ///
    /// Returns the tasks that fired, in insertion order.
    pub fn tick(&mut self, now: NaiveDateTime) -> Vec<ScheduledTask> {
        if !self.active {
            return Vec::new();
        }

        let now = self.effective_time(now);
        let Some(minute) = now.with_second(0).and_then(|t| t.with_nanosecond(0)) else {
            return Vec::new();
        };
        let current = NaiveTime::from_hms_opt(now.hour(), now.minute(), 0);

        let mut fired = Vec::new();
        for task in &mut self.tasks {
            if Some(task.time) != current || !is_eligible(task, minute) {
                continue;
            }
            task.last_run = Some(minute);
            tracing::info!(
                "EXECUTING: {} ({} -> {})",
                task.name,
                task.device,
                task.action
            );
            fired.push(task.clone());
        }
        fired
    }
}

fn is_eligible(task: &ScheduledTask, minute: NaiveDateTime) -> bool {
    match (task.repeat, task.last_run) {
        (_, None) => true,
        (Repeat::Daily, Some(last)) => last != minute,
        (Repeat::Once, Some(_)) => false,
    }
}

/// Tasks used when nothing has been saved yet
#[must_use]
pub fn default_tasks() -> Vec<ScheduledTask> {
    vec![
        ScheduledTask {
            id: "t1".to_string(),
            name: "Morning Purge".to_string(),
            device: Device::Fan,
            action: TaskAction::On,
            time: NaiveTime::from_hms_opt(8, 0, 0).unwrap_or_default(),
            repeat: Repeat::Daily,
            priority: Priority::Low,
            last_run: None,
        },
        ScheduledTask {
            id: "t2".to_string(),
            name: "Night Silent Mode".to_string(),
            device: Device::Purifier,
            action: TaskAction::Silent,
            time: NaiveTime::from_hms_opt(22, 0, 0).unwrap_or_default(),
            repeat: Repeat::Daily,
            priority: Priority::High,
            last_run: None,
        },
    ]
}
