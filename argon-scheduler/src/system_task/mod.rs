use std::sync::{Mutex, MutexGuard, PoisonError};

use argon_common::task::{
    Task, TaskKind, TaskStage, TaskStatusUpdate, TaskUpdateStatus, TimeoutPolicy,
};
use chrono::{DateTime, Duration, Utc};
use tracing::{info, warn};
use uuid::Uuid;

/// How long to wait after a failed database update before trying again
pub const DATABASE_UPDATE_ERR_THRESHOLD_SECS: i64 = 120;

pub const DATABASE_UPDATE_TASK_PREFIX: &str = "argon_db_update";

#[derive(Debug, Default)]
struct SystemTaskState {
    db_update_task: Option<Task>,
    db_update_launched: bool,
    db_update_completed: bool,
    last_failure: Option<DateTime<Utc>>,
}

/// Schedules the singleton maintenance tasks of the cluster.
/// ---
/// At most one database update task is outstanding at any time.
/// The outstanding instance is offered again on every call until it has
/// been launched. After a failure, no new instance is created until the
/// error threshold has passed.
#[derive(Debug)]
pub struct SystemTaskScheduler {
    state: Mutex<SystemTaskState>,
    error_threshold: Duration,
    timeouts: TimeoutPolicy,
}

impl Default for SystemTaskScheduler {
    fn default() -> Self {
        Self::new(
            Duration::seconds(DATABASE_UPDATE_ERR_THRESHOLD_SECS),
            TimeoutPolicy::default(),
        )
    }
}

impl SystemTaskScheduler {
    pub fn new(error_threshold: Duration, timeouts: TimeoutPolicy) -> Self {
        Self {
            state: Mutex::new(SystemTaskState::default()),
            error_threshold,
            timeouts,
        }
    }

    fn lock(&self) -> MutexGuard<'_, SystemTaskState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn is_db_update_completed(&self) -> bool {
        self.lock().db_update_completed
    }

    pub fn outstanding_task(&self) -> Option<Task> {
        self.lock().db_update_task.clone()
    }

    /// Tasks to launch as of `when`.
    /// ---
    /// Creates a new database update task when one is due, or re-offers
    /// the outstanding one if it was never launched.
    pub fn get_tasks_to_schedule(&self, when: DateTime<Utc>) -> Vec<Task> {
        let mut state = self.lock();

        if let Some(task) = &state.db_update_task {
            if state.db_update_launched {
                return Vec::new();
            }
            return vec![task.clone()];
        }

        if state.db_update_completed {
            return Vec::new();
        }

        if let Some(failed_at) = state.last_failure {
            if when - failed_at <= self.error_threshold {
                return Vec::new();
            }
        }

        let task = Task::new(
            DATABASE_UPDATE_TASK_PREFIX,
            Uuid::new_v4().simple(),
            TaskKind::System,
            TaskStage::System,
        )
        .with_command("argon-db-update", Vec::new())
        .with_timeouts(self.timeouts);

        info!("SystemTaskScheduler: Scheduling database update task {}", task.id());

        state.db_update_task = Some(task.clone());
        state.db_update_launched = false;
        vec![task]
    }

    /// Records that the cluster accepted `tasks`.
    pub fn mark_launched(&self, tasks: &[Task]) {
        let mut state = self.lock();

        let launched = state
            .db_update_task
            .as_ref()
            .is_some_and(|outstanding| tasks.iter().any(|t| t.id() == outstanding.id()));

        if launched {
            state.db_update_launched = true;
        }
    }

    /// System tasks that must be killed. None of the current tasks need it.
    pub fn get_tasks_to_kill(&self) -> Vec<Task> {
        Vec::new()
    }

    pub fn handle_task_update(&self, update: &TaskStatusUpdate) {
        let mut state = self.lock();

        let is_outstanding = state
            .db_update_task
            .as_ref()
            .is_some_and(|task| task.id() == update.task_id);

        if !is_outstanding {
            return;
        }

        state.last_failure = None;

        match update.status {
            TaskUpdateStatus::Running => {}
            TaskUpdateStatus::Finished => {
                info!("SystemTaskScheduler: Database update task {} completed", update.task_id);
                state.db_update_completed = true;
            }
            TaskUpdateStatus::Failed => {
                warn!(
                    "SystemTaskScheduler: Database update task {} failed, retrying in {}s",
                    update.task_id,
                    self.error_threshold.num_seconds()
                );
                state.last_failure = Some(update.timestamp);
            }
            TaskUpdateStatus::Killed => {
                warn!("SystemTaskScheduler: Database update task {} killed", update.task_id);
            }
            TaskUpdateStatus::Lost => {
                warn!("SystemTaskScheduler: Database update task {} lost", update.task_id);
            }
        }

        if update.status.is_terminal() {
            state.db_update_task = None;
            state.db_update_launched = false;
        }
    }

    /// Drops a timed-out task and backs off as if it had failed.
    pub fn handle_task_timeout(&self, task: &Task, when: DateTime<Utc>) {
        let mut state = self.lock();

        let is_outstanding = state
            .db_update_task
            .as_ref()
            .is_some_and(|outstanding| outstanding.id() == task.id());

        if !is_outstanding {
            return;
        }

        warn!("SystemTaskScheduler: Database update task {} timed out", task.id());

        state.db_update_task = None;
        state.db_update_launched = false;
        state.last_failure = Some(when);
    }

    /// Allows the database update to run again.
    pub fn reset(&self) {
        self.lock().db_update_completed = false;
    }
}
