use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use argon_common::task::{Task, TaskKind, TaskStatusUpdate};
use chrono::{DateTime, Duration, Utc};
use tracing::debug;

/// Default quiet period after which a task's state is re-queried
pub const DEFAULT_RECONCILIATION_THRESHOLD_SECS: i64 = 600;

/// Result of handing a status update to the registry.
#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    /// Applied to a tracked task, owned by the given kind
    Applied(TaskKind),
    /// Older than the last update, or the task already ended
    Stale,
    /// No tracked task has this ID
    Unknown,
}

#[derive(Debug)]
struct TrackedTask {
    task: Task,
    timed_out: bool,
    reconcile_requested_at: Option<DateTime<Utc>>,
}

/// Canonical timing of every launched task.
/// ---
/// All operations take the single registry lock for their whole duration,
/// so a check and the bookkeeping that follows it are atomic.
/// Reads hand out clones.
#[derive(Debug)]
pub struct TaskRegistry {
    tasks: Mutex<HashMap<String, TrackedTask>>,
    reconciliation_threshold: Duration,
}

impl Default for TaskRegistry {
    fn default() -> Self {
        Self::new(Duration::seconds(DEFAULT_RECONCILIATION_THRESHOLD_SECS))
    }
}

impl TaskRegistry {
    pub fn new(reconciliation_threshold: Duration) -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            reconciliation_threshold,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, TrackedTask>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn reconciliation_threshold(&self) -> Duration {
        self.reconciliation_threshold
    }

    /// Starts tracking `tasks` as launched at `when`.
    pub fn launch_tasks(&self, tasks: &[Task], when: DateTime<Utc>) {
        let mut tracked = self.lock();

        for task in tasks {
            let entry = tracked
                .entry(task.id().to_string())
                .or_insert_with(|| TrackedTask {
                    task: task.clone(),
                    timed_out: false,
                    reconcile_requested_at: None,
                });

            entry.task.launch(when);
        }

        debug!("TaskRegistry: Launched {} task(s)", tasks.len());
    }

    /// Applies `update` to the task it names.
    /// ---
    /// Tasks stop being tracked once a terminal update is applied.
    pub fn handle_task_update(&self, update: &TaskStatusUpdate) -> UpdateOutcome {
        let mut tracked = self.lock();

        let Some(entry) = tracked.get_mut(&update.task_id) else {
            return UpdateOutcome::Unknown;
        };

        if !entry.task.update(update) {
            debug!(
                "TaskRegistry: Dropping stale {} update for task {}",
                update.status, update.task_id
            );
            return UpdateOutcome::Stale;
        }

        let kind = entry.task.kind();

        if update.status.is_terminal() {
            tracked.remove(&update.task_id);
        }

        UpdateOutcome::Applied(kind)
    }

    /// Tasks that exceeded their launch or running threshold at `when`.
    /// ---
    /// Each timed-out task is returned by one call only.
    pub fn get_timeout_tasks(&self, when: DateTime<Utc>) -> Vec<Task> {
        let mut tracked = self.lock();

        tracked
            .values_mut()
            .filter(|entry| !entry.timed_out && entry.task.is_timed_out(when))
            .map(|entry| {
                entry.timed_out = true;
                entry.task.clone()
            })
            .collect()
    }

    /// Launched, unfinished tasks that have been quiet for longer than the
    /// reconciliation threshold.
    /// ---
    /// A returned task is not returned again until another full threshold
    /// passes without news from it.
    pub fn get_tasks_to_reconcile(&self, when: DateTime<Utc>) -> Vec<Task> {
        let threshold = self.reconciliation_threshold;
        let mut tracked = self.lock();

        tracked
            .values_mut()
            .filter(|entry| {
                if !entry.task.is_launched() || entry.task.has_ended() {
                    return false;
                }

                let last_heard = entry.task.last_heard_from();
                let last = match (last_heard, entry.reconcile_requested_at) {
                    (Some(heard), Some(requested)) => heard.max(requested),
                    (heard, requested) => match heard.or(requested) {
                        Some(last) => last,
                        None => return false,
                    },
                };

                when - last > threshold
            })
            .map(|entry| {
                entry.reconcile_requested_at = Some(when);
                entry.task.clone()
            })
            .collect()
    }

    /// Offers a timed-out task again on the next [`Self::get_timeout_tasks`]
    /// call, for timeouts whose owner could not handle them.
    pub fn retry_timeout(&self, task_id: &str) {
        if let Some(entry) = self.lock().get_mut(task_id) {
            entry.timed_out = false;
        }
    }

    pub fn get_task(&self, task_id: &str) -> Option<Task> {
        self.lock().get(task_id).map(|entry| entry.task.clone())
    }

    pub fn remove_task(&self, task_id: &str) -> Option<Task> {
        self.lock().remove(task_id).map(|entry| entry.task)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
