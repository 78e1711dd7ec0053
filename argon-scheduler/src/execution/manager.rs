use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use argon_common::{
    error::Error,
    job::JobExecution,
    task::{Task, TaskStatusUpdate},
};
use chrono::{DateTime, Utc};
use tracing::{debug, error, info};
use uuid::Uuid;

use super::JobExecutionOrchestrator;

type SharedOrchestrator = Arc<Mutex<JobExecutionOrchestrator>>;

/// Running job executions of this scheduler, keyed by job execution ID.
/// ---
/// Calls into a single orchestrator are serialized on its own lock,
/// the map lock is only held to look orchestrators up.
/// Executions leave the map as soon as they finish.
#[derive(Debug, Default)]
pub struct JobExecutionManager {
    running: Mutex<HashMap<Uuid, SharedOrchestrator>>,
}

impl JobExecutionManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_execution(&self, orchestrator: JobExecutionOrchestrator) -> Result<(), Error> {
        let id = orchestrator.id();
        let mut running = self.running.lock().unwrap_or_else(PoisonError::into_inner);

        if running.contains_key(&id) {
            return Err(Error::Conflict(format!(
                "Job execution {} is already running",
                id
            )));
        }

        info!("JobExecutionManager: Added job execution [{}]", id);
        running.insert(id, Arc::new(Mutex::new(orchestrator)));

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Snapshot of a running execution.
    pub fn get_execution(&self, job_exe_id: Uuid) -> Option<JobExecution> {
        let orchestrator = self.lookup(job_exe_id).ok()?;
        let guard = orchestrator.lock().unwrap_or_else(PoisonError::into_inner);
        Some(guard.job_exe().clone())
    }

    /// Starts the next task of every execution that has one ready.
    /// ---
    /// A failing execution is logged and skipped.
    pub fn get_ready_tasks(&self) -> Vec<Task> {
        let mut tasks = Vec::new();

        for orchestrator in self.snapshot() {
            let mut guard = orchestrator.lock().unwrap_or_else(PoisonError::into_inner);

            if !guard.is_next_task_ready() {
                continue;
            }

            match guard.start_next_task() {
                Ok(task) => tasks.push(task),
                Err(e) => error!(
                    "JobExecutionManager: Failed to start next task of [{}]: {}",
                    guard.id(),
                    e
                ),
            }
        }

        tasks
    }

    /// Routes a status update to the owning execution.
    /// ---
    /// Updates for executions that already finished are dropped.
    pub fn handle_task_update(
        &self,
        job_exe_id: Uuid,
        update: &TaskStatusUpdate,
    ) -> Result<(), Error> {
        let Ok(orchestrator) = self.lookup(job_exe_id) else {
            debug!(
                "JobExecutionManager: Dropping update of task {} for finished job execution [{}]",
                update.task_id, job_exe_id
            );
            return Ok(());
        };

        self.apply(job_exe_id, &orchestrator, |orchestrator| {
            orchestrator.task_update(update)
        })
    }

    pub fn handle_task_timeout(
        &self,
        job_exe_id: Uuid,
        task: &Task,
        when: DateTime<Utc>,
    ) -> Result<(), Error> {
        let Ok(orchestrator) = self.lookup(job_exe_id) else {
            debug!(
                "JobExecutionManager: Dropping timeout of task {} for finished job execution [{}]",
                task.id(),
                job_exe_id
            );
            return Ok(());
        };

        self.apply(job_exe_id, &orchestrator, |orchestrator| {
            orchestrator.execution_timed_out(task, when)
        })
    }

    /// Cancels a running execution, returning the task to kill if any.
    pub fn cancel_execution(&self, job_exe_id: Uuid) -> Result<Option<Task>, Error> {
        let orchestrator = self.lookup(job_exe_id)?;
        self.apply(job_exe_id, &orchestrator, |orchestrator| {
            orchestrator.execution_canceled()
        })
    }

    /// Fails every execution bound to `agent_id`.
    /// ---
    /// Returns the IDs of the executions that were failed, each with the
    /// task it had running on the agent.
    pub fn handle_lost_agent(
        &self,
        agent_id: &str,
        when: DateTime<Utc>,
    ) -> Vec<(Uuid, Option<Task>)> {
        let mut lost = Vec::new();

        for orchestrator in self.snapshot() {
            let mut guard = orchestrator.lock().unwrap_or_else(PoisonError::into_inner);

            if guard.agent_id() != agent_id {
                continue;
            }

            match guard.execution_lost(when) {
                Ok(task) => lost.push((guard.id(), task)),
                Err(e) => error!(
                    "JobExecutionManager: Failed to mark [{}] as lost: {}",
                    guard.id(),
                    e
                ),
            }
        }

        self.remove_finished();
        lost
    }

    /// Runs `op` under the orchestrator's lock, removing the execution if
    /// it finished.
    fn apply<T>(
        &self,
        job_exe_id: Uuid,
        orchestrator: &SharedOrchestrator,
        op: impl FnOnce(&mut JobExecutionOrchestrator) -> Result<T, Error>,
    ) -> Result<T, Error> {
        let (result, finished) = {
            let mut guard = orchestrator.lock().unwrap_or_else(PoisonError::into_inner);
            let result = op(&mut guard);
            (result, guard.is_finished())
        };

        if finished {
            self.remove(job_exe_id);
        }

        result
    }

    fn lookup(&self, job_exe_id: Uuid) -> Result<SharedOrchestrator, Error> {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&job_exe_id)
            .cloned()
            .ok_or_else(|| Error::not_found("JobExecution", job_exe_id))
    }

    fn snapshot(&self) -> Vec<SharedOrchestrator> {
        self.running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    fn remove(&self, job_exe_id: Uuid) {
        if self
            .running
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&job_exe_id)
            .is_some()
        {
            info!(
                "JobExecutionManager: Job execution [{}] finished",
                job_exe_id
            );
        }
    }

    fn remove_finished(&self) {
        let finished: Vec<Uuid> = self
            .snapshot()
            .iter()
            .filter_map(|orchestrator| {
                let guard = orchestrator.lock().unwrap_or_else(PoisonError::into_inner);
                guard.is_finished().then(|| guard.id())
            })
            .collect();

        for id in finished {
            self.remove(id);
        }
    }
}
