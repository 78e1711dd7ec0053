use std::sync::Arc;

use argon_common::{
    error::Error,
    failure::{ErrorCatalog, NamedError, names},
    job::{JobExecution, JobExecutionStatus, JobType},
    state::JobExecutionDbTrait,
    task::{Task, TaskKind, TaskStage, TaskStatusUpdate, TaskUpdateStatus, TimeoutPolicy},
};
use chrono::{DateTime, Duration, Utc};
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::{
    ExecutionConfig,
    classify::{classify_failure, timeout_error_name},
};

/// Drives one job execution through its stages.
/// ---
/// Only the active task may move the execution forward.
/// Every state change is written through the state manager
/// before the call returns.
#[derive(Debug)]
pub struct JobExecutionOrchestrator {
    job_exe: JobExecution,
    job_type: Arc<JobType>,
    agent_id: String,
    catalog: Arc<ErrorCatalog>,
    state_manager: Arc<dyn JobExecutionDbTrait>,
    config: ExecutionConfig,
    stages: Vec<TaskStage>,
    /// Index into `stages` of the next stage to start
    next_stage: usize,
    active_task: Option<Task>,
    /// LOST relaunches of the current stage
    relaunch_count: u32,
}

impl JobExecutionOrchestrator {
    /// Takes ownership of `job_exe` and moves it to RUNNING.
    pub fn new(
        mut job_exe: JobExecution,
        job_type: Arc<JobType>,
        agent_id: impl Into<String>,
        catalog: Arc<ErrorCatalog>,
        state_manager: Arc<dyn JobExecutionDbTrait>,
        config: ExecutionConfig,
    ) -> Result<Self, Error> {
        if job_exe.status.is_final() {
            return Err(Error::IllegalState(format!(
                "Job execution {} is already {}",
                job_exe.id, job_exe.status
            )));
        }

        job_exe.status = JobExecutionStatus::Running;
        state_manager.save_job_execution(&job_exe)?;

        let stages = job_type.stages();

        Ok(Self {
            job_exe,
            job_type,
            agent_id: agent_id.into(),
            catalog,
            state_manager,
            config,
            stages,
            next_stage: 0,
            active_task: None,
            relaunch_count: 0,
        })
    }

    pub fn id(&self) -> Uuid {
        self.job_exe.id
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn job_exe(&self) -> &JobExecution {
        &self.job_exe
    }

    pub fn active_task(&self) -> Option<&Task> {
        self.active_task.as_ref()
    }

    pub fn is_finished(&self) -> bool {
        self.job_exe.status.is_final()
    }

    pub fn is_next_task_ready(&self) -> bool {
        !self.is_finished() && self.active_task.is_none() && self.next_stage < self.stages.len()
    }

    /// Builds the task for the next stage and makes it the active task.
    pub fn start_next_task(&mut self) -> Result<Task, Error> {
        if !self.is_next_task_ready() {
            return Err(Error::IllegalState(format!(
                "Job execution {} has no task ready to start",
                self.job_exe.id
            )));
        }

        let stage = self.stages[self.next_stage];
        let task = self.build_task(stage);

        debug!(
            "Orchestrator [{}]: Starting task {} for stage {}",
            self.job_exe.id,
            task.id(),
            stage
        );

        self.active_task = Some(task.clone());

        Ok(task)
    }

    /// Applies a status update for the active task.
    /// ---
    /// Updates for any other task, updates after the execution finished
    /// and stale updates are dropped silently.
    pub fn task_update(&mut self, update: &TaskStatusUpdate) -> Result<(), Error> {
        if self.is_finished() {
            return Ok(());
        }

        let Some(task) = self.active_task.as_mut() else {
            return Ok(());
        };

        if task.id() != update.task_id {
            debug!(
                "Orchestrator [{}]: Ignoring update for inactive task {}",
                self.job_exe.id, update.task_id
            );
            return Ok(());
        }

        let before_update = task.clone();
        if !task.update(update) {
            return Ok(());
        }

        let stage = task.stage();

        match update.status {
            TaskUpdateStatus::Running => {
                self.job_exe.record_stage_started(stage, update.timestamp);
            }
            TaskUpdateStatus::Finished => {
                self.job_exe
                    .record_stage_completed(stage, update.timestamp, update.exit_code);
                self.complete_stage();
            }
            TaskUpdateStatus::Failed => {
                self.job_exe
                    .record_stage_completed(stage, update.timestamp, update.exit_code);

                let error =
                    classify_failure(&before_update, update, &self.job_type, &self.catalog);
                self.fail(error, Utc::now());
            }
            TaskUpdateStatus::Killed => {
                let error = self.catalog.resolve(names::KILLED);
                self.fail(error, Utc::now());
            }
            TaskUpdateStatus::Lost => {
                self.relaunch_stage(stage);
            }
        }

        self.state_manager.save_job_execution(&self.job_exe)
    }

    /// Fails the execution if `task` is still the active task.
    /// ---
    /// Nothing changes unless the failure was persisted, so a timeout that
    /// could not be saved can be handled again.
    pub fn execution_timed_out(&mut self, task: &Task, when: DateTime<Utc>) -> Result<(), Error> {
        if self.is_finished() {
            return Ok(());
        }

        let is_active = self
            .active_task
            .as_ref()
            .is_some_and(|active| active.id() == task.id());

        if !is_active {
            debug!(
                "Orchestrator [{}]: Ignoring timeout of inactive task {}",
                self.job_exe.id,
                task.id()
            );
            return Ok(());
        }

        let name = timeout_error_name(task, &self.job_type);
        let resolved = self.catalog.resolve(name);
        let error = NamedError::system(resolved.name, resolved.title);

        warn!(
            "Orchestrator [{}]: Task {} timed out, failing with {}",
            self.job_exe.id,
            task.id(),
            error.name
        );

        let mut failed = self.job_exe.clone();
        failed.fail(error, when);
        self.state_manager.save_job_execution(&failed)?;

        self.active_task = None;
        self.job_exe = failed;

        Ok(())
    }

    /// Fails the execution because its agent went away.
    /// ---
    /// Returns the task that was active on the agent, if any.
    pub fn execution_lost(&mut self, when: DateTime<Utc>) -> Result<Option<Task>, Error> {
        if self.is_finished() {
            return Ok(None);
        }

        warn!(
            "Orchestrator [{}]: Agent {} lost",
            self.job_exe.id, self.agent_id
        );

        let task = self.active_task.clone();
        let error = self.catalog.resolve(names::NODE_LOST);
        self.fail(error, when);
        self.state_manager.save_job_execution(&self.job_exe)?;

        Ok(task)
    }

    /// Cancels the execution.
    /// ---
    /// Returns the task that was active so the caller can kill it.
    /// Canceling a finished execution changes nothing and returns `None`.
    pub fn execution_canceled(&mut self) -> Result<Option<Task>, Error> {
        if self.is_finished() {
            return Ok(None);
        }

        let task = self.active_task.take();

        self.job_exe.status = JobExecutionStatus::Canceled;
        self.job_exe.ended = Some(Utc::now());

        info!("Orchestrator [{}]: Canceled", self.job_exe.id);

        self.state_manager.save_job_execution(&self.job_exe)?;

        Ok(task)
    }

    fn build_task(&self, stage: TaskStage) -> Task {
        let job_exe_id = self.job_exe.id;
        let prefix = format!("job_{}_{}", job_exe_id, stage);

        let running = match stage {
            TaskStage::Main if self.job_type.is_long_running => None,
            TaskStage::Main => self
                .job_exe
                .timeout_secs
                .and_then(|secs| i64::try_from(secs).ok())
                .map(Duration::seconds),
            other => self.config.timeouts.running_for(other),
        };

        let image = self
            .job_type
            .docker_image
            .clone()
            .unwrap_or_else(|| self.job_type.name.clone());

        let (command, arguments) = match stage {
            TaskStage::Pull => ("pull".to_string(), vec![image]),
            TaskStage::Pre => (image, self.job_type.pre_arguments.clone()),
            TaskStage::Post => (image, self.job_type.post_arguments.clone()),
            _ => (image, self.job_exe.command_arguments.clone()),
        };

        Task::new(
            prefix,
            self.relaunch_count,
            TaskKind::Job { job_exe_id },
            stage,
        )
        .with_agent(self.agent_id.clone())
        .with_command(command, arguments)
        .with_timeouts(TimeoutPolicy::new(self.config.timeouts.launch, running))
    }

    fn complete_stage(&mut self) {
        self.active_task = None;
        self.relaunch_count = 0;
        self.next_stage += 1;

        if self.next_stage >= self.stages.len() {
            self.job_exe.status = JobExecutionStatus::Completed;
            self.job_exe.ended = Some(Utc::now());

            info!("Orchestrator [{}]: Completed", self.job_exe.id);
        }
    }

    fn relaunch_stage(&mut self, stage: TaskStage) {
        self.active_task = None;
        self.job_exe.reset_stage(stage);
        self.relaunch_count += 1;

        if self.relaunch_count > self.config.max_relaunches {
            warn!(
                "Orchestrator [{}]: Stage {} lost {} times, giving up",
                self.job_exe.id, stage, self.relaunch_count
            );

            let error = self.catalog.resolve(names::TASK_LOST);
            self.fail(error, Utc::now());
            return;
        }

        info!(
            "Orchestrator [{}]: Task for stage {} lost, relaunch {} of {}",
            self.job_exe.id, stage, self.relaunch_count, self.config.max_relaunches
        );
    }

    fn fail(&mut self, error: NamedError, when: DateTime<Utc>) {
        self.active_task = None;

        info!(
            "Orchestrator [{}]: Failed with {} ({})",
            self.job_exe.id, error.name, error.category
        );

        self.job_exe.fail(error, when);
    }
}

#[cfg(test)]
mod tests {
    use argon_common::failure::ErrorCategory;
    use argon_persistence_mem::InMemoryStateDb;

    use super::*;
    use crate::execution::DEFAULT_MAX_RELAUNCHES;

    struct Fixture {
        db: Arc<InMemoryStateDb>,
        orchestrator: JobExecutionOrchestrator,
    }

    fn fixture(job_type: JobType) -> Fixture {
        let db = Arc::new(InMemoryStateDb::new());
        let job_exe = JobExecution::new(Uuid::new_v4(), job_type.name.clone())
            .with_command_arguments(vec!["--input".to_string(), "a.tif".to_string()])
            .with_timeout_secs(3600);

        let orchestrator = JobExecutionOrchestrator::new(
            job_exe,
            Arc::new(job_type),
            "agent_1",
            Arc::new(ErrorCatalog::with_builtins()),
            db.clone(),
            ExecutionConfig::default(),
        )
        .unwrap();

        Fixture { db, orchestrator }
    }

    fn normal_fixture() -> Fixture {
        let mut job_type = JobType::new("ndvi", "1.0");
        job_type.docker_image = Some("argon/ndvi:1.0".to_string());
        fixture(job_type)
    }

    fn update(task: &Task, status: TaskUpdateStatus, when: DateTime<Utc>) -> TaskStatusUpdate {
        TaskStatusUpdate::new(task.id(), "agent_1", status, when)
    }

    fn run_stage(
        orchestrator: &mut JobExecutionOrchestrator,
        started: DateTime<Utc>,
        exit_code: i32,
    ) -> Task {
        let task = orchestrator.start_next_task().unwrap();
        orchestrator
            .task_update(&update(&task, TaskUpdateStatus::Running, started))
            .unwrap();
        orchestrator
            .task_update(
                &update(&task, TaskUpdateStatus::Finished, started + Duration::seconds(1))
                    .with_exit_code(exit_code),
            )
            .unwrap();
        task
    }

    #[test]
    fn test_stage_sequence_normal_job_type() {
        let Fixture {
            mut orchestrator, ..
        } = normal_fixture();
        let now = Utc::now();

        let mut observed = Vec::new();
        while orchestrator.is_next_task_ready() {
            let task = run_stage(&mut orchestrator, now, 0);
            observed.push(task.stage());
        }

        assert_eq!(
            observed,
            vec![
                TaskStage::Pull,
                TaskStage::Pre,
                TaskStage::Main,
                TaskStage::Post
            ]
        );
        assert!(orchestrator.is_finished());
    }

    #[test]
    fn test_stage_sequence_system_job_type() {
        let Fixture {
            mut orchestrator, ..
        } = fixture(JobType::system("scale-clock", "1.0"));

        let task = run_stage(&mut orchestrator, Utc::now(), 0);

        assert_eq!(task.stage(), TaskStage::Main);
        assert!(!orchestrator.is_next_task_ready());
        assert_eq!(orchestrator.job_exe().status, JobExecutionStatus::Completed);
    }

    #[test]
    fn test_end_to_end_exit_codes() {
        let Fixture {
            db,
            mut orchestrator,
        } = normal_fixture();
        let start = Utc::now() - Duration::minutes(5);

        run_stage(&mut orchestrator, start, 0);
        assert!(orchestrator.is_next_task_ready());

        run_stage(&mut orchestrator, start + Duration::seconds(2), 1);
        assert!(orchestrator.is_next_task_ready());

        run_stage(&mut orchestrator, start + Duration::seconds(4), 2);
        assert!(orchestrator.is_next_task_ready());

        run_stage(&mut orchestrator, start + Duration::seconds(6), 3);
        assert!(!orchestrator.is_next_task_ready());
        assert!(orchestrator.is_finished());

        let stored = db.get_job_execution(orchestrator.id()).unwrap().unwrap();
        assert_eq!(stored.status, JobExecutionStatus::Completed);
        assert!(stored.ended.unwrap() > start + Duration::seconds(7));
        assert_eq!(stored.stage(TaskStage::Pre).exit_code, Some(1));
        assert_eq!(stored.stage(TaskStage::Main).exit_code, Some(2));
        assert_eq!(stored.stage(TaskStage::Post).exit_code, Some(3));
        assert_eq!(
            stored.stage(TaskStage::Pull).started,
            Some(start),
            "pull stage start"
        );
        assert_eq!(
            stored.stage(TaskStage::Post).completed,
            Some(start + Duration::seconds(7))
        );
    }

    #[test]
    fn test_failed_records_completion_and_classifies() {
        let Fixture {
            db,
            mut orchestrator,
        } = normal_fixture();
        let start = Utc::now() - Duration::minutes(5);

        run_stage(&mut orchestrator, start, 0);

        let pre = orchestrator.start_next_task().unwrap();
        let pre_started = start + Duration::seconds(2);
        let pre_failed = pre_started + Duration::seconds(1);
        orchestrator
            .task_update(&update(&pre, TaskUpdateStatus::Running, pre_started))
            .unwrap();
        orchestrator
            .task_update(&update(&pre, TaskUpdateStatus::Failed, pre_failed).with_exit_code(1))
            .unwrap();

        assert!(orchestrator.is_finished());
        assert!(orchestrator.active_task().is_none());

        let stored = db.get_job_execution(orchestrator.id()).unwrap().unwrap();
        assert_eq!(stored.status, JobExecutionStatus::Failed);
        assert_eq!(stored.stage(TaskStage::Pre).completed, Some(pre_failed));
        assert_eq!(stored.stage(TaskStage::Pre).exit_code, Some(1));
        assert_eq!(stored.error.unwrap().name, names::ALGORITHM_UNKNOWN);
        assert_eq!(stored.error_category, Some(ErrorCategory::Algorithm));
    }

    #[test]
    fn test_killed_fails_with_system_error() {
        let Fixture {
            mut orchestrator, ..
        } = normal_fixture();

        let task = orchestrator.start_next_task().unwrap();
        orchestrator
            .task_update(&update(&task, TaskUpdateStatus::Killed, Utc::now()))
            .unwrap();

        let job_exe = orchestrator.job_exe();
        assert_eq!(job_exe.status, JobExecutionStatus::Failed);
        assert_eq!(job_exe.error.as_ref().unwrap().name, names::KILLED);
        assert_eq!(job_exe.error_category, Some(ErrorCategory::System));
    }

    #[test]
    fn test_lost_task_is_relaunched_with_new_id() {
        let Fixture {
            mut orchestrator, ..
        } = normal_fixture();
        let now = Utc::now();

        let first = orchestrator.start_next_task().unwrap();
        orchestrator
            .task_update(&update(&first, TaskUpdateStatus::Running, now))
            .unwrap();
        orchestrator
            .task_update(&update(
                &first,
                TaskUpdateStatus::Lost,
                now + Duration::seconds(1),
            ))
            .unwrap();

        assert!(!orchestrator.is_finished());
        assert!(orchestrator.is_next_task_ready());
        assert_eq!(orchestrator.job_exe().stage(TaskStage::Pull).started, None);

        let second = orchestrator.start_next_task().unwrap();
        assert_eq!(second.stage(), TaskStage::Pull);
        assert_eq!(second.id_prefix(), first.id_prefix());
        assert_ne!(second.id(), first.id());

        // The superseded task must not move the execution forward
        orchestrator
            .task_update(
                &update(&first, TaskUpdateStatus::Finished, now + Duration::seconds(2))
                    .with_exit_code(0),
            )
            .unwrap();
        assert_eq!(
            orchestrator.active_task().map(Task::id),
            Some(second.id())
        );
        assert_eq!(orchestrator.job_exe().stage(TaskStage::Pull).completed, None);
    }

    #[test]
    fn test_relaunch_limit() {
        let Fixture {
            mut orchestrator, ..
        } = normal_fixture();
        let now = Utc::now();

        for attempt in 0..=DEFAULT_MAX_RELAUNCHES {
            assert!(orchestrator.is_next_task_ready(), "attempt {}", attempt);
            let task = orchestrator.start_next_task().unwrap();
            assert!(task.id().ends_with(&format!("_{}", attempt)));
            orchestrator
                .task_update(&update(&task, TaskUpdateStatus::Lost, now))
                .unwrap();
        }

        assert!(orchestrator.is_finished());
        assert_eq!(
            orchestrator.job_exe().error.as_ref().unwrap().name,
            names::TASK_LOST
        );
    }

    #[test]
    fn test_timeout_of_active_task() {
        let Fixture {
            db,
            mut orchestrator,
        } = normal_fixture();
        let now = Utc::now();

        run_stage(&mut orchestrator, now, 0);
        run_stage(&mut orchestrator, now, 0);

        let main = orchestrator.start_next_task().unwrap();
        let started = now + Duration::seconds(10);
        orchestrator
            .task_update(&update(&main, TaskUpdateStatus::Running, started))
            .unwrap();

        let mut registry_copy = main.clone();
        registry_copy.launch(now);
        registry_copy.update(&update(&main, TaskUpdateStatus::Running, started));

        let timed_out = started + Duration::seconds(1);
        orchestrator
            .execution_timed_out(&registry_copy, timed_out)
            .unwrap();

        let stored = db.get_job_execution(orchestrator.id()).unwrap().unwrap();
        assert_eq!(stored.status, JobExecutionStatus::Failed);
        assert_eq!(stored.error.unwrap().name, names::TIMEOUT);
        assert_eq!(stored.error_category, Some(ErrorCategory::System));
        assert_eq!(stored.ended, Some(timed_out));
    }

    #[test]
    fn test_launch_timeout() {
        let Fixture {
            mut orchestrator, ..
        } = normal_fixture();
        let now = Utc::now();

        let pull = orchestrator.start_next_task().unwrap();
        orchestrator.execution_timed_out(&pull, now).unwrap();

        let job_exe = orchestrator.job_exe();
        assert_eq!(job_exe.error.as_ref().unwrap().name, names::LAUNCH_TIMEOUT);
        assert_eq!(job_exe.ended, Some(now));
    }

    #[test]
    fn test_timeout_of_stale_task_is_ignored() {
        let Fixture {
            mut orchestrator, ..
        } = normal_fixture();
        let now = Utc::now();

        let first = orchestrator.start_next_task().unwrap();
        orchestrator
            .task_update(&update(&first, TaskUpdateStatus::Lost, now))
            .unwrap();
        orchestrator.start_next_task().unwrap();

        orchestrator.execution_timed_out(&first, now).unwrap();

        assert!(!orchestrator.is_finished());
        assert_eq!(orchestrator.job_exe().status, JobExecutionStatus::Running);
    }

    #[test]
    fn test_execution_lost_without_active_task() {
        let Fixture {
            mut orchestrator, ..
        } = normal_fixture();
        let when = Utc::now();

        assert!(orchestrator.execution_lost(when).unwrap().is_none());

        let job_exe = orchestrator.job_exe();
        assert_eq!(job_exe.status, JobExecutionStatus::Failed);
        assert_eq!(job_exe.error.as_ref().unwrap().name, names::NODE_LOST);
        assert_eq!(job_exe.ended, Some(when));
        assert!(!orchestrator.is_next_task_ready());
    }

    #[test]
    fn test_execution_lost_returns_active_task() {
        let Fixture {
            mut orchestrator, ..
        } = normal_fixture();

        let task = orchestrator.start_next_task().unwrap();
        let lost = orchestrator.execution_lost(Utc::now()).unwrap();

        assert_eq!(lost.map(|t| t.id().to_string()), Some(task.id().to_string()));
        assert!(orchestrator.active_task().is_none());
        assert!(orchestrator.execution_lost(Utc::now()).unwrap().is_none());
    }

    #[test]
    fn test_cancel_returns_active_task() {
        let Fixture {
            mut orchestrator, ..
        } = normal_fixture();
        let now = Utc::now();

        let task = orchestrator.start_next_task().unwrap();
        let canceled = orchestrator.execution_canceled().unwrap();

        assert_eq!(canceled.map(|t| t.id().to_string()), Some(task.id().to_string()));
        assert_eq!(orchestrator.job_exe().status, JobExecutionStatus::Canceled);

        orchestrator
            .task_update(&update(&task, TaskUpdateStatus::Running, now))
            .unwrap();
        orchestrator
            .task_update(&update(&task, TaskUpdateStatus::Failed, now))
            .unwrap();

        assert_eq!(orchestrator.job_exe().status, JobExecutionStatus::Canceled);
        assert!(orchestrator.job_exe().error.is_none());
    }

    #[test]
    fn test_cancel_without_active_task() {
        let Fixture {
            mut orchestrator, ..
        } = normal_fixture();

        assert!(orchestrator.execution_canceled().unwrap().is_none());
        assert!(orchestrator.is_finished());
    }

    #[test]
    fn test_start_next_task_when_not_ready() {
        let Fixture {
            mut orchestrator, ..
        } = normal_fixture();

        orchestrator.start_next_task().unwrap();
        let result = orchestrator.start_next_task();

        assert!(matches!(result, Err(Error::IllegalState(_))));
    }

    #[test]
    fn test_main_task_timeouts() {
        let Fixture {
            mut orchestrator, ..
        } = normal_fixture();
        let now = Utc::now();

        run_stage(&mut orchestrator, now, 0);
        run_stage(&mut orchestrator, now, 0);
        let main = orchestrator.start_next_task().unwrap();

        assert_eq!(main.timeouts().running, Some(Duration::seconds(3600)));
        assert_eq!(main.arguments(), ["--input", "a.tif"]);

        let mut long_running = JobType::new("stream", "1.0");
        long_running.is_long_running = true;
        let Fixture {
            orchestrator: mut streaming,
            ..
        } = fixture(long_running);

        run_stage(&mut streaming, now, 0);
        run_stage(&mut streaming, now, 0);
        let main = streaming.start_next_task().unwrap();
        assert_eq!(main.timeouts().running, None);
    }

    #[test]
    fn test_storage_errors_propagate() {
        let Fixture {
            db,
            mut orchestrator,
        } = normal_fixture();

        let task = orchestrator.start_next_task().unwrap();
        db.set_fail_writes(true);

        let running = update(&task, TaskUpdateStatus::Running, Utc::now());
        let result = orchestrator.task_update(&running);
        assert!(matches!(result, Err(Error::Storage(_))));
    }

    #[test]
    fn test_unsaved_timeout_leaves_execution_running() {
        let Fixture {
            db,
            mut orchestrator,
        } = normal_fixture();
        let task = orchestrator.start_next_task().unwrap();
        let when = Utc::now();

        db.set_fail_writes(true);
        let result = orchestrator.execution_timed_out(&task, when);
        assert!(matches!(result, Err(Error::Storage(_))));
        assert!(!orchestrator.is_finished());
        assert_eq!(orchestrator.active_task().map(|t| t.id()), Some(task.id()));

        db.set_fail_writes(false);
        orchestrator.execution_timed_out(&task, when).unwrap();
        assert!(orchestrator.is_finished());
        assert_eq!(
            db.get_job_execution(orchestrator.id()).unwrap().unwrap().ended,
            Some(when)
        );
    }
}
