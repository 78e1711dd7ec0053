use argon_common::{
    failure::{ErrorCatalog, NamedError, names},
    job::JobType,
    task::{Task, TaskStage, TaskStatusUpdate},
};

/// Picks the error for a task that reported FAILED.
/// ---
/// `task` must be the orchestrator's copy *before* the failing update was
/// applied to it, so that "never reached RUNNING" can be told apart.
pub(crate) fn classify_failure(
    task: &Task,
    update: &TaskStatusUpdate,
    job_type: &JobType,
    catalog: &ErrorCatalog,
) -> NamedError {
    if !task.has_started() {
        return catalog.resolve(names::DOCKER_TASK_LAUNCH);
    }

    if task.stage() == TaskStage::Pull {
        return catalog.resolve(names::PULL);
    }

    if update.is_executor_terminated() {
        return catalog.resolve(names::DOCKER_TERMINATED);
    }

    let runs_algorithm = matches!(
        task.stage(),
        TaskStage::Pre | TaskStage::Main | TaskStage::Post
    );

    match update.exit_code {
        Some(code) if code != 0 && job_type.is_system => catalog
            .by_exit_code(code)
            .unwrap_or_else(|| catalog.resolve(names::UNKNOWN)),
        Some(code) if code != 0 && runs_algorithm => {
            match job_type.map_exit_code(code) {
                Some(name) if catalog.contains(name) => catalog.resolve(name),
                _ => catalog.resolve(names::ALGORITHM_UNKNOWN),
            }
        }
        _ => catalog.resolve(names::UNKNOWN),
    }
}

/// Name of the error assigned when `task` times out.
pub(crate) fn timeout_error_name<'a>(task: &Task, job_type: &'a JobType) -> &'a str {
    if !task.has_started() {
        return names::LAUNCH_TIMEOUT;
    }

    match task.stage() {
        TaskStage::Pull => names::PULL_TIMEOUT,
        TaskStage::Pre => names::PRE_TIMEOUT,
        TaskStage::Post => names::POST_TIMEOUT,
        _ => match job_type.timeout_error_name.as_deref() {
            Some(name) => name,
            None if job_type.is_system => names::SYSTEM_TIMEOUT,
            None => names::TIMEOUT,
        },
    }
}
