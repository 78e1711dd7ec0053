use std::fmt::Debug;

use uuid::Uuid;

use crate::{error::Error, job::JobExecution};

/// Storage of job execution records.
/// ---
/// Calls are made while the owning orchestrator is locked,
/// so implementations must not block for long.
pub trait JobExecutionDbTrait: Send + Sync + Debug + 'static {
    /// Inserts or replaces the record with the ID of `job_exe`
    /// ---
    fn save_job_execution(&self, job_exe: &JobExecution) -> Result<(), Error>;

    /// Gets a job execution by `job_exe_id`
    /// ---
    fn get_job_execution(&self, job_exe_id: Uuid) -> Result<Option<JobExecution>, Error>;
}
