use std::sync::PoisonError;

use argon_common::{error::Error, job::JobExecution, state::JobExecutionDbTrait};
use tracing::debug;
use uuid::Uuid;

use crate::db::InMemoryStateDb;

impl JobExecutionDbTrait for InMemoryStateDb {
    fn save_job_execution(&self, job_exe: &JobExecution) -> Result<(), Error> {
        self.check_writable()?;

        debug!(
            "InMemoryStateDb: Saving job execution [{}] with status {}",
            job_exe.id, job_exe.status
        );

        self.job_executions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(job_exe.id, job_exe.clone());

        Ok(())
    }

    fn get_job_execution(&self, job_exe_id: Uuid) -> Result<Option<JobExecution>, Error> {
        Ok(self
            .job_executions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&job_exe_id)
            .cloned())
    }
}
