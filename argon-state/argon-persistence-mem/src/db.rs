use std::{
    collections::HashMap,
    sync::{
        PoisonError, RwLock,
        atomic::{AtomicBool, Ordering},
    },
};

use argon_common::{error::Error, job::JobExecution};
use uuid::Uuid;

/// Process-local state store.
/// ---
/// Records are cloned in and out, nothing survives a restart.
#[derive(Debug, Default)]
pub struct InMemoryStateDb {
    pub(crate) job_executions: RwLock<HashMap<Uuid, JobExecution>>,
    fail_writes: AtomicBool,
}

impl InMemoryStateDb {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every following write fail with [`Error::Storage`].
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub(crate) fn check_writable(&self) -> Result<(), Error> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::Storage("In-memory store is rejecting writes".to_string()));
        }

        Ok(())
    }

    pub fn job_execution_count(&self) -> usize {
        self.job_executions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
