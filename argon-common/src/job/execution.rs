use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

use crate::{
    failure::{ErrorCategory, NamedError},
    task::TaskStage,
};

#[derive(Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum JobExecutionStatus {
    Queued,
    Running,
    Completed,
    Failed,
    Canceled,
}

impl JobExecutionStatus {
    pub fn is_final(&self) -> bool {
        matches!(
            self,
            JobExecutionStatus::Completed
                | JobExecutionStatus::Failed
                | JobExecutionStatus::Canceled
        )
    }
}

/// Timing of a single stage of a job execution.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRecord {
    pub started: Option<DateTime<Utc>>,
    pub completed: Option<DateTime<Utc>>,
    pub exit_code: Option<i32>,
}

/// Persisted record of one run of a job.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct JobExecution {
    pub id: Uuid,
    pub job_id: Uuid,
    pub job_type_name: String,
    pub command_arguments: Vec<String>,
    /// Running threshold of the MAIN stage, in seconds
    pub timeout_secs: Option<u64>,
    pub stages: BTreeMap<TaskStage, StageRecord>,
    pub status: JobExecutionStatus,
    pub error: Option<NamedError>,
    pub error_category: Option<ErrorCategory>,
    pub created_at: DateTime<Utc>,
    pub ended: Option<DateTime<Utc>>,
}

impl JobExecution {
    pub fn new(job_id: Uuid, job_type_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            job_id,
            job_type_name: job_type_name.into(),
            command_arguments: Vec::new(),
            timeout_secs: None,
            stages: BTreeMap::new(),
            status: JobExecutionStatus::Queued,
            error: None,
            error_category: None,
            created_at: Utc::now(),
            ended: None,
        }
    }

    pub fn with_command_arguments(mut self, command_arguments: Vec<String>) -> Self {
        self.command_arguments = command_arguments;
        self
    }

    pub fn with_timeout_secs(mut self, timeout_secs: u64) -> Self {
        self.timeout_secs = Some(timeout_secs);
        self
    }

    /// Timing of `stage`, empty if the stage never ran.
    pub fn stage(&self, stage: TaskStage) -> StageRecord {
        self.stages.get(&stage).cloned().unwrap_or_default()
    }

    fn stage_mut(&mut self, stage: TaskStage) -> &mut StageRecord {
        self.stages.entry(stage).or_default()
    }

    pub fn record_stage_started(&mut self, stage: TaskStage, when: DateTime<Utc>) {
        let record = self.stage_mut(stage);
        if record.started.is_none() {
            record.started = Some(when);
        }
    }

    pub fn record_stage_completed(
        &mut self,
        stage: TaskStage,
        when: DateTime<Utc>,
        exit_code: Option<i32>,
    ) {
        let record = self.stage_mut(stage);
        record.completed = Some(when);
        record.exit_code = exit_code;
    }

    /// Forgets everything recorded for `stage`, used when its task is relaunched.
    pub fn reset_stage(&mut self, stage: TaskStage) {
        self.stages.remove(&stage);
    }

    /// Moves the execution to FAILED with `error`.
    pub fn fail(&mut self, error: NamedError, ended: DateTime<Utc>) {
        self.status = JobExecutionStatus::Failed;
        self.error_category = Some(error.category);
        self.error = Some(error);
        self.ended = Some(ended);
    }
}
