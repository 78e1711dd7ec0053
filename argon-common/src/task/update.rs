use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Reason reported by the cluster when the executor of a task died.
pub const REASON_EXECUTOR_TERMINATED: &str = "REASON_EXECUTOR_TERMINATED";

#[derive(Clone, Debug, Copy, PartialEq, Eq, Serialize, Deserialize, EnumString, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum TaskUpdateStatus {
    Running,
    Finished,
    Failed,
    Killed,
    Lost,
}

impl TaskUpdateStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskUpdateStatus::Running)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskStatusUpdate {
    pub task_id: String,
    pub agent_id: String,
    pub status: TaskUpdateStatus,
    pub timestamp: DateTime<Utc>,
    pub exit_code: Option<i32>,
    pub reason: Option<String>,
}

impl TaskStatusUpdate {
    pub fn new(
        task_id: impl Into<String>,
        agent_id: impl Into<String>,
        status: TaskUpdateStatus,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            agent_id: agent_id.into(),
            status,
            timestamp,
            exit_code: None,
            reason: None,
        }
    }

    pub fn with_exit_code(mut self, exit_code: i32) -> Self {
        self.exit_code = Some(exit_code);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn is_executor_terminated(&self) -> bool {
        self.reason.as_deref() == Some(REASON_EXECUTOR_TERMINATED)
    }
}
