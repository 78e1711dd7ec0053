mod catalog;

pub use catalog::ErrorCatalog;

use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

/// Builtin error names used by failure classification.
pub mod names {
    pub const DOCKER_TASK_LAUNCH: &str = "docker-task-launch";
    pub const PULL: &str = "pull";
    pub const DOCKER_TERMINATED: &str = "docker-terminated";
    pub const ALGORITHM_UNKNOWN: &str = "algorithm-unknown";
    pub const LAUNCH_TIMEOUT: &str = "launch-timeout";
    pub const PULL_TIMEOUT: &str = "pull-timeout";
    pub const PRE_TIMEOUT: &str = "pre-timeout";
    pub const TIMEOUT: &str = "timeout";
    pub const SYSTEM_TIMEOUT: &str = "system-timeout";
    pub const POST_TIMEOUT: &str = "post-timeout";
    pub const NODE_LOST: &str = "node-lost";
    pub const KILLED: &str = "killed";
    pub const TASK_LOST: &str = "task-lost";
    pub const UNKNOWN: &str = "unknown";
}

#[derive(
    Clone, Debug, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, EnumString, Display,
)]
#[strum(serialize_all = "UPPERCASE")]
pub enum ErrorCategory {
    /// Infrastructure faults: launch failures, timeouts, lost nodes.
    System,
    /// The algorithm itself exited abnormally.
    Algorithm,
    /// Faults in the input data.
    Data,
}

/// A named, categorized failure reason assigned to a job execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedError {
    pub name: String,
    pub title: String,
    pub category: ErrorCategory,
}

impl NamedError {
    pub fn new(name: impl Into<String>, title: impl Into<String>, category: ErrorCategory) -> Self {
        Self {
            name: name.into(),
            title: title.into(),
            category,
        }
    }

    pub fn system(name: impl Into<String>, title: impl Into<String>) -> Self {
        Self::new(name, title, ErrorCategory::System)
    }
}
