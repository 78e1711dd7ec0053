use chrono::Duration;
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};
use uuid::Uuid;

#[derive(
    Clone,
    Debug,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    EnumString,
    Display,
)]
#[strum(serialize_all = "lowercase")]
pub enum TaskStage {
    Pull,
    Pre,
    Main,
    Post,
    System,
    Node,
}

/// Identifies which collaborator owns a task.
/// ---
/// Timeouts and status updates are routed on this tag.
#[derive(Clone, Debug, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskKind {
    Job { job_exe_id: Uuid },
    System,
    Node,
}

/// How long a task may go without progress before it counts as timed out.
/// ---
/// `launch` is measured from the launch time until the first RUNNING update,
/// `running` from the first RUNNING update until a terminal update.
/// `None` disables the corresponding check.
#[derive(Clone, Debug, Copy, Default, PartialEq, Eq)]
pub struct TimeoutPolicy {
    pub launch: Option<Duration>,
    pub running: Option<Duration>,
}

impl TimeoutPolicy {
    pub fn new(launch: Option<Duration>, running: Option<Duration>) -> Self {
        Self { launch, running }
    }
}
