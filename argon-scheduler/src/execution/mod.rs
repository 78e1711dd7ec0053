use argon_common::task::TaskStage;
use chrono::Duration;

mod classify;
pub mod manager;
pub mod orchestrator;

pub use manager::JobExecutionManager;
pub use orchestrator::JobExecutionOrchestrator;

/// Relaunches allowed per stage after LOST updates
pub const DEFAULT_MAX_RELAUNCHES: u32 = 3;

/// Thresholds applied to the tasks an orchestrator creates.
/// ---
/// The running threshold of the MAIN stage comes from the job execution
/// itself and is never applied to long-running job types.
#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub struct StageTimeouts {
    pub launch: Option<Duration>,
    pub pull: Option<Duration>,
    pub pre: Option<Duration>,
    pub post: Option<Duration>,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            launch: Some(Duration::minutes(5)),
            pull: Some(Duration::minutes(30)),
            pre: Some(Duration::hours(1)),
            post: Some(Duration::hours(1)),
        }
    }
}

impl StageTimeouts {
    pub fn running_for(&self, stage: TaskStage) -> Option<Duration> {
        match stage {
            TaskStage::Pull => self.pull,
            TaskStage::Pre => self.pre,
            TaskStage::Post => self.post,
            TaskStage::Main | TaskStage::System | TaskStage::Node => None,
        }
    }
}

#[derive(Clone, Debug, Copy, PartialEq, Eq)]
pub struct ExecutionConfig {
    pub max_relaunches: u32,
    pub timeouts: StageTimeouts,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            max_relaunches: DEFAULT_MAX_RELAUNCHES,
            timeouts: StageTimeouts::default(),
        }
    }
}
