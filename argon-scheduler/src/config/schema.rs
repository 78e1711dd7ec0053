use std::time::Duration as StdDuration;

use argon_common::task::TimeoutPolicy;
use chrono::Duration;
use serde::Deserialize;

use crate::{
    dispatcher::{self, DispatcherConfig},
    execution::{DEFAULT_MAX_RELAUNCHES, ExecutionConfig, StageTimeouts},
    registry::DEFAULT_RECONCILIATION_THRESHOLD_SECS,
    scheduling::{self, LaunchServiceConfig},
    supervisor::LoopTiming,
    system_task::DATABASE_UPDATE_ERR_THRESHOLD_SECS,
};

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Name used in logs, defaults to the host name
    pub scheduler_name: Option<String>,
    pub dispatcher: LoopSettings,
    pub launcher: LoopSettings,
    pub registry: RegistrySettings,
    pub executions: ExecutionSettings,
    pub system_tasks: SystemTaskSettings,
}

#[derive(Debug, Deserialize, Clone, Default, PartialEq, Eq)]
#[serde(default)]
pub struct LoopSettings {
    pub throttle_ms: Option<u64>,
    pub warn_threshold_ms: Option<u64>,
}

impl LoopSettings {
    fn timing(&self, default_throttle_ms: u64, default_warn_ms: u64) -> LoopTiming {
        LoopTiming::new(
            StdDuration::from_millis(self.throttle_ms.unwrap_or(default_throttle_ms)),
            StdDuration::from_millis(self.warn_threshold_ms.unwrap_or(default_warn_ms)),
        )
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct RegistrySettings {
    pub reconciliation_threshold_secs: u64,
}

impl Default for RegistrySettings {
    fn default() -> Self {
        Self {
            reconciliation_threshold_secs: DEFAULT_RECONCILIATION_THRESHOLD_SECS as u64,
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutionSettings {
    pub max_relaunches: u32,
    pub launch_timeout_secs: Option<u64>,
    pub pull_timeout_secs: Option<u64>,
    pub pre_timeout_secs: Option<u64>,
    pub post_timeout_secs: Option<u64>,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        let timeouts = StageTimeouts::default();

        Self {
            max_relaunches: DEFAULT_MAX_RELAUNCHES,
            launch_timeout_secs: to_secs(timeouts.launch),
            pull_timeout_secs: to_secs(timeouts.pull),
            pre_timeout_secs: to_secs(timeouts.pre),
            post_timeout_secs: to_secs(timeouts.post),
        }
    }
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct SystemTaskSettings {
    pub error_threshold_secs: u64,
    pub launch_timeout_secs: Option<u64>,
    pub running_timeout_secs: Option<u64>,
}

impl Default for SystemTaskSettings {
    fn default() -> Self {
        Self {
            error_threshold_secs: DATABASE_UPDATE_ERR_THRESHOLD_SECS as u64,
            launch_timeout_secs: None,
            running_timeout_secs: None,
        }
    }
}

fn to_secs(duration: Option<Duration>) -> Option<u64> {
    duration.and_then(|d| u64::try_from(d.num_seconds()).ok())
}

fn from_secs(secs: u64) -> Duration {
    i64::try_from(secs)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::MAX)
}

impl SchedulerConfig {
    pub fn dispatcher_config(&self) -> DispatcherConfig {
        DispatcherConfig {
            timing: self.dispatcher.timing(
                dispatcher::DEFAULT_THROTTLE_MS,
                dispatcher::DEFAULT_WARN_THRESHOLD_MS,
            ),
        }
    }

    pub fn launch_service_config(&self) -> LaunchServiceConfig {
        LaunchServiceConfig {
            timing: self.launcher.timing(
                scheduling::DEFAULT_THROTTLE_MS,
                scheduling::DEFAULT_WARN_THRESHOLD_MS,
            ),
        }
    }

    pub fn reconciliation_threshold(&self) -> Duration {
        from_secs(self.registry.reconciliation_threshold_secs)
    }

    pub fn execution_config(&self) -> ExecutionConfig {
        let settings = &self.executions;

        ExecutionConfig {
            max_relaunches: settings.max_relaunches,
            timeouts: StageTimeouts {
                launch: settings.launch_timeout_secs.map(from_secs),
                pull: settings.pull_timeout_secs.map(from_secs),
                pre: settings.pre_timeout_secs.map(from_secs),
                post: settings.post_timeout_secs.map(from_secs),
            },
        }
    }

    pub fn system_task_error_threshold(&self) -> Duration {
        from_secs(self.system_tasks.error_threshold_secs)
    }

    pub fn system_task_timeouts(&self) -> TimeoutPolicy {
        TimeoutPolicy::new(
            self.system_tasks.launch_timeout_secs.map(from_secs),
            self.system_tasks.running_timeout_secs.map(from_secs),
        )
    }
}
