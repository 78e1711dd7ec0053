use std::fmt::Display;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::{TaskKind, TaskStage, TaskStatusUpdate, TaskUpdateStatus, TimeoutPolicy};

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct TaskResources {
    pub cpus: f64,
    pub mem_mib: f64,
    pub disk_mib: f64,
}

/// A single unit of work sent to the cluster.
/// ---
/// A task is *not launched* until [`Task::launch`] is called,
/// *launched* until a terminal update is applied,
/// and *ended* afterwards. Ended tasks ignore every further update.
#[derive(Clone, Debug)]
pub struct Task {
    id: String,
    id_prefix: String,
    kind: TaskKind,
    stage: TaskStage,
    agent_id: Option<String>,
    command: Option<String>,
    arguments: Vec<String>,
    resources: TaskResources,
    timeouts: TimeoutPolicy,

    launched_at: Option<DateTime<Utc>>,
    /// Timestamp of the first RUNNING update
    started_at: Option<DateTime<Utc>>,
    last_update_at: Option<DateTime<Utc>>,
    ended_at: Option<DateTime<Utc>>,
    terminal_status: Option<TaskUpdateStatus>,
    exit_code: Option<i32>,
}

impl Task {
    /// Creates a task whose ID is `{id_prefix}_{suffix}`.
    /// ---
    /// Relaunches of the same logical task share `id_prefix`
    /// and differ in `suffix`.
    pub fn new(
        id_prefix: impl Into<String>,
        suffix: impl Display,
        kind: TaskKind,
        stage: TaskStage,
    ) -> Self {
        let id_prefix = id_prefix.into();

        Self {
            id: format!("{}_{}", id_prefix, suffix),
            id_prefix,
            kind,
            stage,
            agent_id: None,
            command: None,
            arguments: Vec::new(),
            resources: TaskResources::default(),
            timeouts: TimeoutPolicy::default(),
            launched_at: None,
            started_at: None,
            last_update_at: None,
            ended_at: None,
            terminal_status: None,
            exit_code: None,
        }
    }

    pub fn with_agent(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = Some(agent_id.into());
        self
    }

    pub fn with_command(mut self, command: impl Into<String>, arguments: Vec<String>) -> Self {
        self.command = Some(command.into());
        self.arguments = arguments;
        self
    }

    pub fn with_resources(mut self, resources: TaskResources) -> Self {
        self.resources = resources;
        self
    }

    pub fn with_timeouts(mut self, timeouts: TimeoutPolicy) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn id_prefix(&self) -> &str {
        &self.id_prefix
    }

    pub fn kind(&self) -> TaskKind {
        self.kind
    }

    pub fn stage(&self) -> TaskStage {
        self.stage
    }

    pub fn agent_id(&self) -> Option<&str> {
        self.agent_id.as_deref()
    }

    pub fn command(&self) -> Option<&str> {
        self.command.as_deref()
    }

    pub fn arguments(&self) -> &[String] {
        &self.arguments
    }

    pub fn resources(&self) -> &TaskResources {
        &self.resources
    }

    pub fn timeouts(&self) -> TimeoutPolicy {
        self.timeouts
    }

    pub fn launched_at(&self) -> Option<DateTime<Utc>> {
        self.launched_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn last_update_at(&self) -> Option<DateTime<Utc>> {
        self.last_update_at
    }

    pub fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    pub fn terminal_status(&self) -> Option<TaskUpdateStatus> {
        self.terminal_status
    }

    pub fn exit_code(&self) -> Option<i32> {
        self.exit_code
    }

    pub fn is_launched(&self) -> bool {
        self.launched_at.is_some()
    }

    pub fn has_started(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn has_ended(&self) -> bool {
        self.terminal_status.is_some()
    }

    /// Records the launch time. Only the first launch counts.
    pub fn launch(&mut self, when: DateTime<Utc>) {
        if self.has_ended() || self.launched_at.is_some() {
            return;
        }

        self.launched_at = Some(when);
    }

    /// Applies a status update to this task.
    /// ---
    /// Returns `false` and leaves the task untouched if the update is for
    /// another task, the task has already ended, or the update is older than
    /// the last one applied.
    pub fn update(&mut self, update: &TaskStatusUpdate) -> bool {
        if update.task_id != self.id || self.has_ended() {
            return false;
        }

        if let Some(last) = self.last_update_at {
            if update.timestamp < last {
                return false;
            }
        }

        self.last_update_at = Some(update.timestamp);

        match update.status {
            TaskUpdateStatus::Running => {
                if self.started_at.is_none() {
                    self.started_at = Some(update.timestamp);
                }
            }
            terminal => {
                self.terminal_status = Some(terminal);
                self.ended_at = Some(update.timestamp);
                self.exit_code = update.exit_code;
            }
        }

        true
    }

    /// Whether the task exceeded its launch or running threshold at `when`.
    pub fn is_timed_out(&self, when: DateTime<Utc>) -> bool {
        if self.has_ended() {
            return false;
        }

        let Some(launched_at) = self.launched_at else {
            return false;
        };

        match self.started_at {
            Some(started_at) => self
                .timeouts
                .running
                .is_some_and(|threshold| when - started_at > threshold),
            None => self
                .timeouts
                .launch
                .is_some_and(|threshold| when - launched_at > threshold),
        }
    }

    /// The later of the launch time and the last update time.
    pub fn last_heard_from(&self) -> Option<DateTime<Utc>> {
        match (self.launched_at, self.last_update_at) {
            (Some(launched), Some(updated)) => Some(launched.max(updated)),
            (launched, updated) => launched.or(updated),
        }
    }

    /// Whether the task has gone quiet for longer than `threshold`.
    /// Tasks that were never launched or have ended never need it.
    pub fn needs_reconciliation(&self, when: DateTime<Utc>, threshold: Duration) -> bool {
        if !self.is_launched() || self.has_ended() {
            return false;
        }

        self.last_heard_from()
            .is_some_and(|last| when - last > threshold)
    }
}
