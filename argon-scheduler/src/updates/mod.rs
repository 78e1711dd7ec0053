use argon_common::task::TaskStatusUpdate;
use chrono::{DateTime, Utc};

pub mod default;

pub use default::StatusUpdateHandler;

/// Inbound notification from the cluster.
#[derive(Clone, Debug)]
pub enum ClusterEvent {
    TaskUpdate(TaskStatusUpdate),
    /// The agent and every task on it are gone
    AgentLost {
        agent_id: String,
        when: DateTime<Utc>,
    },
}
