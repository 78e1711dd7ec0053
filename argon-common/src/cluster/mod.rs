use std::fmt::Debug;

use async_trait::async_trait;

use crate::{
    error::Error,
    task::{Task, TaskStatusUpdate},
};

/// Outbound side of the cluster connection.
#[async_trait]
pub trait ClusterTransport: Send + Sync + Debug {
    /// Hands launched tasks to the cluster for execution
    /// ---
    async fn submit(&self, tasks: Vec<Task>) -> Result<(), Error>;

    /// Asks the cluster to kill a single task
    /// ---
    async fn kill(&self, task_id: &str) -> Result<(), Error>;

    /// Asks the cluster to resend the current status of each task
    /// ---
    /// An empty batch is never sent.
    async fn reconcile(&self, task_ids: Vec<String>) -> Result<(), Error>;
}

/// Owner of node-level tasks (health checks, cleanup).
pub trait NodeManager: Send + Sync + Debug {
    fn handle_task_timeout(&self, task: &Task) -> Result<(), Error>;

    fn handle_task_update(&self, _update: &TaskStatusUpdate) -> Result<(), Error> {
        Ok(())
    }
}
