use argon_common::{
    cluster::NodeManager,
    error::Error,
    task::{Task, TaskStatusUpdate},
};
use tracing::{debug, warn};

/// Node manager for schedulers that run no node-level tasks of their own.
#[derive(Debug, Default)]
pub struct LoggingNodeManager;

impl NodeManager for LoggingNodeManager {
    fn handle_task_timeout(&self, task: &Task) -> Result<(), Error> {
        warn!(
            "NodeManager: Node task {} on agent {} timed out",
            task.id(),
            task.agent_id().unwrap_or("unknown")
        );
        Ok(())
    }

    fn handle_task_update(&self, update: &TaskStatusUpdate) -> Result<(), Error> {
        debug!(
            "NodeManager: Node task {} is {}",
            update.task_id, update.status
        );
        Ok(())
    }
}
