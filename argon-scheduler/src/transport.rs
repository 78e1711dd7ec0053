use argon_common::{cluster::ClusterTransport, error::Error, task::Task};
use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::info;

/// A request for the cluster, as emitted by [`ChannelClusterTransport`].
#[derive(Debug)]
pub enum ClusterCommand {
    Submit(Vec<Task>),
    Kill(String),
    Reconcile(Vec<String>),
}

/// Forwards every request as a [`ClusterCommand`] over a channel.
/// ---
/// The receiving side owns the actual cluster connection.
#[derive(Debug, Clone)]
pub struct ChannelClusterTransport {
    command_tx: mpsc::Sender<ClusterCommand>,
}

impl ChannelClusterTransport {
    pub fn new(command_tx: mpsc::Sender<ClusterCommand>) -> Self {
        Self { command_tx }
    }

    async fn send(&self, command: ClusterCommand) -> Result<(), Error> {
        self.command_tx.send(command).await.map_err(|e| {
            Error::ChannelComm(format!("Failed to send cluster command: {}", e))
        })
    }
}

#[async_trait]
impl ClusterTransport for ChannelClusterTransport {
    async fn submit(&self, tasks: Vec<Task>) -> Result<(), Error> {
        self.send(ClusterCommand::Submit(tasks)).await
    }

    async fn kill(&self, task_id: &str) -> Result<(), Error> {
        self.send(ClusterCommand::Kill(task_id.to_string())).await
    }

    async fn reconcile(&self, task_ids: Vec<String>) -> Result<(), Error> {
        if task_ids.is_empty() {
            return Ok(());
        }

        self.send(ClusterCommand::Reconcile(task_ids)).await
    }
}

/// Transport for running the scheduler without a cluster attached.
#[derive(Debug, Clone)]
pub struct LoggingClusterTransport {
    scheduler_name: String,
}

impl LoggingClusterTransport {
    pub fn new(scheduler_name: impl Into<String>) -> Self {
        Self {
            scheduler_name: scheduler_name.into(),
        }
    }
}

#[async_trait]
impl ClusterTransport for LoggingClusterTransport {
    async fn submit(&self, tasks: Vec<Task>) -> Result<(), Error> {
        for task in &tasks {
            info!(
                "Cluster [{}]: Submit {} ({}) to agent {}",
                self.scheduler_name,
                task.id(),
                task.stage(),
                task.agent_id().unwrap_or("any")
            );
        }

        Ok(())
    }

    async fn kill(&self, task_id: &str) -> Result<(), Error> {
        info!("Cluster [{}]: Kill {}", self.scheduler_name, task_id);
        Ok(())
    }

    async fn reconcile(&self, task_ids: Vec<String>) -> Result<(), Error> {
        if !task_ids.is_empty() {
            info!(
                "Cluster [{}]: Reconcile {} task(s): {}",
                self.scheduler_name,
                task_ids.len(),
                task_ids.join(", ")
            );
        }

        Ok(())
    }
}
