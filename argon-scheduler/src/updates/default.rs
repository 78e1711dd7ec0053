use std::sync::Arc;

use argon_common::{
    cluster::{ClusterTransport, NodeManager},
    error::Error,
    task::{TaskKind, TaskStatusUpdate},
};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{
    execution::JobExecutionManager,
    registry::{TaskRegistry, UpdateOutcome},
    supervisor::SupervisorCommand,
    system_task::SystemTaskScheduler,
};

use super::ClusterEvent;

/// Applies cluster events to the registry and routes them to their owners.
pub struct StatusUpdateHandler {
    pub id: Uuid,
    registry: Arc<TaskRegistry>,
    job_exe_mgr: Arc<JobExecutionManager>,
    system_tasks: Arc<SystemTaskScheduler>,
    node_mgr: Arc<dyn NodeManager>,
    transport: Arc<dyn ClusterTransport>,
    event_rx: mpsc::Receiver<ClusterEvent>,
    command_rx: mpsc::Receiver<SupervisorCommand>,
}

impl StatusUpdateHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        registry: Arc<TaskRegistry>,
        job_exe_mgr: Arc<JobExecutionManager>,
        system_tasks: Arc<SystemTaskScheduler>,
        node_mgr: Arc<dyn NodeManager>,
        transport: Arc<dyn ClusterTransport>,
        event_rx: mpsc::Receiver<ClusterEvent>,
        command_rx: mpsc::Receiver<SupervisorCommand>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            registry,
            job_exe_mgr,
            system_tasks,
            node_mgr,
            transport,
            event_rx,
            command_rx,
        }
    }

    pub async fn run_loop(&mut self) -> Result<(), Error> {
        info!("UpdateHandler [{}]: Starting", self.id);

        loop {
            tokio::select! {
                Some(command) = self.command_rx.recv() => {
                    match command {
                        SupervisorCommand::Terminate { ack_chan } => {
                            info!("UpdateHandler [{}]: Received Terminate command", self.id);
                            let _ = ack_chan.send(true);
                            return Ok(());
                        }
                    }
                },

                maybe_event = self.event_rx.recv() => {
                    let Some(event) = maybe_event else {
                        error!("UpdateHandler [{}]: Cluster event channel closed", self.id);
                        return Err(Error::ChannelComm(
                            "Cluster event channel closed".to_string(),
                        ));
                    };

                    if let Err(e) = self.handle_event(event).await {
                        error!("UpdateHandler [{}]: Failed to handle event: {}", self.id, e);
                    }
                }
            }
        }
    }

    pub async fn handle_event(&self, event: ClusterEvent) -> Result<(), Error> {
        match event {
            ClusterEvent::TaskUpdate(update) => self.handle_task_update(&update).await,
            ClusterEvent::AgentLost { agent_id, when } => {
                let lost = self.job_exe_mgr.handle_lost_agent(&agent_id, when);

                // Tasks on the agent went with it
                for task in lost.iter().filter_map(|(_, task)| task.as_ref()) {
                    self.registry.remove_task(task.id());
                }

                warn!(
                    "UpdateHandler [{}]: Agent {} lost, failed {} job execution(s)",
                    self.id,
                    agent_id,
                    lost.len()
                );
                Ok(())
            }
        }
    }

    async fn handle_task_update(&self, update: &TaskStatusUpdate) -> Result<(), Error> {
        match self.registry.handle_task_update(update) {
            UpdateOutcome::Applied(TaskKind::Job { job_exe_id }) => {
                self.job_exe_mgr.handle_task_update(job_exe_id, update)
            }
            UpdateOutcome::Applied(TaskKind::System) => {
                self.system_tasks.handle_task_update(update);
                Ok(())
            }
            UpdateOutcome::Applied(TaskKind::Node) => self.node_mgr.handle_task_update(update),
            UpdateOutcome::Stale => Ok(()),
            UpdateOutcome::Unknown if update.status.is_terminal() => {
                debug!(
                    "UpdateHandler [{}]: Ignoring {} update for unknown task {}",
                    self.id, update.status, update.task_id
                );
                Ok(())
            }
            UpdateOutcome::Unknown => {
                warn!(
                    "UpdateHandler [{}]: Unknown task {} is running, killing it",
                    self.id, update.task_id
                );
                self.transport.kill(&update.task_id).await
            }
        }
    }
}
