use std::{sync::Arc, time::Instant};

use argon_common::{
    cluster::ClusterTransport,
    error::Error,
    task::{Task, TaskKind},
};
use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tracing::{error, info};
use uuid::Uuid;

use crate::{
    execution::JobExecutionManager, registry::TaskRegistry, supervisor::SupervisorCommand,
    system_task::SystemTaskScheduler,
};

use super::LaunchServiceConfig;

/// Periodic loop that starts ready tasks on the cluster.
pub struct TaskLaunchService {
    pub id: Uuid,
    pub config: LaunchServiceConfig,
    registry: Arc<TaskRegistry>,
    job_exe_mgr: Arc<JobExecutionManager>,
    system_tasks: Arc<SystemTaskScheduler>,
    transport: Arc<dyn ClusterTransport>,
    command_rx: mpsc::Receiver<SupervisorCommand>,
}

impl TaskLaunchService {
    pub fn new(
        config: LaunchServiceConfig,
        registry: Arc<TaskRegistry>,
        job_exe_mgr: Arc<JobExecutionManager>,
        system_tasks: Arc<SystemTaskScheduler>,
        transport: Arc<dyn ClusterTransport>,
        command_rx: mpsc::Receiver<SupervisorCommand>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            registry,
            job_exe_mgr,
            system_tasks,
            transport,
            command_rx,
        }
    }

    pub async fn run_loop(&mut self) -> Result<(), Error> {
        info!("Launcher [{}]: Starting", self.id);

        loop {
            let started = Instant::now();

            if let Err(e) = self.run_cycle(Utc::now()).await {
                error!("Launcher [{}]: Launch cycle failed: {}", self.id, e);
            }

            let component = format!("Launcher [{}]", self.id);
            let pause = self
                .config
                .timing
                .finish_cycle(&component, started.elapsed());

            tokio::select! {
                Some(command) = self.command_rx.recv() => {
                    match command {
                        SupervisorCommand::Terminate { ack_chan } => {
                            info!("Launcher [{}]: Received Terminate command", self.id);
                            let _ = ack_chan.send(true);
                            return Ok(());
                        }
                    }
                },

                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    /// Launches every ready task as of `when`.
    /// ---
    /// Tasks are tracked by the registry before they are submitted,
    /// so an update racing the submission is never unknown.
    /// If the submission fails, system tasks are dropped from the registry
    /// and offered again next cycle. Job tasks stay tracked until their
    /// launch timeout fires.
    /// Returns the launched tasks.
    pub async fn run_cycle(&self, when: DateTime<Utc>) -> Result<Vec<Task>, Error> {
        let mut tasks = self.job_exe_mgr.get_ready_tasks();
        tasks.extend(self.system_tasks.get_tasks_to_schedule(when));

        for task in self.system_tasks.get_tasks_to_kill() {
            if let Err(e) = self.transport.kill(task.id()).await {
                error!(
                    "Launcher [{}]: Failed to kill system task {}: {}",
                    self.id,
                    task.id(),
                    e
                );
            }
        }

        if tasks.is_empty() {
            return Ok(tasks);
        }

        self.registry.launch_tasks(&tasks, when);

        info!("Launcher [{}]: Launching {} task(s)", self.id, tasks.len());

        if let Err(e) = self.transport.submit(tasks.clone()).await {
            for task in tasks.iter().filter(|t| t.kind() == TaskKind::System) {
                self.registry.remove_task(task.id());
            }
            return Err(e);
        }

        self.system_tasks.mark_launched(&tasks);

        Ok(tasks)
    }
}
