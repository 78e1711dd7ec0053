use std::{sync::Arc, time::Instant};

use argon_common::{
    cluster::{ClusterTransport, NodeManager},
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

use super::{CycleReport, DispatcherConfig};

/// Periodic loop surfacing timeouts and quiet tasks.
/// ---
/// Each cycle hands every timed-out task to its owner and kills it,
/// then asks the cluster to reconcile tasks that went quiet.
pub struct ReconciliationDispatcher {
    pub id: Uuid,
    pub config: DispatcherConfig,
    registry: Arc<TaskRegistry>,
    job_exe_mgr: Arc<JobExecutionManager>,
    system_tasks: Arc<SystemTaskScheduler>,
    node_mgr: Arc<dyn NodeManager>,
    transport: Arc<dyn ClusterTransport>,
    command_rx: mpsc::Receiver<SupervisorCommand>,
}

impl ReconciliationDispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: DispatcherConfig,
        registry: Arc<TaskRegistry>,
        job_exe_mgr: Arc<JobExecutionManager>,
        system_tasks: Arc<SystemTaskScheduler>,
        node_mgr: Arc<dyn NodeManager>,
        transport: Arc<dyn ClusterTransport>,
        command_rx: mpsc::Receiver<SupervisorCommand>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            registry,
            job_exe_mgr,
            system_tasks,
            node_mgr,
            transport,
            command_rx,
        }
    }

    pub async fn run_loop(&mut self) -> Result<(), Error> {
        info!("Dispatcher [{}]: Starting", self.id);

        loop {
            let started = Instant::now();
            self.run_cycle(Utc::now()).await;

            let component = format!("Dispatcher [{}]", self.id);
            let pause = self
                .config
                .timing
                .finish_cycle(&component, started.elapsed());

            tokio::select! {
                Some(command) = self.command_rx.recv() => {
                    match command {
                        SupervisorCommand::Terminate { ack_chan } => {
                            info!("Dispatcher [{}]: Received Terminate command", self.id);
                            let _ = ack_chan.send(true);
                            return Ok(());
                        }
                    }
                },

                _ = tokio::time::sleep(pause) => {}
            }
        }
    }

    /// Runs one timeout and reconciliation pass as of `when`.
    /// ---
    /// A timeout its owner fails to handle is left unkilled and offered
    /// again next cycle.
    pub async fn run_cycle(&self, when: DateTime<Utc>) -> CycleReport {
        let mut report = CycleReport::default();

        for task in self.registry.get_timeout_tasks(when) {
            if let Err(e) = self.route_timeout(&task, when) {
                report.routing_failures += 1;
                error!(
                    "Dispatcher [{}]: Failed to handle timeout of task {}, retrying next cycle: {}",
                    self.id,
                    task.id(),
                    e
                );
                self.registry.retry_timeout(task.id());
                continue;
            }

            info!("Dispatcher [{}]: Killing timed out task {}", self.id, task.id());
            if let Err(e) = self.transport.kill(task.id()).await {
                error!(
                    "Dispatcher [{}]: Failed to kill task {}: {}",
                    self.id,
                    task.id(),
                    e
                );
            }

            report.timed_out.push(task.id().to_string());
        }

        let to_reconcile: Vec<String> = self
            .registry
            .get_tasks_to_reconcile(when)
            .iter()
            .map(|task| task.id().to_string())
            .collect();

        if !to_reconcile.is_empty() {
            info!(
                "Dispatcher [{}]: Reconciling {} task(s)",
                self.id,
                to_reconcile.len()
            );

            if let Err(e) = self.transport.reconcile(to_reconcile.clone()).await {
                error!(
                    "Dispatcher [{}]: Failed to request reconciliation: {}",
                    self.id, e
                );
            }

            report.reconciled = to_reconcile;
        }

        report
    }

    fn route_timeout(&self, task: &Task, when: DateTime<Utc>) -> Result<(), Error> {
        match task.kind() {
            TaskKind::Job { job_exe_id } => {
                self.job_exe_mgr.handle_task_timeout(job_exe_id, task, when)
            }
            TaskKind::Node => self.node_mgr.handle_task_timeout(task),
            TaskKind::System => {
                self.system_tasks.handle_task_timeout(task, when);
                Ok(())
            }
        }
    }
}
