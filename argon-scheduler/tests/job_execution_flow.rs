use std::sync::Arc;

use argon_common::{
    cluster::{ClusterTransport, NodeManager},
    failure::{ErrorCatalog, names},
    job::{JobExecution, JobExecutionStatus, JobType},
    state::JobExecutionDbTrait,
    task::{Task, TaskKind, TaskStage, TaskStatusUpdate, TaskUpdateStatus},
};
use argon_persistence_mem::InMemoryStateDb;
use argon_scheduler::{
    dispatcher::{DispatcherConfig, ReconciliationDispatcher},
    execution::{ExecutionConfig, JobExecutionManager, JobExecutionOrchestrator, StageTimeouts},
    node::LoggingNodeManager,
    registry::TaskRegistry,
    scheduling::{LaunchServiceConfig, TaskLaunchService},
    supervisor::SupervisorCommand,
    system_task::SystemTaskScheduler,
    transport::{ChannelClusterTransport, ClusterCommand},
    updates::{ClusterEvent, StatusUpdateHandler},
};
use chrono::{DateTime, Duration, Utc};
use tokio::sync::mpsc;
use uuid::Uuid;

struct Scheduler {
    db: Arc<InMemoryStateDb>,
    registry: Arc<TaskRegistry>,
    job_exe_mgr: Arc<JobExecutionManager>,
    launcher: TaskLaunchService,
    handler: StatusUpdateHandler,
    dispatcher: ReconciliationDispatcher,
    cluster_rx: mpsc::Receiver<ClusterCommand>,
    // Dropping these would close the loops' channels
    _event_tx: mpsc::Sender<ClusterEvent>,
    _command_txs: Vec<mpsc::Sender<SupervisorCommand>>,
}

fn scheduler() -> Scheduler {
    let db = Arc::new(InMemoryStateDb::new());
    let registry = Arc::new(TaskRegistry::default());
    let job_exe_mgr = Arc::new(JobExecutionManager::new());
    let system_tasks = Arc::new(SystemTaskScheduler::default());
    let node_mgr: Arc<dyn NodeManager> = Arc::new(LoggingNodeManager);

    let (cluster_tx, cluster_rx) = mpsc::channel(64);
    let transport: Arc<dyn ClusterTransport> = Arc::new(ChannelClusterTransport::new(cluster_tx));

    let (event_tx, event_rx) = mpsc::channel(16);
    let (launcher_tx, launcher_rx) = mpsc::channel(1);
    let (handler_tx, handler_rx) = mpsc::channel(1);
    let (dispatcher_tx, dispatcher_rx) = mpsc::channel(1);

    let launcher = TaskLaunchService::new(
        LaunchServiceConfig::default(),
        registry.clone(),
        job_exe_mgr.clone(),
        system_tasks.clone(),
        transport.clone(),
        launcher_rx,
    );

    let handler = StatusUpdateHandler::new(
        registry.clone(),
        job_exe_mgr.clone(),
        system_tasks.clone(),
        node_mgr.clone(),
        transport.clone(),
        event_rx,
        handler_rx,
    );

    let dispatcher = ReconciliationDispatcher::new(
        DispatcherConfig::default(),
        registry.clone(),
        job_exe_mgr.clone(),
        system_tasks,
        node_mgr,
        transport,
        dispatcher_rx,
    );

    Scheduler {
        db,
        registry,
        job_exe_mgr,
        launcher,
        handler,
        dispatcher,
        cluster_rx,
        _event_tx: event_tx,
        _command_txs: vec![launcher_tx, handler_tx, dispatcher_tx],
    }
}

impl Scheduler {
    fn submit(&self, job_type: JobType, config: ExecutionConfig) -> Uuid {
        let orchestrator = JobExecutionOrchestrator::new(
            JobExecution::new(Uuid::new_v4(), job_type.name.clone()).with_timeout_secs(600),
            Arc::new(job_type),
            "agent_1",
            Arc::new(ErrorCatalog::with_builtins()),
            self.db.clone(),
            config,
        )
        .unwrap();

        let id = orchestrator.id();
        self.job_exe_mgr.add_execution(orchestrator).unwrap();
        id
    }

    /// Runs a launch cycle and returns the single job task it submitted.
    async fn launch_job_task(&mut self, when: DateTime<Utc>) -> Task {
        self.launcher.run_cycle(when).await.unwrap();

        let mut submitted = Vec::new();
        while let Ok(command) = self.cluster_rx.try_recv() {
            if let ClusterCommand::Submit(tasks) = command {
                submitted.extend(tasks);
            }
        }

        let mut job_tasks: Vec<Task> = submitted
            .into_iter()
            .filter(|task| matches!(task.kind(), TaskKind::Job { .. }))
            .collect();

        assert_eq!(job_tasks.len(), 1, "expected exactly one job task");
        job_tasks.remove(0)
    }

    async fn send(
        &self,
        task: &Task,
        status: TaskUpdateStatus,
        when: DateTime<Utc>,
        exit_code: Option<i32>,
    ) {
        let mut update = TaskStatusUpdate::new(task.id(), "agent_1", status, when);
        if let Some(code) = exit_code {
            update = update.with_exit_code(code);
        }

        self.handler
            .handle_event(ClusterEvent::TaskUpdate(update))
            .await
            .unwrap();
    }

    fn stored(&self, job_exe_id: Uuid) -> JobExecution {
        self.db.get_job_execution(job_exe_id).unwrap().unwrap()
    }
}

#[tokio::test]
async fn test_four_stage_execution_completes() {
    let mut scheduler = scheduler();
    let job_exe_id = scheduler.submit(JobType::new("ndvi", "1.0"), ExecutionConfig::default());
    let start = Utc::now() - Duration::minutes(5);

    let expected = [
        (TaskStage::Pull, 0),
        (TaskStage::Pre, 1),
        (TaskStage::Main, 2),
        (TaskStage::Post, 3),
    ];

    for (n, (stage, exit_code)) in expected.into_iter().enumerate() {
        let launched = start + Duration::seconds(2 * n as i64);
        let task = scheduler.launch_job_task(launched).await;
        assert_eq!(task.stage(), stage);

        scheduler
            .send(&task, TaskUpdateStatus::Running, launched, None)
            .await;
        scheduler
            .send(
                &task,
                TaskUpdateStatus::Finished,
                launched + Duration::seconds(1),
                Some(exit_code),
            )
            .await;
    }

    let stored = scheduler.stored(job_exe_id);
    assert_eq!(stored.status, JobExecutionStatus::Completed);
    assert!(stored.ended.unwrap() > start + Duration::seconds(7));
    assert_eq!(stored.stage(TaskStage::Pre).exit_code, Some(1));
    assert_eq!(stored.stage(TaskStage::Main).exit_code, Some(2));
    assert_eq!(stored.stage(TaskStage::Post).exit_code, Some(3));
    assert!(scheduler.job_exe_mgr.is_empty());

    // Only the system task is still tracked
    assert_eq!(scheduler.registry.len(), 1);
}

#[tokio::test]
async fn test_lost_task_is_relaunched_then_times_out() {
    let mut scheduler = scheduler();
    let config = ExecutionConfig {
        timeouts: StageTimeouts {
            launch: Some(Duration::seconds(60)),
            ..StageTimeouts::default()
        },
        ..ExecutionConfig::default()
    };
    let job_exe_id = scheduler.submit(JobType::new("ndvi", "1.0"), config);
    let now = Utc::now();

    let first = scheduler.launch_job_task(now).await;
    scheduler
        .send(&first, TaskUpdateStatus::Running, now, None)
        .await;
    scheduler
        .send(&first, TaskUpdateStatus::Lost, now + Duration::seconds(1), None)
        .await;

    let relaunched_at = now + Duration::seconds(2);
    let second = scheduler.launch_job_task(relaunched_at).await;
    assert_eq!(second.stage(), TaskStage::Pull);
    assert_eq!(second.id_prefix(), first.id_prefix());
    assert_ne!(second.id(), first.id());

    let report = scheduler
        .dispatcher
        .run_cycle(relaunched_at + Duration::seconds(61))
        .await;
    assert!(report.timed_out.contains(&second.id().to_string()));

    let stored = scheduler.stored(job_exe_id);
    assert_eq!(stored.status, JobExecutionStatus::Failed);
    assert_eq!(stored.error.unwrap().name, names::LAUNCH_TIMEOUT);
    assert_eq!(stored.ended, Some(relaunched_at + Duration::seconds(61)));

    let mut killed = Vec::new();
    while let Ok(command) = scheduler.cluster_rx.try_recv() {
        if let ClusterCommand::Kill(task_id) = command {
            killed.push(task_id);
        }
    }
    assert!(killed.contains(&second.id().to_string()));

    // The kill confirmation arrives after the execution already failed
    scheduler
        .send(
            &second,
            TaskUpdateStatus::Killed,
            relaunched_at + Duration::seconds(62),
            None,
        )
        .await;
    assert_eq!(
        scheduler.stored(job_exe_id).error.unwrap().name,
        names::LAUNCH_TIMEOUT
    );
}
