use std::{env, path::PathBuf, sync::Arc, time::Duration};

use argon_common::{
    cluster::{ClusterTransport, NodeManager},
    error::Error,
};
use argon_scheduler::{
    config::{self, CONFIG_ENV_VAR},
    dispatcher::ReconciliationDispatcher,
    execution::JobExecutionManager,
    node::LoggingNodeManager,
    registry::TaskRegistry,
    scheduling::TaskLaunchService,
    supervisor::SupervisorCommand,
    system_task::SystemTaskScheduler,
    transport::LoggingClusterTransport,
    updates::{ClusterEvent, StatusUpdateHandler},
};
use clap::{Arg, ArgAction, Command};
use futures::future::join_all;
use tokio::sync::{mpsc, oneshot};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

const EVENT_CHANNEL_CAPACITY: usize = 1024;
const SHUTDOWN_ACK_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Error> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_level(true)
        .with_target(true)
        .init();

    let matches = Command::new("argon")
        .about("Argon Scheduler CLI")
        .version("0.1.0")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .subcommand(
            Command::new("serve")
                .about("Starts the Argon Scheduler")
                .arg(
                    Arg::new("config")
                        .short('c')
                        .long("config")
                        .help("Path to the configuration file, overrides ARGON_CONFIG")
                        .action(ArgAction::Set),
                ),
        )
        .get_matches();

    match matches.subcommand() {
        Some(("serve", sub_matches)) => {
            let config_path = sub_matches
                .get_one::<String>("config")
                .cloned()
                .or_else(|| env::var(CONFIG_ENV_VAR).ok())
                .map(PathBuf::from);

            serve(config_path).await
        }
        _ => {
            println!("Invalid subcommand");
            Ok(())
        }
    }
}

async fn serve(config_path: Option<PathBuf>) -> Result<(), Error> {
    let config = config::load_config(config_path.as_deref())?;

    let scheduler_name = match &config.scheduler_name {
        Some(name) => name.clone(),
        None => hostname::get()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|_| "argon".to_string()),
    };

    info!("Scheduler [{}]: Starting", scheduler_name);

    let registry = Arc::new(TaskRegistry::new(config.reconciliation_threshold()));
    let job_exe_mgr = Arc::new(JobExecutionManager::new());
    let system_tasks = Arc::new(SystemTaskScheduler::new(
        config.system_task_error_threshold(),
        config.system_task_timeouts(),
    ));
    let node_mgr: Arc<dyn NodeManager> = Arc::new(LoggingNodeManager);
    let transport: Arc<dyn ClusterTransport> =
        Arc::new(LoggingClusterTransport::new(scheduler_name.clone()));

    // Held open for the lifetime of the process, the handler stops when it closes
    let (_event_tx, event_rx) = mpsc::channel::<ClusterEvent>(EVENT_CHANNEL_CAPACITY);

    let (handler_tx, handler_rx) = mpsc::channel(1);
    let (dispatcher_tx, dispatcher_rx) = mpsc::channel(1);
    let (launcher_tx, launcher_rx) = mpsc::channel(1);

    let mut handler = StatusUpdateHandler::new(
        registry.clone(),
        job_exe_mgr.clone(),
        system_tasks.clone(),
        node_mgr.clone(),
        transport.clone(),
        event_rx,
        handler_rx,
    );

    let mut dispatcher = ReconciliationDispatcher::new(
        config.dispatcher_config(),
        registry.clone(),
        job_exe_mgr.clone(),
        system_tasks.clone(),
        node_mgr,
        transport.clone(),
        dispatcher_rx,
    );

    let mut launcher = TaskLaunchService::new(
        config.launch_service_config(),
        registry,
        job_exe_mgr,
        system_tasks,
        transport,
        launcher_rx,
    );

    tokio::spawn(async move {
        if let Err(e) = handler.run_loop().await {
            error!("Main: Update handler stopped: {}", e);
        }
    });

    tokio::spawn(async move {
        if let Err(e) = dispatcher.run_loop().await {
            error!("Main: Dispatcher stopped: {}", e);
        }
    });

    tokio::spawn(async move {
        if let Err(e) = launcher.run_loop().await {
            error!("Main: Launcher stopped: {}", e);
        }
    });

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Main: Error listening for Ctrl+C: {}", e);
    }

    info!("Main: Shutting down");

    terminate_all(vec![
        ("UpdateHandler", handler_tx),
        ("Dispatcher", dispatcher_tx),
        ("Launcher", launcher_tx),
    ])
    .await;

    info!("Main: Exiting application.");

    Ok(())
}

async fn terminate_all(supervised: Vec<(&'static str, mpsc::Sender<SupervisorCommand>)>) {
    let acks = supervised.into_iter().map(|(name, command_tx)| async move {
        let (ack_tx, ack_rx) = oneshot::channel::<bool>();

        if command_tx
            .send(SupervisorCommand::Terminate { ack_chan: ack_tx })
            .await
            .is_err()
        {
            warn!("Shutdown: {} already stopped", name);
            return;
        }

        match tokio::time::timeout(SHUTDOWN_ACK_TIMEOUT, ack_rx).await {
            Ok(Ok(true)) => info!("Shutdown: {} acknowledged graceful shutdown", name),
            Ok(Ok(false)) => warn!(
                "Shutdown: {} acknowledged, but shutdown was not fully graceful",
                name
            ),
            Ok(Err(_)) => warn!("Shutdown: {} ACK channel closed prematurely", name),
            Err(_) => error!("Shutdown: Timeout waiting for {} to acknowledge", name),
        }
    });

    join_all(acks).await;
}
