use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use task_scheduler::config::AppConfig;
use task_scheduler::scheduler::handlers::router;
use task_scheduler::scheduler::kinds::builtin_registry;
use task_scheduler::scheduler::notify::BroadcastSink;
use task_scheduler::scheduler::{Scheduler, TaskService};
use tokio::sync::broadcast::error::RecvError;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "task-scheduler", about = "Priority task scheduler with a supervised worker pool")]
struct Args {
    /// Path to a TOML config file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// HTTP listen address, overrides the config file.
    #[arg(short, long)]
    bind: Option<String>,

    /// Worker pool size, overrides the config file.
    #[arg(short, long)]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    // 1. Configuration:
    let mut config = match &args.config {
        Some(path) => {
            tracing::info!("Loading config from {}", path.display());
            AppConfig::load_from(path)?
        }
        None => AppConfig::default(),
    };
    if let Some(bind) = args.bind {
        config.bind = bind;
    }
    if let Some(workers) = args.workers {
        config.scheduler.worker_count = workers;
    }

    // 2. Scheduler and worker pool:
    let sink = BroadcastSink::new(config.scheduler.event_capacity);
    let mut events = sink.subscribe();

    let scheduler = Scheduler::spawn_with_sink(&config.scheduler, builtin_registry(), Arc::new(sink));
    let service = Arc::new(TaskService::new(scheduler.clone(), config.scheduler.max_retries));

    // 3. HTTP Router:
    let app = router(service);

    // 4. Spawn event logger:
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => tracing::info!(
                    "Task event {:?}: {} ({}) -> {}",
                    event.kind,
                    event.task_id,
                    event.task_name,
                    event.message
                ),
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!("Event logger lagged, {} events skipped", skipped)
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    // 5. Spawn stats reporter:
    let stats_scheduler = scheduler.clone();
    let stats_interval = Duration::from_secs(config.stats_interval_secs.max(1));
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(stats_interval);

        loop {
            interval.tick().await;
            let Ok(stats) = stats_scheduler.stats().await else {
                break;
            };
            tracing::info!(
                "Scheduler stats: {} workers, received={} completed={} failed={} retried={} pending={} tracked={} restarts={}",
                stats.worker_count,
                stats.total_received,
                stats.total_completed,
                stats.total_failed,
                stats.total_retried,
                stats.pending_queue_size,
                stats.total_tracked_tasks,
                stats.worker_restarts
            );
        }
    });

    // 6. Start HTTP server:
    tracing::info!("HTTP server listening on {}", config.bind);
    tracing::info!("Press Ctrl+C to shutdown");

    let listener = tokio::net::TcpListener::bind(&config.bind).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for Ctrl+C: {}", e);
            }
        })
        .await?;

    scheduler.shutdown().await?;

    Ok(())
}
