use crate::config::{load_config, Config, ConfigError};
use crate::dispatch::HttpDispatcher;
use crate::output::{OutputRouter, RetryPolicy};
use crate::registry::{DuckDbRegistry, RegistryError};
use crate::source::{FileTailer, TailerSettings};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;
use tokio::signal;
use tokio::sync::watch;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum RunError {
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

pub async fn run(
    config_path: PathBuf,
    registry_path: Option<PathBuf>,
) -> Result<(), RunError> {
    info!(config_path = %config_path.display(), "loading configuration");
    let config = load_config(&config_path)?;

    let registry_path = registry_path.unwrap_or_else(|| config.registry_path.clone());
    run_pipeline(&config, &registry_path).await
}

/// Start the router and one tailer per unique configured path; on a
/// termination signal stop the tailers first, then the router. A
/// registry open failure is fatal: no tailer can safely resume without
/// its stored offset.
async fn run_pipeline(config: &Config, registry_path: &PathBuf) -> Result<(), RunError> {
    info!(path = %registry_path.display(), "opening offset registry");
    let registry = Arc::new(DuckDbRegistry::new(registry_path)?);
    registry.init_schema().await?;

    let dispatcher = HttpDispatcher::new(&config.host, &config.index);
    let (router, handle) = OutputRouter::new(
        Box::new(dispatcher),
        RetryPolicy::fixed(config.retry_delay),
        config.queue_capacity,
    );

    let (router_stop_tx, router_stop_rx) = watch::channel(false);
    let router_task = tokio::spawn(router.run(router_stop_rx));

    let (tailer_stop_tx, tailer_stop_rx) = watch::channel(false);
    let settings = TailerSettings::from(config);

    let paths = config.unique_paths();
    let mut tailer_tasks = Vec::with_capacity(paths.len());
    for path in &paths {
        let tailer = FileTailer::new(path.clone(), settings.clone(), registry.clone());
        let source = tailer.source().to_string();
        info!(source = %source, "starting tailer");

        let ack_rx = handle.subscribe(&source);
        let queue = handle.queue();
        tailer_tasks.push((source, tokio::spawn(tailer.run(queue, ack_rx, tailer_stop_rx.clone()))));
    }

    if paths.is_empty() {
        warn!("no paths configured, nothing to ship");
    }

    info!("pipeline started, press Ctrl+C to shut down");
    if let Err(e) = signal::ctrl_c().await {
        error!(error = %e, "could not listen for shutdown signal");
    }
    info!("shutdown signal received");

    // Tailers first, then the router.
    let _ = tailer_stop_tx.send(true);
    for (source, task) in tailer_tasks {
        if let Err(e) = task.await {
            error!(source = %source, error = %e, "tailer task failed");
        }
        handle.unsubscribe(&source);
    }

    let _ = router_stop_tx.send(true);
    router_task.await?;

    info!("process terminated");
    Ok(())
}
