//! Worker command.

use anyhow::Result;
use lockhead_config::QueueConfig;
use lockhead_db::close_pool;
use lockhead_worker::{ShellHandler, Worker, run_workers};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

use super::{connect, queue};

pub async fn work(config: &QueueConfig, once: bool) -> Result<()> {
    let pool = connect(config).await?;
    let queue = queue(&pool, config);
    let handler = Arc::new(ShellHandler::new());

    if once {
        let worker = Worker::new("worker-0", queue, handler, config.worker.clone());
        let worked = worker.drain().await;
        close_pool(&pool).await;
        println!("Worked {} jobs", worked?);
        return Ok(());
    }

    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown requested"),
            Err(e) => warn!(error = %e, "Failed to listen for ctrl-c, stopping"),
        }
        let _ = tx.send(true);
    });

    info!(
        concurrency = config.worker.concurrency,
        channel = %config.channel,
        "Starting workers"
    );
    run_workers(queue, handler, config.worker.clone(), rx).await;
    close_pool(&pool).await;
    Ok(())
}
