//! Worker that processes jobs from the queue.

use std::sync::Arc;

use lockhead_config::WorkerConfig;
use lockhead_core::{JobId, Result, Wake, WakeSubscription};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::handler::JobHandler;
use crate::queue::JobQueue;

/// A worker that claims and executes jobs.
pub struct Worker {
    id: String,
    queue: Arc<JobQueue>,
    handler: Arc<dyn JobHandler>,
    config: WorkerConfig,
}

impl Worker {
    pub fn new(
        id: impl Into<String>,
        queue: Arc<JobQueue>,
        handler: Arc<dyn JobHandler>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            id: id.into(),
            queue,
            handler,
            config,
        }
    }

    /// Claim and execute at most one job.
    ///
    /// Returns the id of the job that was worked, whether or not its handler
    /// succeeded. A successful job is deleted; a failed one stays claimed.
    /// Store errors from the claim or the delete are returned.
    pub async fn work_one(&self) -> Result<Option<JobId>> {
        let Some(job) = self.queue.claim().await? else {
            return Ok(None);
        };
        info!(worker_id = %self.id, job_id = %job.id, "Claimed job");

        match self.handler.handle(&job).await {
            Ok(()) => {
                if let Err(e) = self.queue.complete(job.id).await {
                    warn!(
                        worker_id = %self.id,
                        job_id = %job.id,
                        error = %e,
                        "Job ran but could not be deleted"
                    );
                    return Err(e);
                }
                info!(worker_id = %self.id, job_id = %job.id, "Job completed");
            }
            Err(e) => {
                warn!(worker_id = %self.id, job_id = %job.id, error = %e, "Job failed");
            }
        }
        Ok(Some(job.id))
    }

    /// Work jobs until none are left, then return how many were worked.
    ///
    /// A claim can miss when its random offset lands past the end of the
    /// queue, so an empty claim only ends the drain once nothing is pending.
    pub async fn drain(&self) -> Result<usize> {
        let mut worked = 0;
        loop {
            match self.work_one().await? {
                Some(_) => worked += 1,
                None if self.queue.pending().await? == 0 => return Ok(worked),
                None => {}
            }
        }
    }

    /// Run the worker loop until `shutdown` becomes true or its sender is
    /// dropped.
    ///
    /// Shutdown is only observed between claims; a claim or job in progress
    /// always runs to completion.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(worker_id = %self.id, channel = %self.queue.channel_name(), "Starting worker");
        let mut subscription = self.subscribe().await;

        loop {
            if *shutdown.borrow() {
                break;
            }

            match self.work_one().await {
                // More work may be waiting, claim again straight away.
                Ok(Some(_)) => continue,
                Ok(None) => {
                    tokio::select! {
                        _ = shutdown_requested(&mut shutdown) => break,
                        _ = self.wait_for_work(&mut subscription) => {}
                    }
                }
                Err(e) => {
                    warn!(worker_id = %self.id, error = %e, "Store error, backing off");
                    tokio::select! {
                        _ = shutdown_requested(&mut shutdown) => break,
                        _ = sleep(self.config.error_backoff) => {}
                    }
                }
            }
        }

        info!(worker_id = %self.id, "Worker stopped");
    }

    async fn subscribe(&self) -> Option<Box<dyn WakeSubscription>> {
        match self.queue.subscribe().await {
            Ok(sub) => Some(sub),
            Err(e) => {
                warn!(worker_id = %self.id, error = %e, "Wake subscription failed, polling");
                None
            }
        }
    }

    /// Block until a wake signal or the poll interval, whichever comes first.
    ///
    /// Without a subscription this is a plain sleep; resubscribing is tried
    /// once per idle period.
    async fn wait_for_work(&self, subscription: &mut Option<Box<dyn WakeSubscription>>) {
        if subscription.is_none() {
            *subscription = self.subscribe().await;
        }

        let outcome = match subscription.as_mut() {
            Some(sub) => Some(sub.wait(self.config.poll_interval).await),
            None => None,
        };

        match outcome {
            Some(Ok(Wake::Signalled)) => debug!(worker_id = %self.id, "Woken by signal"),
            Some(Ok(Wake::TimedOut)) => {}
            Some(Err(e)) => {
                warn!(worker_id = %self.id, error = %e, "Lost wake subscription, polling");
                *subscription = None;
                sleep(self.config.poll_interval).await;
            }
            None => sleep(self.config.poll_interval).await,
        }
    }
}

/// Resolve once shutdown is requested. A dropped sender counts as a request.
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Run `config.concurrency` workers on the queue until shutdown.
pub async fn run_workers(
    queue: Arc<JobQueue>,
    handler: Arc<dyn JobHandler>,
    config: WorkerConfig,
    shutdown: watch::Receiver<bool>,
) {
    let handles: Vec<_> = (0..config.concurrency)
        .map(|n| {
            let worker = Worker::new(
                format!("worker-{}", n),
                queue.clone(),
                handler.clone(),
                config.clone(),
            );
            let shutdown = shutdown.clone();
            tokio::spawn(async move { worker.run(shutdown).await })
        })
        .collect();

    for result in futures::future::join_all(handles).await {
        if let Err(e) = result {
            warn!(error = %e, "Worker task panicked");
        }
    }
}
