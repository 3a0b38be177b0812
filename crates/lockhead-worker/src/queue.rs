//! Job queue facade over a store and a wake channel.

use std::sync::Arc;

use lockhead_core::{
    ClaimEngine, ClaimWindow, Job, JobId, JobStore, Result, WakeChannel, WakeSubscription,
};
use tracing::{debug, warn};

/// Producer and consumer entry points for one queue.
pub struct JobQueue {
    store: Arc<dyn JobStore>,
    wake: Arc<dyn WakeChannel>,
    engine: ClaimEngine,
}

impl JobQueue {
    pub fn new(store: Arc<dyn JobStore>, wake: Arc<dyn WakeChannel>, window: ClaimWindow) -> Self {
        let engine = ClaimEngine::new(store.clone(), window);
        Self {
            store,
            wake,
            engine,
        }
    }

    /// Enqueue a new job and wake idle workers.
    ///
    /// If the insert succeeds but the publish fails, the channel error is
    /// returned and the job stays queued; workers reach it on their next poll.
    pub async fn enqueue(&self, details: &str) -> Result<JobId> {
        let id = self.store.insert(details).await?;
        debug!(job_id = %id, "Enqueued job");
        self.wake.publish().await?;
        Ok(id)
    }

    /// Enqueue several jobs and publish a single wake signal for all of them.
    pub async fn enqueue_batch(&self, details: &[String]) -> Result<Vec<JobId>> {
        if details.is_empty() {
            return Ok(Vec::new());
        }
        let ids = self.store.insert_batch(details).await?;
        debug!(count = ids.len(), "Enqueued jobs");
        self.wake.publish().await?;
        Ok(ids)
    }

    /// Claim the next available job.
    pub async fn claim(&self) -> Result<Option<Job>> {
        self.engine.claim().await
    }

    /// Remove a finished job.
    pub async fn complete(&self, id: JobId) -> Result<()> {
        if !self.store.delete(id).await? {
            warn!(job_id = %id, "Completed job was already gone");
        }
        Ok(())
    }

    /// Number of jobs waiting to be claimed.
    pub async fn pending(&self) -> Result<i64> {
        self.store.count_eligible().await
    }

    pub async fn subscribe(&self) -> Result<Box<dyn WakeSubscription>> {
        self.wake.subscribe().await
    }

    pub fn channel_name(&self) -> &str {
        self.wake.name()
    }
}
