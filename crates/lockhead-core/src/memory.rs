//! In-memory job store and wake channel.
//!
//! Both are scoped to one process. The store serializes every operation
//! behind a single mutex, which gives `lock_head` the same all-or-nothing
//! behaviour a database transaction would.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::{Mutex, broadcast};
use tracing::trace;

use crate::claim::{ClaimAttempt, ClaimWindow, OffsetSource};
use crate::store::{JobStore, LockQuery};
use crate::wake::{Wake, WakeChannel, WakeSubscription};
use crate::{Error, Job, JobId, Result};

struct MemoryState {
    /// Jobs keyed by id; BTreeMap iteration is ascending id order.
    jobs: BTreeMap<JobId, Job>,
    next_id: i64,
}

impl MemoryState {
    fn allocate_id(&mut self) -> JobId {
        let id = JobId::new(self.next_id);
        self.next_id += 1;
        id
    }

    fn count_eligible(&self) -> i64 {
        self.jobs.values().filter(|j| j.is_eligible()).count() as i64
    }

    fn lock_at(&mut self, offset: i64) -> Option<Job> {
        let skip = usize::try_from(offset).unwrap_or(0);
        let job = self
            .jobs
            .values_mut()
            .filter(|j| j.is_eligible())
            .nth(skip)?;
        job.locked_at = Some(Utc::now());
        Some(job.clone())
    }
}

/// Job store held entirely in process memory.
pub struct MemoryJobStore {
    state: Mutex<MemoryState>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MemoryState {
                jobs: BTreeMap::new(),
                next_id: 1,
            }),
        }
    }
}

impl Default for MemoryJobStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, details: &str) -> Result<JobId> {
        let mut state = self.state.lock().await;
        let id = state.allocate_id();
        state.jobs.insert(
            id,
            Job {
                id,
                details: details.to_string(),
                locked_at: None,
            },
        );
        Ok(id)
    }

    async fn count_eligible(&self) -> Result<i64> {
        Ok(self.state.lock().await.count_eligible())
    }

    async fn try_lock_one(&self, query: LockQuery) -> Result<Option<Job>> {
        Ok(self.state.lock().await.lock_at(query.offset))
    }

    async fn get(&self, id: JobId) -> Result<Option<Job>> {
        Ok(self.state.lock().await.jobs.get(&id).cloned())
    }

    async fn delete(&self, id: JobId) -> Result<bool> {
        Ok(self.state.lock().await.jobs.remove(&id).is_some())
    }

    async fn lock_head(
        &self,
        window: &ClaimWindow,
        offsets: &dyn OffsetSource,
    ) -> Result<ClaimAttempt> {
        let mut state = self.state.lock().await;
        let job_count = state.count_eligible();
        let offset = window.relative_top(job_count, offsets);
        let job = state.lock_at(offset);
        Ok(ClaimAttempt {
            job_count,
            offset,
            job,
        })
    }
}

const LOCAL_CHANNEL_CAPACITY: usize = 16;

/// Wake channel for consumers in the same process.
///
/// Backed by a broadcast channel. A subscriber that falls behind sees a lag
/// instead of the missed signals, which is treated as a single wake.
pub struct LocalWakeChannel {
    name: String,
    tx: broadcast::Sender<()>,
}

impl LocalWakeChannel {
    pub fn new(name: impl Into<String>) -> Self {
        let (tx, _) = broadcast::channel(LOCAL_CHANNEL_CAPACITY);
        Self {
            name: name.into(),
            tx,
        }
    }
}

#[async_trait]
impl WakeChannel for LocalWakeChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self) -> Result<()> {
        // No subscribers is fine: pollers still find the work.
        if self.tx.send(()).is_err() {
            trace!(channel = %self.name, "Published with no subscribers");
        }
        Ok(())
    }

    async fn subscribe(&self) -> Result<Box<dyn WakeSubscription>> {
        Ok(Box::new(LocalSubscription {
            rx: self.tx.subscribe(),
        }))
    }
}

struct LocalSubscription {
    rx: broadcast::Receiver<()>,
}

impl LocalSubscription {
    fn drain(&mut self) {
        while let Ok(()) | Err(broadcast::error::TryRecvError::Lagged(_)) = self.rx.try_recv() {}
    }
}

#[async_trait]
impl WakeSubscription for LocalSubscription {
    async fn wait(&mut self, timeout: Duration) -> Result<Wake> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Err(_) => Ok(Wake::TimedOut),
            Ok(Ok(())) | Ok(Err(broadcast::error::RecvError::Lagged(_))) => {
                self.drain();
                Ok(Wake::Signalled)
            }
            Ok(Err(broadcast::error::RecvError::Closed)) => {
                Err(Error::Channel("local wake channel closed".to_string()))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ClaimEngine;
    use std::sync::Arc;

    const SHORT: Duration = Duration::from_millis(50);

    #[tokio::test]
    async fn test_insert_assigns_increasing_ids() {
        let store = MemoryJobStore::new();
        let a = store.insert("a").await.unwrap();
        let b = store.insert("b").await.unwrap();
        let c = store.insert("c").await.unwrap();
        assert!(a < b && b < c);
        assert_eq!(a, JobId::new(1));

        let job = store.get(b).await.unwrap().unwrap();
        assert_eq!(job.details, "b");
        assert!(job.is_eligible());
    }

    #[tokio::test]
    async fn test_ids_not_reused_after_delete() {
        let store = MemoryJobStore::new();
        let a = store.insert("a").await.unwrap();
        assert!(store.delete(a).await.unwrap());
        assert!(!store.delete(a).await.unwrap());

        let b = store.insert("b").await.unwrap();
        assert_ne!(a, b);
        assert!(store.get(a).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_try_lock_one_skips_offset() {
        let store = MemoryJobStore::new();
        let ids = store
            .insert_batch(&["a".to_string(), "b".to_string(), "c".to_string()])
            .await
            .unwrap();

        let job = store.try_lock_one(LockQuery::at(1)).await.unwrap().unwrap();
        assert_eq!(job.id, ids[1]);
        assert!(job.locked_at.is_some());

        // Locked rows drop out of the scan.
        let job = store.try_lock_one(LockQuery::at(1)).await.unwrap().unwrap();
        assert_eq!(job.id, ids[2]);

        assert!(store.try_lock_one(LockQuery::at(1)).await.unwrap().is_none());
        assert_eq!(store.count_eligible().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_locked_at_is_never_overwritten() {
        let store = MemoryJobStore::new();
        let id = store.insert("a").await.unwrap();
        let first = store.try_lock_one(LockQuery::head()).await.unwrap().unwrap();
        assert!(store.try_lock_one(LockQuery::head()).await.unwrap().is_none());

        let stored = store.get(id).await.unwrap().unwrap();
        assert_eq!(stored.locked_at, first.locked_at);
    }

    #[tokio::test]
    async fn test_publish_wakes_subscriber() {
        let channel = LocalWakeChannel::new("jobs");
        let mut sub = channel.subscribe().await.unwrap();

        channel.publish().await.unwrap();
        assert_eq!(sub.wait(SHORT).await.unwrap(), Wake::Signalled);
    }

    #[tokio::test]
    async fn test_wait_times_out_without_signal() {
        let channel = LocalWakeChannel::new("jobs");
        let mut sub = channel.subscribe().await.unwrap();
        assert_eq!(sub.wait(SHORT).await.unwrap(), Wake::TimedOut);
    }

    #[tokio::test]
    async fn test_publish_before_subscribe_is_missed() {
        let channel = LocalWakeChannel::new("jobs");
        channel.publish().await.unwrap();

        let mut sub = channel.subscribe().await.unwrap();
        assert_eq!(sub.wait(SHORT).await.unwrap(), Wake::TimedOut);
    }

    #[tokio::test]
    async fn test_signals_coalesce() {
        let channel = LocalWakeChannel::new("jobs");
        let mut sub = channel.subscribe().await.unwrap();

        // More than the channel capacity, so the receiver also lags.
        for _ in 0..(LOCAL_CHANNEL_CAPACITY * 2) {
            channel.publish().await.unwrap();
        }

        assert_eq!(sub.wait(SHORT).await.unwrap(), Wake::Signalled);
        assert_eq!(sub.wait(SHORT).await.unwrap(), Wake::TimedOut);
    }

    #[tokio::test]
    async fn test_repeated_wakes_never_double_claim() {
        let store = Arc::new(MemoryJobStore::new());
        let channel = LocalWakeChannel::new("jobs");
        let engine = ClaimEngine::new(store.clone(), crate::ClaimWindow::default());
        let mut sub = channel.subscribe().await.unwrap();

        let id = store.insert("only").await.unwrap();
        for _ in 0..3 {
            channel.publish().await.unwrap();
        }

        let mut claimed = Vec::new();
        for _ in 0..3 {
            if sub.wait(SHORT).await.unwrap() == Wake::TimedOut {
                continue;
            }
            if let Some(job) = engine.claim().await.unwrap() {
                claimed.push(job.id);
            }
        }
        // Spurious wakes just find nothing.
        assert!(engine.claim().await.unwrap().is_none());
        assert_eq!(claimed, vec![id]);
    }

    #[tokio::test]
    async fn test_every_subscriber_is_woken() {
        let channel = LocalWakeChannel::new("jobs");
        let mut a = channel.subscribe().await.unwrap();
        let mut b = channel.subscribe().await.unwrap();

        channel.publish().await.unwrap();
        assert_eq!(a.wait(SHORT).await.unwrap(), Wake::Signalled);
        assert_eq!(b.wait(SHORT).await.unwrap(), Wake::Signalled);
        assert_eq!(channel.name(), "jobs");
    }
}
