//! Job store trait.

use async_trait::async_trait;

use crate::claim::{ClaimAttempt, ClaimWindow, OffsetSource};
use crate::{Job, JobId, Result};

/// Which eligible row `JobStore::try_lock_one` should take.
///
/// The scan is always over eligible rows (`locked_at IS NULL`) in ascending id
/// order and returns at most one row; only the number of rows to skip varies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LockQuery {
    pub offset: i64,
}

impl LockQuery {
    pub fn head() -> Self {
        Self { offset: 0 }
    }

    pub fn at(offset: i64) -> Self {
        Self {
            offset: offset.max(0),
        }
    }
}

/// Durable storage for job records.
///
/// Implementations own the row-locking guarantee: two concurrent
/// `try_lock_one` (or `lock_head`) calls never return the same job.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Append a new eligible job.
    async fn insert(&self, details: &str) -> Result<JobId>;

    /// Append several jobs. The default inserts them one at a time.
    async fn insert_batch(&self, details: &[String]) -> Result<Vec<JobId>> {
        let mut ids = Vec::with_capacity(details.len());
        for d in details {
            ids.push(self.insert(d).await?);
        }
        Ok(ids)
    }

    /// Number of jobs with `locked_at IS NULL`.
    async fn count_eligible(&self) -> Result<i64>;

    /// Atomically pick the eligible job at `query.offset`, mark it claimed and
    /// return the updated record, or `None` if no row exists at that offset.
    async fn try_lock_one(&self, query: LockQuery) -> Result<Option<Job>>;

    async fn get(&self, id: JobId) -> Result<Option<Job>>;

    /// Remove a job once its worker is done with it. Returns false if it was
    /// already gone.
    async fn delete(&self, id: JobId) -> Result<bool>;

    /// Run the full claim protocol: count, choose an offset from `window`, lock.
    ///
    /// The default composes `count_eligible` and `try_lock_one` as two separate
    /// calls, so it is not atomic: a count that is stale by the time of the lock
    /// can narrow or widen the draw, and a claim can miss even though jobs are
    /// eligible. Mutual exclusion still holds through `try_lock_one`. The
    /// bundled stores override this to run all three steps as one unit; the
    /// default is for stores that cannot.
    async fn lock_head(
        &self,
        window: &ClaimWindow,
        offsets: &dyn OffsetSource,
    ) -> Result<ClaimAttempt> {
        let job_count = self.count_eligible().await?;
        let offset = window.relative_top(job_count, offsets);
        let job = self.try_lock_one(LockQuery::at(offset)).await?;
        Ok(ClaimAttempt {
            job_count,
            offset,
            job,
        })
    }
}
