//! Claim engine ("lock_head").
//!
//! When many workers race for a small set of eligible rows, always locking the
//! oldest one makes most of them collide on the same row. Instead, once the
//! queue holds at least `threshold` eligible jobs, each claim skips a random
//! number of the oldest rows (`0..width`), spreading the claimers over several
//! candidates. The candidate set is still the `width` oldest jobs in id order,
//! so a job at the front is at offset 0 on every draw and cannot starve.
//!
//! Below the threshold the offset is always 0: with only a few rows left,
//! skipping any of them mostly produces misses.

use std::sync::Arc;

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::store::JobStore;
use crate::{Job, Result};

pub const DEFAULT_THRESHOLD: i64 = 10;
pub const DEFAULT_WIDTH: i64 = 10;

/// Size of the contention window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimWindow {
    /// Minimum eligible count at which offsets are randomized.
    pub threshold: i64,
    /// Number of candidate rows; offsets are drawn from `0..width`.
    pub width: i64,
}

impl Default for ClaimWindow {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            width: DEFAULT_WIDTH,
        }
    }
}

impl ClaimWindow {
    pub fn new(threshold: i64, width: i64) -> Self {
        Self { threshold, width }
    }

    /// A window that always takes the oldest eligible job.
    pub fn disabled() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
            width: 1,
        }
    }

    pub fn is_randomized(&self, job_count: i64) -> bool {
        job_count >= self.threshold && self.width > 1
    }

    /// Number of eligible rows to skip for a queue holding `job_count` of them.
    pub fn relative_top(&self, job_count: i64, offsets: &dyn OffsetSource) -> i64 {
        if !self.is_randomized(job_count) {
            return 0;
        }
        offsets.pick(self.width).clamp(0, self.width - 1)
    }
}

/// Source of the random offset drawn for each claim.
pub trait OffsetSource: Send + Sync {
    /// Pick a value uniformly from `0..width`. `width` is always at least 2.
    fn pick(&self, width: i64) -> i64;
}

/// Draws offsets from the thread-local RNG.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadRngOffsets;

impl OffsetSource for ThreadRngOffsets {
    fn pick(&self, width: i64) -> i64 {
        rand::thread_rng().gen_range(0..width)
    }
}

/// Outcome of one claim attempt, including how the offset was chosen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimAttempt {
    pub job_count: i64,
    pub offset: i64,
    pub job: Option<Job>,
}

/// Claims jobs from a store using a contention window.
pub struct ClaimEngine {
    store: Arc<dyn JobStore>,
    window: ClaimWindow,
    offsets: Box<dyn OffsetSource>,
}

impl ClaimEngine {
    pub fn new(store: Arc<dyn JobStore>, window: ClaimWindow) -> Self {
        Self::with_offsets(store, window, Box::new(ThreadRngOffsets))
    }

    /// Create an engine with a specific offset source.
    pub fn with_offsets(
        store: Arc<dyn JobStore>,
        window: ClaimWindow,
        offsets: Box<dyn OffsetSource>,
    ) -> Self {
        if window.width < 1 {
            warn!(width = window.width, "Claim window width below 1, using 1");
        }
        let window = ClaimWindow {
            width: window.width.max(1),
            ..window
        };
        Self {
            store,
            window,
            offsets,
        }
    }

    pub fn window(&self) -> ClaimWindow {
        self.window
    }

    /// Claim one job. `Ok(None)` means no job was available at the chosen
    /// offset; the caller decides when to try again.
    pub async fn claim(&self) -> Result<Option<Job>> {
        Ok(self.attempt().await?.job)
    }

    /// Claim one job and report the count and offset the attempt used.
    pub async fn attempt(&self) -> Result<ClaimAttempt> {
        let attempt = self
            .store
            .lock_head(&self.window, self.offsets.as_ref())
            .await?;

        match &attempt.job {
            Some(job) => debug!(
                job_id = %job.id,
                job_count = attempt.job_count,
                offset = attempt.offset,
                "Claimed job"
            ),
            None => debug!(
                job_count = attempt.job_count,
                offset = attempt.offset,
                "No job at offset"
            ),
        }

        Ok(attempt)
    }
}
