//! PostgreSQL job store.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use lockhead_core::store::{JobStore, LockQuery};
use lockhead_core::{ClaimAttempt, ClaimWindow, Job, JobId, OffsetSource};
use sqlx::{PgConnection, PgPool};

use crate::DbResult;

/// A job row as stored in the `jobs` table.
#[derive(Debug, Clone, sqlx::FromRow)]
struct JobRow {
    id: i64,
    details: String,
    locked_at: Option<DateTime<Utc>>,
}

impl From<JobRow> for Job {
    fn from(row: JobRow) -> Self {
        Job {
            id: JobId::new(row.id),
            details: row.details,
            locked_at: row.locked_at,
        }
    }
}

const COUNT_ELIGIBLE: &str = "SELECT count(*) FROM jobs WHERE locked_at IS NULL";

// Row lock is held until the surrounding transaction ends.
const SELECT_UNLOCKED: &str = r#"
    SELECT id FROM jobs
    WHERE locked_at IS NULL
    ORDER BY id ASC
    LIMIT 1
    OFFSET $1
    FOR UPDATE
"#;

const MARK_LOCKED: &str = r#"
    UPDATE jobs
    SET locked_at = NOW()
    WHERE id = $1 AND locked_at IS NULL
    RETURNING id, details, locked_at
"#;

/// PostgreSQL implementation of JobStore.
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert_job(&self, details: &str) -> DbResult<JobId> {
        let id: i64 = sqlx::query_scalar("INSERT INTO jobs (details) VALUES ($1) RETURNING id")
            .bind(details)
            .fetch_one(&self.pool)
            .await?;
        Ok(JobId::new(id))
    }

    /// Insert several jobs with one statement. Ids come back in ascending order.
    pub async fn insert_jobs(&self, details: &[String]) -> DbResult<Vec<JobId>> {
        if details.is_empty() {
            return Ok(Vec::new());
        }

        let mut query_builder = sqlx::QueryBuilder::new("INSERT INTO jobs (details) ");
        query_builder.push_values(details.iter(), |mut b, d| {
            b.push_bind(d);
        });
        query_builder.push(" RETURNING id");

        let mut ids: Vec<i64> = query_builder
            .build_query_scalar()
            .fetch_all(&self.pool)
            .await?;
        ids.sort_unstable();
        Ok(ids.into_iter().map(JobId::new).collect())
    }

    pub async fn count_eligible_jobs(&self) -> DbResult<i64> {
        let count = sqlx::query_scalar(COUNT_ELIGIBLE)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    pub async fn lock_job(&self, query: LockQuery) -> DbResult<Option<Job>> {
        let mut tx = self.pool.begin().await?;
        let row = lock_at_offset(&mut *tx, query.offset).await?;
        tx.commit().await?;
        Ok(row.map(Job::from))
    }

    /// Count, pick an offset and lock in a single transaction.
    pub async fn lock_head_tx(
        &self,
        window: &ClaimWindow,
        offsets: &dyn OffsetSource,
    ) -> DbResult<ClaimAttempt> {
        let mut tx = self.pool.begin().await?;
        let job_count: i64 = sqlx::query_scalar(COUNT_ELIGIBLE)
            .fetch_one(&mut *tx)
            .await?;
        let offset = window.relative_top(job_count, offsets);
        let row = lock_at_offset(&mut *tx, offset).await?;
        tx.commit().await?;

        Ok(ClaimAttempt {
            job_count,
            offset,
            job: row.map(Job::from),
        })
    }

    pub async fn get_job(&self, id: JobId) -> DbResult<Option<Job>> {
        let row = sqlx::query_as::<_, JobRow>(
            "SELECT id, details, locked_at FROM jobs WHERE id = $1",
        )
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(Job::from))
    }

    pub async fn delete_job(&self, id: JobId) -> DbResult<bool> {
        let result = sqlx::query("DELETE FROM jobs WHERE id = $1")
            .bind(id.get())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Lock the eligible row at `offset` and mark it claimed.
///
/// Both statements run on the caller's transaction. The update re-checks
/// `locked_at IS NULL` so a row claimed between the two never comes back.
async fn lock_at_offset(conn: &mut PgConnection, offset: i64) -> DbResult<Option<JobRow>> {
    let unlocked: Option<i64> = sqlx::query_scalar(SELECT_UNLOCKED)
        .bind(offset.max(0))
        .fetch_optional(&mut *conn)
        .await?;

    let Some(id) = unlocked else {
        return Ok(None);
    };

    let row = sqlx::query_as::<_, JobRow>(MARK_LOCKED)
        .bind(id)
        .fetch_optional(&mut *conn)
        .await?;
    Ok(row)
}

#[async_trait]
impl JobStore for PgJobStore {
    async fn insert(&self, details: &str) -> lockhead_core::Result<JobId> {
        Ok(self.insert_job(details).await?)
    }

    async fn insert_batch(&self, details: &[String]) -> lockhead_core::Result<Vec<JobId>> {
        Ok(self.insert_jobs(details).await?)
    }

    async fn count_eligible(&self) -> lockhead_core::Result<i64> {
        Ok(self.count_eligible_jobs().await?)
    }

    async fn try_lock_one(&self, query: LockQuery) -> lockhead_core::Result<Option<Job>> {
        Ok(self.lock_job(query).await?)
    }

    async fn get(&self, id: JobId) -> lockhead_core::Result<Option<Job>> {
        Ok(self.get_job(id).await?)
    }

    async fn delete(&self, id: JobId) -> lockhead_core::Result<bool> {
        Ok(self.delete_job(id).await?)
    }

    async fn lock_head(
        &self,
        window: &ClaimWindow,
        offsets: &dyn OffsetSource,
    ) -> lockhead_core::Result<ClaimAttempt> {
        Ok(self.lock_head_tx(window, offsets).await?)
    }
}
