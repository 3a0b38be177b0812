//! CLI command implementations.

pub mod jobs;
pub mod schema;
pub mod work;

use anyhow::Result;
use lockhead_config::QueueConfig;
use lockhead_db::{PgJobStore, PgWakeChannel, create_pool};
use lockhead_worker::JobQueue;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

/// Open the pool described by `config`.
pub async fn connect(config: &QueueConfig) -> Result<PgPool> {
    info!(url = %config.database.redacted_url(), "Connecting to database...");
    let pool = create_pool(&config.database).await?;
    info!("Database connected");
    Ok(pool)
}

/// Build a queue over the PostgreSQL store and wake channel.
pub fn queue(pool: &PgPool, config: &QueueConfig) -> Arc<JobQueue> {
    let store = Arc::new(PgJobStore::new(pool.clone()));
    let wake = Arc::new(PgWakeChannel::new(pool.clone(), config.channel.clone()));
    Arc::new(JobQueue::new(store, wake, config.claim))
}
