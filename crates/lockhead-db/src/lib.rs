//! PostgreSQL backend for lockhead.
//!
//! Provides the pool lifecycle, schema migrations, and PostgreSQL
//! implementations of `JobStore` and `WakeChannel`.

pub mod error;
pub mod job_store;
pub mod wake;

pub use error::{DbError, DbResult};
pub use job_store::PgJobStore;
pub use wake::PgWakeChannel;

use lockhead_config::DatabaseConfig;
use sqlx::PgPool;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use std::str::FromStr;
use tracing::info;

const JOBS_SCHEMA: &str = include_str!("../migrations/20240101000000_create_jobs.sql");

/// Create a new database connection pool.
///
/// The pool is the only connection state in the process: open it at startup,
/// hand clones to the store and wake channel, and `close_pool` at shutdown.
pub async fn create_pool(config: &DatabaseConfig) -> DbResult<PgPool> {
    let mut options = PgConnectOptions::from_str(&config.url)?;
    if config.quiet {
        options = options.options([("client_min_messages", "warning")]);
    }

    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect_with(options)
        .await?;
    Ok(pool)
}

/// Close every connection in the pool, waiting for checked-out ones.
pub async fn close_pool(pool: &PgPool) {
    pool.close().await;
    info!("Database pool closed");
}

/// Run database migrations.
pub async fn run_migrations(pool: &PgPool) -> DbResult<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Drop the jobs table and recreate it empty.
///
/// Destroys all queued work. Meant for development and tests.
pub async fn reset_schema(pool: &PgPool) -> DbResult<()> {
    let mut tx = pool.begin().await?;
    sqlx::raw_sql("DROP TABLE IF EXISTS jobs CASCADE")
        .execute(&mut *tx)
        .await?;
    sqlx::raw_sql(JOBS_SCHEMA).execute(&mut *tx).await?;
    tx.commit().await?;
    info!("Jobs table reset");
    Ok(())
}
