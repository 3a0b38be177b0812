//! Schema commands.

use anyhow::{Result, bail};
use lockhead_config::QueueConfig;
use lockhead_db::{close_pool, reset_schema, run_migrations};

use super::connect;

pub async fn migrate(config: &QueueConfig) -> Result<()> {
    let pool = connect(config).await?;
    run_migrations(&pool).await?;
    close_pool(&pool).await;
    println!("Migrations applied");
    Ok(())
}

pub async fn reset(config: &QueueConfig, confirmed: bool) -> Result<()> {
    if !confirmed {
        bail!("reset deletes every queued job; pass --yes to confirm");
    }
    let pool = connect(config).await?;
    run_migrations(&pool).await?;
    reset_schema(&pool).await?;
    close_pool(&pool).await;
    println!("Jobs table reset");
    Ok(())
}
