//! Producer and inspection commands.

use anyhow::Result;
use lockhead_config::QueueConfig;
use lockhead_db::close_pool;

use super::{connect, queue};

pub async fn enqueue(config: &QueueConfig, details: &[String]) -> Result<()> {
    let pool = connect(config).await?;
    let ids = queue(&pool, config).enqueue_batch(details).await?;
    close_pool(&pool).await;

    for id in ids {
        println!("{}", id);
    }
    Ok(())
}

pub async fn count(config: &QueueConfig) -> Result<()> {
    let pool = connect(config).await?;
    let pending = queue(&pool, config).pending().await?;
    close_pool(&pool).await;

    println!("{}", pending);
    Ok(())
}

/// Claim one job and print it as JSON. The job stays claimed.
pub async fn claim(config: &QueueConfig) -> Result<()> {
    let pool = connect(config).await?;
    let job = queue(&pool, config).claim().await?;
    close_pool(&pool).await;

    match job {
        Some(job) => println!("{}", serde_json::to_string_pretty(&job)?),
        None => println!("No job available"),
    }
    Ok(())
}
