//! lockhead CLI tool.

use clap::{Parser, Subcommand};
use lockhead_config::{QueueConfig, load_config};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "lockhead")]
#[command(about = "PostgreSQL-backed work queue", long_about = None)]
struct Cli {
    /// Path to a KDL configuration file
    #[arg(long, env = "LOCKHEAD_CONFIG")]
    config: Option<PathBuf>,

    /// Database URL (overrides the configuration file)
    #[arg(long, env = "DATABASE_URL")]
    database_url: Option<String>,

    /// Wake channel name (overrides the configuration file)
    #[arg(long)]
    channel: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply pending schema migrations
    Migrate,
    /// Drop and recreate the jobs table, discarding all jobs
    Reset {
        /// Confirm that all queued jobs should be deleted
        #[arg(long)]
        yes: bool,
    },
    /// Add jobs to the queue
    Enqueue {
        /// Job details, one job per argument
        #[arg(required = true)]
        details: Vec<String>,
    },
    /// Show how many jobs are waiting to be claimed
    Count,
    /// Claim a single job and print it
    Claim,
    /// Run workers that execute each job's details as a shell command
    Work {
        /// Number of concurrent workers
        #[arg(long)]
        concurrency: Option<usize>,
        /// Work until the queue is empty, then exit
        #[arg(long)]
        once: bool,
    },
}

fn resolve_config(cli: &Cli) -> anyhow::Result<QueueConfig> {
    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => QueueConfig::default(),
    };
    if let Some(url) = &cli.database_url {
        config.database.url = url.clone();
    }
    if let Some(channel) = &cli.channel {
        config.channel = channel.clone();
    }
    config.database.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = resolve_config(&cli)?;

    match cli.command {
        Commands::Migrate => {
            commands::schema::migrate(&config).await?;
        }
        Commands::Reset { yes } => {
            commands::schema::reset(&config, yes).await?;
        }
        Commands::Enqueue { details } => {
            commands::jobs::enqueue(&config, &details).await?;
        }
        Commands::Count => {
            commands::jobs::count(&config).await?;
        }
        Commands::Claim => {
            commands::jobs::claim(&config).await?;
        }
        Commands::Work { concurrency, once } => {
            if let Some(n) = concurrency {
                config.worker.concurrency = n.max(1);
            }
            commands::work::work(&config, once).await?;
        }
    }

    Ok(())
}
