//! KDL configuration parsing for lockhead.
//!
//! This crate handles parsing of:
//! - Database connection settings
//! - The wake channel name
//! - Claim window tuning
//! - Worker pool settings

pub mod error;
pub mod settings;

pub use error::{ConfigError, ConfigResult};
pub use settings::{DatabaseConfig, QueueConfig, WorkerConfig, load_config, parse_config};
