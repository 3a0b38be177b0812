//! Error types for lockhead.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("store error: {0}")]
    Store(String),

    #[error("wake channel error: {0}")]
    Channel(String),

    #[error("execution failed: {0}")]
    ExecutionFailed(String),
}

pub type Result<T> = std::result::Result<T, Error>;
