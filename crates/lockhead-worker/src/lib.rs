//! Producers and workers for lockhead.
//!
//! `JobQueue` ties a job store, a wake channel and a claim engine together.
//! `Worker` waits for wake signals (or the poll interval), claims jobs and
//! hands them to a `JobHandler`.

pub mod handler;
pub mod queue;
pub mod worker;

pub use handler::{JobHandler, ShellHandler};
pub use queue::JobQueue;
pub use worker::{Worker, run_workers};
