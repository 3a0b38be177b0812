//! Core types and traits for the lockhead work queue.
//!
//! This crate contains:
//! - Job identifiers and the job record
//! - The `JobStore` trait and its locking primitive
//! - The claim engine (`lock_head`) with its contention window
//! - The `WakeChannel` trait used to signal idle consumers
//! - In-memory store and channel implementations for single-process use

pub mod claim;
pub mod error;
pub mod id;
pub mod job;
pub mod memory;
pub mod store;
pub mod wake;

pub use claim::{ClaimAttempt, ClaimEngine, ClaimWindow, OffsetSource, ThreadRngOffsets};
pub use error::{Error, Result};
pub use id::JobId;
pub use job::Job;
pub use memory::{LocalWakeChannel, MemoryJobStore};
pub use store::{JobStore, LockQuery};
pub use wake::{Wake, WakeChannel, WakeSubscription};
