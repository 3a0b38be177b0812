//! Wake channel trait.
//!
//! Producers publish a zero-payload signal after inserting work; idle
//! consumers block on their subscription until a signal arrives or a timeout
//! elapses, then try a claim. Delivery is at-least-once and signals may
//! coalesce, so a wake only means "work may exist". A consumer that subscribes
//! after a publish can miss it, which is why every wait is bounded.

use std::time::Duration;

use async_trait::async_trait;

use crate::Result;

/// Why a wait returned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wake {
    Signalled,
    TimedOut,
}

#[async_trait]
pub trait WakeChannel: Send + Sync {
    /// Name of the shared channel.
    fn name(&self) -> &str;

    /// Signal waiting consumers that new work may exist.
    async fn publish(&self) -> Result<()>;

    /// Open a subscription. Consumers do this once at startup.
    async fn subscribe(&self) -> Result<Box<dyn WakeSubscription>>;
}

#[async_trait]
pub trait WakeSubscription: Send {
    /// Block until a signal arrives or `timeout` elapses. Signals already
    /// queued when this returns are folded into the same wake.
    async fn wait(&mut self, timeout: Duration) -> Result<Wake>;
}
