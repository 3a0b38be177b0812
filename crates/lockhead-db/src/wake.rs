//! Wake channel over PostgreSQL LISTEN/NOTIFY.

use std::time::Duration;

use async_trait::async_trait;
use lockhead_core::wake::{Wake, WakeChannel, WakeSubscription};
use lockhead_core::{Error, Result};
use sqlx::PgPool;
use sqlx::postgres::PgListener;
use tracing::{debug, trace};

fn channel_error(err: sqlx::Error) -> Error {
    Error::Channel(err.to_string())
}

/// PostgreSQL implementation of WakeChannel.
///
/// Publishing uses `pg_notify` on a pooled connection. Each subscription
/// holds its own dedicated listening connection.
#[derive(Clone)]
pub struct PgWakeChannel {
    pool: PgPool,
    name: String,
}

impl PgWakeChannel {
    pub fn new(pool: PgPool, name: impl Into<String>) -> Self {
        Self {
            pool,
            name: name.into(),
        }
    }
}

#[async_trait]
impl WakeChannel for PgWakeChannel {
    fn name(&self) -> &str {
        &self.name
    }

    async fn publish(&self) -> Result<()> {
        sqlx::query("SELECT pg_notify($1, '')")
            .bind(&self.name)
            .execute(&self.pool)
            .await
            .map_err(channel_error)?;
        trace!(channel = %self.name, "Published wake signal");
        Ok(())
    }

    async fn subscribe(&self) -> Result<Box<dyn WakeSubscription>> {
        let mut listener = PgListener::connect_with(&self.pool)
            .await
            .map_err(channel_error)?;
        listener.listen(&self.name).await.map_err(channel_error)?;
        debug!(channel = %self.name, "Listening for wake signals");
        Ok(Box::new(PgSubscription { listener }))
    }
}

struct PgSubscription {
    listener: PgListener,
}

#[async_trait]
impl WakeSubscription for PgSubscription {
    async fn wait(&mut self, timeout: Duration) -> Result<Wake> {
        match tokio::time::timeout(timeout, self.listener.recv()).await {
            Err(_) => Ok(Wake::TimedOut),
            Ok(Ok(notification)) => {
                let mut coalesced = 0usize;
                while self.listener.next_buffered().is_some() {
                    coalesced += 1;
                }
                trace!(channel = notification.channel(), coalesced, "Woken");
                Ok(Wake::Signalled)
            }
            Ok(Err(e)) => Err(channel_error(e)),
        }
    }
}
