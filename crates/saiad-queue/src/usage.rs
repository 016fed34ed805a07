//! Billing signal: one usage event per terminal job.

use async_trait::async_trait;
use saiad_models::UsageEvent;
use tokio::sync::Mutex;
use tracing::info;

use crate::error::QueueResult;

#[async_trait]
pub trait UsageSink: Send + Sync {
    async fn emit(&self, event: &UsageEvent) -> QueueResult<()>;
}

/// Appends usage events to a Redis stream for the billing collaborator.
pub struct RedisUsageSink {
    client: redis::Client,
    stream: String,
}

impl RedisUsageSink {
    pub fn new(redis_url: &str, stream: impl Into<String>) -> QueueResult<Self> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
            stream: stream.into(),
        })
    }
}

#[async_trait]
impl UsageSink for RedisUsageSink {
    async fn emit(&self, event: &UsageEvent) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let payload = serde_json::to_string(event)?;

        redis::cmd("XADD")
            .arg(&self.stream)
            .arg("*")
            .arg("job_id")
            .arg(event.job_id.as_str())
            .arg("event")
            .arg(&payload)
            .query_async::<String>(&mut conn)
            .await?;

        info!(
            job_id = %event.job_id,
            credits = event.credits_consumed,
            outcome = event.outcome.as_str(),
            "Usage event emitted"
        );
        Ok(())
    }
}

/// Collects usage events in memory.
#[derive(Default)]
pub struct InMemoryUsageSink {
    events: Mutex<Vec<UsageEvent>>,
}

impl InMemoryUsageSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn events(&self) -> Vec<UsageEvent> {
        self.events.lock().await.clone()
    }
}

#[async_trait]
impl UsageSink for InMemoryUsageSink {
    async fn emit(&self, event: &UsageEvent) -> QueueResult<()> {
        info!(
            job_id = %event.job_id,
            credits = event.credits_consumed,
            outcome = event.outcome.as_str(),
            "Usage event recorded"
        );
        self.events.lock().await.push(event.clone());
        Ok(())
    }
}
