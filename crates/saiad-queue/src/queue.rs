//! Job dispatch: Redis Streams for multi-process deployments, an
//! in-process channel for single-binary runs and tests.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use crate::error::{QueueError, QueueResult};
use crate::job::{Delivery, GenerateVideoJob};

/// Queue configuration.
#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Redis URL
    pub redis_url: String,
    /// Stream name for jobs
    pub stream_name: String,
    /// Consumer group name
    pub consumer_group: String,
    /// Dead letter queue stream name
    pub dlq_stream_name: String,
    /// Stream the billing collaborator reads usage events from
    pub usage_stream_name: String,
    /// Max deliveries before DLQ
    pub max_retries: u32,
    /// Pending messages idle longer than this are reclaimed
    pub visibility_timeout: Duration,
    /// TTL for job records and idempotency keys
    pub job_ttl: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://localhost:6379".to_string(),
            stream_name: "saiad:jobs".to_string(),
            consumer_group: "saiad:workers".to_string(),
            dlq_stream_name: "saiad:dlq".to_string(),
            usage_stream_name: "saiad:usage".to_string(),
            max_retries: 3,
            visibility_timeout: Duration::from_secs(600), // 10 minutes
            job_ttl: Duration::from_secs(86_400),
        }
    }
}

impl QueueConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            redis_url: std::env::var("REDIS_URL").unwrap_or(defaults.redis_url),
            stream_name: std::env::var("QUEUE_STREAM").unwrap_or(defaults.stream_name),
            consumer_group: std::env::var("QUEUE_CONSUMER_GROUP")
                .unwrap_or(defaults.consumer_group),
            dlq_stream_name: std::env::var("QUEUE_DLQ_STREAM").unwrap_or(defaults.dlq_stream_name),
            usage_stream_name: std::env::var("USAGE_STREAM")
                .unwrap_or(defaults.usage_stream_name),
            max_retries: std::env::var("QUEUE_MAX_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(defaults.max_retries),
            visibility_timeout: std::env::var("QUEUE_VISIBILITY_TIMEOUT")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.visibility_timeout),
            job_ttl: std::env::var("JOB_TTL_SECS")
                .ok()
                .and_then(|s| s.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.job_ttl),
        }
    }
}

/// Producer side: used by job intake.
#[async_trait]
pub trait JobDispatcher: Send + Sync {
    async fn dispatch(&self, job: &GenerateVideoJob) -> QueueResult<String>;
}

/// Consumer side: used by the worker executor.
#[async_trait]
pub trait JobSource: Send + Sync {
    /// Wait up to `block` for at most `count` new messages.
    async fn receive(
        &self,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> QueueResult<Vec<Delivery>>;

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()>;

    /// Record a failed delivery; dead-letters it once retries run out.
    async fn fail(&self, delivery: &Delivery, error: &str) -> QueueResult<()>;

    /// Take over messages whose consumer went away.
    async fn claim_stale(&self, consumer: &str, count: usize) -> QueueResult<Vec<Delivery>>;
}

/// Job queue backed by a Redis stream and consumer group.
pub struct RedisJobQueue {
    client: redis::Client,
    config: QueueConfig,
}

impl RedisJobQueue {
    pub fn new(config: QueueConfig) -> QueueResult<Self> {
        let client = redis::Client::open(config.redis_url.as_str())?;
        Ok(Self { client, config })
    }

    pub fn from_env() -> QueueResult<Self> {
        Self::new(QueueConfig::from_env())
    }

    async fn conn(&self) -> QueueResult<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }

    /// Initialize the queue (create consumer group if not exists).
    pub async fn init(&self) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        // Create consumer group (ignore error if already exists)
        let result: Result<(), redis::RedisError> = redis::cmd("XGROUP")
            .arg("CREATE")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg("$")
            .arg("MKSTREAM")
            .query_async(&mut conn)
            .await;

        match result {
            Ok(_) => info!(group = %self.config.consumer_group, "Created consumer group"),
            Err(e) if e.to_string().contains("BUSYGROUP") => {
                debug!(group = %self.config.consumer_group, "Consumer group already exists");
            }
            Err(e) => return Err(QueueError::Redis(e)),
        }

        Ok(())
    }

    /// Get queue length.
    pub async fn len(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.xlen(&self.config.stream_name).await?)
    }

    /// Get DLQ length.
    pub async fn dlq_len(&self) -> QueueResult<u64> {
        let mut conn = self.conn().await?;
        Ok(conn.xlen(&self.config.dlq_stream_name).await?)
    }

    async fn dead_letter(&self, delivery: &Delivery, error: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(&delivery.job)?;

        redis::cmd("XADD")
            .arg(&self.config.dlq_stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("error")
            .arg(error)
            .arg("original_id")
            .arg(&delivery.message_id)
            .query_async::<()>(&mut conn)
            .await?;

        self.ack(delivery).await?;
        warn!(job_id = %delivery.job.job_id, error, "Moved job to DLQ");
        Ok(())
    }

    fn retry_key(message_id: &str) -> String {
        format!("saiad:retry:{}", message_id)
    }

    /// Parse stream entries, acking malformed ones so they are not redelivered.
    async fn parse_entries(&self, entries: Vec<redis::streams::StreamId>) -> Vec<Delivery> {
        let mut deliveries = Vec::with_capacity(entries.len());
        for entry in entries {
            let message_id = entry.id.clone();
            let parsed = entry
                .get::<String>("job")
                .ok_or_else(|| "missing job field".to_string())
                .and_then(|payload| {
                    serde_json::from_str::<GenerateVideoJob>(&payload).map_err(|e| e.to_string())
                });
            match parsed {
                Ok(job) => deliveries.push(Delivery { message_id, job }),
                Err(e) => {
                    warn!(message_id = %message_id, error = %e, "Dropping malformed queue message");
                    if let Ok(mut conn) = self.conn().await {
                        let _: Result<(), _> = redis::cmd("XACK")
                            .arg(&self.config.stream_name)
                            .arg(&self.config.consumer_group)
                            .arg(&message_id)
                            .query_async(&mut conn)
                            .await;
                    }
                }
            }
        }
        deliveries
    }
}

#[async_trait]
impl JobDispatcher for RedisJobQueue {
    async fn dispatch(&self, job: &GenerateVideoJob) -> QueueResult<String> {
        let mut conn = self.conn().await?;
        let payload = serde_json::to_string(job)?;

        let message_id: String = redis::cmd("XADD")
            .arg(&self.config.stream_name)
            .arg("*")
            .arg("job")
            .arg(&payload)
            .arg("key")
            .arg(job.idempotency_key())
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::enqueue_failed(e.to_string()))?;

        info!(job_id = %job.job_id, message_id = %message_id, "Enqueued job");
        Ok(message_id)
    }
}

#[async_trait]
impl JobSource for RedisJobQueue {
    async fn receive(
        &self,
        consumer: &str,
        count: usize,
        block: Duration,
    ) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.conn().await?;

        let reply: redis::streams::StreamReadReply = redis::cmd("XREADGROUP")
            .arg("GROUP")
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg("COUNT")
            .arg(count)
            .arg("BLOCK")
            .arg(block.as_millis() as u64)
            .arg("STREAMS")
            .arg(&self.config.stream_name)
            .arg(">") // Only new messages
            .query_async(&mut conn)
            .await
            .map_err(|e| QueueError::dequeue_failed(e.to_string()))?;

        let entries = reply.keys.into_iter().flat_map(|k| k.ids).collect();
        Ok(self.parse_entries(entries).await)
    }

    async fn ack(&self, delivery: &Delivery) -> QueueResult<()> {
        let mut conn = self.conn().await?;

        redis::cmd("XACK")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(&delivery.message_id)
            .query_async::<()>(&mut conn)
            .await?;

        redis::cmd("XDEL")
            .arg(&self.config.stream_name)
            .arg(&delivery.message_id)
            .query_async::<()>(&mut conn)
            .await?;

        conn.del::<_, ()>(Self::retry_key(&delivery.message_id)).await?;
        debug!(message_id = %delivery.message_id, "Acknowledged job");
        Ok(())
    }

    async fn fail(&self, delivery: &Delivery, error: &str) -> QueueResult<()> {
        let mut conn = self.conn().await?;
        let key = Self::retry_key(&delivery.message_id);
        let attempts: u32 = conn.incr(&key, 1).await?;
        conn.expire::<_, ()>(&key, 86_400).await?;

        if attempts >= self.config.max_retries {
            self.dead_letter(delivery, error).await
        } else {
            // Left pending; claim_stale picks it up after the visibility timeout.
            warn!(
                job_id = %delivery.job.job_id,
                attempts,
                error,
                "Job delivery failed, will be redelivered"
            );
            Ok(())
        }
    }

    async fn claim_stale(&self, consumer: &str, count: usize) -> QueueResult<Vec<Delivery>> {
        let mut conn = self.conn().await?;

        let reply: redis::streams::StreamAutoClaimReply = redis::cmd("XAUTOCLAIM")
            .arg(&self.config.stream_name)
            .arg(&self.config.consumer_group)
            .arg(consumer)
            .arg(self.config.visibility_timeout.as_millis() as u64)
            .arg("0-0")
            .arg("COUNT")
            .arg(count)
            .query_async(&mut conn)
            .await?;

        let deliveries = self.parse_entries(reply.claimed).await;
        for delivery in &deliveries {
            info!(job_id = %delivery.job.job_id, "Claimed stale job from stream");
        }
        Ok(deliveries)
    }
}

/// In-process queue over an unbounded channel.
pub struct InMemoryJobQueue {
    tx: mpsc::UnboundedSender<GenerateVideoJob>,
    rx: Mutex<mpsc::UnboundedReceiver<GenerateVideoJob>>,
    next_id: AtomicU64,
}

impl InMemoryJobQueue {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
            next_id: AtomicU64::new(1),
        }
    }

    fn delivery(&self, job: GenerateVideoJob) -> Delivery {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        Delivery {
            message_id: format!("local-{}", id),
            job,
        }
    }
}

impl Default for InMemoryJobQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl JobDispatcher for InMemoryJobQueue {
    async fn dispatch(&self, job: &GenerateVideoJob) -> QueueResult<String> {
        self.tx
            .send(job.clone())
            .map_err(|_| QueueError::enqueue_failed("local queue closed"))?;
        Ok(job.job_id.to_string())
    }
}

#[async_trait]
impl JobSource for InMemoryJobQueue {
    async fn receive(
        &self,
        _consumer: &str,
        count: usize,
        block: Duration,
    ) -> QueueResult<Vec<Delivery>> {
        if count == 0 {
            return Ok(Vec::new());
        }
        let mut rx = self.rx.lock().await;
        let first = match tokio::time::timeout(block, rx.recv()).await {
            Ok(Some(job)) => job,
            Ok(None) => return Err(QueueError::dequeue_failed("local queue closed")),
            Err(_) => return Ok(Vec::new()),
        };

        let mut deliveries = vec![self.delivery(first)];
        while deliveries.len() < count {
            match rx.try_recv() {
                Ok(job) => deliveries.push(self.delivery(job)),
                Err(_) => break,
            }
        }
        Ok(deliveries)
    }

    async fn ack(&self, _delivery: &Delivery) -> QueueResult<()> {
        Ok(())
    }

    async fn fail(&self, delivery: &Delivery, error: &str) -> QueueResult<()> {
        warn!(job_id = %delivery.job.job_id, error, "Dropping failed local job");
        Ok(())
    }

    async fn claim_stale(&self, _consumer: &str, _count: usize) -> QueueResult<Vec<Delivery>> {
        Ok(Vec::new())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use saiad_models::JobId;

    #[tokio::test]
    async fn test_local_queue_delivers_in_order_up_to_count() {
        let queue = InMemoryJobQueue::new();
        for id in ["a", "b", "c"] {
            queue
                .dispatch(&GenerateVideoJob::new(JobId::from_string(id)))
                .await
                .unwrap();
        }

        let batch = queue.receive("w1", 2, Duration::from_millis(10)).await.unwrap();
        let ids: Vec<_> = batch.iter().map(|d| d.job.job_id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_ne!(batch[0].message_id, batch[1].message_id);

        let batch = queue.receive("w1", 5, Duration::from_millis(10)).await.unwrap();
        assert_eq!(batch.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_local_queue_empty_receive_times_out() {
        let queue = InMemoryJobQueue::new();
        let batch = queue.receive("w1", 1, Duration::from_secs(1)).await.unwrap();
        assert!(batch.is_empty());
    }

    #[test]
    fn test_config_defaults() {
        let config = QueueConfig::default();
        assert_eq!(config.stream_name, "saiad:jobs");
        assert_eq!(config.consumer_group, "saiad:workers");
        assert_eq!(config.usage_stream_name, "saiad:usage");
        assert_eq!(config.job_ttl, Duration::from_secs(86_400));
    }
}
