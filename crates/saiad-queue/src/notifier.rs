//! Progress Notifier: relays job events to live subscribers.
//!
//! Events are published after the store write that produced them, in
//! write order. Delivery is at-least-once; subscribers key on `revision`
//! if they need to drop repeats.

use std::pin::Pin;

use async_trait::async_trait;
use futures_util::{Stream, StreamExt};
use redis::AsyncCommands;
use saiad_models::{JobEvent, JobId};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::error::QueueResult;

pub type JobEventStream = Pin<Box<dyn Stream<Item = JobEvent> + Send>>;

#[async_trait]
pub trait ProgressNotifier: Send + Sync {
    async fn publish(&self, event: &JobEvent) -> QueueResult<()>;

    /// Live events for one job from now on. Does not replay history.
    async fn subscribe(&self, job_id: &JobId) -> QueueResult<JobEventStream>;
}

/// Cross-process notifier over Redis Pub/Sub.
pub struct RedisNotifier {
    client: redis::Client,
}

impl RedisNotifier {
    pub fn new(redis_url: &str) -> QueueResult<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self { client })
    }

    /// Get the channel name for a job.
    pub fn channel_name(job_id: &JobId) -> String {
        format!("saiad:progress:{}", job_id)
    }
}

#[async_trait]
impl ProgressNotifier for RedisNotifier {
    async fn publish(&self, event: &JobEvent) -> QueueResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let channel = Self::channel_name(&event.job_id);
        let payload = serde_json::to_string(event)?;

        debug!(channel = %channel, revision = event.revision, "Publishing job event");
        conn.publish::<_, _, ()>(channel, payload).await?;
        Ok(())
    }

    async fn subscribe(&self, job_id: &JobId) -> QueueResult<JobEventStream> {
        let mut pubsub = self.client.get_async_pubsub().await?;
        pubsub.subscribe(Self::channel_name(job_id)).await?;

        let stream = pubsub.into_on_message().filter_map(|msg| async move {
            let payload: String = msg.get_payload().ok()?;
            match serde_json::from_str(&payload) {
                Ok(event) => Some(event),
                Err(e) => {
                    warn!(error = %e, "Dropping malformed job event");
                    None
                }
            }
        });
        Ok(Box::pin(stream))
    }
}

/// In-process notifier over a tokio broadcast channel.
pub struct BroadcastNotifier {
    tx: broadcast::Sender<JobEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }
}

impl Default for BroadcastNotifier {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl ProgressNotifier for BroadcastNotifier {
    async fn publish(&self, event: &JobEvent) -> QueueResult<()> {
        // No receivers is not an error: nobody is watching this job.
        let _ = self.tx.send(event.clone());
        Ok(())
    }

    async fn subscribe(&self, job_id: &JobId) -> QueueResult<JobEventStream> {
        let job_id = job_id.clone();
        let rx = self.tx.subscribe();
        let stream = futures_util::stream::unfold(rx, move |mut rx| {
            let job_id = job_id.clone();
            async move {
                loop {
                    match rx.recv().await {
                        Ok(event) if event.job_id == job_id => return Some((event, rx)),
                        Ok(_) => continue,
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            warn!(job_id = %job_id, skipped, "Subscriber lagged, events dropped");
                        }
                        Err(broadcast::error::RecvError::Closed) => return None,
                    }
                }
            }
        });
        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use saiad_models::{AspectRatio, GenerationConfig, GenerationJob, ProductRef, Scene, Storyboard};

    fn job() -> GenerationJob {
        GenerationJob::new(
            "proj",
            "key",
            GenerationConfig::new(ProductRef::new("p"), 10.0, AspectRatio::SQUARE),
            Storyboard::new(vec![Scene::new(1, 10.0)]),
        )
    }

    #[tokio::test]
    async fn test_broadcast_filters_by_job_and_keeps_order() {
        let notifier = BroadcastNotifier::default();
        let mut tracked = job();
        let other = job();
        let mut stream = notifier.subscribe(&tracked.id).await.unwrap();

        notifier.publish(&JobEvent::from_job(&tracked)).await.unwrap();
        notifier.publish(&JobEvent::from_job(&other)).await.unwrap();
        tracked.start().unwrap();
        notifier.publish(&JobEvent::from_job(&tracked)).await.unwrap();

        let first = stream.next().await.unwrap();
        let second = stream.next().await.unwrap();
        assert_eq!(first.job_id, tracked.id);
        assert_eq!(second.job_id, tracked.id);
        assert!(second.revision > first.revision);
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let notifier = BroadcastNotifier::new(4);
        notifier.publish(&JobEvent::from_job(&job())).await.unwrap();
    }

    #[test]
    fn test_channel_name() {
        assert_eq!(
            RedisNotifier::channel_name(&JobId::from_string("j1")),
            "saiad:progress:j1"
        );
    }
}
