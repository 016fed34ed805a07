//! Wiring of store, notifier, usage sink and queue for one process.
//!
//! `QUEUE_BACKEND=redis` (the default when `REDIS_URL` is set) shares
//! state across API and worker processes. `memory` keeps everything in
//! process, which only works when the API runs the worker embedded.

use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

use crate::error::{QueueError, QueueResult};
use crate::notifier::{BroadcastNotifier, RedisNotifier};
use crate::queue::{InMemoryJobQueue, JobDispatcher, JobSource, QueueConfig, RedisJobQueue};
use crate::redis_store::RedisJobStore;
use crate::store::InMemoryJobStore;
use crate::tracker::JobTracker;
use crate::usage::{InMemoryUsageSink, RedisUsageSink};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Redis,
    Memory,
}

impl FromStr for BackendKind {
    type Err = QueueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "redis" => Ok(BackendKind::Redis),
            "memory" | "in-memory" | "local" => Ok(BackendKind::Memory),
            other => Err(QueueError::connection_failed(format!(
                "Unknown QUEUE_BACKEND '{}'",
                other
            ))),
        }
    }
}

impl BackendKind {
    pub fn from_env() -> QueueResult<Self> {
        match std::env::var("QUEUE_BACKEND") {
            Ok(value) => value.parse(),
            Err(_) if std::env::var("REDIS_URL").is_ok() => Ok(BackendKind::Redis),
            Err(_) => Ok(BackendKind::Memory),
        }
    }
}

/// Everything the API and worker need to share job state.
#[derive(Clone)]
pub struct Backends {
    pub kind: BackendKind,
    pub tracker: JobTracker,
    pub dispatcher: Arc<dyn JobDispatcher>,
    pub source: Arc<dyn JobSource>,
}

impl Backends {
    pub async fn connect(kind: BackendKind, config: &QueueConfig) -> QueueResult<Self> {
        let backends = match kind {
            BackendKind::Redis => {
                let queue = Arc::new(RedisJobQueue::new(config.clone())?);
                queue.init().await?;
                let tracker = JobTracker::new(
                    Arc::new(RedisJobStore::new(config)?),
                    Arc::new(RedisNotifier::new(&config.redis_url)?),
                    Arc::new(RedisUsageSink::new(
                        &config.redis_url,
                        config.usage_stream_name.clone(),
                    )?),
                );
                Self {
                    kind,
                    tracker,
                    dispatcher: queue.clone(),
                    source: queue,
                }
            }
            BackendKind::Memory => {
                let queue = Arc::new(InMemoryJobQueue::new());
                let tracker = JobTracker::new(
                    Arc::new(InMemoryJobStore::new()),
                    Arc::new(BroadcastNotifier::default()),
                    Arc::new(InMemoryUsageSink::new()),
                );
                Self {
                    kind,
                    tracker,
                    dispatcher: queue.clone(),
                    source: queue,
                }
            }
        };
        info!(backend = ?kind, store = backends.tracker.store().backend(), "Job backends ready");
        Ok(backends)
    }

    pub async fn from_env() -> QueueResult<Self> {
        Self::connect(BackendKind::from_env()?, &QueueConfig::from_env()).await
    }
}
