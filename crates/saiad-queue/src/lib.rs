//! Job state, live progress and dispatch for the generation pipeline.
//!
//! This crate provides:
//! - The Job State Store (Redis with revision CAS, or in-memory)
//! - The Progress Notifier (Redis Pub/Sub, or in-process broadcast)
//! - Job dispatch via Redis Streams with retry/DLQ, or an in-process channel
//! - The usage-event sink for billing
//! - `JobTracker` and `JobIntake`, which tie those together
//! - `Backends`, which picks Redis or in-process wiring from the environment

pub mod backend;
pub mod error;
pub mod intake;
pub mod job;
pub mod notifier;
pub mod queue;
pub mod redis_store;
pub mod store;
pub mod tracker;
pub mod usage;

pub use backend::{BackendKind, Backends};
pub use error::{QueueError, QueueResult};
pub use intake::{JobIntake, Submission};
pub use job::{Delivery, GenerateVideoJob};
pub use notifier::{BroadcastNotifier, JobEventStream, ProgressNotifier, RedisNotifier};
pub use queue::{InMemoryJobQueue, JobDispatcher, JobSource, QueueConfig, RedisJobQueue};
pub use redis_store::RedisJobStore;
pub use store::{CreateOutcome, InMemoryJobStore, JobMutation, JobStore};
pub use tracker::JobTracker;
pub use usage::{InMemoryUsageSink, RedisUsageSink, UsageSink};
