//! Ad video generation worker.
//!
//! This crate provides:
//! - The stage orchestrator that drives a job through its five stages
//! - Per-call retry with backoff and stable idempotency keys
//! - Asset persistence between vendors, storage and local disk
//! - The queue executor with graceful shutdown
//! - The sweeper that fails stalled jobs and purges old ones

pub mod assets;
pub mod config;
pub mod context;
pub mod error;
pub mod executor;
pub mod logging;
pub mod orchestrator;
pub mod retry;
pub mod runtime;
pub mod stages;
pub mod sweeper;

pub use config::{PipelineConfig, WorkerConfig};
pub use context::{JobRun, PipelineContext};
pub use error::{WorkerError, WorkerResult};
pub use executor::JobExecutor;
pub use logging::JobLogger;
pub use orchestrator::Orchestrator;
pub use runtime::{start, start_with, WorkerHandle};
pub use sweeper::{JobSweeper, SweepReport};
