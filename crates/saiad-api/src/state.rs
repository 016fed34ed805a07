//! Application state.

use std::sync::Arc;

use saiad_queue::{Backends, JobIntake, JobTracker};
use saiad_storage::ArtifactStore;

use crate::config::ApiConfig;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: ApiConfig,
    pub tracker: JobTracker,
    pub intake: JobIntake,
    pub storage: Arc<dyn ArtifactStore>,
}

impl AppState {
    pub fn new(config: ApiConfig, backends: &Backends, storage: Arc<dyn ArtifactStore>) -> Self {
        Self {
            config,
            tracker: backends.tracker.clone(),
            intake: JobIntake::new(backends.tracker.clone(), backends.dispatcher.clone()),
            storage,
        }
    }
}
