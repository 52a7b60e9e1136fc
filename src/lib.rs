pub mod config;
pub mod error;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::config::ImportConfig;
pub use crate::error::ImportError;
pub use crate::models::{
    ArchivePayload, ImportJob, JobKey, JobStatus, LayerOutcome, StagedFile, UploadRecord,
    UploadState,
};
pub use crate::services::coordinator::{ImportCoordinator, UploadStatusReport};
pub use crate::services::importer::{ImportResult, Importer};
pub use crate::services::queue::{FailureHook, FailureRecord, JobQueue, LogFailureHook};
pub use crate::services::store::{MemoryUploadStore, UploadStore};
pub use crate::services::sweeper::RetentionSweeper;

use std::sync::Arc;
use tokio::sync::watch;

/// Shared handles for one running pipeline.
#[derive(Clone)]
pub struct PipelineState {
    pub coordinator: Arc<ImportCoordinator>,
    pub queue: Arc<JobQueue>,
    pub store: Arc<dyn UploadStore>,
    pub config: ImportConfig,
}

/// Assembles a pipeline around an importer capability and a record store,
/// with the default log-and-surface failure policy.
pub fn build_pipeline(
    config: ImportConfig,
    importer: Arc<dyn Importer>,
    store: Arc<dyn UploadStore>,
) -> PipelineState {
    build_pipeline_with_hook(config, importer, store, Arc::new(LogFailureHook))
}

/// Assembles a pipeline with a caller-provided failure hook.
pub fn build_pipeline_with_hook(
    config: ImportConfig,
    importer: Arc<dyn Importer>,
    store: Arc<dyn UploadStore>,
    hook: Arc<dyn FailureHook>,
) -> PipelineState {
    let queue = Arc::new(JobQueue::new(config.worker_count, importer, hook));
    let coordinator = Arc::new(ImportCoordinator::new(
        queue.clone(),
        store.clone(),
        config.clone(),
    ));
    PipelineState {
        coordinator,
        queue,
        store,
        config,
    }
}

/// Spawns the retention sweeper; it runs until `shutdown` flips.
pub fn spawn_retention_sweeper(
    state: &PipelineState,
    shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    let sweeper = RetentionSweeper::new(
        state.store.clone(),
        state.queue.clone(),
        state.config.clone(),
        shutdown,
    );
    tokio::spawn(sweeper.run())
}
