use crate::config::ImportConfig;
use crate::error::ImportError;
use crate::models::{
    ArchivePayload, ImportJob, JobKey, JobStatus, LayerOutcome, UploadRecord, UploadState,
};
use crate::services::queue::{JobHandle, JobOutcome, JobQueue};
use crate::services::staging::StagingArea;
use crate::services::store::UploadStore;
use crate::utils::validation::require_single_archive;
use dashmap::DashMap;
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

/// Snapshot for the polling boundary: the persisted record plus live
/// per-layer job statuses.
#[derive(Debug)]
pub struct UploadStatusReport {
    pub record: UploadRecord,
    pub jobs: Vec<(JobKey, JobStatus)>,
}

/// Orchestrates one submission end to end: validate, stage, enumerate,
/// dispatch one job per staged file, join, aggregate, and always release the
/// staging area before returning.
pub struct ImportCoordinator {
    queue: Arc<JobQueue>,
    store: Arc<dyn UploadStore>,
    config: ImportConfig,
    cancelled: DashMap<Uuid, ()>,
}

impl ImportCoordinator {
    pub fn new(queue: Arc<JobQueue>, store: Arc<dyn UploadStore>, config: ImportConfig) -> Self {
        Self {
            queue,
            store,
            config,
            cancelled: DashMap::new(),
        }
    }

    /// Runs one upload to a terminal state.
    ///
    /// Validation and staging failures abort the whole submission and
    /// propagate; per-layer import failures do not. A record is persisted at
    /// every state change, so pollers see progress while this future runs.
    pub async fn submit(
        &self,
        payloads: Vec<ArchivePayload>,
        owner: &str,
        layer_configs: Vec<serde_json::Value>,
    ) -> Result<UploadRecord, ImportError> {
        let payload = require_single_archive(payloads, self.config.max_archive_size)?;

        let mut record = UploadRecord::new(owner, &payload.file_name);
        tracing::info!(
            upload_id = %record.id,
            owner,
            name = %record.name,
            size = payload.bytes.len(),
            "upload accepted"
        );
        self.persist(&record).await?;

        let result = self.stage_and_import(&mut record, &payload, layer_configs).await;
        self.cancelled.remove(&record.id);

        match result {
            Ok(()) => {
                tracing::info!(upload_id = %record.id, state = ?record.state, "upload finished");
                self.persist(&record).await?;
                Ok(record)
            }
            Err(err) => {
                if !record.state.is_terminal() {
                    // Non-terminal here, so the transition is legal.
                    let _ = record.advance(UploadState::Failed);
                }
                // Best effort; the original error is the one the caller needs.
                if let Err(persist_err) = self.persist(&record).await {
                    tracing::error!(
                        upload_id = %record.id,
                        error = %persist_err,
                        "failed to persist failed upload record"
                    );
                }
                Err(err)
            }
        }
    }

    async fn stage_and_import(
        &self,
        record: &mut UploadRecord,
        payload: &ArchivePayload,
        layer_configs: Vec<serde_json::Value>,
    ) -> Result<(), ImportError> {
        record.advance(UploadState::Staging)?;
        self.persist(record).await?;

        let mut staging = StagingArea::acquire(&self.config.staging_root)?;
        let outcome = self
            .import_staged(record, &staging, payload, layer_configs)
            .await;

        // Every job for this upload is terminal by now (join-before-release),
        // so no worker can still be reading from the staging directory.
        match (outcome, staging.release()) {
            (Err(err), release) => {
                if let Err(release_err) = release {
                    tracing::error!(
                        upload_id = %record.id,
                        error = %release_err,
                        "failed to release staging area after import error"
                    );
                }
                Err(err)
            }
            (Ok(_), Err(release_err)) => Err(release_err),
            (Ok(all_ok), Ok(())) => {
                let next = if all_ok {
                    UploadState::Complete
                } else {
                    UploadState::Failed
                };
                record.advance(next)?;
                Ok(())
            }
        }
    }

    /// Extracts the archive and drives every layer job to a terminal status.
    /// Returns whether every layer was dispatched and succeeded.
    async fn import_staged(
        &self,
        record: &mut UploadRecord,
        staging: &StagingArea,
        payload: &ArchivePayload,
        layer_configs: Vec<serde_json::Value>,
    ) -> Result<bool, ImportError> {
        let staged = staging.extract_archive(&payload.bytes)?;
        if staged.is_empty() {
            return Err(ImportError::Input("archive contains no files".to_string()));
        }

        record.advance(UploadState::Importing)?;
        self.persist(record).await?;

        let mut handles: Vec<JobHandle> = Vec::with_capacity(staged.len());
        let mut enqueue_err = None;
        let mut all_dispatched = true;
        for (layer, file) in staged.iter().enumerate() {
            if self.cancelled.contains_key(&record.id) {
                tracing::warn!(
                    upload_id = %record.id,
                    layer,
                    "upload cancelled, not dispatching remaining layers"
                );
                all_dispatched = false;
                break;
            }
            let configuration = layer_configs
                .get(layer)
                .cloned()
                .unwrap_or_else(|| json!({}));
            let job = ImportJob {
                key: JobKey {
                    upload_id: record.id,
                    layer,
                },
                source_name: file.source_name.clone(),
                path: file.local_path.clone(),
                configuration,
                attempt: 1,
            };
            match self.queue.enqueue(job) {
                Ok(handle) => handles.push(handle),
                Err(err) => {
                    enqueue_err = Some(err);
                    all_dispatched = false;
                    break;
                }
            }
        }

        // Jobs may complete in any order; aggregate by key, and keep every
        // dispatched job joined before the staging area can go away.
        let mut outcomes = Vec::with_capacity(handles.len());
        for handle in handles {
            let key = handle.key();
            let source_name = staged
                .get(key.layer)
                .map(|f| f.source_name.clone())
                .unwrap_or_default();
            let layer_outcome = match handle.outcome().await {
                JobOutcome::Succeeded(result) => LayerOutcome {
                    layer: key.layer,
                    source_name,
                    status: JobStatus::Succeeded,
                    detail: Some(result.detail),
                    error: None,
                },
                JobOutcome::Failed { message } => LayerOutcome {
                    layer: key.layer,
                    source_name,
                    status: JobStatus::Failed,
                    detail: None,
                    error: Some(message),
                },
            };
            outcomes.push(layer_outcome);
        }
        outcomes.sort_by_key(|outcome| outcome.layer);

        let all_ok = all_dispatched
            && outcomes
                .iter()
                .all(|outcome| outcome.status == JobStatus::Succeeded);
        record.layers = outcomes;

        if let Some(err) = enqueue_err {
            return Err(err);
        }
        Ok(all_ok)
    }

    /// Current state plus per-layer job statuses, for polling UIs.
    pub async fn status(&self, id: Uuid) -> Result<UploadStatusReport, ImportError> {
        let record = self
            .load(id)
            .await?
            .ok_or(ImportError::NotFound(id))?;
        let jobs = self.queue.statuses_for(id);
        Ok(UploadStatusReport { record, jobs })
    }

    /// Flags an upload for cancellation. Jobs already dispatched run to
    /// completion; no further jobs for this upload are enqueued. A no-op on
    /// records that already reached a terminal state.
    pub async fn cancel(&self, id: Uuid) -> Result<(), ImportError> {
        let record = self
            .load(id)
            .await?
            .ok_or(ImportError::NotFound(id))?;
        if record.state.is_terminal() {
            return Ok(());
        }
        self.cancelled.insert(id, ());
        tracing::info!(upload_id = %id, "upload cancellation requested");
        Ok(())
    }

    async fn persist(&self, record: &UploadRecord) -> Result<(), ImportError> {
        self.store.save(record.clone()).await.map_err(|e| {
            ImportError::Resource(format!("failed to persist upload record: {:#}", e))
        })
    }

    async fn load(&self, id: Uuid) -> Result<Option<UploadRecord>, ImportError> {
        self.store.load(id).await.map_err(|e| {
            ImportError::Resource(format!("failed to load upload record: {:#}", e))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::importer::{ImportResult, Importer};
    use crate::services::queue::LogFailureHook;
    use crate::services::store::MemoryUploadStore;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::path::Path;

    struct NoopImporter;

    #[async_trait]
    impl Importer for NoopImporter {
        async fn run(&self, _path: &Path, _configuration: &Value) -> anyhow::Result<ImportResult> {
            Ok(ImportResult { detail: json!({}) })
        }
    }

    fn coordinator() -> ImportCoordinator {
        let mut config = ImportConfig::development();
        config.staging_root = tempfile::tempdir().unwrap().keep();
        let queue = Arc::new(JobQueue::new(
            2,
            Arc::new(NoopImporter),
            Arc::new(LogFailureHook),
        ));
        ImportCoordinator::new(queue, Arc::new(MemoryUploadStore::new()), config)
    }

    #[tokio::test]
    async fn test_status_unknown_upload_is_not_found() {
        let coordinator = coordinator();
        let err = coordinator.status(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ImportError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cancel_unknown_upload_is_not_found() {
        let coordinator = coordinator();
        let err = coordinator.cancel(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, ImportError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_cancel_terminal_record_is_noop() {
        let coordinator = coordinator();
        let mut record = UploadRecord::new("alice", "done.zip");
        let id = record.id;
        record.advance(UploadState::Staging).unwrap();
        record.advance(UploadState::Failed).unwrap();
        coordinator.store.save(record).await.unwrap();

        coordinator.cancel(id).await.unwrap();
        assert!(!coordinator.cancelled.contains_key(&id));
    }
}
