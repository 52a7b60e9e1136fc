use crate::config::ImportConfig;
use crate::services::queue::JobQueue;
use crate::services::store::UploadStore;
use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{Duration, sleep};

/// Background task that retires terminal upload records after the retention
/// window and drops their queue bookkeeping.
pub struct RetentionSweeper {
    store: Arc<dyn UploadStore>,
    queue: Arc<JobQueue>,
    config: ImportConfig,
    shutdown: watch::Receiver<bool>,
}

impl RetentionSweeper {
    pub fn new(
        store: Arc<dyn UploadStore>,
        queue: Arc<JobQueue>,
        config: ImportConfig,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            queue,
            config,
            shutdown,
        }
    }

    pub async fn run(mut self) {
        tracing::info!(
            retention_hours = self.config.retention_hours,
            "🧹 Retention sweeper started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.changed() => {
                    tracing::info!("🛑 Retention sweeper shutting down");
                    break;
                }
                _ = sleep(Duration::from_secs(self.config.sweep_interval_secs)) => {
                    self.sweep().await;
                }
            }
        }
    }

    pub async fn sweep(&self) {
        let cutoff = Utc::now() - chrono::Duration::hours(self.config.retention_hours as i64);

        let due = match self.store.terminal_before(cutoff).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!("Retention sweep query failed: {:#}", e);
                return;
            }
        };

        for id in due {
            tracing::info!(upload_id = %id, "Purging retired upload record");
            if let Err(e) = self.store.delete(id).await {
                tracing::error!(upload_id = %id, "Failed to purge upload record: {:#}", e);
                continue;
            }
            self.queue.forget_upload(id);
        }
    }
}
