use crate::error::ImportError;
use crate::models::{ImportJob, JobKey, JobStatus};
use crate::services::importer::{ImportResult, Importer};
use dashmap::DashMap;
use futures::FutureExt;
use serde_json::json;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio::sync::{Semaphore, oneshot};
use uuid::Uuid;

/// Structured record handed to the failure hook when a job ends in error.
#[derive(Debug, Clone)]
pub struct FailureRecord {
    pub job_id: String,
    pub upload_id: Uuid,
    pub args: serde_json::Value,
    pub error: String,
    pub context: String,
}

/// Invoked synchronously at the queue boundary before a failed job's handle
/// resolves. Retry-vs-log-only is the hook implementor's choice.
pub trait FailureHook: Send + Sync {
    fn on_failure(&self, record: &FailureRecord);
}

/// Default policy: emit a structured log record and surface the failure.
/// No automatic retry.
pub struct LogFailureHook;

impl FailureHook for LogFailureHook {
    fn on_failure(&self, record: &FailureRecord) {
        tracing::error!(
            job_id = %record.job_id,
            upload_id = %record.upload_id,
            args = %record.args,
            error = %record.error,
            context = %record.context,
            "import job failed"
        );
    }
}

/// Terminal outcome of one job as delivered through its handle.
#[derive(Debug, Clone)]
pub enum JobOutcome {
    Succeeded(ImportResult),
    Failed { message: String },
}

/// Awaitable handle for one enqueued job. `enqueue` itself never blocks;
/// `outcome` is where a caller suspends.
#[derive(Debug)]
pub struct JobHandle {
    key: JobKey,
    rx: oneshot::Receiver<JobOutcome>,
}

impl JobHandle {
    pub fn key(&self) -> JobKey {
        self.key
    }

    pub async fn outcome(self) -> JobOutcome {
        match self.rx.await {
            Ok(outcome) => outcome,
            Err(_) => JobOutcome::Failed {
                message: "worker dropped before reporting a result".to_string(),
            },
        }
    }
}

/// Dispatches import jobs to a bounded pool of workers.
///
/// At most one job per key is in flight at any time: re-enqueueing an
/// in-flight key is rejected with `ImportError::DuplicateJob` (callers
/// wanting coalescing keep the first handle). A job that returns an error or panics
/// is caught at the queue boundary and normalized into a failed outcome; it
/// can never take a worker down with it.
pub struct JobQueue {
    importer: Arc<dyn Importer>,
    hook: Arc<dyn FailureHook>,
    workers: Arc<Semaphore>,
    in_flight: Arc<DashMap<JobKey, ()>>,
    statuses: Arc<DashMap<JobKey, JobStatus>>,
}

impl JobQueue {
    pub fn new(
        worker_count: usize,
        importer: Arc<dyn Importer>,
        hook: Arc<dyn FailureHook>,
    ) -> Self {
        Self {
            importer,
            hook,
            workers: Arc::new(Semaphore::new(worker_count)),
            in_flight: Arc::new(DashMap::new()),
            statuses: Arc::new(DashMap::new()),
        }
    }

    pub fn enqueue(&self, job: ImportJob) -> Result<JobHandle, ImportError> {
        let key = job.key;
        // Atomic claim; whoever inserted first owns the key until the job
        // reaches a terminal status.
        if self.in_flight.insert(key, ()).is_some() {
            return Err(ImportError::DuplicateJob(key));
        }
        self.statuses.insert(key, JobStatus::Queued);

        let (tx, rx) = oneshot::channel();
        let importer = self.importer.clone();
        let hook = self.hook.clone();
        let workers = self.workers.clone();
        let in_flight = self.in_flight.clone();
        let statuses = self.statuses.clone();

        tokio::spawn(async move {
            let outcome = match workers.acquire_owned().await {
                Ok(_permit) => {
                    statuses.insert(key, JobStatus::Running);
                    Self::run_job(&*importer, &*hook, &job).await
                }
                Err(_) => JobOutcome::Failed {
                    message: "job queue is shut down".to_string(),
                },
            };

            statuses.insert(
                key,
                match outcome {
                    JobOutcome::Succeeded(_) => JobStatus::Succeeded,
                    JobOutcome::Failed { .. } => JobStatus::Failed,
                },
            );
            in_flight.remove(&key);
            let _ = tx.send(outcome);
        });

        Ok(JobHandle { key, rx })
    }

    async fn run_job(importer: &dyn Importer, hook: &dyn FailureHook, job: &ImportJob) -> JobOutcome {
        let result = AssertUnwindSafe(importer.run(&job.path, &job.configuration))
            .catch_unwind()
            .await;

        let (message, context) = match result {
            Ok(Ok(import_result)) => return JobOutcome::Succeeded(import_result),
            Ok(Err(err)) => (format!("{:#}", err), format!("{:?}", err)),
            Err(panic) => {
                let message = panic_message(panic);
                (message.clone(), format!("panic: {}", message))
            }
        };

        hook.on_failure(&FailureRecord {
            job_id: job.key.to_string(),
            upload_id: job.key.upload_id,
            args: json!({
                "source_name": job.source_name,
                "path": job.path,
                "configuration": job.configuration,
                "attempt": job.attempt,
            }),
            error: message.clone(),
            context,
        });

        JobOutcome::Failed { message }
    }

    pub fn status(&self, key: &JobKey) -> Option<JobStatus> {
        self.statuses.get(key).map(|entry| *entry.value())
    }

    /// Per-key statuses for one upload, for the polling boundary.
    pub fn statuses_for(&self, upload_id: Uuid) -> Vec<(JobKey, JobStatus)> {
        let mut statuses: Vec<(JobKey, JobStatus)> = self
            .statuses
            .iter()
            .filter(|entry| entry.key().upload_id == upload_id)
            .map(|entry| (*entry.key(), *entry.value()))
            .collect();
        statuses.sort_by_key(|(key, _)| key.layer);
        statuses
    }

    /// Drops the status bookkeeping for an upload whose record was purged.
    pub fn forget_upload(&self, upload_id: Uuid) {
        self.statuses
            .retain(|key, _| key.upload_id != upload_id);
    }
}

fn panic_message(panic: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "import worker panicked".to_string()
    }
}
