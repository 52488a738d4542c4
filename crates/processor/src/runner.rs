//! Background job runner.

use crate::locks::UploadLocks;
use crate::variants::process_upload;
use lightbox_core::config::{ImageConfig, JobConfig};
use lightbox_core::upload::UploadStatus;
use lightbox_metadata::models::JobRow;
use lightbox_metadata::repos::JobState;
use lightbox_metadata::{MetadataResult, MetadataStore};
use lightbox_storage::BlobStore;
use std::path::Path;
use std::sync::Arc;
use time::OffsetDateTime;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// At-least-once runner for the processing queue.
///
/// Workers claim queued jobs one at a time; each attempt runs under the
/// upload's serialization lock with a per-attempt timeout, so at most one
/// attempt per upload executes at any moment. A failed attempt re-queues
/// the job until the configured number of tries is exhausted, after which
/// the job and the upload stay failed.
pub struct JobRunner {
    metadata: Arc<dyn MetadataStore>,
    storage: Arc<dyn BlobStore>,
    job_config: JobConfig,
    image_config: ImageConfig,
    locks: UploadLocks,
    wakeup: Notify,
}

impl JobRunner {
    /// Create a new runner.
    pub fn new(
        metadata: Arc<dyn MetadataStore>,
        storage: Arc<dyn BlobStore>,
        job_config: JobConfig,
        image_config: ImageConfig,
        locks: UploadLocks,
    ) -> Arc<Self> {
        Arc::new(Self {
            metadata,
            storage,
            job_config,
            image_config,
            locks,
            wakeup: Notify::new(),
        })
    }

    /// Enqueue a processing job for an assembled upload and wake a worker.
    pub async fn enqueue(&self, upload_id: i64, source_path: &Path) -> MetadataResult<Uuid> {
        let now = OffsetDateTime::now_utc();
        let job = JobRow {
            job_id: Uuid::new_v4(),
            upload_id,
            source_path: source_path.display().to_string(),
            state: JobState::Queued.as_str().to_string(),
            attempts: 0,
            last_error: None,
            created_at: now,
            updated_at: now,
        };
        self.metadata.enqueue_job(&job).await?;
        self.wakeup.notify_one();

        tracing::info!(job_id = %job.job_id, upload_id, "Enqueued processing job");
        Ok(job.job_id)
    }

    /// Re-queue jobs left `running` by a crashed process. Call once at
    /// startup before spawning workers.
    pub async fn recover(&self) -> MetadataResult<usize> {
        let recovered = self
            .metadata
            .recover_orphaned_jobs(OffsetDateTime::now_utc())
            .await?;
        if !recovered.is_empty() {
            tracing::warn!(
                count = recovered.len(),
                "Re-queued processing jobs orphaned by a previous instance"
            );
            self.wakeup.notify_one();
        }
        Ok(recovered.len())
    }

    /// Spawn the configured number of workers.
    pub fn spawn_workers(self: &Arc<Self>) -> Vec<JoinHandle<()>> {
        (0..self.job_config.workers)
            .map(|worker| {
                let runner = self.clone();
                tokio::spawn(async move { runner.worker_loop(worker).await })
            })
            .collect()
    }

    async fn worker_loop(&self, worker: usize) {
        tracing::debug!(worker, "Processing worker started");
        loop {
            match self.metadata.claim_next_job(OffsetDateTime::now_utc()).await {
                Ok(Some(job)) => self.run_attempt(job).await,
                Ok(None) => {
                    // Sleep until a new job is enqueued, or poll anyway so a
                    // missed wakeup cannot strand the queue.
                    tokio::select! {
                        _ = self.wakeup.notified() => {}
                        _ = tokio::time::sleep(self.job_config.poll_interval()) => {}
                    }
                }
                Err(e) => {
                    tracing::error!(worker, error = %e, "Failed to claim processing job");
                    tokio::time::sleep(self.job_config.poll_interval()).await;
                }
            }
        }
    }

    /// Execute one claimed attempt.
    async fn run_attempt(&self, job: JobRow) {
        let now = OffsetDateTime::now_utc();

        let upload = match self.metadata.get_upload_by_id(job.upload_id).await {
            Ok(Some(upload)) => upload,
            Ok(None) => {
                tracing::error!(job_id = %job.job_id, upload_id = job.upload_id, "Job references a missing upload");
                let _ = self
                    .metadata
                    .fail_job(job.job_id, "upload row not found", now)
                    .await;
                return;
            }
            Err(e) => {
                tracing::error!(job_id = %job.job_id, error = %e, "Failed to load upload for job");
                let _ = self
                    .metadata
                    .requeue_job(job.job_id, &e.to_string(), now)
                    .await;
                return;
            }
        };

        let _guard = self.locks.acquire(upload.upload_id).await;

        // Reload under the lock: a concurrent attempt may have finished.
        let upload = match self.metadata.get_upload_by_id(job.upload_id).await {
            Ok(Some(upload)) => upload,
            _ => return,
        };
        if upload.status == UploadStatus::Complete.as_str() {
            tracing::debug!(job_id = %job.job_id, upload_id = %upload.upload_id, "Upload already complete, attempt is a no-op");
            let _ = self
                .metadata
                .finish_job(job.job_id, OffsetDateTime::now_utc())
                .await;
            return;
        }

        let source_path = std::path::PathBuf::from(&job.source_path);
        let outcome = tokio::time::timeout(
            self.job_config.timeout(),
            process_upload(
                self.metadata.as_ref(),
                self.storage.as_ref(),
                &upload,
                &source_path,
                &self.image_config,
            ),
        )
        .await;

        let now = OffsetDateTime::now_utc();
        match outcome {
            Ok(Ok(())) => {
                if let Err(e) = self
                    .metadata
                    .update_status(upload.id, UploadStatus::Complete.as_str(), now)
                    .await
                {
                    tracing::error!(upload_id = %upload.upload_id, error = %e, "Failed to mark upload complete");
                }
                let _ = self.metadata.finish_job(job.job_id, now).await;
                tracing::info!(
                    job_id = %job.job_id,
                    upload_id = %upload.upload_id,
                    attempt = job.attempts,
                    "Processing succeeded"
                );
            }
            outcome => {
                let error = match outcome {
                    Ok(Err(e)) => e.to_string(),
                    Err(_) => format!(
                        "processing timed out after {}s",
                        self.job_config.timeout_s
                    ),
                    Ok(Ok(())) => unreachable!(),
                };

                if let Err(e) = self
                    .metadata
                    .update_status(upload.id, UploadStatus::Failed.as_str(), now)
                    .await
                {
                    tracing::error!(upload_id = %upload.upload_id, error = %e, "Failed to mark upload failed");
                }

                if job.attempts >= self.job_config.tries as i64 {
                    tracing::error!(
                        job_id = %job.job_id,
                        upload_id = %upload.upload_id,
                        attempts = job.attempts,
                        error = %error,
                        "Processing failed permanently"
                    );
                    let _ = self.metadata.fail_job(job.job_id, &error, now).await;
                } else {
                    tracing::warn!(
                        job_id = %job.job_id,
                        upload_id = %upload.upload_id,
                        attempt = job.attempts,
                        error = %error,
                        "Processing attempt failed, re-queueing"
                    );
                    let _ = self.metadata.requeue_job(job.job_id, &error, now).await;
                    self.wakeup.notify_one();
                }
            }
        }
    }
}
