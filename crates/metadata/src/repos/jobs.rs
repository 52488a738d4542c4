//! Processing job repository.

use crate::error::MetadataResult;
use crate::models::JobRow;
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for the durable processing job queue.
#[async_trait]
pub trait JobRepo: Send + Sync {
    /// Enqueue a new processing job.
    async fn enqueue_job(&self, job: &JobRow) -> MetadataResult<()>;

    /// Atomically claim the oldest queued job: transitions it to `running`
    /// and increments its attempt counter. Returns `None` when the queue is
    /// empty. Two workers can never claim the same job.
    async fn claim_next_job(&self, now: OffsetDateTime) -> MetadataResult<Option<JobRow>>;

    /// Get a job by id.
    async fn get_job(&self, job_id: Uuid) -> MetadataResult<Option<JobRow>>;

    /// List jobs for an upload, newest first.
    async fn list_jobs_for_upload(&self, upload_id: i64) -> MetadataResult<Vec<JobRow>>;

    /// Mark a running job as finished.
    async fn finish_job(&self, job_id: Uuid, now: OffsetDateTime) -> MetadataResult<()>;

    /// Mark a running job as terminally failed.
    async fn fail_job(
        &self,
        job_id: Uuid,
        error: &str,
        now: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Put a running job back in the queue for another attempt, recording
    /// the error of the attempt that just failed.
    async fn requeue_job(
        &self,
        job_id: Uuid,
        error: &str,
        now: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Re-queue jobs left `running` by a crashed process. Returns the
    /// recovered jobs. Called once at startup before workers spawn.
    async fn recover_orphaned_jobs(&self, now: OffsetDateTime) -> MetadataResult<Vec<JobRow>>;
}

/// Processing job state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Queued,
    Running,
    Finished,
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Finished => "finished",
            Self::Failed => "failed",
        }
    }
}
