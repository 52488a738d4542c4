//! Upload session repository.

use crate::error::MetadataResult;
use crate::models::{NewUpload, UploadRow};
use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

/// Repository for upload session operations.
#[async_trait]
pub trait UploadRepo: Send + Sync {
    /// Create an upload session if absent and return the row either way.
    ///
    /// First chunks may arrive concurrently, so creation must be an upsert:
    /// the race loser gets the row the winner created. When the row already
    /// exists only `updated_at` is refreshed; chunk activity thereby keeps
    /// the session from being declared stalled at attach time.
    async fn create_or_get_upload(
        &self,
        upload: &NewUpload,
        now: OffsetDateTime,
    ) -> MetadataResult<UploadRow>;

    /// Get an upload session by its client-chosen UUID.
    async fn get_upload(&self, upload_id: Uuid) -> MetadataResult<Option<UploadRow>>;

    /// Get an upload session by its numeric id.
    async fn get_upload_by_id(&self, id: i64) -> MetadataResult<Option<UploadRow>>;

    /// Unconditionally set the session status.
    async fn update_status(
        &self,
        id: i64,
        status: &str,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()>;

    /// Set the status only if the current status matches `from`.
    /// Returns whether the transition happened.
    async fn update_status_if(
        &self,
        id: i64,
        from: &str,
        to: &str,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<bool>;

    /// Record the assembly result: whole-file checksum, measured size and
    /// the canonical blob's storage-relative path.
    async fn set_assembled(
        &self,
        id: i64,
        file_checksum: &str,
        file_size: i64,
        path: &str,
        updated_at: OffsetDateTime,
    ) -> MetadataResult<()>;
}
