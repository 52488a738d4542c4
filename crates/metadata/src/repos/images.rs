//! Image variant repository.

use crate::error::MetadataResult;
use crate::models::{ImageRow, NewImage};
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for image variant records.
#[async_trait]
pub trait ImageRepo: Send + Sync {
    /// Insert or update the record for `(upload_id, variant)`.
    ///
    /// The processing job is at-least-once, so this must converge: re-running
    /// it with the same inputs leaves a single row per variant.
    async fn upsert_image(&self, image: &NewImage, now: OffsetDateTime)
    -> MetadataResult<ImageRow>;

    /// Get a specific variant of an upload.
    async fn get_image(&self, upload_id: i64, variant: &str) -> MetadataResult<Option<ImageRow>>;

    /// Get an image by its id.
    async fn get_image_by_id(&self, id: i64) -> MetadataResult<Option<ImageRow>>;

    /// List all variants of an upload, ordered by variant tag.
    async fn list_images(&self, upload_id: i64) -> MetadataResult<Vec<ImageRow>>;
}
