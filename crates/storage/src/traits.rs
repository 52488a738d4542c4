//! Blob store trait definitions.

use crate::error::StorageResult;
use async_trait::async_trait;
use bytes::Bytes;
use std::path::PathBuf;
use uuid::Uuid;

/// Session-scoped blob store.
///
/// Chunk operations address the temp area (`tmp/<upload_id>/`), blob
/// operations the session directory (`<upload_id>/`). Implementations must
/// finalize every write atomically so readers never observe partial files.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write a chunk at the given index, replacing any previous content.
    /// Idempotent: re-sending the same index overwrites.
    async fn put_chunk(&self, upload_id: Uuid, index: u32, data: Bytes) -> StorageResult<()>;

    /// Read a chunk back.
    async fn read_chunk(&self, upload_id: Uuid, index: u32) -> StorageResult<Bytes>;

    /// List the chunk indices present for a session, ascending by the
    /// parsed integer index (never by file name).
    async fn list_chunks(&self, upload_id: Uuid) -> StorageResult<Vec<u32>>;

    /// Delete the whole chunk temp directory for a session.
    /// Succeeds if the directory does not exist.
    async fn delete_chunk_dir(&self, upload_id: Uuid) -> StorageResult<()>;

    /// Write a named blob into the session directory with atomic finalize.
    async fn put_blob(&self, upload_id: Uuid, name: &str, data: Bytes) -> StorageResult<()>;

    /// Open a streaming write to a named blob. The blob only becomes
    /// visible when `finish` renames it into place.
    async fn put_blob_stream(
        &self,
        upload_id: Uuid,
        name: &str,
    ) -> StorageResult<Box<dyn StreamingUpload>>;

    /// Read a named blob from the session directory.
    async fn read_blob(&self, upload_id: Uuid, name: &str) -> StorageResult<Bytes>;

    /// Absolute filesystem path of a named blob. The file may not exist.
    fn blob_path(&self, upload_id: Uuid, name: &str) -> PathBuf;

    /// Whether a named blob exists in the session directory.
    async fn blob_exists(&self, upload_id: Uuid, name: &str) -> StorageResult<bool>;

    /// Verify the store is reachable and writable.
    async fn health_check(&self) -> StorageResult<()>;
}

/// Handle for streaming writes with atomic finalize.
#[async_trait]
pub trait StreamingUpload: Send {
    /// Append data to the in-flight temp file.
    async fn write(&mut self, data: Bytes) -> StorageResult<()>;

    /// Flush and rename the temp file into place. Returns bytes written.
    async fn finish(self: Box<Self>) -> StorageResult<u64>;

    /// Abort the upload and remove the temp file.
    async fn abort(self: Box<Self>) -> StorageResult<()>;
}
