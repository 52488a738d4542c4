//! Local filesystem blob store.

use crate::error::{StorageError, StorageResult};
use crate::traits::{BlobStore, StreamingUpload};
use async_trait::async_trait;
use bytes::Bytes;
use lightbox_core::chunk::{chunk_file_name, parse_chunk_index};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Subdirectory holding per-session chunk temp files.
const TMP_DIR: &str = "tmp";

/// Local filesystem blob store rooted at a single directory.
pub struct FilesystemStore {
    root: PathBuf,
}

impl FilesystemStore {
    /// Create a new filesystem store, creating the root if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    /// Get the root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn chunk_dir(&self, upload_id: Uuid) -> PathBuf {
        self.root.join(TMP_DIR).join(upload_id.to_string())
    }

    fn chunk_path(&self, upload_id: Uuid, index: u32) -> PathBuf {
        self.chunk_dir(upload_id).join(chunk_file_name(index))
    }

    fn session_dir(&self, upload_id: Uuid) -> PathBuf {
        self.root.join(upload_id.to_string())
    }

    /// Reject blob names that could escape the session directory.
    fn validate_name(name: &str) -> StorageResult<()> {
        if name.is_empty()
            || name.contains('/')
            || name.contains('\\')
            || name.contains("..")
            || name.starts_with('.')
        {
            return Err(StorageError::InvalidName(name.to_string()));
        }
        Ok(())
    }

    /// Write data to a temp file next to `path`, fsync, then rename.
    async fn write_atomic(path: &Path, data: &[u8]) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Unique temp name so concurrent writers of the same key cannot
        // observe each other's partial files.
        let temp_name = format!(".tmp.{}", Uuid::new_v4());
        let temp_path = path.with_file_name(
            path.file_name()
                .map(|n| format!("{}{}", n.to_string_lossy(), temp_name))
                .unwrap_or_else(|| temp_name.clone()),
        );
        {
            let mut file = fs::File::create(&temp_path).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
        }
        fs::rename(&temp_path, path).await?;
        set_default_permissions(path).await?;

        Ok(())
    }

    async fn read_file(path: &Path, key: &str) -> StorageResult<Bytes> {
        let data = fs::read(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                StorageError::NotFound(key.to_string())
            } else {
                StorageError::Io(e)
            }
        })?;
        Ok(Bytes::from(data))
    }
}

/// Owner-writable, group- and world-readable.
async fn set_default_permissions(path: &Path) -> StorageResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, std::fs::Permissions::from_mode(0o644)).await?;
    }
    #[cfg(not(unix))]
    {
        let _ = path;
    }
    Ok(())
}

#[async_trait]
impl BlobStore for FilesystemStore {
    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn put_chunk(&self, upload_id: Uuid, index: u32, data: Bytes) -> StorageResult<()> {
        let path = self.chunk_path(upload_id, index);
        Self::write_atomic(&path, &data).await
    }

    #[instrument(skip(self))]
    async fn read_chunk(&self, upload_id: Uuid, index: u32) -> StorageResult<Bytes> {
        let path = self.chunk_path(upload_id, index);
        Self::read_file(&path, &format!("{upload_id}/{}", chunk_file_name(index))).await
    }

    #[instrument(skip(self))]
    async fn list_chunks(&self, upload_id: Uuid) -> StorageResult<Vec<u32>> {
        let dir = self.chunk_dir(upload_id);
        let mut indices = Vec::new();

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(indices),
            Err(e) => return Err(StorageError::Io(e)),
        };

        while let Some(entry) = entries.next_entry().await? {
            if !entry.file_type().await?.is_file() {
                continue;
            }
            let name = entry.file_name();
            // Leftover temp files and foreign names are not chunks.
            if let Ok(index) = parse_chunk_index(&name.to_string_lossy()) {
                indices.push(index);
            }
        }

        indices.sort_unstable();
        Ok(indices)
    }

    #[instrument(skip(self))]
    async fn delete_chunk_dir(&self, upload_id: Uuid) -> StorageResult<()> {
        let dir = self.chunk_dir(upload_id);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::Io(e)),
        }
    }

    #[instrument(skip(self, data), fields(size = data.len()))]
    async fn put_blob(&self, upload_id: Uuid, name: &str, data: Bytes) -> StorageResult<()> {
        Self::validate_name(name)?;
        let path = self.session_dir(upload_id).join(name);
        Self::write_atomic(&path, &data).await
    }

    #[instrument(skip(self))]
    async fn put_blob_stream(
        &self,
        upload_id: Uuid,
        name: &str,
    ) -> StorageResult<Box<dyn StreamingUpload>> {
        Self::validate_name(name)?;
        let final_path = self.session_dir(upload_id).join(name);
        if let Some(parent) = final_path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let temp_path = final_path.with_file_name(format!("{name}.tmp.{}", Uuid::new_v4()));
        let file = fs::File::create(&temp_path).await?;

        Ok(Box::new(FilesystemUpload {
            file,
            temp_path,
            final_path,
            bytes_written: 0,
        }))
    }

    #[instrument(skip(self))]
    async fn read_blob(&self, upload_id: Uuid, name: &str) -> StorageResult<Bytes> {
        Self::validate_name(name)?;
        let path = self.session_dir(upload_id).join(name);
        Self::read_file(&path, &format!("{upload_id}/{name}")).await
    }

    fn blob_path(&self, upload_id: Uuid, name: &str) -> PathBuf {
        self.session_dir(upload_id).join(name)
    }

    #[instrument(skip(self))]
    async fn blob_exists(&self, upload_id: Uuid, name: &str) -> StorageResult<bool> {
        Self::validate_name(name)?;
        let path = self.session_dir(upload_id).join(name);
        fs::try_exists(&path).await.map_err(StorageError::Io)
    }

    #[instrument(skip(self))]
    async fn health_check(&self) -> StorageResult<()> {
        let metadata = fs::metadata(&self.root).await.map_err(|e| {
            StorageError::Io(std::io::Error::new(
                e.kind(),
                format!("blob root not accessible: {e}"),
            ))
        })?;

        if !metadata.is_dir() {
            return Err(StorageError::Io(std::io::Error::new(
                std::io::ErrorKind::NotADirectory,
                format!("blob root is not a directory: {:?}", self.root),
            )));
        }

        Ok(())
    }
}

/// Streaming upload for the filesystem store.
struct FilesystemUpload {
    file: fs::File,
    temp_path: PathBuf,
    final_path: PathBuf,
    bytes_written: u64,
}

#[async_trait]
impl StreamingUpload for FilesystemUpload {
    async fn write(&mut self, data: Bytes) -> StorageResult<()> {
        self.file.write_all(&data).await?;
        self.bytes_written += data.len() as u64;
        Ok(())
    }

    async fn finish(self: Box<Self>) -> StorageResult<u64> {
        // Flush to disk before the rename makes the blob visible.
        self.file.sync_all().await?;
        drop(self.file);
        fs::rename(&self.temp_path, &self.final_path).await?;
        set_default_permissions(&self.final_path).await?;
        Ok(self.bytes_written)
    }

    async fn abort(self: Box<Self>) -> StorageResult<()> {
        drop(self.file);
        let _ = fs::remove_file(&self.temp_path).await;
        Ok(())
    }
}
