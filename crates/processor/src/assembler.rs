//! Chunk assembly into the canonical blob.

use crate::error::AssembleError;
use lightbox_core::checksum::Checksum;
use lightbox_storage::BlobStore;
use tracing::instrument;
use uuid::Uuid;

/// Result of a successful assembly.
#[derive(Debug, Clone)]
pub struct AssembledFile {
    /// Name of the canonical blob inside the session directory,
    /// e.g. "original.jpg".
    pub blob_name: String,
    /// MD5 of the assembled bytes.
    pub checksum: Checksum,
    /// Size of the assembled file in bytes.
    pub size: u64,
}

/// Derive the canonical blob name from the client's original filename.
///
/// Only short alphanumeric extensions are carried over; anything else
/// yields a bare "original".
pub fn original_blob_name(original_filename: Option<&str>) -> String {
    let ext = original_filename
        .and_then(|name| name.rsplit_once('.'))
        .map(|(_, ext)| ext)
        .filter(|ext| {
            !ext.is_empty() && ext.len() <= 5 && ext.chars().all(|c| c.is_ascii_alphanumeric())
        });

    match ext {
        Some(ext) => format!("original.{}", ext.to_ascii_lowercase()),
        None => "original".to_string(),
    }
}

/// Concatenate a session's chunks in index order into the canonical blob,
/// verifying the whole-file checksum before the blob becomes visible.
///
/// The caller must hold the upload's serialization lock and is responsible
/// for all state transitions; this function only moves bytes. On a
/// checksum mismatch the temp file is discarded and the chunks are left in
/// place so the client can re-drive completion.
#[instrument(skip(storage, declared_checksum))]
pub async fn assemble_upload(
    storage: &dyn BlobStore,
    upload_id: Uuid,
    original_filename: Option<&str>,
    declared_checksum: &Checksum,
) -> Result<AssembledFile, AssembleError> {
    let indices = storage.list_chunks(upload_id).await?;
    let Some(&last_index) = indices.last() else {
        return Err(AssembleError::NoChunks);
    };

    // Indices must form exactly 0..N. `list_chunks` sorts on the parsed
    // integer index, so gaps show up as position/value disagreements.
    let expected = last_index + 1;
    if indices.len() as u32 != expected {
        let missing: Vec<u32> = (0..expected).filter(|i| !indices.contains(i)).collect();
        return Err(AssembleError::MissingChunks { expected, missing });
    }

    let blob_name = original_blob_name(original_filename);
    let mut upload = storage.put_blob_stream(upload_id, &blob_name).await?;
    let mut hasher = Checksum::hasher();

    for index in indices {
        let data = match storage.read_chunk(upload_id, index).await {
            Ok(data) => data,
            Err(e) => {
                upload.abort().await?;
                return Err(e.into());
            }
        };
        hasher.update(&data);
        if let Err(e) = upload.write(data).await {
            upload.abort().await?;
            return Err(e.into());
        }
    }

    let actual = hasher.finalize();
    if &actual != declared_checksum {
        // Discard the temp file; chunks stay so completion can be retried.
        upload.abort().await?;
        return Err(AssembleError::ChecksumMismatch {
            expected: declared_checksum.to_hex(),
            actual: actual.to_hex(),
        });
    }

    let size = upload.finish().await?;

    tracing::info!(
        upload_id = %upload_id,
        blob_name = %blob_name,
        size,
        "Assembled canonical blob"
    );

    Ok(AssembledFile {
        blob_name,
        checksum: actual,
        size,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use lightbox_core::chunk::chunk_data;
    use lightbox_storage::FilesystemStore;

    async fn make_store() -> (tempfile::TempDir, FilesystemStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = FilesystemStore::new(dir.path()).await.unwrap();
        (dir, store)
    }

    async fn put_chunks(store: &FilesystemStore, upload_id: Uuid, data: &[u8], chunk_size: u64) {
        for info in chunk_data(data, chunk_size) {
            let start = (info.index as u64 * chunk_size) as usize;
            let end = start + info.size as usize;
            store
                .put_chunk(upload_id, info.index, Bytes::copy_from_slice(&data[start..end]))
                .await
                .unwrap();
        }
    }

    #[test]
    fn test_original_blob_name() {
        assert_eq!(original_blob_name(Some("photo.JPG")), "original.jpg");
        assert_eq!(original_blob_name(Some("archive.tar.gz")), "original.gz");
        assert_eq!(original_blob_name(Some("noext")), "original");
        assert_eq!(original_blob_name(Some("bad.e!t")), "original");
        assert_eq!(original_blob_name(Some("trailingdot.")), "original");
        assert_eq!(original_blob_name(Some("way.toolongext")), "original");
        assert_eq!(original_blob_name(None), "original");
    }

    #[tokio::test]
    async fn test_assemble_restores_bytes_for_any_partitioning() {
        let data: Vec<u8> = (0..10_000u32).map(|i| (i % 251) as u8).collect();
        let checksum = Checksum::compute(&data);

        for chunk_size in [100u64, 999, 4096, 20_000] {
            let (_dir, store) = make_store().await;
            let upload_id = Uuid::new_v4();
            put_chunks(&store, upload_id, &data, chunk_size).await;

            let assembled = assemble_upload(&store, upload_id, Some("img.png"), &checksum)
                .await
                .unwrap();

            assert_eq!(assembled.blob_name, "original.png");
            assert_eq!(assembled.size, data.len() as u64);
            assert_eq!(assembled.checksum, checksum);

            let blob = store.read_blob(upload_id, "original.png").await.unwrap();
            assert_eq!(blob.as_ref(), data.as_slice());
        }
    }

    #[tokio::test]
    async fn test_assemble_no_chunks() {
        let (_dir, store) = make_store().await;
        let result = assemble_upload(
            &store,
            Uuid::new_v4(),
            None,
            &Checksum::compute(b""),
        )
        .await;
        assert!(matches!(result, Err(AssembleError::NoChunks)));
    }

    #[tokio::test]
    async fn test_assemble_detects_gap() {
        let (_dir, store) = make_store().await;
        let upload_id = Uuid::new_v4();

        store
            .put_chunk(upload_id, 0, Bytes::from("aa"))
            .await
            .unwrap();
        store
            .put_chunk(upload_id, 2, Bytes::from("cc"))
            .await
            .unwrap();

        let result = assemble_upload(&store, upload_id, None, &Checksum::compute(b"aacc")).await;
        match result {
            Err(AssembleError::MissingChunks { expected, missing }) => {
                assert_eq!(expected, 3);
                assert_eq!(missing, vec![1]);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_assemble_checksum_mismatch_retains_chunks() {
        let (_dir, store) = make_store().await;
        let upload_id = Uuid::new_v4();
        let data = b"the real content".to_vec();
        put_chunks(&store, upload_id, &data, 4).await;

        let wrong = Checksum::compute(b"something else");
        let result = assemble_upload(&store, upload_id, Some("f.jpg"), &wrong).await;
        assert!(matches!(result, Err(AssembleError::ChecksumMismatch { .. })));

        // No canonical blob appeared and the chunks are untouched.
        assert!(!store.blob_exists(upload_id, "original.jpg").await.unwrap());
        assert_eq!(store.list_chunks(upload_id).await.unwrap().len(), 4);

        // Completion can be re-driven with the right checksum.
        let assembled =
            assemble_upload(&store, upload_id, Some("f.jpg"), &Checksum::compute(&data))
                .await
                .unwrap();
        assert_eq!(assembled.size, data.len() as u64);
    }

    #[tokio::test]
    async fn test_assemble_out_of_order_submission_is_irrelevant() {
        // Chunks submitted 2, 0, 1 still assemble in index order.
        let (_dir, store) = make_store().await;
        let upload_id = Uuid::new_v4();

        let parts: [&[u8]; 3] = [b"first-", b"second-", b"third"];
        for index in [2usize, 0, 1] {
            store
                .put_chunk(upload_id, index as u32, Bytes::copy_from_slice(parts[index]))
                .await
                .unwrap();
        }

        let joined = b"first-second-third".to_vec();
        let assembled =
            assemble_upload(&store, upload_id, None, &Checksum::compute(&joined))
                .await
                .unwrap();
        assert_eq!(assembled.blob_name, "original");

        let blob = store.read_blob(upload_id, "original").await.unwrap();
        assert_eq!(blob.as_ref(), joined.as_slice());
    }
}
