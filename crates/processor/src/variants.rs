//! Image variant pipeline.

use crate::error::ProcessError;
use bytes::Bytes;
use image::imageops::FilterType;
use lightbox_core::checksum::Checksum;
use lightbox_core::config::ImageConfig;
use lightbox_core::variant::{ORIGINAL_VARIANT, VariantSpec};
use lightbox_metadata::MetadataStore;
use lightbox_metadata::models::{NewImage, UploadRow};
use lightbox_storage::BlobStore;
use std::path::Path;
use time::OffsetDateTime;
use tracing::instrument;

/// A variant encoded in memory, ready to persist.
struct EncodedVariant {
    tag: String,
    data: Vec<u8>,
    width: u32,
    height: u32,
}

/// Result of the CPU-bound decode/resize/encode stage.
struct PipelineOutput {
    source_width: u32,
    source_height: u32,
    source_mime: &'static str,
    variants: Vec<EncodedVariant>,
}

/// Produce all image records for an assembled upload.
///
/// Reads the source at `source_path`, records the `original` variant, then
/// derives each configured resized variant. Upserts keyed on
/// `(upload_id, variant)` make re-runs converge, so the at-least-once job
/// runner can safely retry partial runs. State transitions belong to the
/// caller.
#[instrument(skip_all, fields(upload_id = %upload.upload_id))]
pub async fn process_upload(
    metadata: &dyn MetadataStore,
    storage: &dyn BlobStore,
    upload: &UploadRow,
    source_path: &Path,
    config: &ImageConfig,
) -> Result<(), ProcessError> {
    let source = tokio::fs::read(source_path).await.map_err(|e| {
        ProcessError::SourceUnreadable(format!("{}: {e}", source_path.display()))
    })?;
    if source.is_empty() {
        return Err(ProcessError::SourceUnreadable(format!(
            "{}: file is empty",
            source_path.display()
        )));
    }

    let source_checksum = Checksum::compute(&source);

    // Decoding and resizing are CPU-bound; keep them off the async workers.
    let variant_specs = config.variants.clone();
    let jpeg_quality = config.jpeg_quality;
    let output = tokio::task::spawn_blocking(move || {
        run_pipeline(&source, &variant_specs, jpeg_quality)
    })
    .await
    .map_err(|e| ProcessError::Internal(format!("pipeline task failed: {e}")))??;

    let now = OffsetDateTime::now_utc();

    // The original row points at the assembled blob itself.
    let original_path = upload
        .path
        .clone()
        .unwrap_or_else(|| format!("{}/original", upload.upload_id));
    metadata
        .upsert_image(
            &NewImage {
                upload_id: upload.id,
                variant: ORIGINAL_VARIANT.to_string(),
                path: original_path,
                mime_type: Some(output.source_mime.to_string()),
                width: output.source_width as i64,
                height: output.source_height as i64,
                checksum: Some(source_checksum.to_hex()),
            },
            now,
        )
        .await?;

    for encoded in output.variants {
        let file_name = format!("{}.jpg", encoded.tag);
        let checksum = Checksum::compute(&encoded.data);
        storage
            .put_blob(upload.upload_id, &file_name, Bytes::from(encoded.data))
            .await?;
        metadata
            .upsert_image(
                &NewImage {
                    upload_id: upload.id,
                    variant: encoded.tag,
                    path: format!("{}/{}", upload.upload_id, file_name),
                    mime_type: Some("image/jpeg".to_string()),
                    width: encoded.width as i64,
                    height: encoded.height as i64,
                    checksum: Some(checksum.to_hex()),
                },
                now,
            )
            .await?;
    }

    tracing::info!(upload_id = %upload.upload_id, "Image variants recorded");
    Ok(())
}

/// Decode the source and encode every configured variant.
fn run_pipeline(
    source: &[u8],
    specs: &[VariantSpec],
    jpeg_quality: u8,
) -> Result<PipelineOutput, ProcessError> {
    let mime = image::guess_format(source)
        .map(|format| format.to_mime_type())
        .unwrap_or("application/octet-stream");

    let img = image::load_from_memory(source).map_err(|e| ProcessError::Decode(e.to_string()))?;
    let (source_width, source_height) = (img.width(), img.height());

    let mut variants = Vec::with_capacity(specs.len());
    for spec in specs {
        // Never enlarge: sources smaller than the target are re-encoded at
        // their own dimensions.
        let resized = if source_width.max(source_height) > spec.longest_side {
            img.resize(spec.longest_side, spec.longest_side, FilterType::Lanczos3)
        } else {
            img.clone()
        };

        // JPEG has no alpha channel.
        let rgb = image::DynamicImage::ImageRgb8(resized.to_rgb8());

        let mut data = Vec::new();
        let mut cursor = std::io::Cursor::new(&mut data);
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut cursor, jpeg_quality);
        rgb.write_with_encoder(encoder)
            .map_err(|e| ProcessError::Encode(e.to_string()))?;

        variants.push(EncodedVariant {
            tag: spec.tag.clone(),
            data,
            width: rgb.width(),
            height: rgb.height(),
        });
    }

    Ok(PipelineOutput {
        source_width,
        source_height,
        source_mime: mime,
        variants,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use lightbox_metadata::SqliteStore;
    use lightbox_metadata::models::NewUpload;
    use lightbox_metadata::repos::{ImageRepo, UploadRepo};
    use lightbox_storage::FilesystemStore;
    use uuid::Uuid;

    /// A small PNG with a gradient so resizing is non-trivial.
    fn test_png(width: u32, height: u32) -> Vec<u8> {
        use image::{ImageBuffer, Rgb};

        let img = ImageBuffer::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut bytes = Vec::new();
        img.write_to(
            &mut std::io::Cursor::new(&mut bytes),
            image::ImageFormat::Png,
        )
        .unwrap();
        bytes
    }

    struct Fixture {
        _dir: tempfile::TempDir,
        metadata: SqliteStore,
        storage: FilesystemStore,
        upload: UploadRow,
        source_path: std::path::PathBuf,
    }

    async fn make_fixture(width: u32, height: u32) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        let metadata = SqliteStore::new(dir.path().join("metadata.db")).await.unwrap();
        let storage = FilesystemStore::new(dir.path().join("blobs")).await.unwrap();

        let upload_id = Uuid::new_v4();
        let now = OffsetDateTime::now_utc();
        let upload = metadata
            .create_or_get_upload(
                &NewUpload {
                    upload_id,
                    original_filename: Some("photo.png".to_string()),
                    ..Default::default()
                },
                now,
            )
            .await
            .unwrap();

        let png = test_png(width, height);
        storage
            .put_blob(upload_id, "original.png", Bytes::from(png))
            .await
            .unwrap();
        metadata
            .set_assembled(
                upload.id,
                "00000000000000000000000000000000",
                0,
                &format!("{upload_id}/original.png"),
                now,
            )
            .await
            .unwrap();
        let upload = metadata.get_upload(upload_id).await.unwrap().unwrap();
        let source_path = storage.blob_path(upload_id, "original.png");

        Fixture {
            _dir: dir,
            metadata,
            storage,
            upload,
            source_path,
        }
    }

    #[tokio::test]
    async fn test_pipeline_produces_all_variants() {
        let fixture = make_fixture(2048, 1536).await;
        let config = ImageConfig::default();

        process_upload(
            &fixture.metadata,
            &fixture.storage,
            &fixture.upload,
            &fixture.source_path,
            &config,
        )
        .await
        .unwrap();

        let images = fixture.metadata.list_images(fixture.upload.id).await.unwrap();
        assert_eq!(images.len(), 4);

        let original = fixture
            .metadata
            .get_image(fixture.upload.id, "original")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(original.width, 2048);
        assert_eq!(original.height, 1536);
        assert_eq!(original.mime_type.as_deref(), Some("image/png"));

        for (tag, target) in [("256", 256u32), ("512", 512), ("1024", 1024)] {
            let image = fixture
                .metadata
                .get_image(fixture.upload.id, tag)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(image.mime_type.as_deref(), Some("image/jpeg"));
            assert_eq!(
                image.width.max(image.height),
                target as i64,
                "variant {tag} longest side"
            );
            // Aspect ratio carried over within one pixel of rounding.
            let expected_height = (target as f64 * 1536.0 / 2048.0).round() as i64;
            assert!((image.height - expected_height).abs() <= 1);

            // The blob exists and hashes to the stored checksum.
            let blob = fixture
                .storage
                .read_blob(fixture.upload.upload_id, &format!("{tag}.jpg"))
                .await
                .unwrap();
            assert_eq!(
                Checksum::compute(&blob).to_hex(),
                image.checksum.unwrap()
            );
        }
    }

    #[tokio::test]
    async fn test_pipeline_never_enlarges() {
        let fixture = make_fixture(300, 200).await;
        let config = ImageConfig::default();

        process_upload(
            &fixture.metadata,
            &fixture.storage,
            &fixture.upload,
            &fixture.source_path,
            &config,
        )
        .await
        .unwrap();

        // 512 and 1024 targets exceed the source; dimensions stay put.
        for tag in ["512", "1024"] {
            let image = fixture
                .metadata
                .get_image(fixture.upload.id, tag)
                .await
                .unwrap()
                .unwrap();
            assert_eq!(image.width, 300);
            assert_eq!(image.height, 200);
        }

        let small = fixture
            .metadata
            .get_image(fixture.upload.id, "256")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(small.width, 256);
    }

    #[tokio::test]
    async fn test_pipeline_resize_monotonicity() {
        let fixture = make_fixture(1600, 1200).await;
        let config = ImageConfig::default();

        process_upload(
            &fixture.metadata,
            &fixture.storage,
            &fixture.upload,
            &fixture.source_path,
            &config,
        )
        .await
        .unwrap();

        let widths: Vec<i64> = {
            let mut values = Vec::new();
            for tag in ["256", "512", "1024", "original"] {
                let image = fixture
                    .metadata
                    .get_image(fixture.upload.id, tag)
                    .await
                    .unwrap()
                    .unwrap();
                values.push(image.width);
            }
            values
        };
        assert!(widths.windows(2).all(|pair| pair[0] <= pair[1]));
    }

    #[tokio::test]
    async fn test_pipeline_is_idempotent() {
        let fixture = make_fixture(1024, 768).await;
        let config = ImageConfig::default();

        for _ in 0..2 {
            process_upload(
                &fixture.metadata,
                &fixture.storage,
                &fixture.upload,
                &fixture.source_path,
                &config,
            )
            .await
            .unwrap();
        }

        let images = fixture.metadata.list_images(fixture.upload.id).await.unwrap();
        assert_eq!(images.len(), 4, "re-running must not duplicate rows");
    }

    #[tokio::test]
    async fn test_pipeline_missing_source_is_retryable_error() {
        let fixture = make_fixture(64, 64).await;
        let config = ImageConfig::default();

        let result = process_upload(
            &fixture.metadata,
            &fixture.storage,
            &fixture.upload,
            Path::new("/nonexistent/source.png"),
            &config,
        )
        .await;
        assert!(matches!(result, Err(ProcessError::SourceUnreadable(_))));
    }

    #[tokio::test]
    async fn test_pipeline_rejects_garbage_source() {
        let fixture = make_fixture(64, 64).await;
        let config = ImageConfig::default();

        let garbage = fixture._dir.path().join("garbage.bin");
        std::fs::write(&garbage, b"definitely not an image").unwrap();

        let result = process_upload(
            &fixture.metadata,
            &fixture.storage,
            &fixture.upload,
            &garbage,
            &config,
        )
        .await;
        assert!(matches!(result, Err(ProcessError::Decode(_))));
    }
}
