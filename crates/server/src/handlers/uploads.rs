//! Upload surface handlers: chunk intake, completion, status and readiness.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::{Multipart, Path, State};
use bytes::Bytes;
use lightbox_core::checksum::Checksum;
use lightbox_core::upload::{
    ChunkUploadResponse, CompleteUploadRequest, CompleteUploadResponse, UploadId,
    UploadReadyResponse, UploadStatus, UploadStatusResponse,
};
use lightbox_core::variant::ORIGINAL_VARIANT;
use lightbox_metadata::models::NewUpload;
use lightbox_processor::{AssembleError, assembler};
use time::OffsetDateTime;

/// Parsed multipart form of POST /upload/chunk.
#[derive(Default)]
struct ChunkForm {
    upload_id: Option<String>,
    chunk_index: Option<String>,
    total_chunks: Option<String>,
    chunk_checksum: Option<String>,
    chunk: Option<Bytes>,
    file_name: Option<String>,
    file_size: Option<String>,
    mime_type: Option<String>,
}

impl ChunkForm {
    async fn read(mut multipart: Multipart) -> ApiResult<Self> {
        let mut form = Self::default();
        while let Some(field) = multipart
            .next_field()
            .await
            .map_err(|e| ApiError::Validation(format!("malformed multipart body: {e}")))?
        {
            let name = field.name().map(|s| s.to_string());
            match name.as_deref() {
                Some("upload_id") => form.upload_id = Some(Self::text(field).await?),
                Some("chunk_index") => form.chunk_index = Some(Self::text(field).await?),
                Some("total_chunks") => form.total_chunks = Some(Self::text(field).await?),
                Some("chunk_checksum") => form.chunk_checksum = Some(Self::text(field).await?),
                Some("chunk") => {
                    form.chunk = Some(field.bytes().await.map_err(|e| {
                        ApiError::Validation(format!("failed to read chunk bytes: {e}"))
                    })?);
                }
                Some("file_name") => form.file_name = Some(Self::text(field).await?),
                Some("file_size") => form.file_size = Some(Self::text(field).await?),
                Some("mime_type") => form.mime_type = Some(Self::text(field).await?),
                _ => {}
            }
        }
        Ok(form)
    }

    async fn text(field: axum::extract::multipart::Field<'_>) -> ApiResult<String> {
        field
            .text()
            .await
            .map_err(|e| ApiError::Validation(format!("failed to read form field: {e}")))
    }

    fn required<'a>(value: &'a Option<String>, name: &str) -> ApiResult<&'a str> {
        value
            .as_deref()
            .ok_or_else(|| ApiError::Validation(format!("missing form field '{name}'")))
    }
}

/// POST /upload/chunk - Receive one chunk of an upload session.
///
/// Chunks may arrive in any order, duplicated, and with gaps until
/// completion. Re-sending an index overwrites the previous file, so no
/// lock is taken here; the session row creation is an upsert to tolerate
/// concurrent first chunks.
#[tracing::instrument(skip(state, multipart))]
pub async fn upload_chunk(
    State(state): State<AppState>,
    multipart: Multipart,
) -> ApiResult<Json<ChunkUploadResponse>> {
    let form = ChunkForm::read(multipart).await?;

    let upload_id = UploadId::parse(ChunkForm::required(&form.upload_id, "upload_id")?)
        .map_err(|e| ApiError::Validation(e.to_string()))?;

    let chunk_index: u32 = ChunkForm::required(&form.chunk_index, "chunk_index")?
        .parse()
        .map_err(|_| ApiError::Validation("chunk_index must be a non-negative integer".into()))?;
    let total_chunks: u32 = ChunkForm::required(&form.total_chunks, "total_chunks")?
        .parse()
        .map_err(|_| ApiError::Validation("total_chunks must be a positive integer".into()))?;
    if total_chunks == 0 {
        return Err(ApiError::Validation("total_chunks must be at least 1".into()));
    }
    if chunk_index >= total_chunks {
        return Err(ApiError::Validation(format!(
            "chunk_index {chunk_index} out of range for total_chunks {total_chunks}"
        )));
    }

    let declared = Checksum::from_hex(
        &ChunkForm::required(&form.chunk_checksum, "chunk_checksum")?.to_lowercase(),
    )
    .map_err(|e| ApiError::Validation(e.to_string()))?;

    let chunk = form
        .chunk
        .ok_or_else(|| ApiError::Validation("missing form field 'chunk'".into()))?;
    if chunk.is_empty() {
        return Err(ApiError::Validation("chunk must not be empty".into()));
    }
    if chunk.len() as u64 > state.config.server.max_chunk_size {
        return Err(ApiError::Validation(format!(
            "chunk size {} exceeds maximum {}",
            chunk.len(),
            state.config.server.max_chunk_size
        )));
    }

    // Verify the bytes before any state is touched; the client retries
    // just this chunk on mismatch.
    let actual = Checksum::compute(&chunk);
    if actual != declared {
        return Err(ApiError::ChunkChecksumMismatch {
            expected: declared.to_hex(),
            actual: actual.to_hex(),
        });
    }

    let file_size = match form.file_size.as_deref() {
        Some(raw) => Some(raw.parse::<i64>().map_err(|_| {
            ApiError::Validation("file_size must be a non-negative integer".into())
        })?),
        None => None,
    };
    let metadata_json = form
        .mime_type
        .as_deref()
        .map(|mime| serde_json::json!({ "mime_type": mime }).to_string());

    let upload = state
        .metadata
        .create_or_get_upload(
            &NewUpload {
                upload_id: *upload_id.as_uuid(),
                original_filename: form.file_name.clone(),
                total_size: file_size,
                metadata_json,
            },
            OffsetDateTime::now_utc(),
        )
        .await?;

    let status = UploadStatus::parse(&upload.status)
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    if !status.accepts_chunks() {
        return Err(ApiError::NotAcceptingChunks(upload_id.to_string()));
    }

    state
        .storage
        .put_chunk(*upload_id.as_uuid(), chunk_index, chunk)
        .await?;

    tracing::debug!(
        upload_id = %upload_id,
        chunk_index,
        total_chunks,
        "Chunk accepted"
    );

    Ok(Json(ChunkUploadResponse {
        status: "ok".to_string(),
        received_chunk: chunk_index,
    }))
}

/// POST /upload/complete - Assemble the chunks into the canonical blob.
#[tracing::instrument(skip(state, body), fields(upload_id = %body.upload_id))]
pub async fn complete_upload(
    State(state): State<AppState>,
    Json(body): Json<CompleteUploadRequest>,
) -> ApiResult<Json<CompleteUploadResponse>> {
    let upload_id = UploadId::parse(&body.upload_id)
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    let declared = Checksum::from_hex(&body.file_checksum.to_lowercase())
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    let uuid = *upload_id.as_uuid();

    // Completion, processing attempts and attach recovery all serialize on
    // this lock.
    let _guard = state.locks.acquire(uuid).await;

    let upload = state
        .metadata
        .get_upload(uuid)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("upload {upload_id} not found")))?;

    let status =
        UploadStatus::parse(&upload.status).map_err(|e| ApiError::Internal(e.to_string()))?;
    let now = OffsetDateTime::now_utc();

    match status {
        UploadStatus::Complete => {
            // Repeated completion of a finished upload succeeds without
            // producing duplicate variants.
            return Ok(Json(CompleteUploadResponse {
                status: "assembled".to_string(),
                upload_id: upload_id.to_string(),
            }));
        }
        UploadStatus::Failed => {
            // A failed upload whose chunks are still on disk may be
            // re-driven; anything else stays failed.
            if state.storage.list_chunks(uuid).await?.is_empty() {
                return Err(ApiError::ProcessingFailed {
                    upload_id: upload_id.to_string(),
                    reason: "upload failed and no chunks remain".to_string(),
                });
            }
            state
                .metadata
                .update_status(upload.id, UploadStatus::Assembling.as_str(), now)
                .await?;
        }
        UploadStatus::Uploading => {
            state
                .metadata
                .update_status(upload.id, UploadStatus::Assembling.as_str(), now)
                .await?;
        }
        // An earlier completion attempt died mid-assembly; run it again.
        UploadStatus::Assembling => {}
    }

    let assembled = match assembler::assemble_upload(
        state.storage.as_ref(),
        uuid,
        upload.original_filename.as_deref(),
        &declared,
    )
    .await
    {
        Ok(assembled) => assembled,
        Err(e) => {
            let failed_at = OffsetDateTime::now_utc();
            state
                .metadata
                .update_status(upload.id, UploadStatus::Failed.as_str(), failed_at)
                .await?;
            return Err(match e {
                AssembleError::NoChunks => ApiError::NoChunks(upload_id.to_string()),
                AssembleError::MissingChunks { .. } => ApiError::MissingChunks {
                    upload_id: upload_id.to_string(),
                    detail: e.to_string(),
                },
                AssembleError::ChecksumMismatch { expected, actual } => {
                    // Chunks are retained so the client can re-drive
                    // completion with the right checksum.
                    ApiError::FileChecksumMismatch { expected, actual }
                }
                AssembleError::Storage(e) => ApiError::Storage(e),
            });
        }
    };

    let relative_path = format!("{uuid}/{}", assembled.blob_name);
    state
        .metadata
        .set_assembled(
            upload.id,
            &assembled.checksum.to_hex(),
            assembled.size as i64,
            &relative_path,
            OffsetDateTime::now_utc(),
        )
        .await?;

    // The job must observe the assembled blob: enqueue happens only after
    // the rename above succeeded.
    let source_path = state.storage.blob_path(uuid, &assembled.blob_name);
    state.jobs.enqueue(upload.id, &source_path).await?;

    // Chunk files are no longer needed; cleanup is best-effort.
    if let Err(e) = state.storage.delete_chunk_dir(uuid).await {
        tracing::warn!(upload_id = %upload_id, error = %e, "Failed to delete chunk directory");
    }

    tracing::info!(
        upload_id = %upload_id,
        size = assembled.size,
        "Upload assembled and processing enqueued"
    );

    Ok(Json(CompleteUploadResponse {
        status: "assembled".to_string(),
        upload_id: upload_id.to_string(),
    }))
}

/// GET /upload/{upload_id}/status - Report the session state.
#[tracing::instrument(skip(state))]
pub async fn get_upload_status(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<Json<UploadStatusResponse>> {
    let upload_id =
        UploadId::parse(&upload_id).map_err(|e| ApiError::Validation(e.to_string()))?;

    let upload = state
        .metadata
        .get_upload(*upload_id.as_uuid())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("upload {upload_id} not found")))?;

    let status =
        UploadStatus::parse(&upload.status).map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(UploadStatusResponse {
        upload_id: upload_id.to_string(),
        status,
        file_size: upload.file_size,
        file_checksum: upload.file_checksum,
    }))
}

/// GET /upload/{upload_id}/ready - True iff the `original` image record
/// exists, i.e. the processing job has done the part attachment needs.
#[tracing::instrument(skip(state))]
pub async fn get_upload_ready(
    State(state): State<AppState>,
    Path(upload_id): Path<String>,
) -> ApiResult<Json<UploadReadyResponse>> {
    let upload_id =
        UploadId::parse(&upload_id).map_err(|e| ApiError::Validation(e.to_string()))?;

    let upload = state
        .metadata
        .get_upload(*upload_id.as_uuid())
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("upload {upload_id} not found")))?;

    let ready = state
        .metadata
        .get_image(upload.id, ORIGINAL_VARIANT)
        .await?
        .is_some();

    Ok(Json(UploadReadyResponse { ready }))
}
