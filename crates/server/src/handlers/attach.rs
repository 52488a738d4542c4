//! Attachment resolver handler.

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;
use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use lightbox_core::upload::{
    AttachPendingResponse, AttachRequest, AttachResponse, UploadId, UploadStatus,
};
use lightbox_core::variant::ORIGINAL_VARIANT;
use lightbox_metadata::models::{ImageRow, UploadRow};
use lightbox_metadata::repos::JobState;
use time::OffsetDateTime;

/// POST /upload/attach-to-product - Bind a completed upload's image to a
/// catalog product.
///
/// This endpoint only observes the upload's status; it never infers
/// completion. Uploads still in flight get a 202 with `processing_time` so
/// clients can back off, and a `failed` upload whose assembled blob
/// survived is resurrected through the recovery path.
#[tracing::instrument(skip(state, body), fields(upload_id = %body.upload_id, sku = %body.sku))]
pub async fn attach_to_product(
    State(state): State<AppState>,
    Json(body): Json<AttachRequest>,
) -> ApiResult<Response> {
    let upload_id = UploadId::parse(&body.upload_id)
        .map_err(|e| ApiError::Validation(e.to_string()))?;
    let uuid = *upload_id.as_uuid();

    let mut upload = state
        .metadata
        .get_upload(uuid)
        .await?
        .ok_or_else(|| ApiError::Validation(format!("unknown upload_id {upload_id}")))?;

    let product = state
        .metadata
        .get_product_by_sku(&body.sku)
        .await?
        .ok_or_else(|| ApiError::Validation(format!("unknown sku '{}'", body.sku)))?;

    let mut status =
        UploadStatus::parse(&upload.status).map_err(|e| ApiError::Internal(e.to_string()))?;
    let now = OffsetDateTime::now_utc();
    let since_update = now - upload.updated_at;

    match status {
        UploadStatus::Complete => {}
        UploadStatus::Uploading | UploadStatus::Assembling => {
            if since_update <= state.config.attach.ready_wait() {
                return Ok(pending_response(status, since_update));
            }

            // Stale by the clock, but a queued or running processing job is
            // progress, not a stall; a slow attempt may legitimately take
            // up to the per-attempt timeout.
            let has_active_job = state
                .metadata
                .list_jobs_for_upload(upload.id)
                .await?
                .iter()
                .any(|job| {
                    job.state == JobState::Queued.as_str()
                        || job.state == JobState::Running.as_str()
                });
            if has_active_job {
                return Ok(pending_response(status, since_update));
            }

            // Nothing has touched this upload within the wait threshold;
            // declare it dead rather than keeping the client polling. A
            // processing attempt may finish while we wait on the lock, so
            // the transition is guarded: only fail the upload if it is
            // still stuck where we saw it.
            let stalled = {
                let _guard = state.locks.acquire(uuid).await;
                state
                    .metadata
                    .update_status_if(
                        upload.id,
                        status.as_str(),
                        UploadStatus::Failed.as_str(),
                        OffsetDateTime::now_utc(),
                    )
                    .await?
            };
            if stalled {
                return Err(ApiError::ProcessingFailed {
                    upload_id: upload_id.to_string(),
                    reason: format!(
                        "stalled in '{}' for {}s",
                        status,
                        since_update.whole_seconds()
                    ),
                });
            }

            // The row moved on while we waited; re-read and dispatch on
            // what it is now.
            upload = state
                .metadata
                .get_upload(uuid)
                .await?
                .ok_or_else(|| ApiError::Validation(format!("unknown upload_id {upload_id}")))?;
            status = UploadStatus::parse(&upload.status)
                .map_err(|e| ApiError::Internal(e.to_string()))?;

            let elapsed = OffsetDateTime::now_utc() - upload.updated_at;
            match status {
                UploadStatus::Complete => {}
                UploadStatus::Failed => {
                    return recover_failed_upload(&state, &upload, elapsed.whole_seconds())
                        .await;
                }
                UploadStatus::Uploading | UploadStatus::Assembling => {
                    return Ok(pending_response(status, elapsed));
                }
            }
        }
        UploadStatus::Failed => {
            return recover_failed_upload(&state, &upload, since_update.whole_seconds()).await;
        }
    }

    let image = resolve_image(&state, &upload).await?;

    let link = state
        .metadata
        .attach_image(product.id, image.id, body.is_primary, now)
        .await?;

    tracing::info!(
        upload_id = %upload_id,
        sku = %body.sku,
        image_id = image.id,
        product_id = product.id,
        is_primary = link.is_primary,
        "Image attached to product"
    );

    Ok(Json(AttachResponse {
        status: "success".to_string(),
        image_id: image.id,
        product_id: product.id,
        is_primary: link.is_primary,
    })
    .into_response())
}

/// 202 body for an upload that is still in flight.
fn pending_response(status: UploadStatus, elapsed: time::Duration) -> Response {
    let label = match status {
        UploadStatus::Uploading => "uploading",
        _ => "processing",
    };
    (
        StatusCode::ACCEPTED,
        Json(AttachPendingResponse {
            status: label.to_string(),
            processing_time: elapsed.whole_seconds(),
        }),
    )
        .into_response()
}

/// Recovery escape hatch: if the assembled blob of a failed upload is
/// still on disk, reset the session and re-dispatch the processing job.
async fn recover_failed_upload(
    state: &AppState,
    upload: &UploadRow,
    processing_time: i64,
) -> ApiResult<Response> {
    let Some(relative_path) = upload.path.as_deref() else {
        return Err(ApiError::ProcessingFailed {
            upload_id: upload.upload_id.to_string(),
            reason: "upload failed before assembly".to_string(),
        });
    };
    let blob_name = relative_path
        .rsplit_once('/')
        .map(|(_, name)| name)
        .unwrap_or(relative_path);

    if !state.storage.blob_exists(upload.upload_id, blob_name).await? {
        return Err(ApiError::ProcessingFailed {
            upload_id: upload.upload_id.to_string(),
            reason: "assembled file no longer exists".to_string(),
        });
    }

    let _guard = state.locks.acquire(upload.upload_id).await;
    state
        .metadata
        .update_status(
            upload.id,
            UploadStatus::Uploading.as_str(),
            OffsetDateTime::now_utc(),
        )
        .await?;

    let source_path = state.storage.blob_path(upload.upload_id, blob_name);
    state.jobs.enqueue(upload.id, &source_path).await?;

    tracing::warn!(
        upload_id = %upload.upload_id,
        "Re-dispatched processing for failed upload with surviving blob"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(AttachPendingResponse {
            status: "processing".to_string(),
            processing_time,
        }),
    )
        .into_response())
}

/// Find the image to bind: the `original` variant, or the first available
/// variant as a degraded fallback.
async fn resolve_image(state: &AppState, upload: &UploadRow) -> ApiResult<ImageRow> {
    if let Some(original) = state
        .metadata
        .get_image(upload.id, ORIGINAL_VARIANT)
        .await?
    {
        return Ok(original);
    }

    let variants = state.metadata.list_images(upload.id).await?;
    if let Some(first) = variants.into_iter().next() {
        tracing::warn!(
            upload_id = %upload.upload_id,
            variant = %first.variant,
            "Original image record missing, binding first available variant"
        );
        return Ok(first);
    }

    // Status says complete but no image rows exist: internal inconsistency.
    state
        .metadata
        .update_status(
            upload.id,
            UploadStatus::Failed.as_str(),
            OffsetDateTime::now_utc(),
        )
        .await?;
    Err(ApiError::InconsistentState(format!(
        "upload {} is complete but has no image records",
        upload.upload_id
    )))
}
