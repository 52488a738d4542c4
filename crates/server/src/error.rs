//! API error types.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// API error response.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error code for programmatic handling.
    pub code: String,
    /// Human-readable error message.
    pub message: String,
}

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("chunk checksum mismatch: expected {expected}, got {actual}")]
    ChunkChecksumMismatch { expected: String, actual: String },

    #[error("file checksum mismatch: expected {expected}, got {actual}")]
    FileChecksumMismatch { expected: String, actual: String },

    #[error("no chunks uploaded for {0}")]
    NoChunks(String),

    #[error("missing chunks for {upload_id}: {detail}")]
    MissingChunks { upload_id: String, detail: String },

    #[error("upload {0} is not accepting chunks")]
    NotAcceptingChunks(String),

    #[error("upload {upload_id} failed: {reason}")]
    ProcessingFailed { upload_id: String, reason: String },

    #[error("inconsistent state: {0}")]
    InconsistentState(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("storage error: {0}")]
    Storage(#[from] lightbox_storage::StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] lightbox_metadata::MetadataError),

    #[error("core error: {0}")]
    Core(#[from] lightbox_core::Error),
}

impl ApiError {
    /// Get the error code for this error.
    pub fn code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Validation(_) => "validation_failed",
            Self::ChunkChecksumMismatch { .. } => "chunk_checksum_mismatch",
            Self::FileChecksumMismatch { .. } => "checksum_mismatch",
            Self::NoChunks(_) => "no_chunks",
            Self::MissingChunks { .. } => "missing_chunks",
            Self::NotAcceptingChunks(_) => "not_accepting_chunks",
            Self::ProcessingFailed { .. } => "processing_failed",
            Self::InconsistentState(_) => "inconsistent_state",
            Self::Internal(_) => "internal_error",
            Self::Storage(_) => "storage_error",
            Self::Metadata(_) => "metadata_error",
            Self::Core(_) => "validation_failed",
        }
    }

    /// Get the HTTP status code for this error.
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ChunkChecksumMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::FileChecksumMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NoChunks(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::MissingChunks { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotAcceptingChunks(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::ProcessingFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::InconsistentState(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Storage(e) => match e {
                lightbox_storage::StorageError::NotFound(_) => StatusCode::NOT_FOUND,
                lightbox_storage::StorageError::InvalidName(_) => StatusCode::UNPROCESSABLE_ENTITY,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Metadata(e) => match e {
                lightbox_metadata::MetadataError::NotFound(_) => StatusCode::NOT_FOUND,
                lightbox_metadata::MetadataError::AlreadyExists(_) => StatusCode::CONFLICT,
                lightbox_metadata::MetadataError::Constraint(_) => StatusCode::CONFLICT,
                _ => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Core(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            code: self.code().to_string(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

/// Result type for API handlers.
pub type ApiResult<T> = std::result::Result<T, ApiError>;
