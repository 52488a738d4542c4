//! Processing error types.

use thiserror::Error;

/// Format missing chunk indices for display, capped to keep messages small.
fn format_missing(missing: &[u32]) -> String {
    const MAX_DISPLAYED: usize = 5;
    if missing.len() <= MAX_DISPLAYED {
        format!("{missing:?}")
    } else {
        let sample: Vec<_> = missing.iter().take(MAX_DISPLAYED).collect();
        format!("{:?} (and {} more)", sample, missing.len() - MAX_DISPLAYED)
    }
}

/// Errors from assembling a session's chunks into the canonical blob.
#[derive(Debug, Error)]
pub enum AssembleError {
    #[error("no chunks uploaded")]
    NoChunks,

    #[error("missing chunks {}: indices must form 0..{expected}", format_missing(.missing))]
    MissingChunks { expected: u32, missing: Vec<u32> },

    #[error("file checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("storage error: {0}")]
    Storage(#[from] lightbox_storage::StorageError),
}

/// Errors from the image variant pipeline. All of these are retryable from
/// the job runner's point of view.
#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("source file unreadable: {0}")]
    SourceUnreadable(String),

    #[error("image decode failed: {0}")]
    Decode(String),

    #[error("image encode failed: {0}")]
    Encode(String),

    #[error("storage error: {0}")]
    Storage(#[from] lightbox_storage::StorageError),

    #[error("metadata error: {0}")]
    Metadata(#[from] lightbox_metadata::MetadataError),

    #[error("internal error: {0}")]
    Internal(String),
}
