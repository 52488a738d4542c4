//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid checksum: {0}")]
    InvalidChecksum(String),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("invalid chunk file name: {0}")]
    InvalidChunkName(String),

    #[error("upload session error: {0}")]
    UploadSession(String),

    #[error("invalid upload status: {0}")]
    InvalidStatus(String),

    #[error("invalid variant: {0}")]
    InvalidVariant(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
