//! Upload session types and lifecycle.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an upload session, chosen by the client.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UploadId(Uuid);

impl UploadId {
    /// Generate a new random upload ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from a string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| crate::Error::UploadSession(format!("invalid upload ID: {e}")))
    }

    /// Get the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for UploadId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "UploadId({})", self.0)
    }
}

impl fmt::Display for UploadId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Upload session state.
///
/// Transitions are monotonic: `uploading -> assembling -> complete`, with
/// `failed` reachable from any non-terminal state. The attach recovery path
/// may reset a failed upload back to `uploading`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    /// Session is accepting chunks.
    Uploading,
    /// Chunks were assembled; variants are not yet recorded.
    Assembling,
    /// All variants produced; terminal success.
    Complete,
    /// Terminal failure (recoverable only through the attach escape hatch).
    Failed,
}

impl UploadStatus {
    /// The string stored in the metadata store.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Uploading => "uploading",
            Self::Assembling => "assembling",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }

    /// Parse from the stored string.
    pub fn parse(s: &str) -> crate::Result<Self> {
        match s {
            "uploading" => Ok(Self::Uploading),
            "assembling" => Ok(Self::Assembling),
            "complete" => Ok(Self::Complete),
            "failed" => Ok(Self::Failed),
            other => Err(crate::Error::InvalidStatus(other.to_string())),
        }
    }

    /// Whether new chunks are accepted in this state.
    pub fn accepts_chunks(&self) -> bool {
        matches!(self, Self::Uploading)
    }

    /// Whether the state is terminal.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Response from accepting a chunk.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChunkUploadResponse {
    /// Always "ok".
    pub status: String,
    /// The accepted zero-based chunk index.
    pub received_chunk: u32,
}

/// Request to finish an upload and assemble the file.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompleteUploadRequest {
    /// The upload session ID.
    pub upload_id: String,
    /// MD5 of the whole file, lowercase hex.
    pub file_checksum: String,
}

/// Response from a successful completion.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CompleteUploadResponse {
    /// Always "assembled".
    pub status: String,
    /// The upload session ID.
    pub upload_id: String,
}

/// Response from querying upload status.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadStatusResponse {
    pub upload_id: String,
    pub status: UploadStatus,
    pub file_size: Option<i64>,
    pub file_checksum: Option<String>,
}

/// Response from the readiness probe.
///
/// `ready` is true iff the `original` image record exists, which is what
/// the attach endpoint ultimately needs.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct UploadReadyResponse {
    pub ready: bool,
}

/// Request to attach a completed upload's image to a product.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttachRequest {
    pub upload_id: String,
    pub sku: String,
    #[serde(default)]
    pub is_primary: bool,
}

/// Response from a successful attach.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttachResponse {
    /// Always "success".
    pub status: String,
    pub image_id: i64,
    pub product_id: i64,
    pub is_primary: bool,
}

/// 202 response body while the upload is still being processed.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttachPendingResponse {
    /// "uploading" or "processing".
    pub status: String,
    /// Seconds since the upload row was last updated, for client backoff.
    pub processing_time: i64,
}
