//! Database models mapping to the metadata schema.

use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// Upload sessions
// =============================================================================

/// Upload session record.
///
/// `id` is the server-assigned monotonic id; `upload_id` is the
/// client-chosen UUID. `file_checksum` and `path` are set at assembly.
#[derive(Debug, Clone, FromRow)]
pub struct UploadRow {
    pub id: i64,
    pub upload_id: Uuid,
    pub original_filename: Option<String>,
    /// Size declared by the client at chunk upload time (advisory).
    pub total_size: Option<i64>,
    /// Size of the assembled file, measured server-side.
    pub file_size: Option<i64>,
    /// MD5 of the assembled file, lowercase hex.
    pub file_checksum: Option<String>,
    pub status: String,
    /// Arbitrary client metadata as a JSON object.
    pub metadata_json: Option<String>,
    /// Storage-relative path of the canonical blob, e.g. "<uuid>/original.jpg".
    pub path: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Fields supplied when an upload row is created lazily on first chunk.
#[derive(Debug, Clone, Default)]
pub struct NewUpload {
    pub upload_id: Uuid,
    pub original_filename: Option<String>,
    pub total_size: Option<i64>,
    pub metadata_json: Option<String>,
}

// =============================================================================
// Images
// =============================================================================

/// Image variant record, keyed by `(upload_id, variant)`.
#[derive(Debug, Clone, FromRow)]
pub struct ImageRow {
    pub id: i64,
    /// The owning upload's numeric id.
    pub upload_id: i64,
    pub variant: String,
    /// Storage-relative path of the encoded file.
    pub path: String,
    pub mime_type: Option<String>,
    pub width: i64,
    pub height: i64,
    /// MD5 of the file at `path`, lowercase hex.
    pub checksum: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Fields for upserting an image variant record.
#[derive(Debug, Clone)]
pub struct NewImage {
    pub upload_id: i64,
    pub variant: String,
    pub path: String,
    pub mime_type: Option<String>,
    pub width: i64,
    pub height: i64,
    pub checksum: Option<String>,
}

// =============================================================================
// Catalog products and links
// =============================================================================

/// Catalog product record. The catalog CRUD surface is external; the core
/// only resolves products by SKU and maintains the primary-image column.
#[derive(Debug, Clone, FromRow)]
pub struct ProductRow {
    pub id: i64,
    pub sku: String,
    pub name: Option<String>,
    pub primary_image_id: Option<i64>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Product-image link with the primary flag.
#[derive(Debug, Clone, FromRow)]
pub struct ProductImageRow {
    pub product_id: i64,
    pub image_id: i64,
    pub is_primary: bool,
    pub created_at: OffsetDateTime,
}

// =============================================================================
// Processing jobs
// =============================================================================

/// Processing job record.
#[derive(Debug, Clone, FromRow)]
pub struct JobRow {
    pub job_id: Uuid,
    /// The owning upload's numeric id.
    pub upload_id: i64,
    /// Absolute path of the assembled source blob.
    pub source_path: String,
    pub state: String,
    /// Attempts consumed so far, including the one currently running.
    pub attempts: i64,
    pub last_error: Option<String>,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}
