//! Blob storage for upload sessions.
//!
//! All blobs live under a session-scoped namespace rooted at a configured
//! directory:
//!
//! ```text
//! <root>/tmp/<upload_id>/chunk_<index>.part   -- per-chunk temp files
//! <root>/<upload_id>/original(.<ext>)         -- assembled canonical blob
//! <root>/<upload_id>/<variant>.jpg            -- derived variants
//! ```
//!
//! Every write finalizes atomically (write-temp-then-rename).

pub mod backends;
pub mod error;
pub mod traits;

pub use backends::filesystem::FilesystemStore;
pub use error::{StorageError, StorageResult};
pub use traits::{BlobStore, StreamingUpload};
