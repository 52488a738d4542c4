//! Core domain types and shared logic for the Lightbox image ingest server.
//!
//! This crate defines the canonical data model used across all other crates:
//! - Upload session identifiers and lifecycle
//! - MD5 checksums as exchanged on the wire
//! - Chunk file naming and index parsing
//! - Image variant tags and target sizes
//! - Configuration types

pub mod checksum;
pub mod chunk;
pub mod config;
pub mod error;
pub mod upload;
pub mod variant;

pub use checksum::{Checksum, ChecksumHasher};
pub use chunk::{chunk_file_name, parse_chunk_index};
pub use error::{Error, Result};
pub use upload::{UploadId, UploadStatus};
pub use variant::{ORIGINAL_VARIANT, VariantSpec};

/// Chunk size used by the reference client: 5 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Maximum accepted chunk size: 16 MiB.
pub const MAX_CHUNK_SIZE: u64 = 16 * 1024 * 1024;
