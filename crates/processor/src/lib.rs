//! Assembly and background image processing for Lightbox.
//!
//! Three pieces live here:
//! - the assembler, which concatenates a session's chunks into the
//!   canonical blob under whole-file checksum verification;
//! - the variant pipeline, which decodes an assembled image and derives
//!   the configured set of resized JPEG variants;
//! - the job runner, a pool of workers draining the durable processing
//!   queue with retries and a per-attempt timeout.

pub mod assembler;
pub mod error;
pub mod locks;
pub mod runner;
pub mod variants;

pub use assembler::{AssembledFile, assemble_upload};
pub use error::{AssembleError, ProcessError};
pub use locks::UploadLocks;
pub use runner::JobRunner;
pub use variants::process_upload;
