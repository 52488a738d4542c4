//! Application state shared across handlers.

use lightbox_core::config::AppConfig;
use lightbox_metadata::MetadataStore;
use lightbox_processor::{JobRunner, UploadLocks};
use lightbox_storage::BlobStore;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Application configuration.
    pub config: Arc<AppConfig>,
    /// Blob store backend.
    pub storage: Arc<dyn BlobStore>,
    /// Metadata store.
    pub metadata: Arc<dyn MetadataStore>,
    /// Per-upload serialization locks, shared with the job runner.
    pub locks: UploadLocks,
    /// Processing job runner handle, used to enqueue work.
    pub jobs: Arc<JobRunner>,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid; `main` validates earlier so
    /// this only trips in mis-assembled tests.
    pub fn new(
        config: AppConfig,
        storage: Arc<dyn BlobStore>,
        metadata: Arc<dyn MetadataStore>,
        locks: UploadLocks,
        jobs: Arc<JobRunner>,
    ) -> Self {
        if let Err(error) = config.validate() {
            panic!("Invalid configuration: {error}");
        }

        Self {
            config: Arc::new(config),
            storage,
            metadata,
            locks,
            jobs,
        }
    }
}
