//! Configuration types shared across crates.

use crate::variant::{ORIGINAL_VARIANT, VariantSpec, default_variants};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Server configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address (e.g., "0.0.0.0:8080").
    #[serde(default = "default_bind")]
    pub bind: String,
    /// Maximum accepted chunk size in bytes.
    #[serde(default = "default_max_chunk_size")]
    pub max_chunk_size: u64,
}

fn default_bind() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_max_chunk_size() -> u64 {
    crate::MAX_CHUNK_SIZE
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            max_chunk_size: default_max_chunk_size(),
        }
    }
}

/// Blob store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BlobConfig {
    /// Root directory of the blob store.
    #[serde(default = "default_blob_root")]
    pub root: PathBuf,
}

fn default_blob_root() -> PathBuf {
    PathBuf::from("./data/blobs")
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            root: default_blob_root(),
        }
    }
}

/// Metadata store configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MetadataConfig {
    /// SQLite database file path.
    #[serde(default = "default_metadata_path")]
    pub path: PathBuf,
}

fn default_metadata_path() -> PathBuf {
    PathBuf::from("./data/metadata.db")
}

impl Default for MetadataConfig {
    fn default() -> Self {
        Self {
            path: default_metadata_path(),
        }
    }
}

/// Processing job runner configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct JobConfig {
    /// Maximum attempts per processing job.
    #[serde(default = "default_job_tries")]
    pub tries: u32,
    /// Per-attempt timeout in seconds.
    #[serde(default = "default_job_timeout_s")]
    pub timeout_s: u64,
    /// How long an idle worker sleeps between queue polls, in milliseconds.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Number of background workers consuming the queue.
    #[serde(default = "default_workers")]
    pub workers: usize,
}

fn default_job_tries() -> u32 {
    3
}

fn default_job_timeout_s() -> u64 {
    300
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_workers() -> usize {
    2
}

impl Default for JobConfig {
    fn default() -> Self {
        Self {
            tries: default_job_tries(),
            timeout_s: default_job_timeout_s(),
            poll_interval_ms: default_poll_interval_ms(),
            workers: default_workers(),
        }
    }
}

impl JobConfig {
    /// Get the per-attempt timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_s)
    }

    /// Get the poll interval as a Duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    /// Validate job configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.tries == 0 {
            return Err("job.tries must be at least 1".to_string());
        }
        if self.timeout_s == 0 {
            return Err("job.timeout_s must be at least 1 second".to_string());
        }
        if self.workers == 0 {
            return Err("job.workers must be at least 1".to_string());
        }
        Ok(())
    }
}

/// Image pipeline configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ImageConfig {
    /// JPEG quality for resized variants (1-100).
    #[serde(default = "default_jpeg_quality")]
    pub jpeg_quality: u8,
    /// Ordered list of derived variants. The `original` pseudo-variant is
    /// implicit and always produced.
    #[serde(default = "default_variants")]
    pub variants: Vec<VariantSpec>,
}

fn default_jpeg_quality() -> u8 {
    90
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: default_jpeg_quality(),
            variants: default_variants(),
        }
    }
}

impl ImageConfig {
    /// Validate image configuration invariants.
    pub fn validate(&self) -> Result<(), String> {
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(format!(
                "image.jpeg_quality must be between 1 and 100, got {}",
                self.jpeg_quality
            ));
        }
        if self.variants.is_empty() {
            return Err("image.variants must not be empty".to_string());
        }
        let mut seen = std::collections::HashSet::new();
        for variant in &self.variants {
            if variant.tag == ORIGINAL_VARIANT {
                return Err(format!(
                    "image.variants must not redefine the implicit '{ORIGINAL_VARIANT}' variant"
                ));
            }
            if variant.longest_side == 0 {
                return Err(format!(
                    "image.variants entry '{}' has a zero longest_side",
                    variant.tag
                ));
            }
            if !seen.insert(variant.tag.as_str()) {
                return Err(format!("duplicate variant tag '{}'", variant.tag));
            }
        }
        Ok(())
    }
}

/// Attachment resolver configuration.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AttachConfig {
    /// Seconds after which a stuck non-complete upload is declared failed
    /// when attachment is requested.
    #[serde(default = "default_ready_wait_s")]
    pub ready_wait_s: u64,
}

fn default_ready_wait_s() -> u64 {
    30
}

impl Default for AttachConfig {
    fn default() -> Self {
        Self {
            ready_wait_s: default_ready_wait_s(),
        }
    }
}

impl AttachConfig {
    /// Get the ready-wait threshold as a time Duration.
    pub fn ready_wait(&self) -> time::Duration {
        let secs = i64::try_from(self.ready_wait_s).unwrap_or(i64::MAX);
        time::Duration::seconds(secs)
    }
}

/// Complete application configuration.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Blob store configuration.
    #[serde(default)]
    pub blob: BlobConfig,
    /// Metadata store configuration.
    #[serde(default)]
    pub metadata: MetadataConfig,
    /// Job runner configuration.
    #[serde(default)]
    pub job: JobConfig,
    /// Image pipeline configuration.
    #[serde(default)]
    pub image: ImageConfig,
    /// Attachment resolver configuration.
    #[serde(default)]
    pub attach: AttachConfig,
}

impl AppConfig {
    /// Validate the whole configuration.
    pub fn validate(&self) -> Result<(), String> {
        self.job.validate()?;
        self.image.validate()?;
        Ok(())
    }

    /// Create a test configuration with sensible defaults.
    ///
    /// **For testing only.** Paths still need to be pointed at temp dirs.
    pub fn for_testing() -> Self {
        Self {
            job: JobConfig {
                poll_interval_ms: 50,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}
