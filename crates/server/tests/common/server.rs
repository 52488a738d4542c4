//! Server test utilities.

use crate::common::fixtures::{BOUNDARY, ChunkFormFields, md5_hex, multipart_chunk_body};
use axum::body::Body;
use axum::http::{Request, StatusCode};
use lightbox_core::config::AppConfig;
use lightbox_metadata::{MetadataStore, SqliteStore};
use lightbox_processor::{JobRunner, UploadLocks};
use lightbox_server::{AppState, create_router};
use lightbox_storage::{BlobStore, FilesystemStore};
use serde_json::Value;
use std::sync::Arc;
use tempfile::TempDir;
use tower::ServiceExt;

/// A test server wrapper with all dependencies.
/// Note: #[allow(dead_code)] because each test file compiles common/ separately.
#[allow(dead_code)]
pub struct TestServer {
    pub router: axum::Router,
    pub state: AppState,
    _temp_dir: TempDir,
}

#[allow(dead_code)]
impl TestServer {
    /// Create a new test server with temporary storage and fast polling.
    pub async fn new() -> Self {
        Self::with_config(|_| {}).await
    }

    /// Create a test server with custom config modifications.
    pub async fn with_config<F>(modifier: F) -> Self
    where
        F: FnOnce(&mut AppConfig),
    {
        let temp_dir = tempfile::tempdir().expect("Failed to create temp directory");

        let storage_path = temp_dir.path().join("blobs");
        let storage: Arc<dyn BlobStore> = Arc::new(
            FilesystemStore::new(&storage_path)
                .await
                .expect("Failed to create blob store"),
        );

        let db_path = temp_dir.path().join("metadata.db");
        let metadata: Arc<dyn MetadataStore> = Arc::new(
            SqliteStore::new(&db_path)
                .await
                .expect("Failed to create metadata store"),
        );

        let mut config = AppConfig::for_testing();
        config.blob.root = storage_path;
        config.metadata.path = db_path;
        modifier(&mut config);

        let locks = UploadLocks::new();
        let jobs = JobRunner::new(
            metadata.clone(),
            storage.clone(),
            config.job.clone(),
            config.image.clone(),
            locks.clone(),
        );
        // Worker tasks live for as long as the test runtime.
        let _workers = jobs.spawn_workers();

        let state = AppState::new(config, storage, metadata, locks, jobs);
        let router = create_router(state.clone());

        Self {
            router,
            state,
            _temp_dir: temp_dir,
        }
    }

    /// Get access to the underlying metadata store.
    pub fn metadata(&self) -> Arc<dyn MetadataStore> {
        self.state.metadata.clone()
    }

    /// Make a JSON request and decode the JSON response.
    pub async fn json_request(
        &self,
        method: &str,
        uri: &str,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = match body {
            Some(v) => {
                builder = builder.header("Content-Type", "application/json");
                Body::from(serde_json::to_vec(&v).unwrap())
            }
            None => Body::empty(),
        };

        let request = builder.body(body).unwrap();
        let response = self.router.clone().oneshot(request).await.unwrap();

        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();

        let json: Value = if body_bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&body_bytes).unwrap_or(Value::Null)
        };

        (status, json)
    }

    /// Submit one chunk with a correct checksum.
    pub async fn send_chunk(
        &self,
        upload_id: &str,
        chunk_index: u32,
        total_chunks: u32,
        chunk: &[u8],
    ) -> (StatusCode, Value) {
        let checksum = md5_hex(chunk);
        self.send_chunk_with_checksum(upload_id, chunk_index, total_chunks, chunk, &checksum)
            .await
    }

    /// Submit one chunk with an explicit (possibly wrong) checksum.
    pub async fn send_chunk_with_checksum(
        &self,
        upload_id: &str,
        chunk_index: u32,
        total_chunks: u32,
        chunk: &[u8],
        chunk_checksum: &str,
    ) -> (StatusCode, Value) {
        let body = multipart_chunk_body(&ChunkFormFields {
            upload_id,
            chunk_index,
            total_chunks,
            chunk_checksum,
            chunk,
            file_name: Some("photo.png"),
            mime_type: Some("image/png"),
        });

        let request = Request::builder()
            .method("POST")
            .uri("/upload/chunk")
            .header(
                "Content-Type",
                format!("multipart/form-data; boundary={BOUNDARY}"),
            )
            .body(Body::from(body))
            .unwrap();

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);
        (status, json)
    }

    /// POST /upload/complete.
    pub async fn complete(&self, upload_id: &str, file_checksum: &str) -> (StatusCode, Value) {
        self.json_request(
            "POST",
            "/upload/complete",
            Some(serde_json::json!({
                "upload_id": upload_id,
                "file_checksum": file_checksum,
            })),
        )
        .await
    }

    /// POST /upload/attach-to-product.
    pub async fn attach(
        &self,
        upload_id: &str,
        sku: &str,
        is_primary: bool,
    ) -> (StatusCode, Value) {
        self.json_request(
            "POST",
            "/upload/attach-to-product",
            Some(serde_json::json!({
                "upload_id": upload_id,
                "sku": sku,
                "is_primary": is_primary,
            })),
        )
        .await
    }

    /// Poll /status until the upload reaches `want` or the deadline passes.
    pub async fn wait_for_status(&self, upload_id: &str, want: &str) {
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(10);
        loop {
            let (status, body) = self
                .json_request("GET", &format!("/upload/{upload_id}/status"), None)
                .await;
            assert_eq!(status, StatusCode::OK, "status endpoint failed: {body}");
            let current = body.get("status").and_then(|v| v.as_str()).unwrap_or("");
            if current == want {
                return;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("upload {upload_id} never reached '{want}', stuck at '{current}'");
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    }

    /// Poll /ready until it reports true.
    pub async fn wait_for_ready(&self, upload_id: &str) {
        let deadline = tokio::time::Instant::now() + std::time::Duration::from_secs(10);
        loop {
            let (status, body) = self
                .json_request("GET", &format!("/upload/{upload_id}/ready"), None)
                .await;
            assert_eq!(status, StatusCode::OK, "ready endpoint failed: {body}");
            if body.get("ready").and_then(|v| v.as_bool()) == Some(true) {
                return;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("upload {upload_id} never became ready");
            }
            tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        }
    }

    /// Upload `data` in chunks of `chunk_size` and complete the session.
    /// Returns the whole-file checksum.
    pub async fn upload_file(&self, upload_id: &str, data: &[u8], chunk_size: usize) -> String {
        let chunks: Vec<&[u8]> = data.chunks(chunk_size).collect();
        let total = chunks.len() as u32;
        for (index, chunk) in chunks.iter().enumerate() {
            let (status, body) = self.send_chunk(upload_id, index as u32, total, chunk).await;
            assert_eq!(status, StatusCode::OK, "chunk {index} rejected: {body}");
        }
        let checksum = md5_hex(data);
        let (status, body) = self.complete(upload_id, &checksum).await;
        assert_eq!(status, StatusCode::OK, "complete failed: {body}");
        checksum
    }

    /// Seed a catalog product and return its id.
    pub async fn create_product(&self, sku: &str) -> i64 {
        self.state
            .metadata
            .create_product(sku, Some("Test product"), time::OffsetDateTime::now_utc())
            .await
            .expect("Failed to create product")
            .id
    }
}
