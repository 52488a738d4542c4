//! Per-upload serialization locks.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Registry of async mutexes keyed by upload id.
///
/// All mutations of a single upload's row and of its session directory are
/// serialized through this registry: `completeUpload`, every processing
/// attempt and the attach recovery path acquire the same lock. Chunk writes
/// deliberately do not; they rely on filename uniqueness and atomic rename.
///
/// Entries are never evicted; the map is bounded by the sessions this
/// process has touched.
#[derive(Clone, Default)]
pub struct UploadLocks {
    inner: Arc<Mutex<HashMap<Uuid, Arc<Mutex<()>>>>>,
}

impl UploadLocks {
    /// Create an empty lock registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for an upload, waiting if another task holds it.
    pub async fn acquire(&self, upload_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = {
            let mut map = self.inner.lock().await;
            map.entry(upload_id)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        lock.lock_owned().await
    }
}
