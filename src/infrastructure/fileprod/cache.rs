//! Per-path blob cache with single-flight production.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::Mutex;

/// A produced blob together with its resolved content type.
#[derive(Debug, Clone)]
pub struct CachedBlob {
    pub bytes: Bytes,
    pub content_type: String,
    /// Epoch milliseconds when the blob was produced
    pub generated_at: i64,
}

/// Shared handle to a cached blob.
pub type Blob = Arc<CachedBlob>;

#[derive(Debug, Default)]
pub(crate) struct Slot {
    pub(crate) blob: Option<Blob>,
}

/// Cache keyed by resolved path.
///
/// Each path owns one slot guarded by its own mutex; a producer runs while
/// that mutex is held, so concurrent requests for the same path wait on the
/// slot and then share the freshly produced blob.
#[derive(Debug)]
pub struct BlobCache {
    slots: Mutex<HashMap<String, Arc<Mutex<Slot>>>>,
    max_age_ms: i64,
}

impl BlobCache {
    pub fn new(max_age: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            max_age_ms: max_age.as_millis() as i64,
        }
    }

    pub(crate) async fn slot(&self, path: &str) -> Arc<Mutex<Slot>> {
        let mut slots = self.slots.lock().await;
        slots.entry(path.to_string()).or_default().clone()
    }

    pub(crate) fn is_fresh(&self, blob: &CachedBlob, now: i64) -> bool {
        now - blob.generated_at < self.max_age_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_slots_are_shared_per_path() {
        // given:
        let cache = BlobCache::new(Duration::from_secs(60));

        // when:
        let a = cache.slot("/x").await;
        let b = cache.slot("/x").await;
        let c = cache.slot("/y").await;

        // then:
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[tokio::test]
    async fn test_freshness_window() {
        // given:
        let cache = BlobCache::new(Duration::from_secs(10));
        let blob = CachedBlob {
            bytes: Bytes::new(),
            content_type: "text/plain".to_string(),
            generated_at: 1_000_000,
        };

        // then:
        assert!(cache.is_fresh(&blob, 1_000_000 + 9_999));
        assert!(!cache.is_fresh(&blob, 1_000_000 + 10_000));
    }
}
