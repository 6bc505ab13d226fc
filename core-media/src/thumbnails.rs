//! Thumbnail blob cache
//!
//! Items never change after upload, so an entry is never stale; entries
//! only expire after sitting unused for the idle TTL, or when the LRU is
//! full.

use std::num::NonZeroUsize;
use std::sync::Arc;

use bridge_traits::time::Clock;
use chrono::{DateTime, Duration, Utc};
use lru::LruCache;
use parking_lot::Mutex;
use tracing::{debug, instrument};

use crate::api::MediaApi;
use crate::error::Result;
use crate::models::MediaBlob;

pub const DEFAULT_THUMBNAIL_CAPACITY: usize = 256;

pub fn default_idle_ttl() -> Duration {
    Duration::minutes(30)
}

struct Entry {
    blob: MediaBlob,
    last_access: DateTime<Utc>,
}

pub struct ThumbnailCache {
    api: Arc<dyn MediaApi>,
    clock: Arc<dyn Clock>,
    idle_ttl: Duration,
    entries: Mutex<LruCache<String, Entry>>,
}

impl ThumbnailCache {
    pub fn new(api: Arc<dyn MediaApi>, clock: Arc<dyn Clock>) -> Self {
        Self::with_capacity(api, clock, DEFAULT_THUMBNAIL_CAPACITY)
    }

    pub fn with_capacity(api: Arc<dyn MediaApi>, clock: Arc<dyn Clock>, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        Self {
            api,
            clock,
            idle_ttl: default_idle_ttl(),
            entries: Mutex::new(LruCache::new(capacity)),
        }
    }

    pub fn with_idle_ttl(mut self, idle_ttl: Duration) -> Self {
        self.idle_ttl = idle_ttl;
        self
    }

    /// Thumbnail for `id`, from memory when fresh, otherwise from the
    /// service (falling back to the full download).
    #[instrument(skip(self))]
    pub async fn get(&self, id: &str) -> Result<MediaBlob> {
        let now = self.clock.now();
        {
            let mut entries = self.entries.lock();
            let expired = match entries.get_mut(id) {
                Some(entry) if now - entry.last_access < self.idle_ttl => {
                    entry.last_access = now;
                    return Ok(entry.blob.clone());
                }
                Some(_) => true,
                None => false,
            };
            if expired {
                debug!("Thumbnail idle too long, refetching");
                entries.pop(id);
            }
        }

        let blob = self.api.thumbnail(id).await?;
        self.entries.lock().put(
            id.to_string(),
            Entry {
                blob: blob.clone(),
                last_access: self.clock.now(),
            },
        );
        Ok(blob)
    }

    pub fn invalidate(&self, id: &str) -> bool {
        self.entries.lock().pop(id).is_some()
    }

    pub fn clear(&self) {
        self.entries.lock().clear();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::UploadResponse;
    use crate::error::MediaError;
    use crate::models::{MediaFilter, MediaItem, MediaPage, MediaType, UploadFile};
    use async_trait::async_trait;
    use bridge_traits::http::ProgressCallback;
    use bytes::Bytes;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingThumbnails {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl MediaApi for CountingThumbnails {
        async fn list(&self, _filter: MediaFilter, _page: u32, _page_size: u32) -> Result<MediaPage> {
            Err(MediaError::Parse("unused".to_string()))
        }

        async fn get(&self, id: &str) -> Result<MediaItem> {
            Ok(MediaItem::new(id, MediaType::Photo))
        }

        async fn upload(
            &self,
            _file: &UploadFile,
            _is_private: bool,
            _progress: Option<ProgressCallback>,
        ) -> Result<UploadResponse> {
            Err(MediaError::Parse("unused".to_string()))
        }

        async fn delete(&self, _id: &str) -> Result<()> {
            Ok(())
        }

        async fn download(&self, _id: &str) -> Result<MediaBlob> {
            Err(MediaError::Parse("unused".to_string()))
        }

        async fn thumbnail(&self, id: &str) -> Result<MediaBlob> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(MediaBlob {
                content_type: Some("image/webp".to_string()),
                content_length: None,
                cache_control: None,
                bytes: Bytes::from(id.to_string()),
            })
        }
    }

    struct ManualClock(parking_lot::Mutex<DateTime<Utc>>);

    impl ManualClock {
        fn advance(&self, by: Duration) {
            let mut now = self.0.lock();
            *now = *now + by;
        }
    }

    impl Clock for ManualClock {
        fn now(&self) -> DateTime<Utc> {
            *self.0.lock()
        }
    }

    fn setup() -> (ThumbnailCache, Arc<CountingThumbnails>, Arc<ManualClock>) {
        let api = Arc::new(CountingThumbnails::default());
        let clock = Arc::new(ManualClock(parking_lot::Mutex::new(Utc::now())));
        let cache = ThumbnailCache::with_capacity(api.clone(), clock.clone(), 2);
        (cache, api, clock)
    }

    #[tokio::test]
    async fn test_hit_skips_service() {
        let (cache, api, _clock) = setup();

        cache.get("a").await.unwrap();
        let blob = cache.get("a").await.unwrap();

        assert_eq!(blob.bytes, Bytes::from_static(b"a"));
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_idle_entry_expires() {
        let (cache, api, clock) = setup();

        cache.get("a").await.unwrap();
        clock.advance(Duration::minutes(20));
        cache.get("a").await.unwrap();
        clock.advance(Duration::minutes(20));
        cache.get("a").await.unwrap();
        assert_eq!(api.calls.load(Ordering::SeqCst), 1);

        clock.advance(Duration::minutes(31));
        cache.get("a").await.unwrap();
        assert_eq!(api.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_capacity_evicts_least_recent() {
        let (cache, api, _clock) = setup();

        cache.get("a").await.unwrap();
        cache.get("b").await.unwrap();
        cache.get("a").await.unwrap();
        cache.get("c").await.unwrap();
        assert_eq!(cache.len(), 2);

        cache.get("b").await.unwrap();
        assert_eq!(api.calls.load(Ordering::SeqCst), 4);
        assert!(cache.invalidate("c"));
    }
}
