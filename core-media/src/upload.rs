//! # Upload Coordinator
//!
//! Validates a candidate file, sends it, reports progress and classifies the
//! result. Successful uploads are inserted into the media cache before the
//! next upload may start, so the order of optimistic inserts always matches
//! the order uploads were submitted in.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;

use bridge_traits::http::ProgressCallback;
use core_runtime::config::DEFAULT_MAX_UPLOAD_BYTES;
use core_runtime::events::{CoreEvent, EventBus, UploadEvent};
use core_runtime::logging::strip_path;
use tokio::sync::Mutex;
use tracing::{info, instrument, warn};

use crate::api::UploadResponse;
use crate::cache::MediaCache;
use crate::error::UploadRejection;
use crate::models::{MediaItem, UploadFile};

/// Percent callback for a single upload.
pub type PercentCallback = Arc<dyn Fn(u8) + Send + Sync>;

/// Percent callback for a batch: `(file_index, percent)`.
pub type BatchPercentCallback = Arc<dyn Fn(usize, u8) + Send + Sync>;

/// Terminal outcome of an upload that passed validation.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadOutcome {
    /// Stored and inserted into every matching view.
    Uploaded(MediaItem),
    /// A byte-identical file already exists; nothing was inserted.
    Conflict(MediaItem),
    /// Transport or server failure, as display text. No state changed.
    Failed(String),
}

impl UploadOutcome {
    pub fn item(&self) -> Option<&MediaItem> {
        match self {
            UploadOutcome::Uploaded(item) | UploadOutcome::Conflict(item) => Some(item),
            UploadOutcome::Failed(_) => None,
        }
    }
}

pub struct UploadCoordinator {
    cache: MediaCache,
    max_bytes: u64,
    gate: Mutex<()>,
    events: Option<EventBus>,
}

impl UploadCoordinator {
    /// Uploads through `cache`'s API and inserts into `cache`.
    pub fn new(cache: MediaCache) -> Self {
        Self {
            cache,
            max_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            gate: Mutex::new(()),
            events: None,
        }
    }

    pub fn with_max_bytes(mut self, max_bytes: u64) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    pub fn with_events(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Size and content-type checks. No request is made.
    pub fn validate(&self, file: &UploadFile) -> Result<(), UploadRejection> {
        if file.size() > self.max_bytes {
            return Err(UploadRejection::TooLarge {
                size_bytes: file.size(),
                max_bytes: self.max_bytes,
            });
        }
        if !file.is_image_or_video() {
            return Err(UploadRejection::UnsupportedType {
                content_type: file.content_type.clone(),
            });
        }
        Ok(())
    }

    /// Upload one file.
    ///
    /// Validation failures return `Err` before anything is sent. Otherwise
    /// the call waits for any upload already running, then sends. Progress
    /// never decreases and reaches 100 only when the file was stored.
    #[instrument(skip(self, file, on_progress), fields(file = %strip_path(&file.file_name)))]
    pub async fn upload(
        &self,
        file: &UploadFile,
        is_private: bool,
        on_progress: Option<PercentCallback>,
    ) -> Result<UploadOutcome, UploadRejection> {
        if let Err(rejection) = self.validate(file) {
            warn!(reason = %rejection, "Upload rejected");
            return Err(rejection);
        }

        let _gate = self.gate.lock().await;
        self.emit(UploadEvent::Started {
            file_name: file.file_name.clone(),
            size_bytes: file.size(),
        });

        let progress = self.progress_bridge(&file.file_name, on_progress.clone());
        let outcome = match self.cache.api().upload(file, is_private, Some(progress)).await {
            Ok(UploadResponse::Created(item)) => {
                self.cache.insert_optimistic(&item);
                if let Some(callback) = &on_progress {
                    callback(100);
                }
                info!(media_id = %item.id, "Upload complete");
                self.emit(UploadEvent::Completed {
                    file_name: file.file_name.clone(),
                    media_id: item.id.clone(),
                });
                UploadOutcome::Uploaded(item)
            }
            Ok(UploadResponse::Conflict(existing)) => {
                info!(existing_id = %existing.id, "Upload is a duplicate");
                self.emit(UploadEvent::Conflict {
                    file_name: file.file_name.clone(),
                    existing_id: existing.id.clone(),
                });
                UploadOutcome::Conflict(existing)
            }
            Err(e) => {
                warn!(error = %e, "Upload failed");
                let message = e.user_message();
                self.emit(UploadEvent::Failed {
                    file_name: file.file_name.clone(),
                    message: message.clone(),
                });
                UploadOutcome::Failed(message)
            }
        };

        Ok(outcome)
    }

    /// Upload `files` one after another. One result per file, in order.
    pub async fn upload_all(
        &self,
        files: &[UploadFile],
        is_private: bool,
        on_progress: Option<BatchPercentCallback>,
    ) -> Vec<Result<UploadOutcome, UploadRejection>> {
        let mut results = Vec::with_capacity(files.len());
        for (index, file) in files.iter().enumerate() {
            let per_file = on_progress.as_ref().map(|callback| {
                let callback = Arc::clone(callback);
                Arc::new(move |percent: u8| callback(index, percent)) as PercentCallback
            });
            results.push(self.upload(file, is_private, per_file).await);
        }
        results
    }

    /// Byte progress to percent, capped at 99 and never moving backwards.
    fn progress_bridge(&self, file_name: &str, on_progress: Option<PercentCallback>) -> ProgressCallback {
        let last = Arc::new(AtomicU8::new(0));
        let events = self.events.clone();
        let file_name = file_name.to_string();

        Arc::new(move |sent: u64, total: u64| {
            let percent = if total == 0 {
                0
            } else {
                ((sent.min(total) * 100) / total).min(99) as u8
            };

            let previous = last.fetch_max(percent, Ordering::AcqRel);
            if percent <= previous {
                return;
            }

            if let Some(callback) = &on_progress {
                callback(percent);
            }
            if let Some(bus) = &events {
                bus.emit(CoreEvent::Upload(UploadEvent::Progress {
                    file_name: file_name.clone(),
                    percent,
                }))
                .ok();
            }
        })
    }

    fn emit(&self, event: UploadEvent) {
        if let Some(bus) = &self.events {
            bus.emit(CoreEvent::Upload(event)).ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::MediaApi;
    use crate::error::{MediaError, Result};
    use crate::models::{MediaBlob, MediaFilter, MediaPage, MediaType};
    use async_trait::async_trait;

    struct ProgressApi;

    #[async_trait]
    impl MediaApi for ProgressApi {
        async fn list(&self, _filter: MediaFilter, page: u32, page_size: u32) -> Result<MediaPage> {
            Ok(MediaPage {
                items: Vec::new(),
                total_count: 0,
                page,
                page_size,
            })
        }

        async fn get(&self, id: &str) -> Result<MediaItem> {
            Ok(MediaItem::new(id, MediaType::Photo))
        }

        async fn upload(
            &self,
            file: &UploadFile,
            _is_private: bool,
            progress: Option<ProgressCallback>,
        ) -> Result<UploadResponse> {
            if let Some(progress) = progress {
                progress(10, 40);
                progress(5, 40);
                progress(40, 40);
            }
            if file.file_name == "broken.jpg" {
                return Err(MediaError::Api {
                    status: 500,
                    message: "disk full".to_string(),
                });
            }
            Ok(UploadResponse::Created(MediaItem::new(
                file.file_name.clone(),
                MediaType::Photo,
            )))
        }

        async fn delete(&self, _id: &str) -> Result<()> {
            Ok(())
        }

        async fn download(&self, _id: &str) -> Result<MediaBlob> {
            Err(MediaError::Parse("unused".to_string()))
        }

        async fn thumbnail(&self, _id: &str) -> Result<MediaBlob> {
            Err(MediaError::Parse("unused".to_string()))
        }
    }

    fn coordinator() -> UploadCoordinator {
        UploadCoordinator::new(MediaCache::new(Arc::new(ProgressApi))).with_max_bytes(1024)
    }

    fn recorder() -> (PercentCallback, Arc<parking_lot::Mutex<Vec<u8>>>) {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (Arc::new(move |percent: u8| sink.lock().push(percent)), seen)
    }

    #[test]
    fn test_validate() {
        let coordinator = coordinator();
        assert!(coordinator
            .validate(&UploadFile::new("a.mp4", "video/mp4", vec![0u8; 1024]))
            .is_ok());
        assert!(matches!(
            coordinator.validate(&UploadFile::new("a.jpg", "image/jpeg", vec![0u8; 1025])),
            Err(UploadRejection::TooLarge { size_bytes: 1025, max_bytes: 1024 })
        ));
        assert!(matches!(
            coordinator.validate(&UploadFile::new("a.pdf", "application/pdf", vec![0u8; 4])),
            Err(UploadRejection::UnsupportedType { .. })
        ));
    }

    #[tokio::test]
    async fn test_progress_is_monotonic_and_ends_at_100() {
        let (callback, seen) = recorder();
        let file = UploadFile::new("ok.jpg", "image/jpeg", vec![0u8; 40]);

        let outcome = coordinator().upload(&file, false, Some(callback)).await.unwrap();

        assert!(matches!(outcome, UploadOutcome::Uploaded(_)));
        assert_eq!(*seen.lock(), vec![25, 99, 100]);
    }

    #[tokio::test]
    async fn test_failure_never_reports_100() {
        let (callback, seen) = recorder();
        let file = UploadFile::new("broken.jpg", "image/jpeg", vec![0u8; 40]);

        let outcome = coordinator().upload(&file, false, Some(callback)).await.unwrap();

        assert_eq!(outcome, UploadOutcome::Failed("disk full".to_string()));
        assert_eq!(seen.lock().last(), Some(&99));
    }

    #[tokio::test]
    async fn test_upload_all_reports_per_file() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback: BatchPercentCallback = Arc::new(move |index: usize, percent: u8| {
            if percent == 100 {
                sink.lock().push(index);
            }
        });

        let files = vec![
            UploadFile::new("one.jpg", "image/jpeg", vec![0u8; 8]),
            UploadFile::new("notes.txt", "text/plain", vec![0u8; 8]),
            UploadFile::new("two.jpg", "image/jpeg", vec![0u8; 8]),
        ];
        let results = coordinator().upload_all(&files, true, Some(callback)).await;

        assert_eq!(results.len(), 3);
        assert!(results[1].is_err());
        assert_eq!(*seen.lock(), vec![0, 2]);
    }
}
