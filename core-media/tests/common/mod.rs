//! Scripted media service shared by the integration tests.
//!
//! Each `list` / `upload` call pops the next scripted answer. An answer can
//! be gated on a oneshot so a test decides exactly when it arrives.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use bridge_traits::error::BridgeError;
use bridge_traits::http::ProgressCallback;
use core_media::api::{MediaApi, UploadResponse};
use core_media::error::{MediaError, Result};
use core_media::models::{MediaBlob, MediaFilter, MediaItem, MediaPage, MediaType, UploadFile};
use parking_lot::Mutex;
use tokio::sync::oneshot;

struct Scripted<T> {
    result: Result<T>,
    gate: Option<oneshot::Receiver<()>>,
}

#[derive(Default)]
pub struct FakeMediaApi {
    pages: Mutex<VecDeque<Scripted<MediaPage>>>,
    uploads: Mutex<VecDeque<Scripted<UploadResponse>>>,
    /// `(filter, page)` of every list call, in call order
    pub list_calls: Mutex<Vec<(MediaFilter, u32)>>,
    /// File names of every upload call, in call order
    pub upload_calls: Mutex<Vec<String>>,
    pub deleted: Mutex<Vec<String>>,
}

impl FakeMediaApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn push_page(&self, page: MediaPage) {
        self.pages.lock().push_back(Scripted {
            result: Ok(page),
            gate: None,
        });
    }

    /// Script a page that is only returned once the sender fires.
    pub fn push_gated_page(&self, page: MediaPage) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.pages.lock().push_back(Scripted {
            result: Ok(page),
            gate: Some(rx),
        });
        tx
    }

    pub fn push_page_error(&self, error: MediaError) {
        self.pages.lock().push_back(Scripted {
            result: Err(error),
            gate: None,
        });
    }

    pub fn push_upload(&self, response: UploadResponse) {
        self.uploads.lock().push_back(Scripted {
            result: Ok(response),
            gate: None,
        });
    }

    pub fn push_gated_upload(&self, response: UploadResponse) -> oneshot::Sender<()> {
        let (tx, rx) = oneshot::channel();
        self.uploads.lock().push_back(Scripted {
            result: Ok(response),
            gate: Some(rx),
        });
        tx
    }

    pub fn push_upload_error(&self, error: MediaError) {
        self.uploads.lock().push_back(Scripted {
            result: Err(error),
            gate: None,
        });
    }

    pub fn list_call_count(&self) -> usize {
        self.list_calls.lock().len()
    }

    pub fn upload_call_count(&self) -> usize {
        self.upload_calls.lock().len()
    }
}

async fn settle<T>(scripted: Option<Scripted<T>>) -> Result<T> {
    let Some(scripted) = scripted else {
        return Err(MediaError::Network(BridgeError::OperationFailed(
            "no scripted response".to_string(),
        )));
    };
    if let Some(gate) = scripted.gate {
        gate.await.ok();
    }
    scripted.result
}

#[async_trait]
impl MediaApi for FakeMediaApi {
    async fn list(&self, filter: MediaFilter, page: u32, _page_size: u32) -> Result<MediaPage> {
        self.list_calls.lock().push((filter, page));
        let next = self.pages.lock().pop_front();
        settle(next).await
    }

    async fn get(&self, id: &str) -> Result<MediaItem> {
        Ok(photo(id))
    }

    async fn upload(
        &self,
        file: &UploadFile,
        _is_private: bool,
        progress: Option<ProgressCallback>,
    ) -> Result<UploadResponse> {
        self.upload_calls.lock().push(file.file_name.clone());
        let next = self.uploads.lock().pop_front();

        if let Some(progress) = &progress {
            progress(file.size() / 2, file.size());
        }
        let result = settle(next).await;
        if let Some(progress) = &progress {
            progress(file.size(), file.size());
        }
        result
    }

    async fn delete(&self, id: &str) -> Result<()> {
        self.deleted.lock().push(id.to_string());
        Ok(())
    }

    async fn download(&self, _id: &str) -> Result<MediaBlob> {
        Err(MediaError::Parse("not scripted".to_string()))
    }

    async fn thumbnail(&self, _id: &str) -> Result<MediaBlob> {
        Err(MediaError::Parse("not scripted".to_string()))
    }
}

pub fn photo(id: &str) -> MediaItem {
    MediaItem::new(id, MediaType::Photo)
}

/// Page `page` holding photos with the given ids.
pub fn page_of(ids: &[&str], page: u32, page_size: u32, total_count: u64) -> MediaPage {
    MediaPage {
        items: ids.iter().map(|id| photo(id)).collect(),
        total_count,
        page,
        page_size,
    }
}

/// Page `page` holding photos `m{first}..m{first + count}`.
pub fn numbered_page(first: u32, count: u32, page: u32, page_size: u32, total_count: u64) -> MediaPage {
    MediaPage {
        items: (first..first + count)
            .map(|n| photo(&format!("m{n}")))
            .collect(),
        total_count,
        page,
        page_size,
    }
}

/// Let spawned tasks run until `done` holds.
pub async fn yield_until(mut done: impl FnMut() -> bool) {
    for _ in 0..1000 {
        if done() {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!("condition never became true");
}

pub fn ids(items: &[MediaItem]) -> Vec<&str> {
    items.iter().map(|item| item.id.as_str()).collect()
}
