//! # Media Cache Engine
//!
//! Keeps one [`MediaCollectionView`](crate::view::MediaCollectionView) per
//! filter configuration and reconciles two write paths into it:
//!
//! - remote pages, applied in response order and deduplicated by id against
//!   everything the view already holds;
//! - optimistic inserts and removals, applied synchronously with no round
//!   trip and never rolled back. Removed ids are tombstoned for the rest of
//!   the generation, so a page that was already in flight cannot bring them
//!   back.
//!
//! ## Generations
//!
//! Each view carries a generation stamp taken from a cache-wide counter.
//! `refresh` and eviction move a filter to a new generation; a page response
//! whose request was issued under an older generation is dropped on arrival.
//!
//! ## Locking
//!
//! All view state sits behind one `parking_lot::Mutex`. It is taken for
//! bookkeeping only and never held across an `.await`.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use core_runtime::config::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use core_runtime::events::{CoreEvent, EventBus, MediaEvent};
use parking_lot::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::api::MediaApi;
use crate::error::Result;
use crate::models::{MediaFilter, MediaItem};
use crate::view::{MediaCollectionView, ViewState};

/// What a `load` or `fetch_more` call did to its view.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// The page was applied; `added` items were new to the view.
    Applied { page: u32, added: usize },
    /// Nothing was requested: a fetch was outstanding or no pages remain.
    Skipped,
    /// The response belonged to a superseded generation or an evicted view.
    Discarded,
}

struct Inner {
    api: Arc<dyn MediaApi>,
    page_size: u32,
    viewer_id: Option<String>,
    events: Option<EventBus>,
    views: Mutex<HashMap<MediaFilter, ViewState>>,
    generation: AtomicU64,
}

/// Client-side mirror of the paged media collection.
///
/// Cloning is cheap; clones share the same views.
#[derive(Clone)]
pub struct MediaCache {
    inner: Arc<Inner>,
}

/// Builder for [`MediaCache`].
pub struct MediaCacheBuilder {
    api: Arc<dyn MediaApi>,
    page_size: u32,
    viewer_id: Option<String>,
    events: Option<EventBus>,
}

impl MediaCacheBuilder {
    /// Clamped to `1..=100`.
    pub fn page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        self
    }

    /// Identity used to decide `mine`/`all` membership of inserted items.
    pub fn viewer_id(mut self, viewer_id: Option<String>) -> Self {
        self.viewer_id = viewer_id;
        self
    }

    pub fn events(mut self, bus: EventBus) -> Self {
        self.events = Some(bus);
        self
    }

    pub fn build(self) -> MediaCache {
        MediaCache {
            inner: Arc::new(Inner {
                api: self.api,
                page_size: self.page_size,
                viewer_id: self.viewer_id,
                events: self.events,
                views: Mutex::new(HashMap::new()),
                generation: AtomicU64::new(0),
            }),
        }
    }
}

enum PageRequest {
    Exact(u32),
    Next,
}

impl MediaCache {
    pub fn builder(api: Arc<dyn MediaApi>) -> MediaCacheBuilder {
        MediaCacheBuilder {
            api,
            page_size: DEFAULT_PAGE_SIZE,
            viewer_id: None,
            events: None,
        }
    }

    /// Cache with the default page size, no viewer identity and no events.
    pub fn new(api: Arc<dyn MediaApi>) -> Self {
        Self::builder(api).build()
    }

    pub fn page_size(&self) -> u32 {
        self.inner.page_size
    }

    pub fn viewer_id(&self) -> Option<&str> {
        self.inner.viewer_id.as_deref()
    }

    pub fn api(&self) -> &Arc<dyn MediaApi> {
        &self.inner.api
    }

    /// Snapshot of the view for `filter`, if one exists.
    pub fn view(&self, filter: MediaFilter) -> Option<MediaCollectionView> {
        self.inner.views.lock().get(&filter).map(ViewState::snapshot)
    }

    /// Filters that currently have a view.
    pub fn filters(&self) -> Vec<MediaFilter> {
        self.inner.views.lock().keys().copied().collect()
    }

    /// Register interest in `filter`. The view lives until the last handle
    /// is dropped.
    pub fn observe(&self, filter: MediaFilter) -> ViewHandle {
        let created = {
            let mut views = self.inner.views.lock();
            let created = !views.contains_key(&filter);
            let view = views
                .entry(filter)
                .or_insert_with(|| ViewState::new(filter, self.next_generation()));
            view.observers += 1;
            created
        };

        if created {
            self.emit(MediaEvent::ViewCreated {
                filter: filter.to_string(),
            });
        }

        ViewHandle {
            cache: self.clone(),
            filter,
        }
    }

    /// Drop the view for `filter`. In-flight responses for it are discarded.
    pub fn evict(&self, filter: MediaFilter) -> bool {
        let removed = self.inner.views.lock().remove(&filter).is_some();
        if removed {
            debug!(filter = %filter, "Evicted media view");
            self.emit(MediaEvent::ViewEvicted {
                filter: filter.to_string(),
            });
        }
        removed
    }

    /// Fetch `page` for `filter` and append its unseen items.
    ///
    /// On failure the view's error slot is set, items and `has_more` are left
    /// alone, and the error is returned.
    #[instrument(skip(self), fields(filter = %filter))]
    pub async fn load(&self, filter: MediaFilter, page: u32) -> Result<LoadOutcome> {
        self.run(filter, PageRequest::Exact(page.max(1))).await
    }

    /// Fetch `current_page + 1` unless a fetch is outstanding or no pages
    /// remain.
    #[instrument(skip(self), fields(filter = %filter))]
    pub async fn fetch_more(&self, filter: MediaFilter) -> Result<LoadOutcome> {
        self.run(filter, PageRequest::Next).await
    }

    /// Discard everything held for `filter` and load page 1 again.
    #[instrument(skip(self), fields(filter = %filter))]
    pub async fn refresh(&self, filter: MediaFilter) -> Result<LoadOutcome> {
        let generation = self.next_generation();
        let created = {
            let mut views = self.inner.views.lock();
            match views.get_mut(&filter) {
                Some(view) => {
                    view.reset(generation);
                    false
                }
                None => {
                    views.insert(filter, ViewState::new(filter, generation));
                    true
                }
            }
        };

        if created {
            self.emit(MediaEvent::ViewCreated {
                filter: filter.to_string(),
            });
        }
        self.emit(MediaEvent::Refreshed {
            filter: filter.to_string(),
            generation,
        });

        self.run(filter, PageRequest::Exact(1)).await
    }

    /// Prepend `item` to every view whose filter admits it. Returns the
    /// number of views touched.
    ///
    /// Views still waiting on their first page get the item too; the page
    /// lands behind it.
    pub fn insert_optimistic(&self, item: &MediaItem) -> usize {
        let viewer_id = self.viewer_id();
        let touched = {
            let mut views = self.inner.views.lock();
            views
                .values_mut()
                .filter(|view| view.filter.admits(item, viewer_id))
                .map(|view| view.prepend(item))
                .filter(|inserted| *inserted)
                .count()
        };

        debug!(media_id = %item.id, views = touched, "Optimistic insert");
        self.emit(MediaEvent::ItemInserted {
            media_id: item.id.clone(),
            views: touched,
        });
        touched
    }

    /// Remove `id` from every view. Returns the number of views touched.
    pub fn remove_optimistic(&self, id: &str) -> usize {
        let touched = {
            let mut views = self.inner.views.lock();
            views
                .values_mut()
                .map(|view| view.remove(id))
                .filter(|removed| *removed)
                .count()
        };

        debug!(media_id = %id, views = touched, "Optimistic remove");
        self.emit(MediaEvent::ItemRemoved {
            media_id: id.to_string(),
            views: touched,
        });
        touched
    }

    /// Delete `id` on the service, then drop it from every view.
    ///
    /// Views are untouched when the service refuses.
    #[instrument(skip(self))]
    pub async fn delete(&self, id: &str) -> Result<usize> {
        self.inner.api.delete(id).await?;
        info!(media_id = %id, "Media deleted");
        Ok(self.remove_optimistic(id))
    }

    async fn run(&self, filter: MediaFilter, request: PageRequest) -> Result<LoadOutcome> {
        let Some((page, generation, issued_at)) = self.begin_fetch(filter, request) else {
            return Ok(LoadOutcome::Skipped);
        };

        debug!(page, generation, "Requesting media page");
        let response = self
            .inner
            .api
            .list(filter, page, self.inner.page_size)
            .await;

        let mut views = self.inner.views.lock();
        let view = match views.get_mut(&filter) {
            Some(view) if view.generation == generation => Some(view),
            _ => None,
        };
        let Some(view) = view else {
            drop(views);
            debug!(page, generation, "Dropping response for superseded view");
            self.emit(MediaEvent::ResponseDiscarded {
                filter: filter.to_string(),
                page,
                generation,
            });
            return Ok(LoadOutcome::Discarded);
        };
        view.end_request();

        match response {
            Ok(media_page) => {
                let added = view.apply_page(media_page, issued_at);
                let event = MediaEvent::PageLoaded {
                    filter: filter.to_string(),
                    page,
                    added,
                    total_count: view.total_count,
                    has_more: view.has_more,
                };
                drop(views);

                self.emit(event);
                Ok(LoadOutcome::Applied { page, added })
            }
            Err(e) => {
                let message = e.user_message();
                view.error = Some(message.clone());
                drop(views);

                warn!(page, error = %e, "Media page failed");
                self.emit(MediaEvent::LoadFailed {
                    filter: filter.to_string(),
                    page,
                    message,
                });
                Err(e)
            }
        }
    }

    /// Resolve the page to request and mark it in flight, atomically.
    fn begin_fetch(&self, filter: MediaFilter, request: PageRequest) -> Option<(u32, u64, u64)> {
        let (page, generation, issued_at, created) = {
            let mut views = self.inner.views.lock();
            let created = !views.contains_key(&filter);
            let view = views
                .entry(filter)
                .or_insert_with(|| ViewState::new(filter, self.next_generation()));

            let page = match request {
                PageRequest::Exact(page) => page,
                PageRequest::Next => {
                    if view.in_flight > 0 || !view.has_more {
                        return None;
                    }
                    view.current_page + 1
                }
            };

            let issued_at = view.begin_request();
            (page, view.generation, issued_at, created)
        };

        if created {
            self.emit(MediaEvent::ViewCreated {
                filter: filter.to_string(),
            });
        }
        Some((page, generation, issued_at))
    }

    fn release(&self, filter: MediaFilter) {
        let evicted = {
            let mut views = self.inner.views.lock();
            match views.get_mut(&filter) {
                Some(view) => {
                    view.observers = view.observers.saturating_sub(1);
                    if view.observers == 0 {
                        views.remove(&filter);
                        true
                    } else {
                        false
                    }
                }
                None => false,
            }
        };

        if evicted {
            debug!(filter = %filter, "Last observer gone, evicting view");
            self.emit(MediaEvent::ViewEvicted {
                filter: filter.to_string(),
            });
        }
    }

    fn next_generation(&self) -> u64 {
        self.inner.generation.fetch_add(1, Ordering::Relaxed) + 1
    }

    fn emit(&self, event: MediaEvent) {
        if let Some(bus) = &self.inner.events {
            bus.emit(CoreEvent::Media(event)).ok();
        }
    }
}

impl std::fmt::Debug for MediaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaCache")
            .field("page_size", &self.inner.page_size)
            .field("views", &self.inner.views.lock().len())
            .finish()
    }
}

/// Keeps a filter's view alive. Dropping the last handle evicts it.
pub struct ViewHandle {
    cache: MediaCache,
    filter: MediaFilter,
}

impl ViewHandle {
    pub fn filter(&self) -> MediaFilter {
        self.filter
    }

    pub fn snapshot(&self) -> Option<MediaCollectionView> {
        self.cache.view(self.filter)
    }

    pub fn cache(&self) -> &MediaCache {
        &self.cache
    }
}

impl Drop for ViewHandle {
    fn drop(&mut self) {
        self.cache.release(self.filter);
    }
}
