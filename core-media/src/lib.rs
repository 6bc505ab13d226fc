//! # Media Module
//!
//! Client-side mirror of a household's remote photo and video collection.
//!
//! ## Overview
//!
//! - [`api`]: the [`MediaApi`] seam and its HTTP implementation
//! - [`cache`]: per-filter paginated views with optimistic insert/remove
//! - [`trigger`]: coalesced "load more" from a host visibility signal
//! - [`upload`]: validated, strictly sequential uploads feeding the cache
//! - [`thumbnails`]: LRU of thumbnail blobs
//!
//! ## Usage
//!
//! ```ignore
//! use core_media::{HttpMediaApi, MediaCache, MediaFilter, UploadCoordinator};
//!
//! let api = Arc::new(HttpMediaApi::new(http_client, base_url, household_id));
//! let cache = MediaCache::builder(api).page_size(20).build();
//!
//! let _handle = cache.observe(MediaFilter::default());
//! cache.refresh(MediaFilter::default()).await?;
//!
//! let uploads = UploadCoordinator::new(cache.clone());
//! uploads.upload(&file, false, None).await?;
//! ```

pub mod api;
pub mod cache;
pub mod error;
pub mod models;
pub mod thumbnails;
pub mod trigger;
pub mod upload;
pub mod view;

pub use api::{HttpMediaApi, MediaApi, UploadResponse};
pub use cache::{LoadOutcome, MediaCache, MediaCacheBuilder, ViewHandle};
pub use error::{MediaError, Result, UploadRejection};
pub use models::{
    MediaBlob, MediaFilter, MediaItem, MediaPage, MediaType, TypeFilter, UploadFile,
    VisibilityFilter,
};
pub use thumbnails::ThumbnailCache;
pub use trigger::{BoundaryMarker, ContinuationTrigger, ManualBoundary, VisibilityObserver};
pub use upload::{UploadCoordinator, UploadOutcome};
pub use view::MediaCollectionView;
