//! Core service façade and bootstrap helpers.
//!
//! Wires a [`CoreConfig`] into the media cache, the upload coordinator, the
//! thumbnail cache and log stream clients, all publishing on one
//! [`EventBus`]. Desktop hosts enable the `desktop-shims` feature so the
//! reqwest and tungstenite adapters are filled in when the config does not
//! carry its own bridges.
//!
//! ```ignore
//! let core = CoreService::from_env()?;
//! let photos = MediaFilter::new(TypeFilter::Photo, VisibilityFilter::All);
//!
//! let _view = core.media().observe(photos);
//! core.media().refresh(photos).await?;
//!
//! let logs = core.log_stream(None)?;
//! ```

pub mod error;

pub use error::{CoreError, Result};

pub use core_logs::{LogEntry, LogStreamClient, LogStreamParams, LogStreamSnapshot, StreamState};
pub use core_media::{
    MediaCache, MediaCollectionView, MediaFilter, MediaItem, TypeFilter, UploadCoordinator,
    UploadFile, UploadOutcome, UploadRejection, VisibilityFilter,
};
pub use core_runtime::config::CoreConfig;
pub use core_runtime::events::{CoreEvent, EventBus};

use std::sync::Arc;

use core_media::{HttpMediaApi, MediaApi, ThumbnailCache};
use core_runtime::events::Receiver;
use core_runtime::logging::redact_if_sensitive;
use tracing::info;

/// Primary façade exposed to host applications.
#[derive(Clone)]
pub struct CoreService {
    config: Arc<CoreConfig>,
    events: EventBus,
    media: MediaCache,
    uploads: Arc<UploadCoordinator>,
    thumbnails: Arc<ThumbnailCache>,
}

impl CoreService {
    /// Create a new service from a built configuration.
    pub fn new(config: CoreConfig) -> Result<Self> {
        config.validate()?;

        let events = EventBus::new(config.event_buffer_size);
        let api: Arc<dyn MediaApi> = Arc::new(HttpMediaApi::new(
            Arc::clone(&config.http_client),
            config.api_base_url.clone(),
            config.household_id.clone(),
        ));

        let media = MediaCache::builder(Arc::clone(&api))
            .page_size(config.page_size)
            .viewer_id(config.viewer_id.clone())
            .events(events.clone())
            .build();

        let uploads = UploadCoordinator::new(media.clone())
            .with_max_bytes(config.max_upload_bytes)
            .with_events(events.clone());

        let thumbnails = ThumbnailCache::new(api, Arc::clone(&config.clock));

        info!(
            api_base_url = %config.api_base_url,
            household = %redact_if_sensitive("household_id", &config.household_id),
            page_size = config.page_size,
            log_stream_configured = config.log_stream.endpoint().is_some(),
            "Core service initialized"
        );

        Ok(Self {
            config: Arc::new(config),
            events,
            media,
            uploads: Arc::new(uploads),
            thumbnails: Arc::new(thumbnails),
        })
    }

    /// Build the configuration from the process environment.
    pub fn from_env() -> Result<Self> {
        let config = CoreConfig::builder().from_env().build()?;
        Self::new(config)
    }

    pub fn config(&self) -> &CoreConfig {
        &self.config
    }

    pub fn media(&self) -> &MediaCache {
        &self.media
    }

    pub fn uploads(&self) -> &UploadCoordinator {
        &self.uploads
    }

    pub fn thumbnails(&self) -> &ThumbnailCache {
        &self.thumbnails
    }

    pub fn events(&self) -> &EventBus {
        &self.events
    }

    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.events.subscribe()
    }

    /// Delete on the service, then drop the item from every view and the
    /// thumbnail cache.
    pub async fn delete_media(&self, id: &str) -> Result<()> {
        self.media.delete(id).await?;
        self.thumbnails.invalidate(id);
        Ok(())
    }

    /// Open a log stream client. `None` tails the configured default number
    /// of lines.
    pub fn log_stream(&self, params: Option<LogStreamParams>) -> Result<LogStreamClient> {
        let params = params
            .unwrap_or_else(|| LogStreamParams::new(self.config.log_stream.default_line_count));

        Ok(LogStreamClient::start(
            &self.config.log_stream,
            Arc::clone(&self.config.stream_connector),
            Some(self.events.clone()),
            params,
        )?)
    }
}

impl std::fmt::Debug for CoreService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreService")
            .field("config", &self.config)
            .field("media", &self.media)
            .finish()
    }
}
