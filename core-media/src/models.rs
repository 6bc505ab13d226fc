//! Media domain models
//!
//! Wire shapes follow the media service's camelCase JSON. Items are whole
//! values: the client inserts or removes them, never patches them.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of a stored file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Photo,
    Video,
}

impl MediaType {
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Photo => "photo",
            MediaType::Video => "video",
        }
    }
}

/// A photo or video held by the media service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaItem {
    /// Opaque, unique within a household's collection
    pub id: String,
    #[serde(default)]
    pub household_id: String,
    #[serde(default)]
    pub path: String,
    #[serde(rename = "type")]
    pub media_type: MediaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub taken_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration_sec: Option<u32>,
    #[serde(default)]
    pub created_at: String,
    #[serde(default)]
    pub updated_at: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub preview_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thumbnail_path: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_filename: Option<String>,

    // Camera and capture metadata, backfilled by the service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_make: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub camera_model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub longitude: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iso: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub f_number: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposure_time: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub focal_length: Option<f64>,

    #[serde(default)]
    pub is_private: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uploader_id: Option<String>,
}

impl MediaItem {
    /// Minimal item, mostly useful for tests and optimistic placeholders.
    pub fn new(id: impl Into<String>, media_type: MediaType) -> Self {
        Self {
            id: id.into(),
            household_id: String::new(),
            path: String::new(),
            media_type,
            mime_type: None,
            size_bytes: None,
            sha256: None,
            taken_at: None,
            width: None,
            height: None,
            duration_sec: None,
            created_at: String::new(),
            updated_at: String::new(),
            preview_path: None,
            thumbnail_path: None,
            original_filename: None,
            camera_make: None,
            camera_model: None,
            latitude: None,
            longitude: None,
            orientation: None,
            iso: None,
            f_number: None,
            exposure_time: None,
            focal_length: None,
            is_private: false,
            uploader_id: None,
        }
    }

    pub fn with_privacy(mut self, is_private: bool) -> Self {
        self.is_private = is_private;
        self
    }

    pub fn with_uploader(mut self, uploader_id: impl Into<String>) -> Self {
        self.uploader_id = Some(uploader_id.into());
        self
    }

    /// Whether `viewer_id` uploaded this item.
    ///
    /// Unknown identities on either side count as ownership: the only items
    /// judged locally are the ones this client just uploaded.
    pub fn is_owned_by(&self, viewer_id: Option<&str>) -> bool {
        match (viewer_id, self.uploader_id.as_deref()) {
            (Some(viewer), Some(uploader)) => viewer == uploader,
            _ => true,
        }
    }
}

/// Media-type half of a filter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TypeFilter {
    #[default]
    All,
    Photo,
    Video,
}

impl TypeFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            TypeFilter::All => "all",
            TypeFilter::Photo => "photo",
            TypeFilter::Video => "video",
        }
    }

    pub fn matches(&self, media_type: MediaType) -> bool {
        match self {
            TypeFilter::All => true,
            TypeFilter::Photo => media_type == MediaType::Photo,
            TypeFilter::Video => media_type == MediaType::Video,
        }
    }
}

/// Visibility half of a filter configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VisibilityFilter {
    /// Public items plus the viewer's own private items
    #[default]
    All,
    /// Everything the viewer uploaded
    Mine,
    /// Non-private items only
    Public,
}

impl VisibilityFilter {
    pub fn as_str(&self) -> &'static str {
        match self {
            VisibilityFilter::All => "all",
            VisibilityFilter::Mine => "mine",
            VisibilityFilter::Public => "public",
        }
    }

    pub fn matches(&self, item: &MediaItem, viewer_id: Option<&str>) -> bool {
        match self {
            VisibilityFilter::All => !item.is_private || item.is_owned_by(viewer_id),
            VisibilityFilter::Mine => item.is_owned_by(viewer_id),
            VisibilityFilter::Public => !item.is_private,
        }
    }
}

/// A filter configuration: one collection view exists per distinct value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct MediaFilter {
    pub media_type: TypeFilter,
    pub visibility: VisibilityFilter,
}

impl MediaFilter {
    pub fn new(media_type: TypeFilter, visibility: VisibilityFilter) -> Self {
        Self {
            media_type,
            visibility,
        }
    }

    /// Whether `item` belongs in a view for this filter.
    pub fn admits(&self, item: &MediaItem, viewer_id: Option<&str>) -> bool {
        self.media_type.matches(item.media_type) && self.visibility.matches(item, viewer_id)
    }
}

impl fmt::Display for MediaFilter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.media_type.as_str(), self.visibility.as_str())
    }
}

/// One page of a listing, as returned by the service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaPage {
    #[serde(default)]
    pub items: Vec<MediaItem>,
    pub total_count: u64,
    /// 1-based
    pub page: u32,
    pub page_size: u32,
}

impl MediaPage {
    /// `page * pageSize < totalCount` is the only signal for further pages.
    pub fn has_more(&self) -> bool {
        u64::from(self.page) * u64::from(self.page_size) < self.total_count
    }
}

/// A candidate file handed to the upload coordinator.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub file_name: String,
    /// Declared content type (e.g. `image/jpeg`)
    pub content_type: String,
    pub bytes: Bytes,
}

impl UploadFile {
    pub fn new(
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            file_name: file_name.into(),
            content_type: content_type.into(),
            bytes: bytes.into(),
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }

    pub fn is_image_or_video(&self) -> bool {
        let content_type = self.content_type.trim().to_ascii_lowercase();
        content_type.starts_with("image/") || content_type.starts_with("video/")
    }
}

/// Binary payload with the caching headers the service sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaBlob {
    pub content_type: Option<String>,
    pub content_length: Option<u64>,
    pub cache_control: Option<String>,
    pub bytes: Bytes,
}
