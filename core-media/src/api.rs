//! Media service client
//!
//! [`MediaApi`] is the seam between the cache engine and the remote media
//! service. [`HttpMediaApi`] implements it over the host `HttpClient`.

use async_trait::async_trait;
use bridge_traits::http::{
    HttpClient, HttpMethod, HttpRequest, HttpResponse, MultipartForm, MultipartPart,
    ProgressCallback,
};
use core_runtime::logging::{redact_if_sensitive, strip_path};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

use crate::error::{MediaError, Result, UPLOAD_FAILED_MESSAGE};
use crate::models::{MediaBlob, MediaFilter, MediaItem, MediaPage, TypeFilter, UploadFile, VisibilityFilter};

/// Header carrying the household on every media request.
pub const HOUSEHOLD_HEADER: &str = "X-Household-ID";

/// Large videos over a home uplink take a while.
const UPLOAD_TIMEOUT: Duration = Duration::from_secs(600);

/// Result of a successful upload round trip.
#[derive(Debug, Clone, PartialEq)]
pub enum UploadResponse {
    /// 201: the service stored the file.
    Created(MediaItem),
    /// 409: a byte-identical file already exists.
    Conflict(MediaItem),
}

/// Operations of the remote media service.
#[async_trait]
pub trait MediaApi: Send + Sync {
    /// `GET /media?page&pageSize&type&visibility`
    async fn list(&self, filter: MediaFilter, page: u32, page_size: u32) -> Result<MediaPage>;

    /// `GET /media/{id}`
    async fn get(&self, id: &str) -> Result<MediaItem>;

    /// `POST /media` as multipart with a `file` part and an `is_private` flag.
    ///
    /// `progress` receives `(bytes_sent, bytes_total)` for the file part.
    async fn upload(
        &self,
        file: &UploadFile,
        is_private: bool,
        progress: Option<ProgressCallback>,
    ) -> Result<UploadResponse>;

    /// `DELETE /media/{id}`
    async fn delete(&self, id: &str) -> Result<()>;

    /// `GET /media/{id}/download`
    async fn download(&self, id: &str) -> Result<MediaBlob>;

    /// `GET /media/{id}/thumbnail`
    async fn thumbnail(&self, id: &str) -> Result<MediaBlob>;
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ItemBody {
    item: MediaItem,
}

#[derive(Debug, Deserialize)]
struct UploadBody {
    #[serde(default)]
    item: Option<MediaItem>,
    #[serde(default)]
    existing: Option<MediaItem>,
    #[serde(default)]
    error: Option<String>,
}

/// [`MediaApi`] over HTTP.
pub struct HttpMediaApi {
    http_client: Arc<dyn HttpClient>,
    base_url: String,
    household_id: String,
}

impl HttpMediaApi {
    /// `base_url` without trailing slash, e.g. `http://192.168.1.20:8080`.
    pub fn new(
        http_client: Arc<dyn HttpClient>,
        base_url: impl Into<String>,
        household_id: impl Into<String>,
    ) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let household_id = household_id.into();
        debug!(
            base_url = %base_url,
            household = %redact_if_sensitive("household_id", &household_id),
            "Media client created"
        );
        Self {
            http_client,
            base_url,
            household_id,
        }
    }

    fn item_url(&self, id: &str, suffix: &str) -> String {
        format!("{}/media/{}{}", self.base_url, urlencoding::encode(id), suffix)
    }

    fn list_url(&self, filter: MediaFilter, page: u32, page_size: u32) -> String {
        let mut url = format!(
            "{}/media?page={}&pageSize={}",
            self.base_url, page, page_size
        );
        if filter.media_type != TypeFilter::All {
            url.push_str("&type=");
            url.push_str(filter.media_type.as_str());
        }
        if filter.visibility != VisibilityFilter::All {
            url.push_str("&visibility=");
            url.push_str(filter.visibility.as_str());
        }
        url
    }

    fn request(&self, method: HttpMethod, url: String) -> HttpRequest {
        HttpRequest::new(method, url).header(HOUSEHOLD_HEADER, self.household_id.clone())
    }

    async fn send(&self, request: HttpRequest) -> Result<HttpResponse> {
        Ok(self.http_client.execute(request).await?)
    }

    /// Error for a non-success response: the body's `error` text when
    /// present, `fallback` otherwise.
    fn api_error(response: &HttpResponse, fallback: &str) -> MediaError {
        let message = serde_json::from_slice::<ErrorBody>(&response.body)
            .ok()
            .and_then(|body| body.error)
            .filter(|message| !message.is_empty())
            .unwrap_or_else(|| fallback.to_string());

        MediaError::Api {
            status: response.status,
            message,
        }
    }

    fn parse<T: serde::de::DeserializeOwned>(response: &HttpResponse) -> Result<T> {
        serde_json::from_slice(&response.body).map_err(|e| MediaError::Parse(e.to_string()))
    }

    fn blob(response: HttpResponse) -> MediaBlob {
        MediaBlob {
            content_type: response.header("content-type").map(str::to_string),
            content_length: response
                .header("content-length")
                .and_then(|value| value.trim().parse().ok()),
            cache_control: response.header("cache-control").map(str::to_string),
            bytes: response.body,
        }
    }

    async fn fetch_blob(&self, url: String, fallback: &str) -> Result<MediaBlob> {
        let response = self.send(self.request(HttpMethod::Get, url)).await?;
        if !response.is_success() {
            return Err(Self::api_error(&response, fallback));
        }
        Ok(Self::blob(response))
    }
}

#[async_trait]
impl MediaApi for HttpMediaApi {
    #[instrument(skip(self), fields(filter = %filter))]
    async fn list(&self, filter: MediaFilter, page: u32, page_size: u32) -> Result<MediaPage> {
        let url = self.list_url(filter, page, page_size);
        let response = self
            .send(self.request(HttpMethod::Get, url).header("Accept", "application/json"))
            .await?;

        if !response.is_success() {
            warn!(status = response.status, "Media listing failed");
            return Err(Self::api_error(&response, "Failed to load media"));
        }

        let page: MediaPage = Self::parse(&response)?;
        debug!(
            page = page.page,
            items = page.items.len(),
            total_count = page.total_count,
            "Media page received"
        );
        Ok(page)
    }

    #[instrument(skip(self))]
    async fn get(&self, id: &str) -> Result<MediaItem> {
        let response = self
            .send(self.request(HttpMethod::Get, self.item_url(id, "")))
            .await?;

        if !response.is_success() {
            return Err(Self::api_error(&response, "Failed to fetch media"));
        }

        Ok(Self::parse::<ItemBody>(&response)?.item)
    }

    #[instrument(skip(self, file, progress), fields(file = %strip_path(&file.file_name), size = file.size()))]
    async fn upload(
        &self,
        file: &UploadFile,
        is_private: bool,
        progress: Option<ProgressCallback>,
    ) -> Result<UploadResponse> {
        let form = MultipartForm::new()
            .part(MultipartPart::file(
                "file",
                file.file_name.clone(),
                file.content_type.clone(),
                file.bytes.clone(),
            ))
            .part(MultipartPart::text("is_private", is_private.to_string()));

        let request = self
            .request(HttpMethod::Post, format!("{}/media", self.base_url))
            .timeout(UPLOAD_TIMEOUT);

        let response = self
            .http_client
            .upload_multipart(request, form, progress)
            .await?;

        // Every answer, error or not, is expected to be JSON.
        let body: UploadBody = Self::parse(&response)?;

        match response.status {
            200 | 201 => body
                .item
                .map(UploadResponse::Created)
                .ok_or_else(|| MediaError::Parse("missing 'item' in upload response".to_string())),
            409 => body
                .existing
                .map(UploadResponse::Conflict)
                .ok_or_else(|| MediaError::Parse("missing 'existing' in conflict response".to_string())),
            status => {
                warn!(status, "Upload rejected by media service");
                Err(MediaError::Api {
                    status,
                    message: body
                        .error
                        .filter(|message| !message.is_empty())
                        .unwrap_or_else(|| UPLOAD_FAILED_MESSAGE.to_string()),
                })
            }
        }
    }

    #[instrument(skip(self))]
    async fn delete(&self, id: &str) -> Result<()> {
        let response = self
            .send(self.request(HttpMethod::Delete, self.item_url(id, "")))
            .await?;

        if !response.is_success() {
            return Err(Self::api_error(&response, "Failed to delete media"));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn download(&self, id: &str) -> Result<MediaBlob> {
        self.fetch_blob(self.item_url(id, "/download"), "Failed to fetch media")
            .await
    }

    #[instrument(skip(self))]
    async fn thumbnail(&self, id: &str) -> Result<MediaBlob> {
        match self
            .fetch_blob(self.item_url(id, "/thumbnail"), "Failed to fetch thumbnail")
            .await
        {
            Ok(blob) => Ok(blob),
            Err(e) => {
                debug!(error = %e, "Thumbnail unavailable, falling back to full download");
                self.download(id).await
            }
        }
    }
}
