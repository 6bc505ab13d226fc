//! HTTP Client Abstraction
//!
//! Provides async HTTP operations, retry policy and multipart uploads that
//! report transfer progress.

use async_trait::async_trait;
use bytes::Bytes;
use serde::{de::DeserializeOwned, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{BridgeError, Result};

/// HTTP method types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
    Head,
}

impl HttpMethod {
    /// Methods that can be replayed without side effects.
    pub fn is_idempotent(&self) -> bool {
        !matches!(self, HttpMethod::Post | HttpMethod::Patch)
    }
}

/// HTTP request builder
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub method: HttpMethod,
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Option<Bytes>,
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    pub fn new(method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(HttpMethod::Get, url)
    }

    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> Result<Self> {
        let json = serde_json::to_vec(body).map_err(|e| {
            BridgeError::OperationFailed(format!("JSON serialization failed: {}", e))
        })?;
        self.body = Some(Bytes::from(json));
        self.headers
            .insert("Content-Type".to_string(), "application/json".to_string());
        Ok(self)
    }

    pub fn body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }

    pub fn timeout(mut self, duration: Duration) -> Self {
        self.timeout = Some(duration);
        self
    }
}

/// HTTP response
#[derive(Debug)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Bytes,
}

impl HttpResponse {
    /// Parse response body as JSON
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            BridgeError::OperationFailed(format!("JSON deserialization failed: {}", e))
        })
    }

    /// Get response body as UTF-8 string
    pub fn text(&self) -> Result<String> {
        String::from_utf8(self.body.to_vec())
            .map_err(|e| BridgeError::OperationFailed(format!("Invalid UTF-8: {}", e)))
    }

    /// Case-insensitive header lookup
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Check if response status is successful (2xx)
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// Check if response status indicates a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }

    /// Check if response status indicates a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        (500..600).contains(&self.status)
    }
}

/// Retry policy configuration
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Base delay between retries
    pub base_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Whether to use exponential backoff
    pub use_exponential_backoff: bool,
}

impl RetryPolicy {
    /// A policy that performs exactly one attempt.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            use_exponential_backoff: true,
        }
    }
}

/// Callback receiving `(bytes_sent, bytes_total)` while a body is transferred.
pub type ProgressCallback = Arc<dyn Fn(u64, u64) + Send + Sync>;

/// One part of a `multipart/form-data` body.
#[derive(Clone)]
pub struct MultipartPart {
    pub name: String,
    pub file_name: Option<String>,
    pub content_type: Option<String>,
    pub data: Bytes,
}

impl MultipartPart {
    /// A plain text field.
    pub fn text(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            file_name: None,
            content_type: None,
            data: Bytes::from(value.into()),
        }
    }

    /// A file field. Progress is reported for file parts only.
    pub fn file(
        name: impl Into<String>,
        file_name: impl Into<String>,
        content_type: impl Into<String>,
        data: Bytes,
    ) -> Self {
        Self {
            name: name.into(),
            file_name: Some(file_name.into()),
            content_type: Some(content_type.into()),
            data,
        }
    }

    pub fn is_file(&self) -> bool {
        self.file_name.is_some()
    }
}

impl fmt::Debug for MultipartPart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MultipartPart")
            .field("name", &self.name)
            .field("file_name", &self.file_name)
            .field("content_type", &self.content_type)
            .field("len", &self.data.len())
            .finish()
    }
}

/// A `multipart/form-data` body.
#[derive(Debug, Clone, Default)]
pub struct MultipartForm {
    pub parts: Vec<MultipartPart>,
}

impl MultipartForm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn part(mut self, part: MultipartPart) -> Self {
        self.parts.push(part);
        self
    }

    /// Total bytes across file parts, the denominator for progress.
    pub fn file_bytes(&self) -> u64 {
        self.parts
            .iter()
            .filter(|part| part.is_file())
            .map(|part| part.data.len() as u64)
            .sum()
    }
}

/// Async HTTP client trait
///
/// This trait abstracts HTTP operations to allow platform-specific implementations.
/// Implementations should handle:
/// - Automatic retry with exponential backoff for idempotent requests
/// - TLS certificate validation
/// - Connection pooling and keep-alive
///
/// # Example
///
/// ```ignore
/// use bridge_traits::http::{HttpClient, HttpRequest};
///
/// async fn fetch_page(client: &dyn HttpClient) -> Result<String> {
///     let request = HttpRequest::get("http://nas.local:8080/media?page=1")
///         .header("X-Household-ID", "household-1");
///
///     let response = client.execute(request).await?;
///     response.text()
/// }
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Execute an HTTP request
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Network connection fails
    /// - TLS validation fails
    /// - Request times out
    /// - Maximum retries exceeded
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;

    /// Execute an HTTP request with custom retry policy
    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let _ = policy;
        self.execute(request).await
    }

    /// Send a `multipart/form-data` body, reporting file bytes as they are
    /// handed to the transport.
    ///
    /// Uploads are never retried: the body is consumed by the first attempt.
    async fn upload_multipart(
        &self,
        request: HttpRequest,
        form: MultipartForm,
        progress: Option<ProgressCallback>,
    ) -> Result<HttpResponse> {
        let _ = (request, form, progress);
        Err(BridgeError::NotAvailable(
            "multipart upload is not supported by this HttpClient".to_string(),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_request_builder() {
        let request = HttpRequest::new(HttpMethod::Get, "http://nas.local/media")
            .header("X-Household-ID", "hh-1")
            .timeout(Duration::from_secs(30));

        assert_eq!(request.url, "http://nas.local/media");
        assert_eq!(
            request.headers.get("X-Household-ID"),
            Some(&"hh-1".to_string())
        );
        assert_eq!(request.timeout, Some(Duration::from_secs(30)));
    }

    #[test]
    fn test_http_response_status_checks() {
        let response = HttpResponse {
            status: 200,
            headers: HashMap::new(),
            body: Bytes::from("test"),
        };

        assert!(response.is_success());
        assert!(!response.is_client_error());
        assert!(!response.is_server_error());
    }

    #[test]
    fn test_header_lookup_ignores_case() {
        let mut headers = HashMap::new();
        headers.insert("content-type".to_string(), "image/jpeg".to_string());
        let response = HttpResponse {
            status: 200,
            headers,
            body: Bytes::new(),
        };

        assert_eq!(response.header("Content-Type"), Some("image/jpeg"));
        assert_eq!(response.header("Content-Length"), None);
    }

    #[test]
    fn test_multipart_file_bytes_ignores_text_fields() {
        let form = MultipartForm::new()
            .part(MultipartPart::file(
                "file",
                "a.jpg",
                "image/jpeg",
                Bytes::from(vec![0u8; 1024]),
            ))
            .part(MultipartPart::text("is_private", "true"));

        assert_eq!(form.file_bytes(), 1024);
        assert_eq!(form.parts.len(), 2);
    }

    #[test]
    fn test_post_is_not_idempotent() {
        assert!(!HttpMethod::Post.is_idempotent());
        assert!(HttpMethod::Get.is_idempotent());
        assert!(HttpMethod::Delete.is_idempotent());
    }
}
