//! HTTP Client Implementation using Reqwest

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    http::{
        HttpClient, HttpMethod, HttpRequest, HttpResponse, MultipartForm, MultipartPart,
        ProgressCallback, RetryPolicy,
    },
};
use bytes::Bytes;
use futures_util::Stream;
use reqwest::Client;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Size of the slices a file part is streamed in; one progress tick per slice.
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Reqwest-based HTTP client implementation
///
/// Provides HTTP operations with:
/// - Connection pooling via reqwest
/// - Retry with exponential backoff for idempotent requests
/// - Streamed multipart uploads with byte-level progress
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// Create a new HTTP client with default configuration
    pub fn new() -> Result<Self> {
        Self::with_timeout(Duration::from_secs(30))
    }

    /// Create a new HTTP client with custom timeout
    ///
    /// The timeout covers whole requests, so uploads of large videos should
    /// pass a per-request timeout instead.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(10)
            .user_agent(concat!("homestore/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BridgeError::OperationFailed(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }

    /// Create a new HTTP client with custom configuration
    pub fn with_client(client: Client) -> Self {
        Self { client }
    }

    /// Convert bridge HttpMethod to reqwest Method
    fn convert_method(method: HttpMethod) -> reqwest::Method {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Head => reqwest::Method::HEAD,
        }
    }

    /// Build reqwest request from bridge request, without a body
    fn request_builder(&self, request: &HttpRequest) -> reqwest::RequestBuilder {
        let method = Self::convert_method(request.method);
        let mut req = self.client.request(method, &request.url);

        for (key, value) in &request.headers {
            req = req.header(key, value);
        }

        if let Some(timeout) = request.timeout {
            req = req.timeout(timeout);
        }

        req
    }

    fn map_send_error(e: reqwest::Error) -> BridgeError {
        if e.is_timeout() {
            BridgeError::Timeout
        } else if e.is_connect() {
            BridgeError::ConnectionFailed(e.to_string())
        } else {
            BridgeError::OperationFailed(e.to_string())
        }
    }

    async fn read_response(response: reqwest::Response) -> Result<HttpResponse> {
        let status = response.status().as_u16();
        let headers: HashMap<String, String> = response
            .headers()
            .iter()
            .filter_map(|(k, v)| v.to_str().ok().map(|s| (k.to_string(), s.to_string())))
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|e| BridgeError::OperationFailed(e.to_string()))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    /// Execute request with retry logic
    async fn execute_with_retry_internal(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        let mut attempt = 0;
        let mut last_error = None;

        while attempt < policy.max_attempts {
            debug!(
                attempt = attempt + 1,
                max_attempts = policy.max_attempts,
                url = %request.url,
                "Executing HTTP request"
            );

            let mut req_builder = self.request_builder(&request);
            if let Some(body) = request.body.clone() {
                req_builder = req_builder.body(body);
            }

            match req_builder.send().await {
                Ok(response) => {
                    let status = response.status().as_u16();
                    let retryable = status >= 500 || status == 429;

                    if retryable && attempt + 1 < policy.max_attempts {
                        warn!(
                            status = status,
                            attempt = attempt + 1,
                            "HTTP request failed with retryable status"
                        );
                        last_error = Some(BridgeError::OperationFailed(format!(
                            "HTTP {} error",
                            status
                        )));
                    } else {
                        // Out of attempts the caller still gets the server's
                        // response, so its error body is not lost.
                        return Self::read_response(response).await;
                    }
                }
                Err(e) => {
                    warn!(
                        error = %e,
                        attempt = attempt + 1,
                        "HTTP request failed"
                    );
                    last_error = Some(Self::map_send_error(e));
                }
            }

            attempt += 1;

            if attempt < policy.max_attempts {
                let delay = if policy.use_exponential_backoff {
                    let exponential_delay = policy.base_delay * 2u32.pow(attempt - 1);
                    exponential_delay.min(policy.max_delay)
                } else {
                    policy.base_delay
                };

                debug!(delay_ms = delay.as_millis(), "Retrying after delay");
                sleep(delay).await;
            }
        }

        Err(last_error.unwrap_or_else(|| {
            BridgeError::OperationFailed("All retry attempts exhausted".to_string())
        }))
    }
}

/// Split `data` into slices and report cumulative progress as each slice is
/// pulled by the transport.
fn progress_stream(
    data: Bytes,
    sent: Arc<AtomicU64>,
    total: u64,
    progress: Option<ProgressCallback>,
) -> impl Stream<Item = std::io::Result<Bytes>> + Send + 'static {
    let chunks: Vec<Bytes> = (0..data.len())
        .step_by(UPLOAD_CHUNK_SIZE)
        .map(|start| data.slice(start..(start + UPLOAD_CHUNK_SIZE).min(data.len())))
        .collect();

    futures_util::stream::iter(chunks.into_iter().map(move |chunk| {
        let len = chunk.len() as u64;
        let now = sent.fetch_add(len, Ordering::Relaxed) + len;
        if let Some(callback) = &progress {
            callback(now, total);
        }
        Ok(chunk)
    }))
}

fn build_form(
    form: MultipartForm,
    progress: Option<ProgressCallback>,
) -> Result<reqwest::multipart::Form> {
    let total = form.file_bytes();
    let sent = Arc::new(AtomicU64::new(0));
    let mut multipart = reqwest::multipart::Form::new();

    for part in form.parts {
        let MultipartPart {
            name,
            file_name,
            content_type,
            data,
        } = part;

        let mut req_part = match file_name {
            Some(file_name) => {
                let len = data.len() as u64;
                let stream = progress_stream(data, Arc::clone(&sent), total, progress.clone());
                reqwest::multipart::Part::stream_with_length(reqwest::Body::wrap_stream(stream), len)
                    .file_name(file_name)
            }
            None => reqwest::multipart::Part::bytes(data.to_vec()),
        };

        if let Some(content_type) = content_type {
            req_part = req_part.mime_str(&content_type).map_err(|e| {
                BridgeError::OperationFailed(format!(
                    "Invalid content type {}: {}",
                    content_type, e
                ))
            })?;
        }

        multipart = multipart.part(name, req_part);
    }

    Ok(multipart)
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let policy = if request.method.is_idempotent() {
            RetryPolicy::default()
        } else {
            RetryPolicy::none()
        };
        self.execute_with_retry(request, policy).await
    }

    async fn execute_with_retry(
        &self,
        request: HttpRequest,
        policy: RetryPolicy,
    ) -> Result<HttpResponse> {
        self.execute_with_retry_internal(request, policy).await
    }

    async fn upload_multipart(
        &self,
        request: HttpRequest,
        form: MultipartForm,
        progress: Option<ProgressCallback>,
    ) -> Result<HttpResponse> {
        debug!(url = %request.url, bytes = form.file_bytes(), "Uploading multipart body");

        let multipart = build_form(form, progress)?;
        let response = self
            .request_builder(&request)
            .multipart(multipart)
            .send()
            .await
            .map_err(|e| {
                warn!(error = %e, "Multipart upload failed");
                Self::map_send_error(e)
            })?;

        Self::read_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures_util::StreamExt;
    use std::sync::Mutex;

    #[test]
    fn test_http_client_creation() {
        assert!(ReqwestHttpClient::new().is_ok());
    }

    #[test]
    fn test_method_conversion() {
        assert_eq!(
            ReqwestHttpClient::convert_method(HttpMethod::Get),
            reqwest::Method::GET
        );
        assert_eq!(
            ReqwestHttpClient::convert_method(HttpMethod::Delete),
            reqwest::Method::DELETE
        );
    }

    #[tokio::test]
    async fn test_progress_stream_reports_cumulative_bytes() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let callback: ProgressCallback = Arc::new(move |sent, total| {
            seen_clone.lock().unwrap().push((sent, total));
        });

        let data = Bytes::from(vec![7u8; UPLOAD_CHUNK_SIZE * 2 + 10]);
        let total = data.len() as u64;
        let chunks: Vec<_> = progress_stream(data, Arc::new(AtomicU64::new(0)), total, Some(callback))
            .collect()
            .await;

        assert_eq!(chunks.len(), 3);
        let seen = seen.lock().unwrap();
        assert_eq!(
            *seen,
            vec![
                (UPLOAD_CHUNK_SIZE as u64, total),
                (UPLOAD_CHUNK_SIZE as u64 * 2, total),
                (total, total)
            ]
        );
    }

    #[test]
    fn test_build_form_rejects_bad_content_type() {
        let form = MultipartForm::new().part(MultipartPart::file(
            "file",
            "a.jpg",
            "not a mime",
            Bytes::from_static(b"x"),
        ));

        assert!(build_form(form, None).is_err());
    }
}
