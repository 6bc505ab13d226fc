//! # Core Configuration Module
//!
//! Configuration for the household media and log-tail core.
//!
//! ## Overview
//!
//! A builder assembles a [`CoreConfig`] holding the host bridges and the
//! settings of the media cache, upload coordinator and log stream client.
//! Validation is fail-fast: `build()` either returns a config every component
//! can use as-is or an actionable [`Error`].
//!
//! ## Bridges
//!
//! - `HttpClient` - media service requests (desktop default: reqwest)
//! - `StreamConnector` - log push stream (desktop default: tokio-tungstenite)
//! - `Clock` - thumbnail expiry (default: system clock)
//!
//! With the `desktop-shims` feature the desktop adapters are supplied when a
//! bridge is not injected. Without it a missing bridge is reported as
//! [`Error::CapabilityMissing`].
//!
//! ## Usage
//!
//! ```ignore
//! use core_runtime::config::CoreConfig;
//!
//! let config = CoreConfig::builder()
//!     .api_base_url("http://192.168.1.20:8080/")
//!     .household_id("hh-1")
//!     .log_stream_host("192.168.1.20")
//!     .build()?;
//!
//! assert_eq!(config.api_base_url, "http://192.168.1.20:8080");
//! ```
//!
//! ### From the environment
//!
//! ```ignore
//! let config = CoreConfig::builder().from_env().build()?;
//! ```
//!
//! | Variable | Setting |
//! |----------|---------|
//! | `PI_API_URL` | full media service URL |
//! | `PI_HOST` / `NEXT_PUBLIC_PI_HOST`, `PI_PORT` | media service host and port when no full URL is set |
//! | `HOUSEHOLD_ID` / `NEXT_PUBLIC_HOUSEHOLD_ID` | household header value |
//! | `VIEWER_ID` | identity used by visibility filters |
//! | `PI_WS_URL` | full log stream endpoint |
//! | `NEXT_PUBLIC_PI_HOST`, `NEXT_PUBLIC_PI_PORT` | log stream host and port |

use crate::error::{Error, Result};
use bridge_traits::{Clock, HttpClient, StreamConnector, SystemClock};
use std::sync::Arc;
use std::time::Duration;

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_PAGE_SIZE: u32 = 20;
pub const MAX_PAGE_SIZE: u32 = 100;
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 100 * 1024 * 1024;
pub const DEFAULT_LOG_STREAM_PORT: u16 = 8080;
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(3);
pub const DEFAULT_LOG_LINE_COUNT: u32 = 50;
pub const DEFAULT_EVENT_BUFFER_SIZE: usize = 100;

/// Path of the log push endpoint on the log service.
pub const LOG_STREAM_PATH: &str = "/logs/stream";

/// Core configuration.
///
/// Use [`CoreConfigBuilder`] to construct instances.
#[derive(Clone)]
pub struct CoreConfig {
    /// Media service base URL, without trailing slash
    pub api_base_url: String,

    /// Sent as `X-Household-ID` on every media request
    pub household_id: String,

    /// Identity of the person browsing; decides `mine` membership
    pub viewer_id: Option<String>,

    /// Items requested per page (1..=100)
    pub page_size: u32,

    /// Largest file the upload coordinator accepts
    pub max_upload_bytes: u64,

    pub log_stream: LogStreamConfig,

    /// Capacity of the event bus channel
    pub event_buffer_size: usize,

    pub http_client: Arc<dyn HttpClient>,
    pub stream_connector: Arc<dyn StreamConnector>,
    pub clock: Arc<dyn Clock>,
}

impl std::fmt::Debug for CoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreConfig")
            .field("api_base_url", &self.api_base_url)
            .field(
                "household_id",
                &crate::logging::redact_if_sensitive("household_id", &self.household_id),
            )
            .field("viewer_id", &self.viewer_id.as_ref().map(|_| "<set>"))
            .field("page_size", &self.page_size)
            .field("max_upload_bytes", &self.max_upload_bytes)
            .field("log_stream", &self.log_stream)
            .field("event_buffer_size", &self.event_buffer_size)
            .field("http_client", &"HttpClient { ... }")
            .field("stream_connector", &"StreamConnector { ... }")
            .finish()
    }
}

/// Settings of the log stream client.
///
/// The endpoint is derived lazily: a missing host is not a build error, it
/// puts every log client built from this config into its terminal
/// unconfigured state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogStreamConfig {
    /// Full endpoint (e.g. `ws://nas.local:8080/logs/stream`), overrides host/port
    pub url: Option<String>,
    pub host: Option<String>,
    pub port: u16,
    /// Fixed delay between a disconnect and the next connection attempt
    pub reconnect_delay: Duration,
    /// Tail length requested when the caller does not choose one
    pub default_line_count: u32,
    /// Keep only this many most recent entries; `None` keeps everything
    pub buffer_limit: Option<usize>,
}

impl Default for LogStreamConfig {
    fn default() -> Self {
        Self {
            url: None,
            host: None,
            port: DEFAULT_LOG_STREAM_PORT,
            reconnect_delay: DEFAULT_RECONNECT_DELAY,
            default_line_count: DEFAULT_LOG_LINE_COUNT,
            buffer_limit: None,
        }
    }
}

impl LogStreamConfig {
    /// Endpoint without query string, or `None` when it cannot be derived.
    pub fn endpoint(&self) -> Option<String> {
        if let Some(url) = self.url.as_deref().map(str::trim).filter(|u| !u.is_empty()) {
            return Some(url.trim_end_matches('/').to_string());
        }

        let host = self.host.as_deref().map(str::trim).filter(|h| !h.is_empty())?;
        Some(format!("ws://{}:{}{}", host, self.port, LOG_STREAM_PATH))
    }

    fn validate(&self) -> Result<()> {
        if let Some(url) = &self.url {
            if !(url.starts_with("ws://") || url.starts_with("wss://")) {
                return Err(Error::Config(format!(
                    "Log stream URL must start with ws:// or wss://, got '{}'",
                    url
                )));
            }
        }

        if self.port == 0 {
            return Err(Error::Config("Log stream port cannot be 0".to_string()));
        }

        if self.reconnect_delay.is_zero() {
            return Err(Error::Config(
                "Log stream reconnect delay must be greater than 0".to_string(),
            ));
        }

        if self.default_line_count == 0 {
            return Err(Error::Config(
                "Default log line count must be greater than 0".to_string(),
            ));
        }

        if self.buffer_limit == Some(0) {
            return Err(Error::Config(
                "Log buffer limit must be greater than 0. Leave it unset for an unbounded buffer."
                    .to_string(),
            ));
        }

        Ok(())
    }
}

impl CoreConfig {
    /// Creates a new builder for constructing a `CoreConfig`.
    pub fn builder() -> CoreConfigBuilder {
        CoreConfigBuilder::default()
    }

    /// Validates the configuration and returns an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.api_base_url.is_empty() {
            return Err(Error::Config("API base URL cannot be empty".to_string()));
        }

        if !(self.api_base_url.starts_with("http://") || self.api_base_url.starts_with("https://"))
        {
            return Err(Error::Config(format!(
                "API base URL must start with http:// or https://, got '{}'",
                self.api_base_url
            )));
        }

        if self.page_size == 0 || self.page_size > MAX_PAGE_SIZE {
            return Err(Error::Config(format!(
                "Page size must be between 1 and {}, got {}",
                MAX_PAGE_SIZE, self.page_size
            )));
        }

        if self.max_upload_bytes == 0 {
            return Err(Error::Config(
                "Maximum upload size must be greater than 0 bytes".to_string(),
            ));
        }

        if self.event_buffer_size == 0 {
            return Err(Error::Config(
                "Event buffer size must be greater than 0".to_string(),
            ));
        }

        self.log_stream.validate()
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn http_client_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "HttpClient".to_string(),
        message: "HttpClient implementation is required to reach the media service. \
                 Desktop: enable the 'desktop-shims' feature to use the default ReqwestHttpClient. \
                 Other hosts: inject an adapter with CoreConfigBuilder::http_client."
            .to_string(),
    }
}

#[cfg(not(feature = "desktop-shims"))]
fn stream_connector_missing_error() -> Error {
    Error::CapabilityMissing {
        capability: "StreamConnector".to_string(),
        message: "StreamConnector implementation is required for the log stream. \
                 Desktop: enable the 'desktop-shims' feature to use the default TungsteniteConnector. \
                 Other hosts: inject an adapter with CoreConfigBuilder::stream_connector."
            .to_string(),
    }
}

#[cfg(feature = "desktop-shims")]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    use bridge_desktop::ReqwestHttpClient;

    Ok(Arc::new(ReqwestHttpClient::new()?))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_http_client() -> Result<Arc<dyn HttpClient>> {
    Err(http_client_missing_error())
}

#[cfg(feature = "desktop-shims")]
fn provide_default_stream_connector() -> Result<Arc<dyn StreamConnector>> {
    Ok(Arc::new(bridge_desktop::TungsteniteConnector::new()))
}

#[cfg(not(feature = "desktop-shims"))]
fn provide_default_stream_connector() -> Result<Arc<dyn StreamConnector>> {
    Err(stream_connector_missing_error())
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Builder for constructing [`CoreConfig`] instances.
#[derive(Default)]
pub struct CoreConfigBuilder {
    api_base_url: Option<String>,
    household_id: Option<String>,
    viewer_id: Option<String>,
    page_size: Option<u32>,
    max_upload_bytes: Option<u64>,
    log_stream: LogStreamConfig,
    event_buffer_size: Option<usize>,
    http_client: Option<Arc<dyn HttpClient>>,
    stream_connector: Option<Arc<dyn StreamConnector>>,
    clock: Option<Arc<dyn Clock>>,
}

impl CoreConfigBuilder {
    /// Fill unset values from the process environment.
    pub fn from_env(self) -> Self {
        self.from_env_with(|key| std::env::var(key).ok())
    }

    /// Fill unset values from `lookup`, using the same variable names as
    /// [`from_env`](Self::from_env).
    ///
    /// Values set on the builder before this call win over the environment.
    pub fn from_env_with<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| non_empty(lookup(key));

        if self.api_base_url.is_none() {
            self.api_base_url = var("PI_API_URL").or_else(|| {
                let host = var("PI_HOST").or_else(|| var("NEXT_PUBLIC_PI_HOST"))?;
                let port = var("PI_PORT").unwrap_or_else(|| "8080".to_string());
                Some(format!("http://{}:{}", host, port))
            });
        }

        if self.household_id.is_none() {
            self.household_id = var("HOUSEHOLD_ID").or_else(|| var("NEXT_PUBLIC_HOUSEHOLD_ID"));
        }

        if self.viewer_id.is_none() {
            self.viewer_id = var("VIEWER_ID");
        }

        if self.log_stream.url.is_none() {
            self.log_stream.url = var("PI_WS_URL");
        }

        if self.log_stream.host.is_none() {
            self.log_stream.host = var("NEXT_PUBLIC_PI_HOST");
        }

        if let Some(port) = var("NEXT_PUBLIC_PI_PORT").and_then(|p| p.trim().parse().ok()) {
            if self.log_stream.port == DEFAULT_LOG_STREAM_PORT {
                self.log_stream.port = port;
            }
        }

        self
    }

    /// Media service base URL. A trailing slash is removed.
    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = Some(url.into());
        self
    }

    pub fn household_id(mut self, id: impl Into<String>) -> Self {
        self.household_id = Some(id.into());
        self
    }

    pub fn viewer_id(mut self, id: impl Into<String>) -> Self {
        self.viewer_id = Some(id.into());
        self
    }

    /// Items per page, 1..=100. Default: 20
    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = Some(size);
        self
    }

    /// Default: 100 MiB
    pub fn max_upload_bytes(mut self, bytes: u64) -> Self {
        self.max_upload_bytes = Some(bytes);
        self
    }

    /// Full log stream endpoint, overriding host and port.
    pub fn log_stream_url(mut self, url: impl Into<String>) -> Self {
        self.log_stream.url = Some(url.into());
        self
    }

    pub fn log_stream_host(mut self, host: impl Into<String>) -> Self {
        self.log_stream.host = Some(host.into());
        self
    }

    /// Default: 8080
    pub fn log_stream_port(mut self, port: u16) -> Self {
        self.log_stream.port = port;
        self
    }

    /// Default: 3 seconds
    pub fn reconnect_delay(mut self, delay: Duration) -> Self {
        self.log_stream.reconnect_delay = delay;
        self
    }

    /// Default: 50
    pub fn default_log_line_count(mut self, lines: u32) -> Self {
        self.log_stream.default_line_count = lines;
        self
    }

    /// Cap the log buffer to the `limit` most recent entries. Default: unbounded
    pub fn log_buffer_limit(mut self, limit: usize) -> Self {
        self.log_stream.buffer_limit = Some(limit);
        self
    }

    /// Default: 100
    pub fn event_buffer_size(mut self, size: usize) -> Self {
        self.event_buffer_size = Some(size);
        self
    }

    /// Sets the HTTP client implementation.
    ///
    /// If not provided, the reqwest-based desktop client is used when the
    /// `desktop-shims` feature is enabled.
    pub fn http_client(mut self, client: Arc<dyn HttpClient>) -> Self {
        self.http_client = Some(client);
        self
    }

    /// Sets the push stream connector.
    ///
    /// If not provided, the tokio-tungstenite connector is used when the
    /// `desktop-shims` feature is enabled.
    pub fn stream_connector(mut self, connector: Arc<dyn StreamConnector>) -> Self {
        self.stream_connector = Some(connector);
        self
    }

    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Builds the final `CoreConfig` instance.
    ///
    /// # Errors
    ///
    /// - [`Error::CapabilityMissing`] when a bridge is missing and no default
    ///   is available
    /// - [`Error::Config`] when a setting is out of range
    pub fn build(self) -> Result<CoreConfig> {
        let api_base_url = self
            .api_base_url
            .unwrap_or_else(|| DEFAULT_API_BASE_URL.to_string())
            .trim()
            .trim_end_matches('/')
            .to_string();

        let http_client = match self.http_client {
            Some(client) => client,
            None => provide_default_http_client()?,
        };

        let stream_connector = match self.stream_connector {
            Some(connector) => connector,
            None => provide_default_stream_connector()?,
        };

        let config = CoreConfig {
            api_base_url,
            household_id: self.household_id.unwrap_or_default(),
            viewer_id: non_empty(self.viewer_id),
            page_size: self.page_size.unwrap_or(DEFAULT_PAGE_SIZE),
            max_upload_bytes: self.max_upload_bytes.unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            log_stream: self.log_stream,
            event_buffer_size: self.event_buffer_size.unwrap_or(DEFAULT_EVENT_BUFFER_SIZE),
            http_client,
            stream_connector,
            clock: self.clock.unwrap_or_else(|| Arc::new(SystemClock)),
        };

        config.validate()?;

        Ok(config)
    }
}
