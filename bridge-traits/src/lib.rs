//! # Host Bridge Traits
//!
//! Capability traits the media and log cores require from the host platform.
//!
//! ## Traits
//!
//! ### Networking
//! - [`HttpClient`](http::HttpClient) - Async HTTP requests and multipart uploads with progress
//! - [`StreamConnector`](stream::StreamConnector) - Long-lived push connections (WebSocket)
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](time::LoggerSink) - Forward structured logs to host logging
//!
//! ## Platform Requirements
//!
//! | Platform | Implementation Crate |
//! |----------|---------------------|
//! | Desktop  | `bridge-desktop`    |
//!
//! Other hosts inject their own adapters through
//! `core_runtime::config::CoreConfigBuilder`.
//!
//! ## Error Handling
//!
//! All bridge traits use [`BridgeError`](error::BridgeError). Implementations
//! should convert platform-specific errors into it and keep the message
//! actionable (URL, status, what was attempted).
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so a single adapter can be shared
//! across async tasks behind an `Arc`.

pub mod error;
pub mod http;
pub mod stream;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use http::{
    HttpClient, HttpMethod, HttpRequest, HttpResponse, MultipartForm, MultipartPart,
    ProgressCallback, RetryPolicy,
};
pub use stream::{StreamConnection, StreamConnector, StreamFrame};
pub use time::{Clock, ConsoleLogger, LogLevel, LogRecord, LoggerSink, SystemClock};
