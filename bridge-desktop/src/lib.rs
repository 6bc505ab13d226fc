//! # Desktop Bridge Implementations
//!
//! Default implementations of bridge traits for desktop platforms
//! (macOS, Windows, Linux).
//!
//! ## Overview
//!
//! - `HttpClient` using `reqwest`, including streamed multipart uploads
//! - `StreamConnector` using `tokio-tungstenite`
//!
//! ## Usage
//!
//! ```ignore
//! use bridge_desktop::{ReqwestHttpClient, TungsteniteConnector};
//! use std::sync::Arc;
//!
//! let http = Arc::new(ReqwestHttpClient::new()?);
//! let stream = Arc::new(TungsteniteConnector::new());
//! ```

mod http;
mod websocket;

pub use http::ReqwestHttpClient;
pub use websocket::{TungsteniteConnection, TungsteniteConnector};
