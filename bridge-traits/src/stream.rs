//! Push Stream Abstraction
//!
//! A long-lived, server-push connection (WebSocket on desktop). The core only
//! needs to open a connection, read inbound frames until the peer goes away,
//! and close it.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::Result;

/// A single inbound frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamFrame {
    Text(String),
    Binary(Bytes),
}

impl StreamFrame {
    /// Frame payload as text, if it is valid UTF-8.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            StreamFrame::Text(text) => Some(text),
            StreamFrame::Binary(bytes) => std::str::from_utf8(bytes).ok(),
        }
    }
}

/// An open push connection.
#[async_trait]
pub trait StreamConnection: Send {
    /// Wait for the next inbound frame.
    ///
    /// Returns `None` once the peer closed the connection, and `Some(Err(_))`
    /// for a transport error. Control frames (ping/pong) are handled by the
    /// implementation and never surface here.
    async fn next_frame(&mut self) -> Option<Result<StreamFrame>>;

    /// Close the connection. Calling this on an already closed connection is
    /// not an error.
    async fn close(&mut self) -> Result<()>;
}

/// Opens push connections.
///
/// # Example
///
/// ```ignore
/// use bridge_traits::stream::StreamConnector;
///
/// async fn tail(connector: &dyn StreamConnector) -> Result<()> {
///     let mut conn = connector.connect("ws://nas.local:8080/logs/stream?n=50").await?;
///     while let Some(frame) = conn.next_frame().await {
///         println!("{:?}", frame?);
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait StreamConnector: Send + Sync {
    /// Open a connection to `url`. Resolves once the transport is open.
    async fn connect(&self, url: &str) -> Result<Box<dyn StreamConnection>>;
}
