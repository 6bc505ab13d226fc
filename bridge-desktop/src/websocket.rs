//! WebSocket push connections using tokio-tungstenite

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    stream::{StreamConnection, StreamConnector, StreamFrame},
};
use bytes::Bytes;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{Error as WsError, Message},
    MaybeTlsStream, WebSocketStream,
};
use tracing::{debug, warn};

/// Opens WebSocket connections.
#[derive(Debug, Clone, Default)]
pub struct TungsteniteConnector;

impl TungsteniteConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StreamConnector for TungsteniteConnector {
    async fn connect(&self, url: &str) -> Result<Box<dyn StreamConnection>> {
        debug!(url = %url, "Opening WebSocket");

        let (ws, response) = connect_async(url).await.map_err(|e| {
            warn!(url = %url, error = %e, "WebSocket handshake failed");
            BridgeError::ConnectionFailed(format!("{}: {}", url, e))
        })?;

        debug!(status = response.status().as_u16(), "WebSocket open");
        Ok(Box::new(TungsteniteConnection {
            ws,
            closed: false,
        }))
    }
}

/// An open WebSocket.
pub struct TungsteniteConnection {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

#[async_trait]
impl StreamConnection for TungsteniteConnection {
    async fn next_frame(&mut self) -> Option<Result<StreamFrame>> {
        if self.closed {
            return None;
        }

        loop {
            match self.ws.next().await {
                Some(Ok(Message::Text(text))) => return Some(Ok(StreamFrame::Text(text))),
                Some(Ok(Message::Binary(data))) => {
                    return Some(Ok(StreamFrame::Binary(Bytes::from(data))))
                }
                // tungstenite answers pings itself while we poll
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(Message::Frame(_))) => continue,
                Some(Ok(Message::Close(frame))) => {
                    debug!(?frame, "WebSocket closed by peer");
                    self.closed = true;
                    return None;
                }
                Some(Err(WsError::ConnectionClosed)) | Some(Err(WsError::AlreadyClosed)) | None => {
                    self.closed = true;
                    return None;
                }
                Some(Err(e)) => {
                    self.closed = true;
                    return Some(Err(BridgeError::ConnectionFailed(e.to_string())));
                }
            }
        }
    }

    async fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        match self.ws.close(None).await {
            Ok(()) | Err(WsError::ConnectionClosed) | Err(WsError::AlreadyClosed) => Ok(()),
            Err(e) => Err(BridgeError::ConnectionFailed(e.to_string())),
        }
    }
}
