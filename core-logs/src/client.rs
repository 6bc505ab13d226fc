//! # Log Stream Client
//!
//! Keeps one push connection to the log service open for as long as the
//! client lives and mirrors what arrives into a [`LogBuffer`].
//!
//! ## State machine
//!
//! ```text
//!              ┌──────────────── reconnect delay ───────────────┐
//!              v                                                 │
//! start ──> Connecting ──open──> Connected ──close/error──> Disconnected
//!   │
//!   └── no endpoint ──> Unconfigured (terminal, never retried)
//! ```
//!
//! Each connection sequence runs as one spawned task owning a
//! `CancellationToken`. Teardown cancels the token: a pending reconnect
//! timer is abandoned and an open connection is closed. Everything the task
//! writes is checked against its own token under the state lock, so a
//! superseded task can never touch the buffer or state again.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bridge_traits::stream::{StreamConnector, StreamFrame};
use core_runtime::config::{LogStreamConfig, DEFAULT_LOG_LINE_COUNT};
use core_runtime::events::{CoreEvent, EventBus, LogStreamEvent};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::buffer::LogBuffer;
use crate::entry::{parse_frame, InboundFrame, LogEntry};
use crate::error::{LogStreamError, Result};

/// Error slot text after a transport failure.
pub const TRANSPORT_ERROR_MESSAGE: &str = "WebSocket connection error";
/// Error slot text when no endpoint can be derived.
pub const UNCONFIGURED_MESSAGE: &str = "Log stream not configured: set PI_WS_URL or NEXT_PUBLIC_PI_HOST";

static NEXT_CLIENT_ID: AtomicU64 = AtomicU64::new(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamState {
    Connecting,
    Connected,
    Disconnected,
    /// Terminal: the endpoint could not be derived.
    Unconfigured,
}

impl StreamState {
    pub fn as_str(&self) -> &'static str {
        match self {
            StreamState::Connecting => "connecting",
            StreamState::Connected => "connected",
            StreamState::Disconnected => "disconnected",
            StreamState::Unconfigured => "unconfigured",
        }
    }
}

/// What to ask the log service for.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogStreamParams {
    /// Tail length, `n`
    pub line_count: u32,
    /// Only records after this cursor
    pub since: Option<String>,
}

impl Default for LogStreamParams {
    fn default() -> Self {
        Self::new(DEFAULT_LOG_LINE_COUNT)
    }
}

impl LogStreamParams {
    pub fn new(line_count: u32) -> Self {
        Self {
            line_count,
            since: None,
        }
    }

    pub fn since(mut self, cursor: impl Into<String>) -> Self {
        self.since = Some(cursor.into());
        self
    }
}

/// `endpoint` with the tail parameters appended.
pub fn stream_url(endpoint: &str, params: &LogStreamParams) -> String {
    let separator = if endpoint.contains('?') { '&' } else { '?' };
    let mut url = format!("{endpoint}{separator}n={}", params.line_count);
    if let Some(since) = params.since.as_deref().filter(|s| !s.is_empty()) {
        url.push_str("&since=");
        url.push_str(&urlencoding::encode(since));
    }
    url
}

/// Point-in-time copy of a client's observable state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogStreamSnapshot {
    pub state: StreamState,
    pub entries: Vec<LogEntry>,
    pub error: Option<String>,
    pub params: LogStreamParams,
    /// Id the next record will receive
    pub next_id: u64,
}

struct StreamData {
    state: StreamState,
    buffer: LogBuffer,
    error: Option<String>,
    next_id: u64,
    params: LogStreamParams,
}

struct Session {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

struct Inner {
    client_id: u64,
    endpoint: Option<String>,
    reconnect_delay: Duration,
    connector: Arc<dyn StreamConnector>,
    events: Option<EventBus>,
    runtime: Handle,
    data: Mutex<StreamData>,
    session: Mutex<Option<Session>>,
}

impl Inner {
    fn emit(&self, event: LogStreamEvent) {
        if let Some(bus) = &self.events {
            bus.emit(CoreEvent::LogStream(event)).ok();
        }
    }

    /// Move to `state` unless `cancel` (the writer's session) is cancelled.
    fn transition(&self, cancel: Option<&CancellationToken>, state: StreamState) {
        let changed = {
            let mut data = self.data.lock();
            if cancel.is_some_and(CancellationToken::is_cancelled) || data.state == state {
                false
            } else {
                data.state = state;
                if state == StreamState::Connected {
                    data.error = None;
                }
                true
            }
        };

        if changed {
            debug!(client_id = self.client_id, state = state.as_str(), "Log stream state");
            self.emit(LogStreamEvent::StateChanged {
                client_id: self.client_id,
                state: state.as_str().to_string(),
            });
        }
    }

    fn set_error(&self, cancel: &CancellationToken, message: &str) {
        let mut data = self.data.lock();
        if !cancel.is_cancelled() {
            data.error = Some(message.to_string());
        }
    }

    fn ingest(&self, cancel: &CancellationToken, frame: &StreamFrame) {
        let Some(text) = frame.as_text() else {
            debug!(client_id = self.client_id, "Dropping non-text log frame");
            return;
        };

        match parse_frame(text) {
            Ok(InboundFrame::Record(record)) => {
                let mut data = self.data.lock();
                if cancel.is_cancelled() {
                    return;
                }
                let id = data.next_id;
                data.next_id += 1;
                data.buffer.push(record.into_entry(id));
            }
            Ok(InboundFrame::ServerError(message)) => {
                warn!(client_id = self.client_id, error = %message, "Log service reported an error");
                self.set_error(cancel, &message);
            }
            Err(e) => {
                debug!(client_id = self.client_id, error = %e, "Dropping malformed log record");
            }
        }
    }
}

/// Live tail of the server log.
///
/// Dropping the client tears it down.
pub struct LogStreamClient {
    inner: Arc<Inner>,
}

impl LogStreamClient {
    /// Create a client and begin connecting.
    ///
    /// Must be called inside a tokio runtime. A config without a derivable
    /// endpoint still yields a client, in the `Unconfigured` state.
    pub fn start(
        config: &LogStreamConfig,
        connector: Arc<dyn StreamConnector>,
        events: Option<EventBus>,
        params: LogStreamParams,
    ) -> Result<Self> {
        let runtime = Handle::try_current().map_err(|e| LogStreamError::Runtime(e.to_string()))?;
        let buffer = config
            .buffer_limit
            .map_or_else(LogBuffer::new, LogBuffer::with_limit);

        let client = Self {
            inner: Arc::new(Inner {
                client_id: NEXT_CLIENT_ID.fetch_add(1, Ordering::Relaxed),
                endpoint: config.endpoint(),
                reconnect_delay: config.reconnect_delay,
                connector,
                events,
                runtime,
                data: Mutex::new(StreamData {
                    state: StreamState::Disconnected,
                    buffer,
                    error: None,
                    next_id: 0,
                    params,
                }),
                session: Mutex::new(None),
            }),
        };

        client.open();
        Ok(client)
    }

    pub fn client_id(&self) -> u64 {
        self.inner.client_id
    }

    pub fn state(&self) -> StreamState {
        self.inner.data.lock().state
    }

    pub fn error(&self) -> Option<String> {
        self.inner.data.lock().error.clone()
    }

    pub fn params(&self) -> LogStreamParams {
        self.inner.data.lock().params.clone()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.inner.data.lock().buffer.to_vec()
    }

    pub fn snapshot(&self) -> LogStreamSnapshot {
        let data = self.inner.data.lock();
        LogStreamSnapshot {
            state: data.state,
            entries: data.buffer.to_vec(),
            error: data.error.clone(),
            params: data.params.clone(),
            next_id: data.next_id,
        }
    }

    /// Tear down the current connection and start over with `params`.
    /// Buffered entries and the id counter carry over.
    #[instrument(skip(self), fields(client_id = self.inner.client_id))]
    pub fn set_params(&self, params: LogStreamParams) {
        self.teardown();
        self.inner.data.lock().params = params;
        self.open();
    }

    /// Empty the buffer. Connection state and id counter are untouched.
    pub fn clear(&self) -> usize {
        let cleared = self.inner.data.lock().buffer.clear();
        self.inner.emit(LogStreamEvent::EntriesCleared {
            client_id: self.inner.client_id,
            cleared,
        });
        cleared
    }

    /// Cancel any pending reconnect and close the connection. Safe to call
    /// any number of times.
    pub fn teardown(&self) {
        let session = self.inner.session.lock().take();
        if let Some(session) = session {
            session.cancel.cancel();
            debug!(client_id = self.inner.client_id, "Log stream torn down");
        }

        if self.state() != StreamState::Unconfigured {
            self.inner.transition(None, StreamState::Disconnected);
        }
    }

    /// Like [`teardown`](Self::teardown), then wait until the connection
    /// task has closed its transport.
    pub async fn shutdown(&self) {
        let session = self.inner.session.lock().take();
        if let Some(session) = session {
            session.cancel.cancel();
            session.task.await.ok();
        }
        self.teardown();
    }

    fn open(&self) {
        let inner = &self.inner;

        let Some(endpoint) = inner.endpoint.as_deref() else {
            let newly = {
                let mut data = inner.data.lock();
                let newly = data.state != StreamState::Unconfigured;
                data.state = StreamState::Unconfigured;
                data.error = Some(UNCONFIGURED_MESSAGE.to_string());
                newly
            };
            if newly {
                error!(client_id = inner.client_id, "Log stream endpoint cannot be derived");
                inner.emit(LogStreamEvent::StateChanged {
                    client_id: inner.client_id,
                    state: StreamState::Unconfigured.as_str().to_string(),
                });
                inner.emit(LogStreamEvent::ConfigurationError {
                    client_id: inner.client_id,
                    message: UNCONFIGURED_MESSAGE.to_string(),
                });
            }
            return;
        };

        let url = stream_url(endpoint, &inner.data.lock().params);
        let cancel = CancellationToken::new();

        inner.transition(None, StreamState::Connecting);
        let task = inner
            .runtime
            .spawn(run_session(Arc::clone(inner), url, cancel.clone()));
        *inner.session.lock() = Some(Session { cancel, task });
    }
}

impl Drop for LogStreamClient {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for LogStreamClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogStreamClient")
            .field("client_id", &self.inner.client_id)
            .field("endpoint", &self.inner.endpoint)
            .field("state", &self.state())
            .finish()
    }
}

async fn run_session(inner: Arc<Inner>, url: String, cancel: CancellationToken) {
    loop {
        inner.transition(Some(&cancel), StreamState::Connecting);

        let connected = tokio::select! {
            _ = cancel.cancelled() => return,
            result = inner.connector.connect(&url) => result,
        };

        match connected {
            Ok(mut connection) => {
                info!(client_id = inner.client_id, url = %url, "Log stream connected");
                inner.transition(Some(&cancel), StreamState::Connected);

                let torn_down = loop {
                    let frame = tokio::select! {
                        _ = cancel.cancelled() => break true,
                        frame = connection.next_frame() => frame,
                    };

                    match frame {
                        Some(Ok(frame)) => inner.ingest(&cancel, &frame),
                        Some(Err(e)) => {
                            warn!(client_id = inner.client_id, error = %e, "Log stream transport error");
                            inner.set_error(&cancel, TRANSPORT_ERROR_MESSAGE);
                            break false;
                        }
                        None => {
                            info!(client_id = inner.client_id, "Log stream closed by peer");
                            break false;
                        }
                    }
                };

                if let Err(e) = connection.close().await {
                    debug!(client_id = inner.client_id, error = %e, "Error closing log stream");
                }
                if torn_down {
                    return;
                }
            }
            Err(e) => {
                warn!(client_id = inner.client_id, error = %e, "Log stream connection failed");
                inner.set_error(&cancel, TRANSPORT_ERROR_MESSAGE);
            }
        }

        inner.transition(Some(&cancel), StreamState::Disconnected);
        debug!(
            client_id = inner.client_id,
            delay_ms = inner.reconnect_delay.as_millis() as u64,
            "Scheduling reconnect"
        );

        tokio::select! {
            _ = cancel.cancelled() => return,
            _ = tokio::time::sleep(inner.reconnect_delay) => {}
        }
    }
}
