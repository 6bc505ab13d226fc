//! # Event Bus System
//!
//! Typed state-change notifications built on `tokio::sync::broadcast`.
//!
//! ## Overview
//!
//! The media cache, the upload coordinator and every log stream client publish
//! what changed on a shared [`EventBus`]. Presentation code subscribes and
//! re-reads the affected snapshot (`MediaCache::view`,
//! `LogStreamClient::snapshot`); events describe the change, snapshots carry
//! the state.
//!
//! ```text
//! ┌─────────────┐     emit      ┌───────────┐
//! │ MediaCache  ├──────────────>│           │
//! └─────────────┘               │           │     subscribe    ┌────────────┐
//! ┌─────────────┐     emit      │ EventBus  ├─────────────────>│ Subscriber │
//! │ Uploads     ├──────────────>│ (broadcast│                  └────────────┘
//! └─────────────┘               │  channel) │     subscribe    ┌────────────┐
//! ┌─────────────┐     emit      │           ├─────────────────>│ Subscriber │
//! │ Log clients ├──────────────>│           │                  └────────────┘
//! └─────────────┘               └───────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust
//! use core_runtime::events::{CoreEvent, EventBus, MediaEvent};
//!
//! # #[tokio::main]
//! # async fn main() {
//! let bus = EventBus::new(100);
//! let mut rx = bus.subscribe();
//!
//! bus.emit(CoreEvent::Media(MediaEvent::ViewCreated {
//!     filter: "all/all".to_string(),
//! }))
//! .ok();
//!
//! assert!(matches!(rx.recv().await, Ok(CoreEvent::Media(_))));
//! # }
//! ```
//!
//! ## Error Handling
//!
//! `emit` fails only when nobody is subscribed; publishers ignore that with
//! `.ok()`. A slow subscriber receives `RecvError::Lagged(n)` and can keep
//! reading; `RecvError::Closed` means every publisher is gone.

use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::broadcast;

pub use tokio::sync::broadcast::error::{RecvError, SendError};
pub use tokio::sync::broadcast::Receiver;

pub use crate::config::DEFAULT_EVENT_BUFFER_SIZE;

// ============================================================================
// Core Event Types
// ============================================================================

/// Top-level event enum encompassing all event categories.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", content = "payload")]
pub enum CoreEvent {
    Media(MediaEvent),
    Upload(UploadEvent),
    LogStream(LogStreamEvent),
}

impl CoreEvent {
    /// Returns a human-readable description of the event.
    pub fn description(&self) -> &str {
        match self {
            CoreEvent::Media(e) => e.description(),
            CoreEvent::Upload(e) => e.description(),
            CoreEvent::LogStream(e) => e.description(),
        }
    }

    /// Returns the severity level of the event.
    pub fn severity(&self) -> EventSeverity {
        match self {
            CoreEvent::Media(MediaEvent::LoadFailed { .. }) => EventSeverity::Error,
            CoreEvent::Upload(UploadEvent::Failed { .. }) => EventSeverity::Error,
            CoreEvent::LogStream(LogStreamEvent::ConfigurationError { .. }) => {
                EventSeverity::Error
            }
            CoreEvent::Upload(UploadEvent::Conflict { .. }) => EventSeverity::Warning,
            CoreEvent::Media(MediaEvent::PageLoaded { .. }) => EventSeverity::Info,
            CoreEvent::Upload(UploadEvent::Completed { .. }) => EventSeverity::Info,
            CoreEvent::LogStream(LogStreamEvent::StateChanged { .. }) => EventSeverity::Info,
            _ => EventSeverity::Debug,
        }
    }
}

/// Event severity levels for filtering and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

// ============================================================================
// Media Cache Events
// ============================================================================

/// Changes to media collection views. `filter` is the view key as displayed
/// by `MediaFilter` (e.g. `photo/mine`).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum MediaEvent {
    /// A view was created for a filter configuration seen for the first time.
    ViewCreated { filter: String },
    /// A page was applied to a view.
    PageLoaded {
        filter: String,
        page: u32,
        /// Items that were new to the view
        added: usize,
        total_count: u64,
        has_more: bool,
    },
    /// A page request failed; the view's error slot now holds `message`.
    LoadFailed {
        filter: String,
        page: u32,
        message: String,
    },
    /// A view was reset and restarted from page 1.
    Refreshed { filter: String, generation: u64 },
    /// An item was prepended to `views` views without a round trip.
    ItemInserted { media_id: String, views: usize },
    /// An item was dropped from `views` views without a round trip.
    ItemRemoved { media_id: String, views: usize },
    /// Nobody observes the filter configuration any more.
    ViewEvicted { filter: String },
    /// A page arrived for a superseded generation and was dropped.
    ResponseDiscarded {
        filter: String,
        page: u32,
        generation: u64,
    },
}

impl MediaEvent {
    fn description(&self) -> &str {
        match self {
            MediaEvent::ViewCreated { .. } => "Media view created",
            MediaEvent::PageLoaded { .. } => "Media page loaded",
            MediaEvent::LoadFailed { .. } => "Media page failed to load",
            MediaEvent::Refreshed { .. } => "Media view refreshed",
            MediaEvent::ItemInserted { .. } => "Media item inserted",
            MediaEvent::ItemRemoved { .. } => "Media item removed",
            MediaEvent::ViewEvicted { .. } => "Media view evicted",
            MediaEvent::ResponseDiscarded { .. } => "Stale media page discarded",
        }
    }
}

// ============================================================================
// Upload Events
// ============================================================================

/// Lifecycle of a single upload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum UploadEvent {
    Started { file_name: String, size_bytes: u64 },
    /// Integer percent, non-decreasing within one upload
    Progress { file_name: String, percent: u8 },
    Completed { file_name: String, media_id: String },
    /// The service already holds a byte-identical file.
    Conflict {
        file_name: String,
        existing_id: String,
    },
    Failed { file_name: String, message: String },
}

impl UploadEvent {
    fn description(&self) -> &str {
        match self {
            UploadEvent::Started { .. } => "Upload started",
            UploadEvent::Progress { .. } => "Upload progress",
            UploadEvent::Completed { .. } => "Upload completed",
            UploadEvent::Conflict { .. } => "Upload matched an existing item",
            UploadEvent::Failed { .. } => "Upload failed",
        }
    }
}

// ============================================================================
// Log Stream Events
// ============================================================================

/// Changes to a log stream client. `client_id` tells clients apart when
/// several log surfaces are open.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "event")]
pub enum LogStreamEvent {
    /// Connection state moved to `state` (`connecting`, `connected`,
    /// `disconnected`, `unconfigured`).
    StateChanged { client_id: u64, state: String },
    EntriesCleared { client_id: u64, cleared: usize },
    /// The endpoint cannot be derived; the client will not connect.
    ConfigurationError { client_id: u64, message: String },
}

impl LogStreamEvent {
    fn description(&self) -> &str {
        match self {
            LogStreamEvent::StateChanged { .. } => "Log stream state changed",
            LogStreamEvent::EntriesCleared { .. } => "Log buffer cleared",
            LogStreamEvent::ConfigurationError { .. } => "Log stream not configured",
        }
    }
}

// ============================================================================
// Event Bus
// ============================================================================

/// Central broadcast channel for [`CoreEvent`]s.
///
/// Cloning is cheap; clones publish into the same channel.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<CoreEvent>,
}

impl EventBus {
    /// Creates a new event bus with the specified buffer size.
    ///
    /// A subscriber that falls behind by more than `capacity` events receives
    /// `RecvError::Lagged`.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Publishes an event to all subscribers.
    ///
    /// Returns the number of subscribers that received the event, or an
    /// error if there are no active subscribers.
    pub fn emit(&self, event: CoreEvent) -> Result<usize, SendError<CoreEvent>> {
        self.sender.send(event)
    }

    /// Creates a new subscriber. Past events are not replayed.
    pub fn subscribe(&self) -> Receiver<CoreEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_BUFFER_SIZE)
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventBus")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

// ============================================================================
// Event Stream Wrapper
// ============================================================================

type EventFilter = Box<dyn Fn(&CoreEvent) -> bool + Send + Sync>;

/// A `broadcast::Receiver` with an optional predicate.
///
/// ```rust
/// use core_runtime::events::{CoreEvent, EventBus, EventStream};
///
/// let bus = EventBus::new(100);
/// let uploads = EventStream::new(bus.subscribe())
///     .filter(|event| matches!(event, CoreEvent::Upload(_)));
/// ```
pub struct EventStream {
    receiver: Receiver<CoreEvent>,
    filter: Option<EventFilter>,
}

impl EventStream {
    pub fn new(receiver: Receiver<CoreEvent>) -> Self {
        Self {
            receiver,
            filter: None,
        }
    }

    /// Only events matching `predicate` are returned by `recv()`.
    pub fn filter<F>(mut self, predicate: F) -> Self
    where
        F: Fn(&CoreEvent) -> bool + Send + Sync + 'static,
    {
        self.filter = Some(Box::new(predicate));
        self
    }

    fn matches(&self, event: &CoreEvent) -> bool {
        self.filter.as_ref().map_or(true, |filter| filter(event))
    }

    /// Receives the next event that passes the filter.
    ///
    /// # Errors
    ///
    /// `RecvError::Lagged(n)` if the subscriber fell behind by `n` events,
    /// `RecvError::Closed` if all senders have been dropped.
    pub async fn recv(&mut self) -> Result<CoreEvent, RecvError> {
        loop {
            let event = self.receiver.recv().await?;
            if self.matches(&event) {
                return Ok(event);
            }
        }
    }

    /// Attempts to receive an event without waiting.
    ///
    /// Returns `None` if no matching event is currently available.
    pub fn try_recv(&mut self) -> Option<Result<CoreEvent, RecvError>> {
        loop {
            match self.receiver.try_recv() {
                Ok(event) => {
                    if self.matches(&event) {
                        return Some(Ok(event));
                    }
                }
                Err(broadcast::error::TryRecvError::Empty) => return None,
                Err(broadcast::error::TryRecvError::Lagged(n)) => {
                    return Some(Err(RecvError::Lagged(n)))
                }
                Err(broadcast::error::TryRecvError::Closed) => return Some(Err(RecvError::Closed)),
            }
        }
    }
}

impl fmt::Debug for EventStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventStream")
            .field("has_filter", &self.filter.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page_loaded(page: u32) -> CoreEvent {
        CoreEvent::Media(MediaEvent::PageLoaded {
            filter: "all/all".to_string(),
            page,
            added: 20,
            total_count: 45,
            has_more: true,
        })
    }

    #[tokio::test]
    async fn test_event_bus_subscription() {
        let bus = EventBus::new(10);
        assert_eq!(bus.subscriber_count(), 0);

        let _sub1 = bus.subscribe();
        let _sub2 = bus.subscribe();
        assert_eq!(bus.subscriber_count(), 2);
    }

    #[tokio::test]
    async fn test_event_emission_no_subscribers() {
        let bus = EventBus::new(10);
        assert!(bus.emit(page_loaded(1)).is_err());
    }

    #[tokio::test]
    async fn test_multiple_subscribers_receive_same_event() {
        let bus = EventBus::new(10);
        let mut sub1 = bus.subscribe();
        let mut sub2 = bus.subscribe();

        let event = CoreEvent::Upload(UploadEvent::Completed {
            file_name: "IMG_0001.jpg".to_string(),
            media_id: "m-1".to_string(),
        });
        assert_eq!(bus.emit(event.clone()).unwrap(), 2);

        assert_eq!(sub1.recv().await.unwrap(), event);
        assert_eq!(sub2.recv().await.unwrap(), event);
    }

    #[tokio::test]
    async fn test_event_stream_with_filter() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe())
            .filter(|event| matches!(event, CoreEvent::LogStream(_)));

        bus.emit(page_loaded(1)).ok();
        let log_event = CoreEvent::LogStream(LogStreamEvent::StateChanged {
            client_id: 1,
            state: "connected".to_string(),
        });
        bus.emit(log_event.clone()).ok();

        assert_eq!(stream.recv().await.unwrap(), log_event);
    }

    #[tokio::test]
    async fn test_lagged_subscriber() {
        let bus = EventBus::new(2);
        let mut sub = bus.subscribe();

        for page in 1..=5 {
            bus.emit(page_loaded(page)).ok();
        }

        assert!(matches!(sub.recv().await, Err(RecvError::Lagged(_))));
    }

    #[test]
    fn test_event_severity() {
        let failed = CoreEvent::Media(MediaEvent::LoadFailed {
            filter: "video/public".to_string(),
            page: 2,
            message: "Network error".to_string(),
        });
        assert_eq!(failed.severity(), EventSeverity::Error);

        let conflict = CoreEvent::Upload(UploadEvent::Conflict {
            file_name: "a.jpg".to_string(),
            existing_id: "abc".to_string(),
        });
        assert_eq!(conflict.severity(), EventSeverity::Warning);

        assert_eq!(page_loaded(1).severity(), EventSeverity::Info);

        let progress = CoreEvent::Upload(UploadEvent::Progress {
            file_name: "a.jpg".to_string(),
            percent: 40,
        });
        assert_eq!(progress.severity(), EventSeverity::Debug);
    }

    #[test]
    fn test_event_description() {
        let event = CoreEvent::LogStream(LogStreamEvent::EntriesCleared {
            client_id: 3,
            cleared: 12,
        });
        assert_eq!(event.description(), "Log buffer cleared");
    }

    #[test]
    fn test_event_serialization() {
        let event = CoreEvent::Media(MediaEvent::ResponseDiscarded {
            filter: "photo/mine".to_string(),
            page: 3,
            generation: 7,
        });

        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"type\":\"Media\""));
        assert!(json.contains("\"event\":\"ResponseDiscarded\""));

        let deserialized: CoreEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, event);
    }

    #[tokio::test]
    async fn test_try_recv() {
        let bus = EventBus::new(10);
        let mut stream = EventStream::new(bus.subscribe());
        assert!(stream.try_recv().is_none());

        bus.emit(page_loaded(2)).ok();
        let received = stream.try_recv().unwrap().unwrap();
        assert_eq!(received, page_loaded(2));
    }
}
