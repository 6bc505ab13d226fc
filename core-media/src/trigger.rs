//! Continuation trigger
//!
//! Turns a host "end of list is visible" signal into at most one
//! `fetch_more` per visibility transition. The host supplies the signal
//! through [`VisibilityObserver`]; it can be an intersection observer, a
//! scroll-percentage poll or a "load more" button.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::cache::MediaCache;
use crate::models::MediaFilter;

pub type BoundaryCallback = Arc<dyn Fn() + Send + Sync>;

/// Identifies the element whose visibility means "near the end".
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryMarker {
    pub filter: MediaFilter,
    /// Number of rendered items when the marker was placed
    pub rendered: usize,
}

/// Host capability: call back once each time `marker` becomes visible.
pub trait VisibilityObserver: Send + Sync {
    fn observe(&self, marker: BoundaryMarker, callback: BoundaryCallback);

    /// Stop all callbacks. Must be idempotent.
    fn dispose(&self);
}

struct TriggerState {
    cache: MediaCache,
    filter: MediaFilter,
    pending: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl TriggerState {
    fn fire(self: &Arc<Self>) -> bool {
        let Some(view) = self.cache.view(self.filter) else {
            return false;
        };
        if view.is_loading || view.is_loading_more || !view.has_more {
            debug!(filter = %self.filter, "Boundary visible, nothing to fetch");
            return false;
        }

        if self
            .pending
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return false;
        }

        let Ok(handle) = Handle::try_current() else {
            warn!("Continuation trigger fired outside a tokio runtime");
            self.pending.store(false, Ordering::Release);
            return false;
        };

        let state = Arc::clone(self);
        let task = handle.spawn(async move {
            if let Err(e) = state.cache.fetch_more(state.filter).await {
                debug!(filter = %state.filter, error = %e, "Continuation fetch failed");
            }
            state.pending.store(false, Ordering::Release);
        });
        *self.task.lock() = Some(task);
        true
    }
}

/// Binds a filter's view to a [`VisibilityObserver`].
///
/// Dropping the trigger disposes the observer.
pub struct ContinuationTrigger {
    state: Arc<TriggerState>,
    observer: Arc<dyn VisibilityObserver>,
}

impl ContinuationTrigger {
    pub fn attach(
        cache: MediaCache,
        filter: MediaFilter,
        observer: Arc<dyn VisibilityObserver>,
        marker: BoundaryMarker,
    ) -> Self {
        let state = Arc::new(TriggerState {
            cache,
            filter,
            pending: AtomicBool::new(false),
            task: Mutex::new(None),
        });

        let callback_state = Arc::clone(&state);
        observer.observe(
            marker,
            Arc::new(move || {
                callback_state.fire();
            }),
        );

        Self { state, observer }
    }

    /// Fire as if the boundary had just become visible. Returns whether a
    /// fetch was started.
    pub fn fire(&self) -> bool {
        self.state.fire()
    }

    pub fn is_pending(&self) -> bool {
        self.state.pending.load(Ordering::Acquire)
    }

    /// Wait for the fetch started by the latest firing, if any.
    pub async fn wait_idle(&self) {
        let task = self.state.task.lock().take();
        if let Some(task) = task {
            task.await.ok();
        }
    }
}

impl Drop for ContinuationTrigger {
    fn drop(&mut self) {
        self.observer.dispose();
    }
}

/// Observer driven by explicit [`signal`](ManualBoundary::signal) calls,
/// e.g. a "load more" button.
#[derive(Default)]
pub struct ManualBoundary {
    callbacks: Mutex<Vec<(BoundaryMarker, BoundaryCallback)>>,
    disposed: AtomicBool,
}

impl ManualBoundary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Report the boundary as visible to every registered callback.
    pub fn signal(&self) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        let callbacks: Vec<BoundaryCallback> = self
            .callbacks
            .lock()
            .iter()
            .map(|(_, callback)| Arc::clone(callback))
            .collect();
        for callback in callbacks {
            callback();
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.disposed.load(Ordering::Acquire)
    }
}

impl VisibilityObserver for ManualBoundary {
    fn observe(&self, marker: BoundaryMarker, callback: BoundaryCallback) {
        if self.disposed.load(Ordering::Acquire) {
            return;
        }
        self.callbacks.lock().push((marker, callback));
    }

    fn dispose(&self) {
        self.disposed.store(true, Ordering::Release);
        self.callbacks.lock().clear();
    }
}
