//! services/client/src/app/signal.rs
//!
//! A payload-less, fire-and-forget broadcast channel that lets one view tell
//! the others "the conversation list may be stale" without holding a
//! reference to them.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::debug;

type Listener = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Listeners {
    next_id: AtomicU64,
    entries: Mutex<Vec<(u64, Listener)>>,
}

/// Process-wide "conversations changed" signal.
///
/// `broadcast` calls every listener registered at the time of the call,
/// synchronously and exactly once. Nothing is queued: a listener registered
/// after a broadcast never sees it.
#[derive(Clone, Default)]
pub struct RefreshSignal {
    inner: Arc<Listeners>,
}

impl RefreshSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a listener. It stays registered until the returned
    /// `Subscription` is dropped.
    #[must_use = "dropping the subscription unsubscribes immediately"]
    pub fn subscribe<F>(&self, listener: F) -> Subscription
    where
        F: Fn() + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner.entries.lock().push((id, Arc::new(listener)));
        debug!(listener_id = id, "Refresh listener subscribed");
        Subscription {
            id,
            listeners: Arc::downgrade(&self.inner),
        }
    }

    pub fn broadcast(&self) {
        // Snapshot first so listeners may (un)subscribe while being called.
        let snapshot: Vec<Listener> = self
            .inner
            .entries
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        debug!(listeners = snapshot.len(), "Broadcasting conversation refresh");
        for listener in snapshot {
            listener();
        }
    }

    pub fn listener_count(&self) -> usize {
        self.inner.entries.lock().len()
    }
}

/// Handle for a registered listener; unsubscribes on drop.
pub struct Subscription {
    id: u64,
    listeners: Weak<Listeners>,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(listeners) = self.listeners.upgrade() {
            listeners.entries.lock().retain(|(id, _)| *id != self.id);
            debug!(listener_id = self.id, "Refresh listener unsubscribed");
        }
    }
}
