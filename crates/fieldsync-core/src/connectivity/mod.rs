//! Connectivity monitor.
//!
//! Single source of truth for "is the remote service reachable". Platform
//! adapters feed it through [`ConnectivityMonitor::set_online`]; the sync
//! service watches it through [`ConnectivityMonitor::watch`] and application
//! code subscribes listeners for status indicators.

use std::collections::HashMap;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::watch;

type Listener = Arc<dyn Fn(bool) + Send + Sync>;

struct MonitorInner {
    state: watch::Sender<bool>,
    listeners: Mutex<HashMap<u64, Listener>>,
    next_listener_id: AtomicU64,
}

/// Tracks online/offline state and notifies subscribers on transitions
#[derive(Clone)]
pub struct ConnectivityMonitor {
    inner: Arc<MonitorInner>,
}

impl ConnectivityMonitor {
    /// Create a monitor seeded with the platform's current reachability
    pub fn new(initially_online: bool) -> Self {
        let (state, _) = watch::channel(initially_online);
        Self {
            inner: Arc::new(MonitorInner {
                state,
                listeners: Mutex::new(HashMap::new()),
                next_listener_id: AtomicU64::new(0),
            }),
        }
    }

    /// Last known state
    pub fn is_online(&self) -> bool {
        *self.inner.state.borrow()
    }

    /// Report a platform signal. Returns `true` if this was a transition.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.inner.state.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });

        if changed {
            if online {
                tracing::info!("Connectivity restored");
            } else {
                tracing::info!("Connectivity lost");
            }
            self.notify(online);
        }
        changed
    }

    /// Register `listener`, called with the new state on every transition
    pub fn subscribe<F>(&self, listener: F) -> ListenerHandle
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let id = self.inner.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, Arc::new(listener));

        ListenerHandle {
            id,
            monitor: Arc::downgrade(&self.inner),
        }
    }

    /// Receiver that observes every state change
    pub fn watch(&self) -> watch::Receiver<bool> {
        self.inner.state.subscribe()
    }

    fn listener_count(&self) -> usize {
        self.inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    fn notify(&self, online: bool) {
        // Snapshot first so listeners may (un)subscribe without deadlocking.
        let listeners: Vec<(u64, Listener)> = self
            .inner
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, listener)| (*id, Arc::clone(listener)))
            .collect();

        for (id, listener) in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(online))).is_err() {
                tracing::warn!("Network listener {id} panicked; continuing with remaining listeners");
            }
        }
    }
}

impl std::fmt::Debug for ConnectivityMonitor {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("ConnectivityMonitor")
            .field("online", &self.is_online())
            .field("listeners", &self.listener_count())
            .finish()
    }
}

/// Registration token returned by [`ConnectivityMonitor::subscribe`]
#[must_use = "dropping the handle keeps the listener registered; call unsubscribe() to remove it"]
pub struct ListenerHandle {
    id: u64,
    monitor: Weak<MonitorInner>,
}

impl ListenerHandle {
    /// Remove the listener. Returns `false` if it was already gone.
    pub fn unsubscribe(self) -> bool {
        let Some(monitor) = self.monitor.upgrade() else {
            return false;
        };
        let mut listeners = monitor
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        listeners.remove(&self.id).is_some()
    }
}
