//! Ordered listener registries with idempotent disposal

use super::types::PriceUpdate;
use crate::telemetry::{increment, CounterMetric};
use parking_lot::Mutex;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

/// Callback receiving every price update
pub type PriceListener = dyn Fn(&str, &PriceUpdate) + Send + Sync;

/// Callback receiving `true` on open and `false` on close
pub type ConnectionListener = dyn Fn(bool) + Send + Sync;

/// Registry storage, shared with the handles it hands out
struct Slots<F: ?Sized> {
    entries: Mutex<Vec<(u64, Arc<F>)>>,
}

trait Detach: Send + Sync {
    fn detach(&self, id: u64) -> bool;
}

impl<F: ?Sized + Send + Sync> Detach for Slots<F> {
    fn detach(&self, id: u64) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(entry_id, _)| *entry_id != id);
        entries.len() != before
    }
}

/// Disposer returned by every listener registration.
///
/// Dropping the handle does not unregister the listener; call
/// [`ListenerHandle::dispose`].
pub struct ListenerHandle {
    id: u64,
    slots: Weak<dyn Detach>,
}

impl ListenerHandle {
    /// Unregister the listener. Returns `false` if it was already gone.
    pub fn dispose(&self) -> bool {
        self.slots
            .upgrade()
            .map(|slots| slots.detach(self.id))
            .unwrap_or(false)
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl fmt::Debug for ListenerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListenerHandle").field("id", &self.id).finish()
    }
}

/// Listeners kept in registration order
pub struct ListenerRegistry<F: ?Sized> {
    name: &'static str,
    slots: Arc<Slots<F>>,
    next_id: AtomicU64,
}

impl<F: ?Sized + Send + Sync + 'static> ListenerRegistry<F> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            slots: Arc::new(Slots {
                entries: Mutex::new(Vec::new()),
            }),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn register(&self, listener: Arc<F>) -> ListenerHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.slots.entries.lock().push((id, listener));

        let slots: Weak<Slots<F>> = Arc::downgrade(&self.slots);
        ListenerHandle { id, slots }
    }

    /// Copy of the current listeners, in registration order
    pub fn snapshot(&self) -> Vec<Arc<F>> {
        self.slots
            .entries
            .lock()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect()
    }

    /// Call every listener on a snapshot of the registry.
    ///
    /// The lock is not held while listeners run, so a listener may dispose
    /// itself or register others. A panicking listener is logged and skipped.
    /// Returns the number of listeners that panicked.
    pub fn dispatch(&self, mut call: impl FnMut(&F)) -> usize {
        let mut panicked = 0;
        for listener in self.snapshot() {
            if catch_unwind(AssertUnwindSafe(|| call(listener.as_ref()))).is_err() {
                panicked += 1;
                increment(CounterMetric::ListenerPanics);
                tracing::error!(registry = self.name, "Listener panicked during dispatch");
            }
        }
        panicked
    }

    pub fn len(&self) -> usize {
        self.slots.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.slots.entries.lock().clear();
    }
}
