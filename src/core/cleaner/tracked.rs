//! Reachability tracking for watched objects.
//!
//! Rust has no tracing collector to report unreachable objects, so watched
//! values live inside a [`Tracked`] handle. When the last strong handle is
//! dropped the value is unreachable, and every cleaner watching it receives a
//! dead signal. The value itself never sees the cleanup logic.

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};

use crossbeam_channel::Sender;
use parking_lot::Mutex;

use super::{Signal, WatchId};

/// Where to report the death of a tracked value.
struct Notifier {
    watch: WatchId,
    tx: Sender<Signal>,
}

pub(super) struct TrackedInner<T> {
    value: T,
    notifiers: Mutex<Vec<Notifier>>,
}

impl<T> Drop for TrackedInner<T> {
    fn drop(&mut self) {
        for notifier in self.notifiers.get_mut().drain(..) {
            // A disconnected cleaner has nothing left to run.
            let _ = notifier.tx.send(Signal::Dead(notifier.watch));
        }
    }
}

/// Shared owning handle to a value that cleaners can watch.
///
/// Behaves like an `Arc<T>`: clones share the value and it is dropped with
/// the last clone. Watches hold only weak references.
///
/// # Examples
///
/// ```
/// use pending_limiter::core::Tracked;
///
/// let conn = Tracked::new(String::from("socket"));
/// let alias = conn.clone();
/// assert_eq!(alias.len(), 6);
/// assert_eq!(Tracked::strong_count(&conn), 2);
/// ```
pub struct Tracked<T> {
    inner: Arc<TrackedInner<T>>,
}

impl<T> Tracked<T> {
    /// Wrap `value` so it can be watched.
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(TrackedInner {
                value,
                notifiers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Number of live strong handles.
    #[must_use]
    pub fn strong_count(this: &Self) -> usize {
        Arc::strong_count(&this.inner)
    }

    /// Whether both handles point at the same value.
    #[must_use]
    pub fn ptr_eq(this: &Self, other: &Self) -> bool {
        Arc::ptr_eq(&this.inner, &other.inner)
    }

    pub(super) fn attach(&self, watch: WatchId, tx: Sender<Signal>) {
        self.inner.notifiers.lock().push(Notifier { watch, tx });
    }

    pub(super) fn downgrade(&self) -> Weak<TrackedInner<T>> {
        Arc::downgrade(&self.inner)
    }

    pub(super) fn from_inner(inner: Arc<TrackedInner<T>>) -> Self {
        Self { inner }
    }
}

impl<T> TrackedInner<T> {
    pub(super) fn detach(&self, watch: WatchId) {
        self.notifiers.lock().retain(|n| n.watch != watch);
    }
}

impl<T> Clone for Tracked<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Deref for Tracked<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner.value
    }
}

impl<T: fmt::Debug> fmt::Debug for Tracked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked")
            .field("value", &self.inner.value)
            .field("watches", &self.inner.notifiers.lock().len())
            .finish()
    }
}
